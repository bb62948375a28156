//! Operator registry
//!
//! Maps operator names to factories. A factory validates the argument list
//! once, when a pattern is compiled, and either returns a ready [`Operator`]
//! or a [`ConfigError`] that keeps the pattern from being deployed.
//!
//! Built-in names:
//!
//! | Name | Arguments | Operator |
//! |------|-----------|----------|
//! | `timeLengthWindow` | ttl (ms), capacity: integral constants | [`HybridWindow`] |
//! | `stringMin` | one string attribute | [`StringMinimum`] |
//! | `stringMax` | one string attribute | [`StringMaximum`] |
//! | `stringMedianPick` | one string attribute | [`StringMedianPick`] |
//! | `stringConcat` | one string attribute | [`StringConcatenator`] |
//! | `eventCounter` | any | [`EventCounter`] |
//! | `risingEdgeAnd` | two integral attributes | [`RisingEdgeCorrelator`] |
//! | `stringCompare` | two string attributes | [`StringComparator`] |
//!
//! [`OperatorRegistry::with_namespace`] also registers the namespaced
//! spellings (`vispar:timeLength`, `vispar:stringmin`, `vispar:stringavg`,
//! `vispar:and`, ...) that existing deployments use.

use indexmap::IndexMap;
use tracing::{debug, info};
use vispar_core::{AttributeType, Value};

use crate::aggregation::{
    EventCounter, IncrementalAggregator, StringConcatenator, StringMaximum, StringMedianPick,
    StringMinimum,
};
use crate::config::RegistryConfig;
use crate::correlator::{RisingEdgeCorrelator, StringComparator};
use crate::error::{ConfigError, StateError};
use crate::persistence::{Checkpointable, OperatorCheckpoint};
use crate::window::HybridWindow;

/// One argument of an operator invocation
#[derive(Debug, Clone, PartialEq)]
pub enum OperatorArg {
    /// Reference to a stream attribute with its declared type
    Attribute { name: String, ty: AttributeType },
    /// Literal value
    Constant(Value),
}

impl OperatorArg {
    pub fn attribute(name: impl Into<String>, ty: AttributeType) -> Self {
        OperatorArg::Attribute {
            name: name.into(),
            ty,
        }
    }

    pub fn constant(value: impl Into<Value>) -> Self {
        OperatorArg::Constant(value.into())
    }

    /// Declared domain of the argument. `None` for a null constant.
    pub fn declared_type(&self) -> Option<AttributeType> {
        match self {
            OperatorArg::Attribute { ty, .. } => Some(*ty),
            OperatorArg::Constant(value) => match value {
                Value::Null => None,
                Value::Bool(_) => Some(AttributeType::Bool),
                Value::Int(_) => Some(AttributeType::Long),
                Value::Float(_) => Some(AttributeType::Double),
                Value::Str(_) => Some(AttributeType::Str),
            },
        }
    }

    fn describe(&self) -> String {
        match self.declared_type() {
            Some(ty) => ty.to_string(),
            None => "null".to_string(),
        }
    }
}

/// A validated, ready-to-run operator instance
#[derive(Debug)]
pub enum Operator {
    Window(HybridWindow),
    Minimum(StringMinimum),
    Maximum(StringMaximum),
    MedianPick(StringMedianPick),
    Concat(StringConcatenator),
    Counter(EventCounter),
    Correlator(RisingEdgeCorrelator),
    Comparator(StringComparator),
}

impl Operator {
    /// Same names as [`OperatorState::kind`](crate::persistence::OperatorState::kind).
    pub fn kind(&self) -> &'static str {
        match self {
            Operator::Window(_) => "window",
            Operator::Minimum(_) => "minimum",
            Operator::Maximum(_) => "maximum",
            Operator::MedianPick(_) => "median_pick",
            Operator::Concat(_) => "concat",
            Operator::Counter(_) => "counter",
            Operator::Correlator(_) => "correlator",
            Operator::Comparator(_) => "comparator",
        }
    }

    /// The string aggregator inside, if this is one.
    pub fn as_aggregator_mut(&mut self) -> Option<&mut dyn IncrementalAggregator> {
        match self {
            Operator::Minimum(op) => Some(op),
            Operator::Maximum(op) => Some(op),
            Operator::MedianPick(op) => Some(op),
            Operator::Concat(op) => Some(op),
            _ => None,
        }
    }

    pub fn into_window(self) -> Option<HybridWindow> {
        match self {
            Operator::Window(window) => Some(window),
            _ => None,
        }
    }
}

impl Checkpointable for Operator {
    fn checkpoint(&self) -> OperatorCheckpoint {
        match self {
            Operator::Window(op) => op.checkpoint(),
            Operator::Minimum(op) => op.checkpoint(),
            Operator::Maximum(op) => op.checkpoint(),
            Operator::MedianPick(op) => op.checkpoint(),
            Operator::Concat(op) => op.checkpoint(),
            Operator::Counter(op) => op.checkpoint(),
            Operator::Correlator(op) => op.checkpoint(),
            Operator::Comparator(op) => op.checkpoint(),
        }
    }

    fn restore(&mut self, checkpoint: &OperatorCheckpoint) -> Result<(), StateError> {
        match self {
            Operator::Window(op) => op.restore(checkpoint),
            Operator::Minimum(op) => op.restore(checkpoint),
            Operator::Maximum(op) => op.restore(checkpoint),
            Operator::MedianPick(op) => op.restore(checkpoint),
            Operator::Concat(op) => op.restore(checkpoint),
            Operator::Counter(op) => op.restore(checkpoint),
            Operator::Correlator(op) => op.restore(checkpoint),
            Operator::Comparator(op) => op.restore(checkpoint),
        }
    }
}

/// Builds an operator from its argument list
pub type OperatorFactory = fn(&[OperatorArg]) -> Result<Operator, ConfigError>;

/// Names resolvable under a namespace prefix, paired with their built-in
const NAMESPACED: &[(&str, &str)] = &[
    ("timeLength", "timeLengthWindow"),
    ("stringmin", "stringMin"),
    ("stringmax", "stringMax"),
    ("stringavg", "stringMedianPick"),
    ("stringsum", "stringConcat"),
    ("and", "risingEdgeAnd"),
    ("stringcompare", "stringCompare"),
];

/// Registry of operator factories
#[derive(Debug, Clone, Default)]
pub struct OperatorRegistry {
    factories: IndexMap<String, OperatorFactory>,
    aliases: IndexMap<String, String>,
}

impl OperatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in operator under its plain name.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("timeLengthWindow", time_length_window);
        registry.register("stringMin", string_min);
        registry.register("stringMax", string_max);
        registry.register("stringMedianPick", string_median_pick);
        registry.register("stringConcat", string_concat);
        registry.register("eventCounter", event_counter);
        registry.register("risingEdgeAnd", rising_edge_and);
        registry.register("stringCompare", string_compare);
        registry
    }

    /// Built-ins plus the `<namespace>:` aliases from `config`.
    pub fn with_namespace(config: &RegistryConfig) -> Self {
        let mut registry = Self::with_builtins();
        if !config.namespace.is_empty() {
            for (short, target) in NAMESPACED {
                let alias = format!("{}:{}", config.namespace, short);
                // Targets are the built-ins registered above.
                let _ = registry.register_alias(&alias, target);
            }
        }
        info!(
            operators = registry.factories.len(),
            aliases = registry.aliases.len(),
            namespace = %config.namespace,
            "operator registry ready"
        );
        registry
    }

    pub fn register(&mut self, name: &str, factory: OperatorFactory) {
        debug!(name, "registering operator");
        self.factories.insert(name.to_string(), factory);
    }

    /// Make `alias` resolve to the registered operator `target`.
    pub fn register_alias(&mut self, alias: &str, target: &str) -> Result<(), ConfigError> {
        let target = self.resolve(target)?.to_string();
        debug!(alias, target = %target, "registering operator alias");
        self.aliases.insert(alias.to_string(), target);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.resolve(name).is_ok()
    }

    /// Registered names, built-ins first, then aliases.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories
            .keys()
            .chain(self.aliases.keys())
            .map(String::as_str)
    }

    /// Validate `args` and build the operator registered as `name`.
    pub fn create(&self, name: &str, args: &[OperatorArg]) -> Result<Operator, ConfigError> {
        let canonical = self.resolve(name)?;
        let factory = self
            .factories
            .get(canonical)
            .ok_or_else(|| ConfigError::UnknownOperator(name.to_string()))?;
        let operator = factory(args)?;
        debug!(name, kind = operator.kind(), "operator created");
        Ok(operator)
    }

    fn resolve<'a>(&'a self, name: &'a str) -> Result<&'a str, ConfigError> {
        if self.factories.contains_key(name) {
            return Ok(name);
        }
        self.aliases
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| ConfigError::UnknownOperator(name.to_string()))
    }
}

// =============================================================================
// Argument validation
// =============================================================================

fn expect_arity(operator: &str, args: &[OperatorArg], expected: usize) -> Result<(), ConfigError> {
    if args.len() != expected {
        return Err(ConfigError::arity(operator, expected, args.len()));
    }
    Ok(())
}

fn expect_string(operator: &str, args: &[OperatorArg], index: usize) -> Result<(), ConfigError> {
    match args[index].declared_type() {
        Some(AttributeType::Str) => Ok(()),
        _ => Err(ConfigError::argument_type(
            operator,
            index,
            AttributeType::Str.to_string(),
            args[index].describe(),
        )),
    }
}

fn expect_integral(operator: &str, args: &[OperatorArg], index: usize) -> Result<(), ConfigError> {
    match args[index].declared_type() {
        Some(ty) if ty.is_integral() => Ok(()),
        _ => Err(ConfigError::argument_type(
            operator,
            index,
            "int or long",
            args[index].describe(),
        )),
    }
}

fn integral_constant(
    operator: &str,
    args: &[OperatorArg],
    index: usize,
) -> Result<i64, ConfigError> {
    match &args[index] {
        OperatorArg::Constant(Value::Int(n)) => Ok(*n),
        other => Err(ConfigError::argument_type(
            operator,
            index,
            "integral constant",
            match other {
                OperatorArg::Attribute { name, .. } => format!("attribute {name}"),
                constant => constant.describe(),
            },
        )),
    }
}

fn single_string(operator: &str, args: &[OperatorArg]) -> Result<(), ConfigError> {
    expect_arity(operator, args, 1)?;
    expect_string(operator, args, 0)
}

// =============================================================================
// Built-in factories
// =============================================================================

fn time_length_window(args: &[OperatorArg]) -> Result<Operator, ConfigError> {
    const NAME: &str = "timeLengthWindow";
    expect_arity(NAME, args, 2)?;
    let ttl_ms = integral_constant(NAME, args, 0)?;
    let capacity = integral_constant(NAME, args, 1)?;
    let capacity = usize::try_from(capacity).map_err(|_| {
        ConfigError::bound(NAME, format!("capacity must be at least 1, got {capacity}"))
    })?;
    Ok(Operator::Window(HybridWindow::new(capacity, ttl_ms)?))
}

fn string_min(args: &[OperatorArg]) -> Result<Operator, ConfigError> {
    single_string("stringMin", args)?;
    Ok(Operator::Minimum(StringMinimum::new()))
}

fn string_max(args: &[OperatorArg]) -> Result<Operator, ConfigError> {
    single_string("stringMax", args)?;
    Ok(Operator::Maximum(StringMaximum::new()))
}

fn string_median_pick(args: &[OperatorArg]) -> Result<Operator, ConfigError> {
    single_string("stringMedianPick", args)?;
    Ok(Operator::MedianPick(StringMedianPick::new()))
}

fn string_concat(args: &[OperatorArg]) -> Result<Operator, ConfigError> {
    single_string("stringConcat", args)?;
    Ok(Operator::Concat(StringConcatenator::new()))
}

fn event_counter(_args: &[OperatorArg]) -> Result<Operator, ConfigError> {
    Ok(Operator::Counter(EventCounter::new()))
}

fn rising_edge_and(args: &[OperatorArg]) -> Result<Operator, ConfigError> {
    let name = RisingEdgeCorrelator::NAME;
    expect_arity(name, args, 2)?;
    expect_integral(name, args, 0)?;
    expect_integral(name, args, 1)?;
    Ok(Operator::Correlator(RisingEdgeCorrelator::new()))
}

fn string_compare(args: &[OperatorArg]) -> Result<Operator, ConfigError> {
    let name = StringComparator::NAME;
    expect_arity(name, args, 2)?;
    expect_string(name, args, 0)?;
    expect_string(name, args, 1)?;
    Ok(Operator::Comparator(StringComparator::new()))
}
