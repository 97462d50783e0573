//! Turning raw provider payloads into normalized field maps.
//!
//! Each [`MetricFamily`] has a [`PayloadParser`]; the defaults are data-driven
//! [`RuleParser`]s built from the tables in [`families`]. Callers can swap in
//! their own parser per family through [`ParserRegistry::with_parser`].

pub mod classify;
pub mod families;
pub mod rules;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::{FieldMap, MetricFamily};
use rules::{FieldRule, apply_rules};

#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
    /// The payload was not a JSON object (after unwrapping a list)
    UnexpectedShape(&'static str),

    /// No rule matched anything in the payload
    NoRecognizedFields,

    /// Raised by custom parsers
    Invalid(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::UnexpectedShape(kind) => {
                write!(f, "expected a JSON object, got {kind}")
            }
            ParseError::NoRecognizedFields => write!(f, "payload contained no recognized fields"),
            ParseError::Invalid(msg) => write!(f, "invalid payload: {msg}"),
        }
    }
}

impl std::error::Error for ParseError {}

pub trait PayloadParser: Send + Sync {
    fn parse(&self, payload: &Value) -> Result<FieldMap, ParseError>;
}

/// Lists are unwrapped to their first element.
pub fn unwrap_payload(payload: &Value) -> Result<&Value, ParseError> {
    let payload = match payload {
        Value::Array(items) => items.first().ok_or(ParseError::UnexpectedShape("an empty list"))?,
        other => other,
    };

    match payload {
        Value::Object(_) => Ok(payload),
        Value::Null => Err(ParseError::UnexpectedShape("null")),
        Value::Bool(_) => Err(ParseError::UnexpectedShape("a boolean")),
        Value::Number(_) => Err(ParseError::UnexpectedShape("a number")),
        Value::String(_) => Err(ParseError::UnexpectedShape("a string")),
        Value::Array(_) => Err(ParseError::UnexpectedShape("a nested list")),
    }
}

pub struct RuleParser {
    rules: Vec<FieldRule>,
}

impl RuleParser {
    pub fn new(rules: Vec<FieldRule>) -> Self {
        Self { rules }
    }

    pub fn for_family(family: MetricFamily) -> Self {
        Self::new(families::default_rules(family))
    }
}

impl PayloadParser for RuleParser {
    fn parse(&self, payload: &Value) -> Result<FieldMap, ParseError> {
        let payload = unwrap_payload(payload)?;
        let (fields, matched) = apply_rules(&self.rules, payload);
        if !matched {
            return Err(ParseError::NoRecognizedFields);
        }
        Ok(fields)
    }
}

#[derive(Clone)]
pub struct ParserRegistry {
    parsers: HashMap<MetricFamily, Arc<dyn PayloadParser>>,
}

impl ParserRegistry {
    pub fn empty() -> Self {
        Self {
            parsers: HashMap::new(),
        }
    }

    pub fn with_defaults() -> Self {
        MetricFamily::ALL
            .into_iter()
            .fold(Self::empty(), |registry, family| {
                registry.with_parser(family, RuleParser::for_family(family))
            })
    }

    pub fn with_parser(
        mut self,
        family: MetricFamily,
        parser: impl PayloadParser + 'static,
    ) -> Self {
        self.parsers.insert(family, Arc::new(parser));
        self
    }

    pub fn get(&self, family: MetricFamily) -> Option<Arc<dyn PayloadParser>> {
        self.parsers.get(&family).cloned()
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
