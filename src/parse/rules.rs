//! Declarative field extraction.
//!
//! A [`FieldRule`] names an output field and an ordered list of
//! [`Extractor`]s; the first extractor yielding a non-null value wins.

use serde_json::Value;

use super::classify::{Rating, Sentiment};
use crate::{FieldMap, FieldValue};

pub type DeriveFn = fn(&Value) -> Option<FieldValue>;

#[derive(Clone, Copy)]
pub enum Extractor {
    /// Number at a JSON pointer; numeric strings are accepted
    Number(&'static str),
    Text(&'static str),
    /// Consensus label at a JSON pointer
    Rating(&'static str),
    /// Sentiment label or score at a JSON pointer
    Sentiment(&'static str),
    /// Computed from the whole payload
    Derived(DeriveFn),
}

impl Extractor {
    pub fn extract(&self, payload: &Value) -> Option<FieldValue> {
        match self {
            Extractor::Number(pointer) => number_at(payload, pointer).map(FieldValue::Number),
            Extractor::Text(pointer) => match payload.pointer(pointer)? {
                Value::String(s) if !s.is_empty() => Some(FieldValue::Text(s.clone())),
                Value::Number(n) => Some(FieldValue::Text(n.to_string())),
                _ => None,
            },
            Extractor::Rating(pointer) => match payload.pointer(pointer)? {
                Value::String(s) => Some(FieldValue::Rating(Rating::from_label(s))),
                _ => None,
            },
            Extractor::Sentiment(pointer) => match payload.pointer(pointer)? {
                Value::String(s) => Some(FieldValue::Sentiment(Sentiment::from_label(s))),
                value => value
                    .as_f64()
                    .map(|score| FieldValue::Sentiment(Sentiment::from_score(score))),
            },
            Extractor::Derived(derive) => derive(payload),
        }
    }
}

/// Numeric value at `pointer`, accepting numbers and numeric strings.
pub fn number_at(payload: &Value, pointer: &str) -> Option<f64> {
    match payload.pointer(pointer)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|n| n.is_finite())
}

/// First non-null number among `pointers`.
pub fn first_number(payload: &Value, pointers: &[&str]) -> Option<f64> {
    pointers.iter().find_map(|p| number_at(payload, p))
}

#[derive(Clone)]
pub struct FieldRule {
    pub field: &'static str,
    pub extractors: Vec<Extractor>,
    pub default: Option<FieldValue>,
}

impl FieldRule {
    pub fn new(field: &'static str) -> Self {
        Self {
            field,
            extractors: Vec::new(),
            default: None,
        }
    }

    /// Number from the first pointer that resolves.
    pub fn number(field: &'static str, pointers: &[&'static str]) -> Self {
        pointers
            .iter()
            .fold(Self::new(field), |rule, p| rule.then(Extractor::Number(*p)))
    }

    pub fn text(field: &'static str, pointers: &[&'static str]) -> Self {
        pointers
            .iter()
            .fold(Self::new(field), |rule, p| rule.then(Extractor::Text(*p)))
    }

    pub fn derived(field: &'static str, derive: DeriveFn) -> Self {
        Self::new(field).then(Extractor::Derived(derive))
    }

    pub fn then(mut self, extractor: Extractor) -> Self {
        self.extractors.push(extractor);
        self
    }

    pub fn or(mut self, default: FieldValue) -> Self {
        self.default = Some(default);
        self
    }

    /// Value found in the payload, ignoring the default.
    pub fn extract(&self, payload: &Value) -> Option<FieldValue> {
        self.extractors.iter().find_map(|e| e.extract(payload))
    }

    pub fn evaluate(&self, payload: &Value) -> Option<FieldValue> {
        self.extract(payload).or_else(|| self.default.clone())
    }
}

/// Apply every rule to `payload`. Returns the field map and whether any rule
/// matched the payload itself (as opposed to falling back to a default).
pub fn apply_rules(rules: &[FieldRule], payload: &Value) -> (FieldMap, bool) {
    let mut fields = FieldMap::new();
    let mut matched = false;

    for rule in rules {
        match rule.extract(payload) {
            Some(value) => {
                matched = true;
                fields.insert(rule.field.to_string(), value);
            }
            None => {
                if let Some(default) = &rule.default {
                    fields.insert(rule.field.to_string(), default.clone());
                }
            }
        }
    }

    (fields, matched)
}
