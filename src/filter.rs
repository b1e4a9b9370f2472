//! Payload filters applied to search candidates.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{VdbError, VdbResult};
use crate::storage::{Payload, PayloadValue};

/// Comparison operator of a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Gt => "gt",
            Self::Ge => "ge",
            Self::Lt => "lt",
            Self::Le => "le",
        }
    }

    fn accepts(&self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => ordering == Ordering::Equal,
            Self::Ne => ordering != Ordering::Equal,
            Self::Gt => ordering == Ordering::Greater,
            Self::Ge => ordering != Ordering::Less,
            Self::Lt => ordering == Ordering::Less,
            Self::Le => ordering != Ordering::Greater,
        }
    }
}

impl FromStr for Operator {
    type Err = VdbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "eq" => Ok(Self::Eq),
            "ne" => Ok(Self::Ne),
            "gt" => Ok(Self::Gt),
            "ge" => Ok(Self::Ge),
            "lt" => Ok(Self::Lt),
            "le" => Ok(Self::Le),
            other => Err(VdbError::InvalidOperator(other.to_string())),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single `field <operator> value` predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub field: String,
    pub operator: Operator,
    pub value: PayloadValue,
}

impl Filter {
    pub fn new(field: impl Into<String>, operator: Operator, value: impl Into<PayloadValue>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }

    /// Builds a filter from an operator name such as `"ge"`.
    pub fn parse(
        field: impl Into<String>,
        operator: &str,
        value: impl Into<PayloadValue>,
    ) -> VdbResult<Self> {
        Ok(Self::new(field, operator.parse()?, value))
    }

    /// Whether `payload` satisfies this filter.
    ///
    /// A missing field never matches. Integers and floats compare
    /// numerically with each other and strings compare lexicographically.
    /// Booleans, arrays and maps only support `eq` and `ne`. Values of
    /// unrelated types are unequal and unordered.
    pub fn evaluate(&self, payload: &Payload) -> bool {
        let Some(actual) = payload.get(&self.field) else {
            return false;
        };

        match compare(actual, &self.value) {
            Some(ordering) => self.operator.accepts(ordering),
            None => match self.operator {
                Operator::Eq => actual == &self.value,
                Operator::Ne => actual != &self.value,
                Operator::Gt | Operator::Ge | Operator::Lt | Operator::Le => false,
            },
        }
    }
}

/// Ordering between two ordered values, `None` when the pair is unordered.
fn compare(actual: &PayloadValue, expected: &PayloadValue) -> Option<Ordering> {
    match (actual, expected) {
        (PayloadValue::Integer(a), PayloadValue::Integer(b)) => Some(a.cmp(b)),
        (PayloadValue::Text(a), PayloadValue::Text(b)) => Some(a.cmp(b)),
        (a, b) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => None,
        },
    }
}

/// `true` when every filter matches (an empty list always matches).
pub fn matches_all(filters: &[Filter], payload: &Payload) -> bool {
    filters.iter().all(|filter| filter.evaluate(payload))
}
