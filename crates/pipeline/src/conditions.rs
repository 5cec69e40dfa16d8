//! Condition implementations
//!
//! Conditions gate batch policies and conditional processors. They are
//! deliberately read-only over the batch: structured access re-parses part
//! content rather than touching the part's JSON cache.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use weir_bloblang::field;
use weir_bloblang::query::{self, FunctionContext, QueryFn};
use weir_protocol::{Batch, Condition, Part};

#[cfg(test)]
#[path = "conditions_test.rs"]
mod tests;

/// Comparison applied by a [`Text`] condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextOperator {
    Equals,
    EqualsCs,
    Contains,
    ContainsCs,
    Prefix,
    PrefixCs,
    Suffix,
    SuffixCs,
}

impl TextOperator {
    fn matches(self, content: &str, arg: &str) -> bool {
        match self {
            Self::EqualsCs => content == arg,
            Self::Equals => content.eq_ignore_ascii_case(arg),
            Self::ContainsCs => content.contains(arg),
            Self::Contains => content.to_ascii_lowercase().contains(&arg.to_ascii_lowercase()),
            Self::PrefixCs => content.starts_with(arg),
            Self::Prefix => content
                .to_ascii_lowercase()
                .starts_with(&arg.to_ascii_lowercase()),
            Self::SuffixCs => content.ends_with(arg),
            Self::Suffix => content
                .to_ascii_lowercase()
                .ends_with(&arg.to_ascii_lowercase()),
        }
    }
}

/// Tests the content of one part against a string operator
pub struct Text {
    operator: TextOperator,
    arg: String,
    part: i64,
}

impl Text {
    /// Create a text condition over the indexed part (negative counts from
    /// the end)
    pub fn new(operator: TextOperator, arg: impl Into<String>, part: i64) -> Self {
        Self {
            operator,
            arg: arg.into(),
            part,
        }
    }
}

impl Condition for Text {
    fn check(&self, batch: &Batch) -> bool {
        let len = batch.len() as i64;
        let index = if self.part < 0 { len + self.part } else { self.part };
        if index < 0 {
            return false;
        }
        let Some(part) = batch.get(index as usize) else {
            return false;
        };
        let content = String::from_utf8_lossy(part.data());
        self.operator.matches(&content, &self.arg)
    }
}

/// Counts checks, yielding true for the first N-1 of every N
///
/// Used to sample or split streams by volume: with `arg` of 3 the condition
/// resolves true, true, false, repeating.
pub struct Count {
    arg: u64,
    state: Mutex<u64>,
}

impl Count {
    /// Create a count condition that fires false every `arg` checks
    pub fn new(arg: u64) -> Self {
        Self {
            arg,
            state: Mutex::new(0),
        }
    }
}

impl Condition for Count {
    fn check(&self, _batch: &Batch) -> bool {
        let mut count = self.state.lock();
        *count += 1;
        if *count >= self.arg {
            *count = 0;
            return false;
        }
        true
    }
}

/// Always resolves to a fixed value
pub struct Static(pub bool);

impl Condition for Static {
    fn check(&self, _batch: &Batch) -> bool {
        self.0
    }
}

/// Evaluates a query expression against the first part, matching on a
/// boolean true result
pub struct BloblangCondition {
    expr: QueryFn,
}

impl BloblangCondition {
    /// Parse the expression, failing at configuration time when malformed
    pub fn new(expr: &str) -> weir_bloblang::Result<Self> {
        Ok(Self {
            expr: query::parse_exact(expr)?,
        })
    }
}

impl Condition for BloblangCondition {
    fn check(&self, batch: &Batch) -> bool {
        let ctx = FunctionContext::new(0, batch);
        matches!(self.expr.exec(&ctx), Ok(Value::Bool(true)))
    }
}

/// Extracts a JSON path from the first part and applies a child condition to
/// the extracted value
pub struct CheckField {
    path: String,
    child: Arc<dyn Condition>,
}

impl CheckField {
    /// Create a check over a dotted JSON path
    pub fn new(path: impl Into<String>, child: Arc<dyn Condition>) -> Self {
        Self {
            path: path.into(),
            child,
        }
    }
}

impl Condition for CheckField {
    fn check(&self, batch: &Batch) -> bool {
        let Some(part) = batch.get(0) else {
            return false;
        };
        let Ok(doc) = serde_json::from_slice::<Value>(part.data()) else {
            return false;
        };
        let Some(value) = query::walk_value(&doc, &self.path) else {
            return false;
        };
        let derived = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        self.child.check(&Batch::from_parts(vec![Part::from(derived.as_str())]))
    }
}

/// Resolves an interpolated string and applies a child condition to the
/// result
pub struct CheckInterpolation {
    value: field::Expression,
    child: Arc<dyn Condition>,
}

impl CheckInterpolation {
    /// Parse the interpolated value, failing at configuration time when
    /// malformed
    pub fn new(value: &str, child: Arc<dyn Condition>) -> weir_bloblang::Result<Self> {
        Ok(Self {
            value: field::parse(value)?,
            child,
        })
    }
}

impl Condition for CheckInterpolation {
    fn check(&self, batch: &Batch) -> bool {
        let resolved = match self.value.try_resolve_string(0, batch, false) {
            Ok(resolved) => resolved,
            Err(_) => return false,
        };
        self.child
            .check(&Batch::from_parts(vec![Part::from(resolved.as_str())]))
    }
}
