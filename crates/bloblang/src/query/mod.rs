//! Query expression language
//!
//! A parsed expression is a [`QueryFn`]: either a literal value known at
//! parse time, or a dynamic function evaluated against a
//! [`FunctionContext`]. Keeping literals distinguishable lets match cases
//! compare by equality, lets interpolations short-circuit static text, and
//! lets parsers validate literal arguments up front.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use weir_protocol::{Batch, Part};

use crate::error::Error;
use crate::parser::{Input, ParserError};

mod deprecated;
mod functions;
mod methods;
mod parse;

pub use functions::construct_function;
pub use methods::construct_method;
pub use parse::parse_query;

/// Walk a dotted path into a JSON value; numeric segments index arrays
pub fn walk_value<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    functions::walk_path(value, path)
}


/// The state an expression is evaluated against
#[derive(Clone, Copy)]
pub struct FunctionContext<'a> {
    /// Index of the part under evaluation within its batch. May be negative
    /// or out of range after an explicit rebind; part lookups resolve
    /// negative indices from the end of the batch.
    pub index: i64,
    /// The whole batch, so functions can reach sibling parts
    pub msg: &'a Batch,
    /// The current `this` value when a parent established a sub-context
    pub value: Option<&'a Value>,
    /// Whether deprecated-syntax compatibility is in effect
    pub legacy: bool,
    /// Named variables, when the caller provides them
    pub vars: Option<&'a HashMap<String, Value>>,
}

impl<'a> FunctionContext<'a> {
    /// A plain context over a batch part
    pub fn new(index: i64, msg: &'a Batch) -> Self {
        Self {
            index,
            msg,
            value: None,
            legacy: false,
            vars: None,
        }
    }

    /// The part the context points at, resolving negative indices from the
    /// end of the batch
    pub fn part(&self) -> Option<&'a Part> {
        part_at(self.msg, self.index)
    }
}

/// Resolve a possibly-negative index against a batch
pub(crate) fn part_at(msg: &Batch, index: i64) -> Option<&Part> {
    let len = msg.len() as i64;
    let resolved = if index < 0 { len + index } else { index };
    if resolved < 0 {
        return None;
    }
    msg.get(resolved as usize)
}

type DynFn = dyn Fn(&FunctionContext<'_>) -> Result<Value, Error> + Send + Sync;

/// A parsed query expression
#[derive(Clone)]
pub enum QueryFn {
    /// A value fully known at parse time
    Literal(Value),
    /// A function of the evaluation context
    Dynamic(Arc<DynFn>),
}

impl QueryFn {
    /// Wrap a literal value
    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal(value.into())
    }

    /// Wrap an evaluation closure
    pub fn dynamic<F>(f: F) -> Self
    where
        F: Fn(&FunctionContext<'_>) -> Result<Value, Error> + Send + Sync + 'static,
    {
        Self::Dynamic(Arc::new(f))
    }

    /// Evaluate against a context
    pub fn exec(&self, ctx: &FunctionContext<'_>) -> Result<Value, Error> {
        match self {
            Self::Literal(value) => Ok(value.clone()),
            Self::Dynamic(f) => f(ctx),
        }
    }

    /// The literal value, when this expression is static
    pub fn as_literal(&self) -> Option<&Value> {
        match self {
            Self::Literal(value) => Some(value),
            Self::Dynamic(_) => None,
        }
    }
}

impl fmt::Debug for QueryFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
            Self::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

/// Render a value the way expressions stringify: strings pass through raw,
/// everything else is JSON-encoded
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Evaluate an expression and stringify the result
pub fn exec_to_string(f: &QueryFn, ctx: &FunctionContext<'_>) -> Result<String, Error> {
    Ok(value_to_string(&f.exec(ctx)?))
}

/// Evaluate an expression into raw bytes
pub fn exec_to_bytes(f: &QueryFn, ctx: &FunctionContext<'_>) -> Result<Vec<u8>, Error> {
    Ok(exec_to_string(f, ctx)?.into_bytes())
}

/// Parse a complete query expression
///
/// Trailing input is tolerated, mirroring partial parses inside larger
/// documents; use [`parse_exact`] when the whole string must be consumed.
pub fn parse(expr: &str) -> Result<QueryFn, Error> {
    let (f, _) = parse_query(Input::new(expr)).map_err(Error::Parse)?;
    Ok(f)
}

/// Parse a query expression, requiring the whole string to be consumed
pub fn parse_exact(expr: &str) -> Result<QueryFn, Error> {
    let (f, remaining) = parse_query(Input::new(expr)).map_err(Error::Parse)?;
    if !remaining.is_empty() {
        return Err(Error::Parse(ParserError::message(
            remaining.pos(),
            format!(
                "unexpected contents at end of expression: {}",
                remaining.rest()
            ),
        )));
    }
    Ok(f)
}

/// Parse a query expression accepting the deprecated single-call syntax
///
/// The whole input is first matched against the deprecated function table
/// (`name` or `name:arg`), lowering to an ordinary [`QueryFn`] - bare legacy
/// names such as `content` must keep their original meaning rather than
/// resolve as field paths. Anything the table does not recognise parses with
/// the modern grammar, whose result (with its remainder or error) is
/// returned so callers surface accurate positions.
pub fn parse_deprecated(input: Input<'_>) -> crate::parser::PResult<'_, QueryFn> {
    if let Some(f) = deprecated::parse_deprecated_function(input.rest()) {
        let len = input.rest().len();
        return Ok((f, input.advance(len)));
    }
    parse_query(input)
}
