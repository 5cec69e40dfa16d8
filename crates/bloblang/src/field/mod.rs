//! Field interpolation
//!
//! Configuration strings may embed query expressions: `${!expr}` evaluates
//! `expr` against the current part and substitutes the result, while
//! `${{!expr}}` escapes to the literal text `${!expr}`. Everything else
//! passes through unchanged.
//!
//! A fully static expression (no query fragments) resolves without touching
//! the message at all. A runtime evaluation failure marks the part's fail
//! flag with the error text and the whole expression resolves to an empty
//! string for that part; sibling parts are unaffected.

use bytes::Bytes;

use weir_protocol::Batch;

use crate::error::Error;
use crate::parser::{Input, PResult, ParserError};
use crate::query::{self, exec_to_string, FunctionContext, QueryFn};

#[cfg(test)]
#[path = "field_test.rs"]
mod tests;

/// One fragment of an interpolated string
#[derive(Debug)]
enum Resolver {
    Static(String),
    Query(QueryFn),
}

/// A parsed interpolated string
#[derive(Debug)]
pub struct Expression {
    resolvers: Vec<Resolver>,
    static_value: Option<String>,
}

/// Parse an interpolated configuration string
///
/// Fails at configuration time when an embedded `${!...}` expression is
/// malformed, annotated with the byte position of the fault.
pub fn parse(expr: &str) -> Result<Expression, Error> {
    let mut resolvers = Vec::new();
    let mut input = Input::new(expr);

    while !input.is_empty() {
        let (resolver, next) = parse_fragment(input).map_err(Error::Parse)?;
        resolvers.push(resolver);
        input = next;
    }

    let static_value = resolvers
        .iter()
        .all(|r| matches!(r, Resolver::Static(_)))
        .then(|| {
            resolvers
                .iter()
                .map(|r| match r {
                    Resolver::Static(s) => s.as_str(),
                    Resolver::Query(_) => unreachable!(),
                })
                .collect::<String>()
        });

    Ok(Expression {
        resolvers,
        static_value,
    })
}

fn parse_fragment(input: Input<'_>) -> PResult<'_, Resolver> {
    let rest = input.rest();

    // Escape block: ${{!expr}} lowers to the literal text ${!expr}.
    if let Some(inner) = rest.strip_prefix("${{!") {
        return Ok(match inner.find("}}") {
            Some(end) => (
                Resolver::Static(format!("${{!{}}}", &inner[..end])),
                input.advance(4 + end + 2),
            ),
            // An unterminated escape is plain text.
            None => (Resolver::Static(rest.to_string()), input.advance(rest.len())),
        });
    }

    // Query block: ${!expr}
    if rest.starts_with("${!") {
        let Some(end) = rest[3..].find('}') else {
            // An unterminated block is plain text.
            return Ok((Resolver::Static(rest.to_string()), input.advance(rest.len())));
        };
        let inner = &rest[3..3 + end];
        let offset = input.pos() + 3;
        return match query::parse_deprecated(Input::new(inner)) {
            Ok((f, remaining)) if remaining.is_empty() => {
                Ok((Resolver::Query(f), input.advance(3 + end + 1)))
            }
            Ok((_, remaining)) => Err(ParserError::message(
                offset + remaining.pos(),
                format!(
                    "unexpected contents at end of expression: {}",
                    remaining.rest()
                ),
            )),
            Err(err) => Err(ParserError {
                pos: offset + err.pos,
                kind: err.kind,
            }),
        };
    }

    // A lone dollar that opens no block is plain text.
    if rest.starts_with('$') {
        return Ok((Resolver::Static("$".to_string()), input.advance(1)));
    }

    match crate::parser::not_char(input, '$') {
        Ok((text, next)) => Ok((Resolver::Static(text), next)),
        Err(err) => Err(err),
    }
}

/// JSON-string escape bytes so they can be embedded inside a JSON scalar
fn escape_bytes(input: &str) -> String {
    let quoted = serde_json::to_string(input).unwrap_or_default();
    if quoted.len() < 2 {
        return input.to_string();
    }
    quoted[1..quoted.len() - 1].to_string()
}

impl Expression {
    /// Whether the expression contains no query fragments
    pub fn is_static(&self) -> bool {
        self.static_value.is_some()
    }

    fn resolve_fragments(
        &self,
        index: usize,
        msg: &Batch,
        escaped: bool,
        legacy: bool,
    ) -> Result<String, Error> {
        let mut out = String::new();
        for resolver in &self.resolvers {
            match resolver {
                Resolver::Static(s) => out.push_str(s),
                Resolver::Query(f) => {
                    let ctx = FunctionContext {
                        index: index as i64,
                        msg,
                        value: None,
                        legacy,
                        vars: None,
                    };
                    let fragment = exec_to_string(f, &ctx)?;
                    if escaped {
                        out.push_str(&escape_bytes(&fragment));
                    } else {
                        out.push_str(&fragment);
                    }
                }
            }
        }
        Ok(out)
    }

    /// Resolve against a part without mutating the message; evaluation
    /// failures surface as errors
    pub fn try_resolve_string(
        &self,
        index: usize,
        msg: &Batch,
        legacy: bool,
    ) -> Result<String, Error> {
        if let Some(s) = &self.static_value {
            return Ok(s.clone());
        }
        self.resolve_fragments(index, msg, false, legacy)
    }

    /// Resolve against a part into a string
    ///
    /// A runtime evaluation failure sets the part's fail flag with the error
    /// text and yields an empty string.
    pub fn resolve_string(&self, index: usize, msg: &mut Batch, legacy: bool) -> String {
        if let Some(s) = &self.static_value {
            return s.clone();
        }
        match self.resolve_fragments(index, msg, false, legacy) {
            Ok(s) => s,
            Err(err) => {
                if let Some(part) = msg.get_mut(index) {
                    part.set_failed(err.to_string());
                }
                String::new()
            }
        }
    }

    /// Resolve against a part into bytes
    ///
    /// When `escaped` is set, query fragments are JSON-string escaped so the
    /// result stays valid when embedded inside a JSON scalar.
    pub fn resolve_bytes(
        &self,
        index: usize,
        msg: &mut Batch,
        escaped: bool,
        legacy: bool,
    ) -> Bytes {
        if let Some(s) = &self.static_value {
            return Bytes::from(s.clone());
        }
        match self.resolve_fragments(index, msg, escaped, legacy) {
            Ok(s) => Bytes::from(s),
            Err(err) => {
                if let Some(part) = msg.get_mut(index) {
                    part.set_failed(err.to_string());
                }
                Bytes::new()
            }
        }
    }
}
