//! Method registry
//!
//! Methods wrap a target expression in a new one: rebinding the evaluation
//! index, mapping a sub-context, or providing fallbacks. Field-access tails
//! (`.foo`) lower to path methods through [`path_method`].

use serde_json::Value;

use crate::error::Error;
use crate::parser::ParserError;

use super::functions::walk_path;
use super::{FunctionContext, QueryFn};

fn check_args(pos: usize, args: &[QueryFn], expected: usize) -> Result<(), ParserError> {
    if args.len() != expected {
        return Err(ParserError::message(
            pos,
            format!(
                "expected {} parameters, received: {}",
                expected,
                args.len()
            ),
        ));
    }
    Ok(())
}

fn literal_int(arg: &QueryFn, pos: usize) -> Result<i64, ParserError> {
    match arg.as_literal() {
        Some(Value::Number(n)) if n.is_i64() => Ok(n.as_i64().unwrap()),
        Some(Value::Number(_)) => Err(ParserError::message(
            pos,
            "expected int param, received float64",
        )),
        Some(Value::String(_)) => Err(ParserError::message(
            pos,
            "expected int param, received string",
        )),
        Some(Value::Bool(_)) => Err(ParserError::message(pos, "expected int param, received bool")),
        Some(_) => Err(ParserError::message(pos, "expected int param")),
        None => Err(ParserError::message(pos, "expected int param, received query")),
    }
}

/// Build a method from its parsed name and arguments
///
/// `pos` is the byte position of the method name, used to annotate argument
/// validation errors.
pub fn construct_method(
    target: QueryFn,
    name: &str,
    mut args: Vec<QueryFn>,
    pos: usize,
) -> Result<QueryFn, ParserError> {
    match name {
        "from" => {
            check_args(pos, &args, 1)?;
            let index = literal_int(&args[0], pos)?;
            Ok(QueryFn::dynamic(move |ctx| {
                let rebound = FunctionContext { index, ..*ctx };
                target.exec(&rebound)
            }))
        }
        "from_all" => {
            check_args(pos, &args, 0)?;
            Ok(QueryFn::dynamic(move |ctx| {
                let mut results = Vec::with_capacity(ctx.msg.len());
                for i in 0..ctx.msg.len() {
                    let rebound = FunctionContext {
                        index: i as i64,
                        ..*ctx
                    };
                    results.push(target.exec(&rebound)?);
                }
                Ok(Value::Array(results))
            }))
        }
        "map" => {
            check_args(pos, &args, 1)?;
            let mapped = args.pop().unwrap();
            Ok(map_method(target, mapped))
        }
        "or" => {
            check_args(pos, &args, 1)?;
            let fallback = args.pop().unwrap();
            Ok(or_method(target, fallback))
        }
        "catch" => {
            check_args(pos, &args, 1)?;
            let fallback = args.pop().unwrap();
            Ok(QueryFn::dynamic(move |ctx| match target.exec(ctx) {
                Ok(value) => Ok(value),
                Err(_) => fallback.exec(ctx),
            }))
        }
        "string" => {
            check_args(pos, &args, 0)?;
            Ok(QueryFn::dynamic(move |ctx| {
                Ok(Value::String(super::value_to_string(&target.exec(ctx)?)))
            }))
        }
        "number" => {
            check_args(pos, &args, 0)?;
            Ok(QueryFn::dynamic(move |ctx| {
                match target.exec(ctx)? {
                    Value::Number(n) => Ok(Value::Number(n)),
                    Value::String(s) => {
                        let parsed: f64 = s.parse().map_err(|_| {
                            Error::eval(format!("failed to parse '{s}' as number"))
                        })?;
                        Ok(Value::from(parsed))
                    }
                    other => Err(Error::eval(format!(
                        "expected number, found {other}"
                    ))),
                }
            }))
        }
        "uppercase" => {
            check_args(pos, &args, 0)?;
            Ok(string_transform(target, |s| s.to_uppercase()))
        }
        "lowercase" => {
            check_args(pos, &args, 0)?;
            Ok(string_transform(target, |s| s.to_lowercase()))
        }
        "trim" => {
            check_args(pos, &args, 0)?;
            Ok(string_transform(target, |s| s.trim().to_string()))
        }
        "length" => {
            check_args(pos, &args, 0)?;
            Ok(QueryFn::dynamic(move |ctx| {
                let length = match target.exec(ctx)? {
                    Value::String(s) => s.chars().count(),
                    Value::Array(items) => items.len(),
                    Value::Object(map) => map.len(),
                    other => {
                        return Err(Error::eval(format!(
                            "expected string, array or object, found {other}"
                        )))
                    }
                };
                Ok(Value::from(length as i64))
            }))
        }
        "contains" => {
            check_args(pos, &args, 1)?;
            let needle = args.pop().unwrap();
            Ok(QueryFn::dynamic(move |ctx| {
                let needle = needle.exec(ctx)?;
                let found = match target.exec(ctx)? {
                    Value::String(s) => {
                        s.contains(&super::value_to_string(&needle))
                    }
                    Value::Array(items) => items.iter().any(|item| item == &needle),
                    Value::Object(map) => map.values().any(|item| item == &needle),
                    other => {
                        return Err(Error::eval(format!(
                            "expected string, array or object, found {other}"
                        )))
                    }
                };
                Ok(Value::Bool(found))
            }))
        }
        unknown => Err(ParserError::message(
            pos,
            format!("unrecognised method '{unknown}'"),
        )),
    }
}

/// Apply a pure string transform to the target's stringified result
fn string_transform(
    target: QueryFn,
    transform: impl Fn(&str) -> String + Send + Sync + 'static,
) -> QueryFn {
    QueryFn::dynamic(move |ctx| {
        let value = target.exec(ctx)?;
        Ok(Value::String(transform(&super::value_to_string(&value))))
    })
}

/// Evaluate `mapped` with `this` rebound to the target's result
pub fn map_method(target: QueryFn, mapped: QueryFn) -> QueryFn {
    QueryFn::dynamic(move |ctx| {
        let value = target.exec(ctx)?;
        let sub = FunctionContext {
            value: Some(&value),
            ..*ctx
        };
        mapped.exec(&sub)
    })
}

/// Fall back to an alternative on null or error
pub fn or_method(target: QueryFn, fallback: QueryFn) -> QueryFn {
    QueryFn::dynamic(move |ctx| match target.exec(ctx) {
        Ok(Value::Null) | Err(_) => fallback.exec(ctx),
        Ok(value) => Ok(value),
    })
}

/// Walk one field segment into the target's result, yielding null when the
/// segment is absent or the value is not traversable
pub fn path_method(target: QueryFn, segment: String) -> QueryFn {
    QueryFn::dynamic(move |ctx| {
        let value = target.exec(ctx)?;
        Ok(walk_path(&value, &segment).cloned().unwrap_or(Value::Null))
    })
}

/// Negate the target's boolean result
pub fn not_method(target: QueryFn) -> QueryFn {
    QueryFn::dynamic(move |ctx| match target.exec(ctx)? {
        Value::Bool(b) => Ok(Value::Bool(!b)),
        Value::Null => Ok(Value::Bool(true)),
        other => Err(Error::eval(format!("cannot negate non-boolean value {other}"))),
    })
}
