//! Function registry
//!
//! Functions are constructed at parse time from their name and argument
//! list. Literal arguments are validated up front; dynamic arguments are
//! resolved against the context at evaluation time.

use std::collections::HashMap;
use std::sync::OnceLock;

use parking_lot::Mutex;
use serde_json::{Map, Value};

use crate::error::Error;
use crate::parser::ParserError;

use super::{part_at, value_to_string, FunctionContext, QueryFn};

/// Default timestamp format
const TIMESTAMP_FORMAT: &str = "%a %b %-d %H:%M:%S %z %Y";

/// Default UTC timestamp format
const TIMESTAMP_UTC_FORMAT: &str = "%a %b %-d %H:%M:%S %z UTC %Y";

fn counters() -> &'static Mutex<HashMap<String, i64>> {
    static COUNTERS: OnceLock<Mutex<HashMap<String, i64>>> = OnceLock::new();
    COUNTERS.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Increment and fetch a process-wide counter. Counters start at 1 and reset
/// on process restart; they are not shared across processes.
pub(crate) fn next_count(name: &str) -> i64 {
    let mut counters = counters().lock();
    let entry = counters.entry(name.to_string()).or_insert(0);
    *entry += 1;
    *entry
}

/// The descriptive type name of a literal, used in argument errors
fn literal_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_i64() || n.is_u64() => "int64",
        Value::Number(_) => "float64",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

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

/// A string argument: literal strings validate at parse time, dynamic
/// arguments resolve at evaluation time
#[derive(Clone)]
pub(crate) enum StringArg {
    Static(String),
    Dynamic(QueryFn),
}

impl StringArg {
    pub(crate) fn extract(arg: QueryFn, pos: usize) -> Result<Self, ParserError> {
        match arg.as_literal() {
            Some(Value::String(s)) => Ok(Self::Static(s.clone())),
            Some(other) => Err(ParserError::message(
                pos,
                format!("expected string param, received {}", literal_type_name(other)),
            )),
            None => Ok(Self::Dynamic(arg)),
        }
    }

    pub(crate) fn resolve(&self, ctx: &FunctionContext<'_>) -> Result<String, Error> {
        match self {
            Self::Static(s) => Ok(s.clone()),
            Self::Dynamic(f) => Ok(value_to_string(&f.exec(ctx)?)),
        }
    }
}

fn literal_int(arg: &QueryFn, pos: usize) -> Result<i64, ParserError> {
    match arg.as_literal() {
        Some(Value::Number(n)) if n.is_i64() => Ok(n.as_i64().unwrap()),
        Some(other) => Err(ParserError::message(
            pos,
            format!("expected int param, received {}", literal_type_name(other)),
        )),
        None => Err(ParserError::message(pos, "expected int param, received query")),
    }
}

fn literal_string(arg: &QueryFn, pos: usize) -> Result<String, ParserError> {
    match arg.as_literal() {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(ParserError::message(
            pos,
            format!("expected string param, received {}", literal_type_name(other)),
        )),
        None => Err(ParserError::message(pos, "expected string param, received query")),
    }
}

// ============================================================================
// Part accessors shared with the deprecated function table
// ============================================================================

pub(crate) fn content_value(ctx: &FunctionContext<'_>, index: i64) -> Value {
    match part_at(ctx.msg, index) {
        Some(part) => Value::String(String::from_utf8_lossy(part.data()).into_owned()),
        None => Value::String(String::new()),
    }
}

pub(crate) fn meta_value(ctx: &FunctionContext<'_>, key: Option<&str>, index: i64) -> Value {
    let part = part_at(ctx.msg, index);
    match key {
        Some(key) => {
            let value = part.and_then(|p| p.metadata().get(key)).unwrap_or("");
            Value::String(value.to_string())
        }
        None => {
            let mut object = Map::new();
            if let Some(part) = part {
                for (k, v) in part.metadata().iter() {
                    object.insert(k.to_string(), Value::String(v.to_string()));
                }
            }
            Value::Object(object)
        }
    }
}

pub(crate) fn error_value(ctx: &FunctionContext<'_>, index: i64) -> Value {
    let value = part_at(ctx.msg, index)
        .and_then(|p| p.failed())
        .unwrap_or("");
    Value::String(value.to_string())
}

/// Fetch a JSON document from a part and walk a dotted path. Parse failures
/// and missing paths yield null rather than an error, so fallbacks (`|`)
/// compose naturally.
pub(crate) fn json_value(ctx: &FunctionContext<'_>, path: &str, index: i64) -> Value {
    let Some(part) = part_at(ctx.msg, index) else {
        return Value::Null;
    };
    let Ok(doc) = serde_json::from_slice::<Value>(part.data()) else {
        return Value::Null;
    };
    walk_path(&doc, path).cloned().unwrap_or(Value::Null)
}

/// Walk a dotted path into a value; numeric segments index arrays
pub(crate) fn walk_path<'a>(mut value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }
    for segment in path.split('.') {
        match value {
            Value::Object(map) => value = map.get(segment)?,
            Value::Array(items) => {
                let index: usize = segment.parse().ok()?;
                value = items.get(index)?;
            }
            _ => return None,
        }
    }
    Some(value)
}

// ============================================================================
// Construction
// ============================================================================

/// Build a function from its parsed name and arguments
///
/// `pos` is the byte position of the function name, used to annotate
/// argument validation errors.
pub fn construct_function(
    name: &str,
    mut args: Vec<QueryFn>,
    pos: usize,
) -> Result<QueryFn, ParserError> {
    match name {
        "content" => {
            check_args(pos, &args, 0)?;
            Ok(QueryFn::dynamic(|ctx| Ok(content_value(ctx, ctx.index))))
        }
        "json" => {
            if args.len() > 1 {
                return Err(ParserError::message(
                    pos,
                    format!("expected 1 parameters, received: {}", args.len()),
                ));
            }
            let path = match args.pop() {
                Some(arg) => Some(StringArg::extract(arg, pos)?),
                None => None,
            };
            Ok(QueryFn::dynamic(move |ctx| {
                let path = match &path {
                    Some(arg) => arg.resolve(ctx)?,
                    None => String::new(),
                };
                Ok(json_value(ctx, &path, ctx.index))
            }))
        }
        "meta" => {
            if args.len() > 1 {
                return Err(ParserError::message(
                    pos,
                    format!("expected 1 parameters, received: {}", args.len()),
                ));
            }
            let key = match args.pop() {
                Some(arg) => Some(StringArg::extract(arg, pos)?),
                None => None,
            };
            Ok(QueryFn::dynamic(move |ctx| {
                let key = match &key {
                    Some(arg) => Some(arg.resolve(ctx)?),
                    None => None,
                };
                Ok(meta_value(ctx, key.as_deref(), ctx.index))
            }))
        }
        "error" => {
            check_args(pos, &args, 0)?;
            Ok(QueryFn::dynamic(|ctx| Ok(error_value(ctx, ctx.index))))
        }
        "hostname" => {
            check_args(pos, &args, 0)?;
            Ok(QueryFn::dynamic(|_| {
                let name = hostname::get()
                    .map_err(|e| Error::eval(format!("failed to resolve hostname: {e}")))?;
                Ok(Value::String(name.to_string_lossy().into_owned()))
            }))
        }
        "timestamp" => {
            let format = optional_format(pos, args, TIMESTAMP_FORMAT)?;
            Ok(QueryFn::dynamic(move |_| {
                Ok(Value::String(chrono::Local::now().format(&format).to_string()))
            }))
        }
        "timestamp_utc" => {
            let format = optional_format(pos, args, TIMESTAMP_UTC_FORMAT)?;
            Ok(QueryFn::dynamic(move |_| {
                Ok(Value::String(chrono::Utc::now().format(&format).to_string()))
            }))
        }
        "timestamp_unix" => {
            if args.len() > 1 {
                return Err(ParserError::message(
                    pos,
                    format!("expected 1 parameters, received: {}", args.len()),
                ));
            }
            let precision = match args.pop() {
                Some(arg) => Some(literal_int(&arg, pos)?),
                None => None,
            };
            Ok(QueryFn::dynamic(move |_| Ok(unix_timestamp(precision))))
        }
        "timestamp_unix_nano" => {
            check_args(pos, &args, 0)?;
            Ok(QueryFn::dynamic(|_| {
                Ok(Value::from(chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0)))
            }))
        }
        "uuid_v4" => {
            check_args(pos, &args, 0)?;
            Ok(QueryFn::dynamic(|_| {
                Ok(Value::String(uuid::Uuid::new_v4().to_string()))
            }))
        }
        "count" => {
            check_args(pos, &args, 1)?;
            let name = literal_string(&args[0], pos)?;
            Ok(QueryFn::dynamic(move |_| Ok(Value::from(next_count(&name)))))
        }
        "batch_size" => {
            check_args(pos, &args, 0)?;
            Ok(QueryFn::dynamic(|ctx| Ok(Value::from(ctx.msg.len() as i64))))
        }
        "batch_index" => {
            check_args(pos, &args, 0)?;
            Ok(QueryFn::dynamic(|ctx| Ok(Value::from(ctx.index))))
        }
        "env" => {
            check_args(pos, &args, 1)?;
            let name = literal_string(&args[0], pos)?;
            Ok(QueryFn::dynamic(move |_| {
                Ok(Value::String(std::env::var(&name).unwrap_or_default()))
            }))
        }
        unknown => Err(ParserError::message(
            pos,
            format!("unrecognised function '{unknown}'"),
        )),
    }
}

fn optional_format(
    pos: usize,
    mut args: Vec<QueryFn>,
    default: &str,
) -> Result<String, ParserError> {
    if args.len() > 1 {
        return Err(ParserError::message(
            pos,
            format!("expected 1 parameters, received: {}", args.len()),
        ));
    }
    match args.pop() {
        Some(arg) => literal_string(&arg, pos),
        None => Ok(default.to_string()),
    }
}

pub(crate) fn unix_timestamp(precision: Option<i64>) -> Value {
    let now = chrono::Utc::now();
    match precision {
        Some(precision) => {
            let secs = now.timestamp() as f64
                + f64::from(now.timestamp_subsec_nanos()) / 1_000_000_000.0;
            let precision = precision.max(0) as usize;
            Value::String(format!("{secs:.precision$}"))
        }
        None => Value::from(now.timestamp()),
    }
}

/// Build the function a `$name` variable reference lowers to
pub(crate) fn var_function(name: String) -> QueryFn {
    QueryFn::dynamic(move |ctx| {
        ctx.vars
            .and_then(|vars| vars.get(&name))
            .cloned()
            .ok_or_else(|| Error::eval(format!("variable '{name}' undefined")))
    })
}

/// Build the function a root field path lowers to: `this` yields the context
/// value itself, a path walks into it
pub(crate) fn field_function(path: Option<String>) -> QueryFn {
    QueryFn::dynamic(move |ctx| {
        let root = match ctx.value {
            Some(value) => value,
            None => return Ok(Value::Null),
        };
        match &path {
            Some(path) => Ok(walk_path(root, path).cloned().unwrap_or(Value::Null)),
            None => Ok(root.clone()),
        }
    })
}
