//! Deprecated single-call function syntax
//!
//! The original interpolation dialect invoked functions as `name:arg` with no
//! parentheses (`${!json_field:foo.bar,1}`). These lower to ordinary
//! [`QueryFn`] values in a single pass; evaluation never branches on the
//! dialect except where legacy index defaults require it: without an explicit
//! index argument a legacy-mode evaluation targets the first part of the
//! batch, a modern one targets the part under evaluation.

use serde_json::Value;

use super::functions::{
    content_value, error_value, json_value, meta_value, next_count, unix_timestamp,
};
use super::{FunctionContext, QueryFn};

fn default_index(ctx: &FunctionContext<'_>, explicit: Option<i64>) -> i64 {
    match explicit {
        Some(index) => index,
        None if ctx.legacy => 0,
        None => ctx.index,
    }
}

/// Split a `path,index` argument into its parts
fn split_index_arg(arg: &str) -> (String, Option<i64>) {
    if let Some((head, tail)) = arg.rsplit_once(',') {
        if let Ok(index) = tail.trim().parse::<i64>() {
            return (head.to_string(), Some(index));
        }
    }
    (arg.to_string(), None)
}

/// Lower a deprecated `name:arg` invocation, when the name is recognised
pub(crate) fn parse_deprecated_function(input: &str) -> Option<QueryFn> {
    // The final colon splits name from argument; names never contain colons
    // but arguments may.
    let (name, arg) = match input.rfind(':') {
        Some(i) => (&input[..i], &input[i + 1..]),
        None => (input, ""),
    };
    let arg = arg.to_string();

    let f = match name {
        "echo" => QueryFn::literal(arg),
        "count" => QueryFn::dynamic(move |_| Ok(Value::from(next_count(&arg)))),
        "timestamp_unix_nano" => QueryFn::dynamic(|_| {
            Ok(Value::from(chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0)))
        }),
        "timestamp_unix" => {
            let precision = arg.parse::<i64>().ok();
            QueryFn::dynamic(move |_| Ok(unix_timestamp(precision)))
        }
        "timestamp" | "timestamp_utc" => {
            let utc = name == "timestamp_utc";
            QueryFn::dynamic(move |_| {
                let formatted = if utc {
                    chrono::Utc::now().format("%a %b %-d %H:%M:%S %z UTC %Y").to_string()
                } else {
                    chrono::Local::now().format("%a %b %-d %H:%M:%S %z %Y").to_string()
                };
                Ok(Value::String(formatted))
            })
        }
        "hostname" => QueryFn::dynamic(|_| {
            Ok(Value::String(
                hostname::get()
                    .map(|h| h.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            ))
        }),
        "uuid_v4" => QueryFn::dynamic(|_| Ok(Value::String(uuid::Uuid::new_v4().to_string()))),
        "batch_size" => QueryFn::dynamic(|ctx| Ok(Value::from(ctx.msg.len() as i64))),
        "content" => {
            let index = arg.trim().parse::<i64>().ok();
            QueryFn::dynamic(move |ctx| Ok(content_value(ctx, default_index(ctx, index))))
        }
        "error" => {
            let index = arg.trim().parse::<i64>().ok();
            QueryFn::dynamic(move |ctx| Ok(error_value(ctx, default_index(ctx, index))))
        }
        "metadata" | "meta" => {
            let (key, index) = split_index_arg(&arg);
            QueryFn::dynamic(move |ctx| {
                let key = if key.is_empty() { None } else { Some(key.as_str()) };
                Ok(meta_value(ctx, key, default_index(ctx, index)))
            })
        }
        "metadata_json_object" => {
            let index = arg.trim().parse::<i64>().ok();
            QueryFn::dynamic(move |ctx| Ok(meta_value(ctx, None, default_index(ctx, index))))
        }
        "json_field" => {
            let (path, index) = split_index_arg(&arg);
            QueryFn::dynamic(move |ctx| Ok(json_value(ctx, &path, default_index(ctx, index))))
        }
        _ => return None,
    };
    Some(f)
}
