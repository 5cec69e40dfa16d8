//! Expression parser
//!
//! Grammar sketch:
//!
//! ```text
//! query    = operand (op operand)*
//! operand  = "!"? primary tail*
//! primary  = match | function | "(" query ")" | literal | array | object
//!          | variable | field-path
//! tail     = "." (method-call | "(" query ")" | field-segment)
//! match    = "match" query? "{" case ("," | newline case)* "}"
//! ```
//!
//! Operators follow conventional precedence; `|` (fallback on null or error)
//! binds loosest. Comments run from `#` to end of line and are permitted
//! wherever line breaks are.

use serde_json::{Map, Value};

use crate::error::Error;
use crate::parser::{
    boolean, char_p, char_run, discard_spaces, discard_whitespace, must_be, newline_allow_comment,
    null_literal, number, one_of, optional, quoted_string, snake_case, term, Input, PResult,
    ParserError,
};

use super::functions::{field_function, var_function};
use super::methods::{map_method, not_method, or_method, path_method};
use super::{construct_function, construct_method, FunctionContext, QueryFn};

/// Parse a query expression at the cursor, leaving trailing input unconsumed
pub fn parse_query(input: Input<'_>) -> PResult<'_, QueryFn> {
    let input = discard_spaces(input);
    let (first, mut input) = parse_operand(input)?;
    let mut operands = vec![first];
    let mut ops = Vec::new();

    loop {
        let at_op = discard_spaces(input);
        let Some((op, after_op)) = parse_op(at_op) else {
            break;
        };
        let after_op = discard_whitespace(after_op);
        let (operand, next) = parse_operand(after_op)?;
        ops.push(op);
        operands.push(operand);
        input = next;
    }

    Ok((resolve_ops(operands, ops), input))
}

// ============================================================================
// Operators
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Pipe,
    Or,
    And,
    Eq,
    Neq,
    Gte,
    Lte,
    Gt,
    Lt,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

fn parse_op(input: Input<'_>) -> Option<(Op, Input<'_>)> {
    const TABLE: &[(&str, Op)] = &[
        ("==", Op::Eq),
        ("!=", Op::Neq),
        (">=", Op::Gte),
        ("<=", Op::Lte),
        ("&&", Op::And),
        ("||", Op::Or),
        (">", Op::Gt),
        ("<", Op::Lt),
        ("+", Op::Add),
        ("-", Op::Sub),
        ("*", Op::Mul),
        ("/", Op::Div),
        ("%", Op::Mod),
        ("|", Op::Pipe),
    ];
    for (token, op) in TABLE {
        if input.rest().starts_with(token) {
            return Some((*op, input.advance(token.len())));
        }
    }
    None
}

fn precedence(op: Op) -> u8 {
    match op {
        Op::Pipe => 1,
        Op::Or => 2,
        Op::And => 3,
        Op::Eq | Op::Neq | Op::Gt | Op::Lt | Op::Gte | Op::Lte => 4,
        Op::Add | Op::Sub => 5,
        Op::Mul | Op::Div | Op::Mod => 6,
    }
}

/// Reduce an operand/operator chain, combining the highest-precedence
/// (leftmost among equals) operator first
fn resolve_ops(mut operands: Vec<QueryFn>, mut ops: Vec<Op>) -> QueryFn {
    while !ops.is_empty() {
        let mut best = 0;
        for i in 1..ops.len() {
            if precedence(ops[i]) > precedence(ops[best]) {
                best = i;
            }
        }
        let rhs = operands.remove(best + 1);
        let lhs = operands[best].clone();
        operands[best] = apply_op(ops.remove(best), lhs, rhs);
    }
    operands.pop().expect("operand chain is never empty")
}

fn apply_op(op: Op, lhs: QueryFn, rhs: QueryFn) -> QueryFn {
    match op {
        Op::Pipe => or_method(lhs, rhs),
        Op::And => QueryFn::dynamic(move |ctx| {
            if !truthy(&lhs.exec(ctx)?)? {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(truthy(&rhs.exec(ctx)?)?))
        }),
        Op::Or => QueryFn::dynamic(move |ctx| {
            if truthy(&lhs.exec(ctx)?)? {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(truthy(&rhs.exec(ctx)?)?))
        }),
        op => QueryFn::dynamic(move |ctx| arith(op, lhs.exec(ctx)?, rhs.exec(ctx)?)),
    }
}

fn truthy(value: &Value) -> Result<bool, Error> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Null => Ok(false),
        other => Err(Error::eval(format!("expected bool value, found {other}"))),
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    if let (Value::Number(x), Value::Number(y)) = (a, b) {
        return x.as_f64() == y.as_f64();
    }
    a == b
}

fn arith(op: Op, a: Value, b: Value) -> Result<Value, Error> {
    match op {
        Op::Eq => return Ok(Value::Bool(values_equal(&a, &b))),
        Op::Neq => return Ok(Value::Bool(!values_equal(&a, &b))),
        Op::Gt | Op::Lt | Op::Gte | Op::Lte => {
            let result = match (&a, &b) {
                (Value::Number(x), Value::Number(y)) => {
                    compare(op, x.as_f64().unwrap_or(f64::NAN), y.as_f64().unwrap_or(f64::NAN))
                }
                (Value::String(x), Value::String(y)) => match op {
                    Op::Gt => x > y,
                    Op::Lt => x < y,
                    Op::Gte => x >= y,
                    Op::Lte => x <= y,
                    _ => unreachable!(),
                },
                _ => false,
            };
            return Ok(Value::Bool(result));
        }
        _ => {}
    }

    // Arithmetic short-circuits on null operands.
    if a.is_null() || b.is_null() {
        return Ok(Value::Null);
    }

    if let (Op::Add, Value::String(x), Value::String(y)) = (op, &a, &b) {
        return Ok(Value::String(format!("{x}{y}")));
    }

    let (Value::Number(x), Value::Number(y)) = (&a, &b) else {
        return Err(Error::eval(format!("cannot apply operator to {a} and {b}")));
    };

    if let (Some(x), Some(y)) = (x.as_i64(), y.as_i64()) {
        let result = match op {
            Op::Add => Some(Value::from(x + y)),
            Op::Sub => Some(Value::from(x - y)),
            Op::Mul => Some(Value::from(x * y)),
            Op::Mod if y != 0 => Some(Value::from(x % y)),
            Op::Mod => return Err(Error::eval("modulo by zero")),
            Op::Div if y != 0 && x % y == 0 => Some(Value::from(x / y)),
            _ => None,
        };
        if let Some(result) = result {
            return Ok(result);
        }
    }

    let (x, y) = (
        x.as_f64().unwrap_or(f64::NAN),
        y.as_f64().unwrap_or(f64::NAN),
    );
    let result = match op {
        Op::Add => x + y,
        Op::Sub => x - y,
        Op::Mul => x * y,
        Op::Div if y != 0.0 => x / y,
        Op::Div => return Err(Error::eval("division by zero")),
        Op::Mod => return Err(Error::eval("modulo of non-integer values")),
        _ => unreachable!(),
    };
    Ok(Value::from(result))
}

fn compare(op: Op, x: f64, y: f64) -> bool {
    match op {
        Op::Gt => x > y,
        Op::Lt => x < y,
        Op::Gte => x >= y,
        Op::Lte => x <= y,
        _ => unreachable!(),
    }
}

// ============================================================================
// Operands and tails
// ============================================================================

fn parse_operand(input: Input<'_>) -> PResult<'_, QueryFn> {
    let (negated, input) = match char_p(input, '!') {
        Ok((_, next)) => (true, discard_spaces(next)),
        Err(_) => (false, input),
    };

    let (mut f, mut input) = parse_primary(input)?;

    loop {
        let Ok((_, after_dot)) = char_p(input, '.') else {
            break;
        };
        let mut tail_input = after_dot;
        if let Ok(((), next)) = newline_allow_comment(tail_input) {
            tail_input = discard_spaces(next);
        }
        match parse_tail(f.clone(), tail_input) {
            Ok((next_f, next)) => {
                f = next_f;
                input = next;
            }
            Err(err) => return Err(err.into_required()),
        }
    }

    if negated {
        f = not_method(f);
    }
    Ok((f, input))
}

fn parse_tail(target: QueryFn, input: Input<'_>) -> PResult<'_, QueryFn> {
    // Bracketed sub-context: .(expr)
    match char_p(input, '(') {
        Ok((_, after)) => {
            let after = discard_whitespace(after);
            let (sub, after) = parse_query(after)?;
            let after = discard_whitespace(after);
            let (_, next) = char_p(after, ')')?;
            return Ok((map_method(target, sub), next));
        }
        Err(err) if !err.is_recoverable() => return Err(err),
        Err(_) => {}
    }

    // Method invocation: .name(args)
    if let Ok((name, after_name)) = snake_case(input) {
        match parse_call_args(after_name) {
            Ok((args, next)) => {
                let method = construct_method(target.clone(), &name, args, input.pos())?;
                return Ok((method, next));
            }
            Err(err) if !err.is_recoverable() => return Err(err),
            Err(_) => {}
        }
    }

    // Plain field access: .segment
    let (segment, next) = parse_path_segment(input).map_err(|_| ParserError {
        pos: input.pos(),
        kind: crate::parser::ErrorKind::Expected(vec![
            "method".to_string(),
            "field-path".to_string(),
        ]),
    })?;
    Ok((path_method(target, segment), next))
}

fn parse_path_segment(input: Input<'_>) -> PResult<'_, String> {
    char_run(input, |c| {
        c.is_ascii_alphanumeric() || matches!(c, '_' | '~' | '*' | '+')
    })
    .map_err(|e| e.relabel("field-path"))
}

// ============================================================================
// Primaries
// ============================================================================

fn parse_primary(input: Input<'_>) -> PResult<'_, QueryFn> {
    one_of(
        input,
        &[
            &parse_match,
            &parse_function,
            &parse_brackets,
            &parse_bool_lit,
            &parse_number_lit,
            &parse_string_lit,
            &parse_null_lit,
            &parse_array_lit,
            &parse_object_lit,
            &parse_variable,
            &parse_field_root,
        ],
    )
}

fn parse_bool_lit(input: Input<'_>) -> PResult<'_, QueryFn> {
    boolean(input).map(|(v, next)| (QueryFn::Literal(v), next))
}

fn parse_number_lit(input: Input<'_>) -> PResult<'_, QueryFn> {
    number(input).map(|(v, next)| (QueryFn::Literal(v), next))
}

fn parse_string_lit(input: Input<'_>) -> PResult<'_, QueryFn> {
    quoted_string(input).map(|(s, next)| (QueryFn::Literal(Value::String(s)), next))
}

fn parse_null_lit(input: Input<'_>) -> PResult<'_, QueryFn> {
    null_literal(input).map(|(v, next)| (QueryFn::Literal(v), next))
}

fn parse_variable(input: Input<'_>) -> PResult<'_, QueryFn> {
    let (_, after) = char_p(input, '$').map_err(|e| e.relabel("variable-path"))?;
    let (name, next) = char_run(after, |c| {
        c.is_ascii_alphanumeric() || c == '_' || c == '-'
    })
    .map_err(|e| e.relabel("variable-path"))?;
    Ok((var_function(name), next))
}

fn parse_field_root(input: Input<'_>) -> PResult<'_, QueryFn> {
    let (path, next) = parse_path_segment(input)?;
    let f = if path == "this" {
        field_function(None)
    } else {
        field_function(Some(path))
    };
    Ok((f, next))
}

fn parse_brackets(input: Input<'_>) -> PResult<'_, QueryFn> {
    let (_, after) = char_p(input, '(').map_err(|e| e.relabel("function"))?;
    let after = discard_whitespace(after);
    let (sub, after) = parse_query(after)?;
    let after = discard_whitespace(after);
    let (_, next) = char_p(after, ')')?;
    Ok((sub, next))
}

fn parse_function(input: Input<'_>) -> PResult<'_, QueryFn> {
    let (name, after_name) = snake_case(input).map_err(|e| e.relabel("function"))?;
    let (args, next) = parse_call_args(after_name)?;
    let f = construct_function(&name, args, input.pos())?;
    Ok((f, next))
}

/// Parse a parenthesised argument list. A missing open bracket is a
/// recoverable "function-parameters" failure so alternatives (field paths)
/// may still match; a malformed argument inside the brackets is hard.
fn parse_call_args(input: Input<'_>) -> PResult<'_, Vec<QueryFn>> {
    fn start(i: Input<'_>) -> PResult<'_, ()> {
        let (_, next) = char_p(i, '(').map_err(|e| e.relabel("function-parameters"))?;
        Ok(((), discard_whitespace(next)))
    }
    fn element(i: Input<'_>) -> PResult<'_, QueryFn> {
        must_be(parse_arg(i))
    }
    fn delim(i: Input<'_>) -> PResult<'_, ()> {
        let i = discard_spaces(i);
        let (_, next) = char_p(i, ',')?;
        Ok(((), discard_whitespace(next)))
    }
    fn stop(i: Input<'_>) -> PResult<'_, ()> {
        let i = discard_whitespace(i);
        let (_, next) = char_p(i, ')')?;
        Ok(((), next))
    }
    crate::parser::delimited_pattern(input, &start, &element, &delim, &stop, false)
}

/// The alternatives reported when an argument fails to parse, literals first
const ARG_EXPECTED: &[&str] = &[
    "boolean",
    "number",
    "quoted-string",
    "match",
    "function",
    "null",
    "array",
    "object",
    "variable-path",
    "field-path",
];

fn parse_arg(input: Input<'_>) -> PResult<'_, QueryFn> {
    parse_query(input).map_err(|err| {
        if err.is_recoverable() {
            ParserError {
                pos: err.pos,
                kind: crate::parser::ErrorKind::Expected(
                    ARG_EXPECTED.iter().map(|s| s.to_string()).collect(),
                ),
            }
        } else {
            err
        }
    })
}

// ============================================================================
// Collection literals
// ============================================================================

/// Lift a list of expressions into a literal when every element is static
fn lift_array(elements: Vec<QueryFn>) -> QueryFn {
    if elements.iter().all(|e| e.as_literal().is_some()) {
        let values: Vec<Value> = elements
            .into_iter()
            .map(|e| match e {
                QueryFn::Literal(v) => v,
                QueryFn::Dynamic(_) => unreachable!(),
            })
            .collect();
        return QueryFn::Literal(Value::Array(values));
    }
    QueryFn::dynamic(move |ctx| {
        let mut out = Vec::with_capacity(elements.len());
        for element in &elements {
            out.push(element.exec(ctx)?);
        }
        Ok(Value::Array(out))
    })
}

fn parse_array_lit(input: Input<'_>) -> PResult<'_, QueryFn> {
    fn start(i: Input<'_>) -> PResult<'_, ()> {
        let (_, next) = char_p(i, '[').map_err(|e| e.relabel("array"))?;
        Ok(((), discard_whitespace(next)))
    }
    fn element(i: Input<'_>) -> PResult<'_, QueryFn> {
        must_be(parse_arg(i))
    }
    fn delim(i: Input<'_>) -> PResult<'_, ()> {
        let i = discard_spaces(i);
        let (_, next) = char_p(i, ',')?;
        Ok(((), discard_whitespace(next)))
    }
    fn stop(i: Input<'_>) -> PResult<'_, ()> {
        let i = discard_whitespace(i);
        let (_, next) = char_p(i, ']')?;
        Ok(((), next))
    }
    let (elements, next) =
        crate::parser::delimited_pattern(input, &start, &element, &delim, &stop, true)?;
    Ok((lift_array(elements), next))
}

fn parse_object_lit(input: Input<'_>) -> PResult<'_, QueryFn> {
    fn start(i: Input<'_>) -> PResult<'_, ()> {
        let (_, next) = char_p(i, '{').map_err(|e| e.relabel("object"))?;
        Ok(((), discard_whitespace(next)))
    }
    // Fully recoverable on malformed entries: a brace block that is not an
    // object literal (e.g. a match body) must fall through to alternatives.
    fn element(i: Input<'_>) -> PResult<'_, (String, QueryFn)> {
        let (key, after_key) = quoted_string(i)?;
        let after_key = discard_spaces(after_key);
        let (_, after_colon) = char_p(after_key, ':')?;
        let after_colon = discard_whitespace(after_colon);
        let (value, next) = parse_arg(after_colon)?;
        Ok(((key, value), next))
    }
    fn delim(i: Input<'_>) -> PResult<'_, ()> {
        let i = discard_spaces(i);
        let (_, next) = char_p(i, ',')?;
        Ok(((), discard_whitespace(next)))
    }
    fn stop(i: Input<'_>) -> PResult<'_, ()> {
        let i = discard_whitespace(i);
        let (_, next) = char_p(i, '}')?;
        Ok(((), next))
    }
    let (entries, next) =
        crate::parser::delimited_pattern(input, &start, &element, &delim, &stop, true)?;

    if entries.iter().all(|(_, v)| v.as_literal().is_some()) {
        let mut object = Map::new();
        for (key, value) in entries {
            let QueryFn::Literal(value) = value else {
                unreachable!()
            };
            object.insert(key, value);
        }
        return Ok((QueryFn::Literal(Value::Object(object)), next));
    }
    let f = QueryFn::dynamic(move |ctx| {
        let mut object = Map::new();
        for (key, value) in &entries {
            object.insert(key.clone(), value.exec(ctx)?);
        }
        Ok(Value::Object(object))
    });
    Ok((f, next))
}

// ============================================================================
// Match expressions
// ============================================================================

#[derive(Clone)]
enum CaseKind {
    Default,
    Literal(Value),
    Predicate(QueryFn),
}

#[derive(Clone)]
struct MatchCase {
    kind: CaseKind,
    query: QueryFn,
}

fn parse_match(input: Input<'_>) -> PResult<'_, QueryFn> {
    let (_, after_kw) = term(input, "match").map_err(|e| e.relabel("match"))?;
    // Keyword boundary: "matched" is a field path, not a match expression.
    if after_kw
        .first()
        .is_some_and(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '~' | '*' | '+'))
    {
        return Err(ParserError::expected(input.pos(), "match"));
    }

    let after_kw = discard_spaces(after_kw);
    let (context, after_ctx) = optional(after_kw, parse_query)?;
    let after_ctx = discard_whitespace(after_ctx);

    fn start(i: Input<'_>) -> PResult<'_, ()> {
        let (_, next) = char_p(i, '{')?;
        Ok(((), discard_whitespace(next)))
    }
    let element = parse_match_case;
    fn delim(i: Input<'_>) -> PResult<'_, ()> {
        let i = discard_spaces(i);
        if let Ok((_, next)) = char_p(i, ',') {
            return Ok(((), discard_whitespace(next)));
        }
        let ((), next) = newline_allow_comment(i)?;
        Ok(((), discard_whitespace(next)))
    }
    fn stop(i: Input<'_>) -> PResult<'_, ()> {
        let i = discard_whitespace(i);
        let (_, next) = char_p(i, '}')?;
        Ok(((), next))
    }

    let (cases, next) = must_be(crate::parser::delimited_pattern(
        after_ctx, &start, &element, &delim, &stop, true,
    ))?;
    Ok((match_function(context, cases), next))
}

fn parse_match_case(input: Input<'_>) -> PResult<'_, MatchCase> {
    // Default case: _ => query
    let kind_result: PResult<'_, CaseKind> = (|| {
        let (_, after) = char_p(input, '_').map_err(|e| e.relabel("match-case"))?;
        let after = discard_spaces(after);
        let (_, next) = term(after, "=>")?;
        Ok((CaseKind::Default, next))
    })();

    let (kind, after_arrow) = match kind_result {
        Ok(ok) => ok,
        Err(err) if !err.is_recoverable() => return Err(err),
        Err(_) => {
            let (case_query, after) =
                parse_query(input).map_err(|e| e.relabel("match-case"))?;
            let after = discard_spaces(after);
            let (_, next) = term(after, "=>")?;
            let kind = match case_query.as_literal() {
                Some(value) => CaseKind::Literal(value.clone()),
                None => CaseKind::Predicate(case_query),
            };
            (kind, next)
        }
    };

    let after_arrow = discard_spaces(after_arrow);
    let (query, next) = parse_query(after_arrow)?;
    Ok((MatchCase { kind, query }, next))
}

/// Cases are evaluated top to bottom; the first match wins; no match and no
/// default yields null
fn match_function(context: Option<QueryFn>, cases: Vec<MatchCase>) -> QueryFn {
    QueryFn::dynamic(move |ctx| {
        let context_value = match &context {
            Some(f) => f.exec(ctx)?,
            None => ctx.value.cloned().unwrap_or(Value::Null),
        };
        let sub = FunctionContext {
            value: Some(&context_value),
            ..*ctx
        };
        for case in &cases {
            let is_match = match &case.kind {
                CaseKind::Default => true,
                CaseKind::Literal(lit) => values_equal(&context_value, lit),
                CaseKind::Predicate(f) => matches!(f.exec(&sub), Ok(Value::Bool(true))),
            };
            if is_match {
                return case.query.exec(&sub);
            }
        }
        Ok(Value::Null)
    })
}
