//! Parser combinator substrate
//!
//! Every parser takes an [`Input`] cursor and returns either a payload plus
//! the advanced cursor, or a [`ParserError`] carrying the byte position at
//! which parsing failed and the alternatives that were expected there.
//!
//! Failures come in two strengths. An *expected* failure is recoverable:
//! [`one_of`] merges the expected alternatives of recoverable failures and
//! tries the next branch. [`must_be`] promotes a recoverable failure into a
//! hard one ("required"), which aborts alternative branches and surfaces to
//! the caller with its position intact.

use std::fmt;

use serde_json::Value;

#[cfg(test)]
#[path = "parser_test.rs"]
mod tests;

/// Cursor over the string being parsed
#[derive(Debug, Clone, Copy)]
pub struct Input<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Input<'a> {
    /// Start a cursor at the beginning of a source string
    pub fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    /// The unconsumed remainder
    #[inline]
    pub fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    /// Byte position from the start of the source
    #[inline]
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Whether all input has been consumed
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pos >= self.src.len()
    }

    /// The next unconsumed character
    #[inline]
    pub fn first(&self) -> Option<char> {
        self.rest().chars().next()
    }

    /// Advance the cursor by a number of bytes
    #[inline]
    #[must_use]
    pub fn advance(mut self, bytes: usize) -> Self {
        self.pos += bytes;
        self
    }
}

/// How strongly a parse failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Recoverable: the listed alternatives were expected here
    Expected(Vec<String>),
    /// Hard: the listed alternatives were required here
    Required(Vec<String>),
    /// Hard: a free-form failure (bad function name, bad argument, ...)
    Message(String),
}

/// A parse failure annotated with its byte position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParserError {
    pub pos: usize,
    pub kind: ErrorKind,
}

impl ParserError {
    /// A recoverable failure expecting a single alternative
    pub fn expected(pos: usize, label: impl Into<String>) -> Self {
        Self {
            pos,
            kind: ErrorKind::Expected(vec![label.into()]),
        }
    }

    /// A hard free-form failure
    pub fn message(pos: usize, msg: impl Into<String>) -> Self {
        Self {
            pos,
            kind: ErrorKind::Message(msg.into()),
        }
    }

    /// Whether alternative branches may still be tried after this failure
    #[inline]
    pub fn is_recoverable(&self) -> bool {
        matches!(self.kind, ErrorKind::Expected(_))
    }

    /// Promote a recoverable failure into a hard one
    #[must_use]
    pub fn into_required(self) -> Self {
        match self.kind {
            ErrorKind::Expected(alts) => Self {
                pos: self.pos,
                kind: ErrorKind::Required(alts),
            },
            kind => Self {
                pos: self.pos,
                kind,
            },
        }
    }

    /// Replace the expected alternatives with a single label
    #[must_use]
    pub fn relabel(self, label: impl Into<String>) -> Self {
        match self.kind {
            ErrorKind::Expected(_) => Self {
                pos: self.pos,
                kind: ErrorKind::Expected(vec![label.into()]),
            },
            kind => Self {
                pos: self.pos,
                kind,
            },
        }
    }

    /// Merge another recoverable failure: the failure that progressed
    /// furthest wins outright; at equal positions the expected alternatives
    /// are unioned in order.
    fn merge(&mut self, other: ParserError) {
        if other.pos > self.pos {
            *self = other;
            return;
        }
        if other.pos < self.pos {
            return;
        }
        let (ErrorKind::Expected(acc), ErrorKind::Expected(alts)) = (&mut self.kind, other.kind)
        else {
            return;
        };
        for alt in alts {
            if !acc.contains(&alt) {
                acc.push(alt);
            }
        }
    }
}

impl fmt::Display for ParserError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ErrorKind::Expected(alts) if alts.len() == 1 => {
                write!(f, "char {}: expected: {}", self.pos, alts[0])
            }
            ErrorKind::Expected(alts) => {
                write!(f, "char {}: expected one of: [{}]", self.pos, alts.join(" "))
            }
            ErrorKind::Required(alts) if alts.len() == 1 => {
                write!(f, "char {}: required: {}", self.pos, alts[0])
            }
            ErrorKind::Required(alts) => {
                write!(f, "char {}: required one of: [{}]", self.pos, alts.join(" "))
            }
            ErrorKind::Message(msg) => write!(f, "char {}: {}", self.pos, msg),
        }
    }
}

/// The outcome of applying a parser at a cursor
pub type PResult<'a, T> = Result<(T, Input<'a>), ParserError>;

// ============================================================================
// Primitive parsers
// ============================================================================

/// Parse an exact character
pub fn char_p(input: Input<'_>, c: char) -> PResult<'_, char> {
    match input.first() {
        Some(got) if got == c => Ok((c, input.advance(c.len_utf8()))),
        _ => Err(ParserError::expected(input.pos(), c.to_string())),
    }
}

/// Parse a run of characters up until (but not including) a candidate
pub fn not_char(input: Input<'_>, c: char) -> PResult<'_, String> {
    let rest = input.rest();
    let end = rest.find(c).unwrap_or(rest.len());
    if end == 0 {
        return Err(ParserError::expected(input.pos(), format!("not '{c}'")));
    }
    Ok((rest[..end].to_string(), input.advance(end)))
}

/// Parse an exact term
pub fn term<'a>(input: Input<'a>, t: &'static str) -> PResult<'a, &'static str> {
    if input.rest().starts_with(t) {
        Ok((t, input.advance(t.len())))
    } else {
        Err(ParserError::expected(input.pos(), t))
    }
}

/// Parse a run of characters matching a predicate (at least one)
pub fn char_run(input: Input<'_>, pred: impl Fn(char) -> bool) -> PResult<'_, String> {
    let rest = input.rest();
    let end = rest
        .char_indices()
        .find(|(_, c)| !pred(*c))
        .map(|(i, _)| i)
        .unwrap_or(rest.len());
    if end == 0 {
        return Err(ParserError::expected(input.pos(), "character-run"));
    }
    Ok((rest[..end].to_string(), input.advance(end)))
}

/// Parse at least one space or tab
pub fn spaces_and_tabs(input: Input<'_>) -> PResult<'_, String> {
    char_run(input, |c| c == ' ' || c == '\t')
        .map_err(|e| e.relabel("whitespace"))
}

/// Discard any spaces and tabs
#[must_use]
pub fn discard_spaces(input: Input<'_>) -> Input<'_> {
    match spaces_and_tabs(input) {
        Ok((_, next)) => next,
        Err(_) => input,
    }
}

/// Parse a line break, optionally preceded by a `#` comment
///
/// The comment itself requires a terminating line break: a trailing comment
/// at the end of input is not consumed.
pub fn newline_allow_comment(input: Input<'_>) -> PResult<'_, ()> {
    let rest = input.rest();
    if let Some(stripped) = rest.strip_prefix('#') {
        return match stripped.find('\n') {
            Some(i) => Ok(((), input.advance(i + 2))),
            None => Err(ParserError::expected(input.pos(), "line-break")),
        };
    }
    if rest.starts_with('\n') {
        return Ok(((), input.advance(1)));
    }
    if rest.starts_with("\r\n") {
        return Ok(((), input.advance(2)));
    }
    Err(ParserError::expected(input.pos(), "line-break"))
}

/// Discard all whitespace, including line breaks and comments
#[must_use]
pub fn discard_whitespace(mut input: Input<'_>) -> Input<'_> {
    loop {
        let before = input.pos();
        input = discard_spaces(input);
        if let Ok(((), next)) = newline_allow_comment(input) {
            input = next;
        }
        if input.pos() == before {
            return input;
        }
    }
}

/// Parse a snake_case identifier
pub fn snake_case(input: Input<'_>) -> PResult<'_, String> {
    char_run(input, |c| {
        c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_'
    })
    .map_err(|e| e.relabel("snake-case"))
}

/// Parse a number literal into a JSON value (integer when possible)
pub fn number(input: Input<'_>) -> PResult<'_, Value> {
    let rest = input.rest();
    let mut end = 0;
    let bytes = rest.as_bytes();
    if end < bytes.len() && bytes[end] == b'-' {
        end += 1;
    }
    let digits_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end == digits_start {
        return Err(ParserError::expected(input.pos(), "number"));
    }
    let mut is_float = false;
    if end < bytes.len() && bytes[end] == b'.' && bytes.get(end + 1).is_some_and(u8::is_ascii_digit)
    {
        is_float = true;
        end += 1;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
    }
    let text = &rest[..end];
    let value = if is_float {
        let f: f64 = text
            .parse()
            .map_err(|_| ParserError::expected(input.pos(), "number"))?;
        Value::from(f)
    } else {
        let i: i64 = text
            .parse()
            .map_err(|_| ParserError::expected(input.pos(), "number"))?;
        Value::from(i)
    };
    Ok((value, input.advance(end)))
}

/// Parse a boolean literal
pub fn boolean(input: Input<'_>) -> PResult<'_, Value> {
    if let Ok((_, next)) = term(input, "true") {
        return Ok((Value::Bool(true), next));
    }
    if let Ok((_, next)) = term(input, "false") {
        return Ok((Value::Bool(false), next));
    }
    Err(ParserError::expected(input.pos(), "boolean"))
}

/// Parse a `null` literal
pub fn null_literal(input: Input<'_>) -> PResult<'_, Value> {
    term(input, "null")
        .map(|(_, next)| (Value::Null, next))
        .map_err(|e| e.relabel("null"))
}

/// Parse a double-quoted string with C-style escapes
pub fn quoted_string(input: Input<'_>) -> PResult<'_, String> {
    let rest = input.rest();
    if !rest.starts_with('"') {
        return Err(ParserError::expected(input.pos(), "quoted-string"));
    }
    let mut out = String::new();
    let mut chars = rest.char_indices().skip(1);
    while let Some((i, c)) = chars.next() {
        match c {
            '"' => return Ok((out, input.advance(i + 1))),
            '\\' => match chars.next() {
                Some((_, 'n')) => out.push('\n'),
                Some((_, 'r')) => out.push('\r'),
                Some((_, 't')) => out.push('\t'),
                Some((_, '"')) => out.push('"'),
                Some((_, '\\')) => out.push('\\'),
                Some((_, '/')) => out.push('/'),
                Some((_, 'u')) => {
                    let mut code = 0u32;
                    for _ in 0..4 {
                        let Some((_, h)) = chars.next() else {
                            return Err(ParserError::expected(input.pos(), "quoted-string"));
                        };
                        let Some(d) = h.to_digit(16) else {
                            return Err(ParserError::expected(input.pos(), "quoted-string"));
                        };
                        code = code * 16 + d;
                    }
                    out.push(char::from_u32(code).unwrap_or('\u{FFFD}'));
                }
                _ => return Err(ParserError::expected(input.pos(), "quoted-string")),
            },
            other => out.push(other),
        }
    }
    Err(ParserError::expected(input.pos(), "quoted-string"))
}

// ============================================================================
// Combinators
// ============================================================================

/// Try a set of alternatives in order
///
/// Recoverable failures accumulate their expected alternatives; the first
/// hard failure aborts the whole set.
pub fn one_of<'a, T>(
    input: Input<'a>,
    parsers: &[&dyn Fn(Input<'a>) -> PResult<'a, T>],
) -> PResult<'a, T> {
    let mut acc: Option<ParserError> = None;
    for parser in parsers {
        match parser(input) {
            Ok(ok) => return Ok(ok),
            Err(err) if err.is_recoverable() => match &mut acc {
                Some(acc) => acc.merge(err),
                None => acc = Some(err),
            },
            Err(err) => return Err(err),
        }
    }
    Err(acc.unwrap_or_else(|| ParserError::expected(input.pos(), "empty-alternatives")))
}

/// Apply a parser zero or one times
///
/// Recoverable failures yield `None`; hard failures propagate.
pub fn optional<'a, T>(
    input: Input<'a>,
    parser: impl FnOnce(Input<'a>) -> PResult<'a, T>,
) -> Result<(Option<T>, Input<'a>), ParserError> {
    match parser(input) {
        Ok((value, next)) => Ok((Some(value), next)),
        Err(err) if err.is_recoverable() => Ok((None, input)),
        Err(err) => Err(err),
    }
}

/// Apply a parser repeatedly until it fails, collecting payloads
///
/// A hard failure propagates; a recoverable one terminates the run.
pub fn until_fail<'a, T>(
    mut input: Input<'a>,
    parser: impl Fn(Input<'a>) -> PResult<'a, T>,
) -> Result<(Vec<T>, Input<'a>), ParserError> {
    let mut out = Vec::new();
    loop {
        match parser(input) {
            Ok((value, next)) => {
                out.push(value);
                input = next;
            }
            Err(err) if err.is_recoverable() => return Ok((out, input)),
            Err(err) => return Err(err),
        }
    }
}

/// Promote a recoverable failure to a hard one
pub fn must_be<T>(result: Result<T, ParserError>) -> Result<T, ParserError> {
    result.map_err(ParserError::into_required)
}

/// Replace a recoverable failure's alternatives with a single label
pub fn expect<T>(result: Result<T, ParserError>, label: &str) -> Result<T, ParserError> {
    result.map_err(|e| e.relabel(label))
}

/// Parse a delimited sequence: `start element (delim element)* stop`
///
/// Zero elements are accepted when `stop` follows `start` directly. When
/// `allow_trailing` is set a delimiter may precede `stop`.
pub fn delimited_pattern<'a, T>(
    input: Input<'a>,
    start: &dyn Fn(Input<'a>) -> PResult<'a, ()>,
    element: &dyn Fn(Input<'a>) -> PResult<'a, T>,
    delim: &dyn Fn(Input<'a>) -> PResult<'a, ()>,
    stop: &dyn Fn(Input<'a>) -> PResult<'a, ()>,
    allow_trailing: bool,
) -> PResult<'a, Vec<T>> {
    let (_, mut input) = start(input)?;
    let mut out = Vec::new();

    if let Ok(((), next)) = stop(input) {
        return Ok((out, next));
    }

    loop {
        let (value, next) = element(input)?;
        out.push(value);
        input = next;

        match delim(input) {
            Ok(((), next)) => {
                input = next;
                if allow_trailing {
                    if let Ok(((), next)) = stop(input) {
                        return Ok((out, next));
                    }
                }
            }
            Err(delim_err) => {
                return match stop(input) {
                    Ok(((), next)) => Ok((out, next)),
                    Err(stop_err) => {
                        let mut err = delim_err;
                        err.merge(stop_err);
                        Err(err)
                    }
                };
            }
        }
    }
}
