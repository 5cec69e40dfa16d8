//! Field interpolation tests

use proptest::prelude::*;

use weir_protocol::{Batch, Part};

use super::parse;

fn batch_of(content: &str) -> Batch {
    Batch::from_bytes(content.to_string())
}

#[test]
fn test_static_text_passes_through() {
    let expr = parse("hello world").unwrap();
    assert!(expr.is_static());
    let mut batch = batch_of("ignored");
    assert_eq!(expr.resolve_string(0, &mut batch, false), "hello world");
}

#[test]
fn test_query_substitution() {
    let expr = parse(r#"document ${!json("id")} processed"#).unwrap();
    assert!(!expr.is_static());
    let mut batch = batch_of(r#"{"id":"abc"}"#);
    assert_eq!(
        expr.resolve_string(0, &mut batch, false),
        "document abc processed"
    );
}

#[test]
fn test_escape_block_is_not_evaluated() {
    let expr = parse("foo ${{!echo:bar}} baz").unwrap();
    assert!(expr.is_static());
    let mut batch = batch_of("ignored");
    assert_eq!(
        expr.resolve_string(0, &mut batch, false),
        "foo ${!echo:bar} baz"
    );
}

#[test]
fn test_nested_expressions_are_not_recursively_expanded() {
    // The part content itself looks like an interpolation; the result must
    // be substituted verbatim, never re-evaluated.
    let expr = parse("${!content()}").unwrap();
    let mut batch = batch_of("${!echo:inner}");
    assert_eq!(expr.resolve_string(0, &mut batch, false), "${!echo:inner}");
}

#[test]
fn test_unterminated_block_is_plain_text() {
    let expr = parse("prefix ${!json(").unwrap();
    let mut batch = batch_of("ignored");
    assert_eq!(expr.resolve_string(0, &mut batch, false), "prefix ${!json(");
}

#[test]
fn test_lone_dollars() {
    let expr = parse("a $ b $$ c ${not a block}").unwrap();
    let mut batch = batch_of("ignored");
    assert_eq!(
        expr.resolve_string(0, &mut batch, false),
        "a $ b $$ c ${not a block}"
    );
}

#[test]
fn test_malformed_expression_is_a_config_error() {
    let err = parse("${!not_a_function()}").unwrap_err();
    assert_eq!(
        err.to_string(),
        "failed to parse expression: char 3: unrecognised function 'not_a_function'"
    );
}

#[test]
fn test_trailing_garbage_inside_block() {
    let err = parse(r#"${!json("foo") nah}"#).unwrap_err();
    assert!(err
        .to_string()
        .contains("unexpected contents at end of expression"));
}

#[test]
fn test_eval_error_sets_fail_flag_and_yields_empty() {
    let expr = parse("a ${!$missing} b").unwrap();
    let mut batch = batch_of("ignored");
    assert_eq!(expr.resolve_string(0, &mut batch, false), "");

    let flag = batch.get(0).unwrap().failed().expect("fail flag set");
    assert!(flag.contains("variable 'missing' undefined"), "{flag}");
}

#[test]
fn test_eval_error_leaves_siblings_untouched() {
    let expr = parse("${!$missing}").unwrap();
    let mut batch = Batch::from_parts(vec![Part::from("a"), Part::from("b")]);
    expr.resolve_string(1, &mut batch, false);

    assert!(batch.get(0).unwrap().failed().is_none());
    assert!(batch.get(1).unwrap().failed().is_some());
}

#[test]
fn test_escaped_bytes_keep_json_scalars_valid() {
    let expr = parse("${!content()}").unwrap();
    let mut batch = batch_of("line\nwith \"quotes\"");

    let resolved = expr.resolve_bytes(0, &mut batch, true, false);
    assert_eq!(resolved.as_ref(), br#"line\nwith \"quotes\""#);

    // Static fragments are never escaped.
    let expr = parse("\"${!content()}\"").unwrap();
    let mut batch = batch_of("x\"y");
    let resolved = expr.resolve_bytes(0, &mut batch, true, false);
    assert_eq!(resolved.as_ref(), br#""x\"y""#);
}

// ============================================================================
// Deprecated syntax
// ============================================================================

#[test]
fn test_deprecated_json_field() {
    let expr = parse("${!json_field:foo.bar}").unwrap();
    let mut batch = batch_of(r#"{"foo":{"bar":"hello world"}}"#);
    assert_eq!(expr.resolve_string(0, &mut batch, false), "hello world");
}

#[test]
fn test_deprecated_metadata() {
    let expr = parse("${!metadata:foo}").unwrap();
    let mut part = Part::from("ignored");
    part.metadata_mut().set("foo", "bar");
    let mut batch = Batch::from_parts(vec![part]);
    assert_eq!(expr.resolve_string(0, &mut batch, false), "bar");
}

#[test]
fn test_deprecated_index_args() {
    let expr = parse("${!json_field:foo,1}").unwrap();
    let mut batch = Batch::from_parts(vec![
        Part::from("not json"),
        Part::from(r#"{"foo":"second"}"#),
    ]);
    assert_eq!(expr.resolve_string(0, &mut batch, false), "second");
}

#[test]
fn test_legacy_mode_targets_first_part() {
    let expr = parse("${!content}").unwrap();
    let mut batch = Batch::from_parts(vec![Part::from("first"), Part::from("second")]);

    // Legacy evaluation pins unindexed deprecated functions to part zero.
    assert_eq!(expr.resolve_string(1, &mut batch, true), "first");
    // Modern evaluation follows the part under evaluation.
    assert_eq!(expr.resolve_string(1, &mut batch, false), "second");
}

#[test]
fn test_deprecated_count() {
    let expr = parse("${!count:field_interp_counter}").unwrap();
    let mut batch = batch_of("ignored");
    assert_eq!(expr.resolve_string(0, &mut batch, false), "1");
    assert_eq!(expr.resolve_string(0, &mut batch, false), "2");
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    // Escaped blocks round-trip to the unescaped syntax without evaluation.
    #[test]
    fn prop_escape_round_trips(inner in "[a-zA-Z0-9 :!.()]{0,40}") {
        let template = format!("before ${{{{!{inner}}}}} after");
        let expr = parse(&template).unwrap();
        let mut batch = batch_of("ignored");
        prop_assert_eq!(
            expr.resolve_string(0, &mut batch, false),
            format!("before ${{!{inner}}} after")
        );
    }

    // Plain text without interpolation markers always passes through.
    #[test]
    fn prop_plain_text_identity(text in "[^$]{0,64}") {
        let expr = parse(&text).unwrap();
        let mut batch = batch_of("ignored");
        prop_assert_eq!(expr.resolve_string(0, &mut batch, false), text);
    }
}
