//! Condition tests

use std::sync::Arc;

use weir_protocol::{Batch, Condition, Part};

use super::{
    BloblangCondition, CheckField, CheckInterpolation, Count, Static, Text, TextOperator,
};

fn batch_of(contents: &[&str]) -> Batch {
    contents.iter().map(|c| Part::from(*c)).collect()
}

#[test]
fn test_text_operators() {
    let tests: &[(TextOperator, &str, &str, bool)] = &[
        (TextOperator::EqualsCs, "foo", "foo", true),
        (TextOperator::EqualsCs, "foo", "FOO", false),
        (TextOperator::Equals, "foo", "FOO", true),
        (TextOperator::ContainsCs, "hello world", "lo wo", true),
        (TextOperator::ContainsCs, "hello world", "LO WO", false),
        (TextOperator::Contains, "hello world", "LO WO", true),
        (TextOperator::PrefixCs, "hello", "he", true),
        (TextOperator::Prefix, "hello", "HE", true),
        (TextOperator::SuffixCs, "hello", "lo", true),
        (TextOperator::Suffix, "hello", "LO", true),
        (TextOperator::SuffixCs, "hello", "he", false),
    ];
    for (op, content, arg, expected) in tests {
        let cond = Text::new(*op, *arg, 0);
        assert_eq!(
            cond.check(&batch_of(&[content])),
            *expected,
            "{op:?} {content} {arg}"
        );
    }
}

#[test]
fn test_text_part_indexing() {
    let batch = batch_of(&["first", "second"]);
    assert!(Text::new(TextOperator::EqualsCs, "second", 1).check(&batch));
    assert!(Text::new(TextOperator::EqualsCs, "second", -1).check(&batch));
    assert!(!Text::new(TextOperator::EqualsCs, "anything", 5).check(&batch));
}

#[test]
fn test_count_condition_cycles() {
    let cond = Count::new(10);
    for _ in 0..10 {
        for _ in 0..9 {
            assert!(cond.check(&Batch::new()), "expected true during count");
        }
        assert!(!cond.check(&Batch::new()), "expected false at end of count");
    }
}

#[test]
fn test_static_condition() {
    assert!(Static(true).check(&Batch::new()));
    assert!(!Static(false).check(&Batch::new()));
}

#[test]
fn test_bloblang_condition() {
    let cond = BloblangCondition::new(r#"json("age") > 18"#).unwrap();
    assert!(cond.check(&batch_of(&[r#"{"age":30}"#])));
    assert!(!cond.check(&batch_of(&[r#"{"age":10}"#])));
    // Non-boolean results never match.
    let cond = BloblangCondition::new(r#"json("age")"#).unwrap();
    assert!(!cond.check(&batch_of(&[r#"{"age":30}"#])));
}

#[test]
fn test_check_field() {
    let child: Arc<dyn Condition> = Arc::new(Text::new(TextOperator::EqualsCs, "hello world", 0));
    let cond = CheckField::new("foo.bar", child);

    assert!(cond.check(&batch_of(&[r#"{"foo":{"bar":"hello world"}}"#])));
    assert!(!cond.check(&batch_of(&[r#"{"foo":{"bar":"nope"}}"#])));
    assert!(!cond.check(&batch_of(&[r#"{"foo":{}}"#])));
    assert!(!cond.check(&batch_of(&["not json"])));
}

#[test]
fn test_check_interpolation() {
    let child: Arc<dyn Condition> = Arc::new(Text::new(TextOperator::EqualsCs, "2", 0));
    let cond = CheckInterpolation::new("${!batch_size()}", child).unwrap();

    assert!(cond.check(&batch_of(&["a", "b"])));
    assert!(!cond.check(&batch_of(&["a"])));
}

#[test]
fn test_check_interpolation_composite_value() {
    let child: Arc<dyn Condition> = Arc::new(Text::new(TextOperator::EqualsCs, "id-7", 0));
    let cond = CheckInterpolation::new(r#"id-${!json("n")}"#, child).unwrap();

    assert!(cond.check(&batch_of(&[r#"{"n":7}"#])));
    assert!(!cond.check(&batch_of(&[r#"{"n":8}"#])));
}
