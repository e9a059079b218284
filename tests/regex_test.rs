//! Sequence regex engine behavior through the public API

use conforma::value::{kw, Value};
use conforma::{conform, def, explain_data, form, preds, regex, unform, valid, Spec};
use pretty_assertions::assert_eq;
use rstest::rstest;

fn ints(items: &[i64]) -> Value {
    Value::Vector(items.iter().map(|i| Value::Int(*i)).collect())
}

// S4: cat + star destructuring and extra input
#[test]
fn cat_star_destructures() {
    let s = regex::cat(vec![
        (kw("xs"), regex::star(preds::is_int())),
        (kw("s"), preds::is_string()),
    ]);

    let input = Value::Vector(vec![
        Value::Int(1),
        Value::Int(2),
        Value::Int(3),
        Value::from("x"),
    ]);
    assert_eq!(
        conform(&s, &input),
        Some(Value::map_of(vec![
            (kw("xs"), ints(&[1, 2, 3])),
            (kw("s"), Value::from("x")),
        ]))
    );

    let bad = Value::Vector(vec![
        Value::Int(1),
        Value::Int(2),
        Value::from("x"),
        Value::Int(3),
    ]);
    assert_eq!(conform(&s, &bad), None);
    let ed = explain_data(&s, &bad).unwrap();
    assert_eq!(ed.problems[0].reason.as_deref(), Some("Extra input"));
}

#[rstest]
#[case(&[], true)]
#[case(&[1], true)]
#[case(&[1, 2, 3, 4], true)]
fn star_accepts_any_run(#[case] input: &[i64], #[case] ok: bool) {
    let s = regex::star(preds::is_int());
    assert_eq!(valid(&s, &ints(input)), ok);
}

#[rstest]
#[case(&[], false)]
#[case(&[1], true)]
#[case(&[1, 2], true)]
fn plus_requires_one(#[case] input: &[i64], #[case] ok: bool) {
    let s = regex::plus(preds::is_int());
    assert_eq!(valid(&s, &ints(input)), ok);
}

#[test]
fn maybe_yields_nil_on_empty() {
    let s = regex::maybe(preds::is_int());
    assert_eq!(conform(&s, &Value::Vector(vec![])), Some(Value::Nil));
    assert_eq!(conform(&s, &ints(&[7])), Some(Value::Int(7)));
    assert!(!valid(&s, &ints(&[1, 2])));
}

#[test]
fn alt_tags_branches() {
    let s = regex::alt(vec![
        (kw("n"), preds::is_int()),
        (kw("s"), preds::is_string()),
    ]);
    assert_eq!(
        conform(&s, &Value::Vector(vec![Value::from("q")])),
        Some(Value::Vector(vec![Value::keyword("s"), Value::from("q")]))
    );
    let c = conform(&s, &ints(&[3])).unwrap();
    assert_eq!(unform(&s, &c).unwrap(), ints(&[3]));
}

#[test]
fn amp_filters_matches() {
    let even_count = Spec::pred_form(
        Value::form(vec![
            Value::symbol("even?"),
            Value::form(vec![Value::symbol("count"), Value::symbol("%")]),
        ]),
        |v| v.count().map_or(false, |n| n % 2 == 0),
    );
    let s = regex::amp(regex::star(preds::is_int()), vec![even_count]);
    assert!(valid(&s, &ints(&[])));
    assert!(!valid(&s, &ints(&[1])));
    assert!(valid(&s, &ints(&[1, 2])));
}

#[test]
fn insufficient_input_names_the_missing_part() {
    let s = regex::cat(vec![
        (kw("a"), preds::is_int()),
        (kw("b"), preds::is_string()),
    ]);
    let ed = explain_data(&s, &ints(&[1])).unwrap();
    assert_eq!(ed.problems.len(), 1);
    assert_eq!(ed.problems[0].reason.as_deref(), Some("Insufficient input"));
    assert_eq!(ed.problems[0].path, vec![Value::keyword("b")]);
}

#[test]
fn nested_regex_is_one_element() {
    let inner = regex::star(preds::is_int());
    let s = regex::cat(vec![
        (kw("a"), inner.nested()),
        (kw("b"), preds::is_string()),
    ]);
    let input = Value::Vector(vec![ints(&[1, 2]), Value::from("x")]);
    assert_eq!(
        conform(&s, &input),
        Some(Value::map_of(vec![
            (kw("a"), ints(&[1, 2])),
            (kw("b"), Value::from("x")),
        ]))
    );
}

#[test]
fn named_regex_splices_into_cat() {
    def(kw("regex-int/run"), regex::plus(preds::is_int())).unwrap();
    let s = regex::cat(vec![
        (kw("nums"), Spec::named(kw("regex-int/run"))),
        (kw("tail"), preds::is_keyword()),
    ]);
    let input = Value::Vector(vec![Value::Int(1), Value::Int(2), Value::keyword("end")]);
    assert_eq!(
        conform(&s, &input),
        Some(Value::map_of(vec![
            (kw("nums"), ints(&[1, 2])),
            (kw("tail"), Value::keyword("end")),
        ]))
    );
}

#[test]
fn unform_inverts_conform() {
    let s = regex::cat(vec![
        (kw("xs"), regex::star(preds::is_int())),
        (kw("ys"), regex::plus(preds::is_string())),
        (kw("z"), regex::maybe(preds::is_keyword())),
    ]);
    for input in [
        Value::Vector(vec![Value::Int(1), Value::from("a")]),
        Value::Vector(vec![
            Value::Int(1),
            Value::Int(2),
            Value::from("a"),
            Value::from("b"),
            Value::keyword("k"),
        ]),
        Value::Vector(vec![Value::from("only")]),
    ] {
        let c = conform(&s, &input).expect("input should conform");
        assert_eq!(unform(&s, &c).unwrap(), input, "failed for {}", input);
    }
}

#[test]
fn describe_round_trips_symbolically() {
    let s = regex::cat(vec![
        (kw("xs"), regex::star(preds::is_int())),
        (kw("s"), preds::is_string()),
    ]);
    assert_eq!(form(&s).to_string(), "(cat :xs (* int?) :s string?)");
    assert_eq!(
        form(&regex::alt(vec![
            (kw("n"), preds::is_int()),
            (kw("s"), preds::is_string()),
        ]))
        .to_string(),
        "(alt :n int? :s string?)"
    );
}

#[test]
fn non_sequence_inputs_are_invalid() {
    let s = regex::star(preds::is_int());
    for v in [
        Value::Int(1),
        Value::from("x"),
        Value::Map(Default::default()),
    ] {
        assert!(!valid(&s, &v), "{} should not regex-conform", v);
    }
    // nil is the empty sequence
    assert!(valid(&s, &Value::Nil));
}
