//! Collection specs, keyed maps, and multi-spec dispatch

use conforma::value::{kw, Value};
use conforma::{
    conform, config, def, explain_data, preds, valid, CollKind, CollOpts, KeysForm, MultiMethods,
    Spec,
};
use pretty_assertions::assert_eq;

fn int_vec(n: usize) -> Vec<Value> {
    (0..n).map(|i| Value::Int(i as i64)).collect()
}

// S5: multi-spec
#[test]
fn multi_spec_dispatch() {
    def(kw("s5/kind"), preds::is_keyword()).unwrap();
    def(kw("s5/n"), preds::is_int()).unwrap();
    def(kw("s5/s"), preds::is_string()).unwrap();

    let methods = MultiMethods::new();
    methods.add(
        Value::keyword("a"),
        Spec::keys(KeysForm::new().req_un(&["s5/kind", "s5/n"])),
    );
    methods.add(
        Value::keyword("b"),
        Spec::keys(KeysForm::new().req_un(&["s5/kind", "s5/s"])),
    );
    let s = Spec::multi_keyed(Value::symbol("s5-kind"), kw("kind"), methods);

    let ok = Value::map_of(vec![
        (kw("kind"), Value::keyword("a")),
        (kw("n"), Value::Int(1)),
    ]);
    assert_eq!(conform(&s, &ok), Some(ok.clone()));

    let unknown = Value::map_of(vec![(kw("kind"), Value::keyword("z"))]);
    assert_eq!(conform(&s, &unknown), None);
    let ed = explain_data(&s, &unknown).unwrap();
    assert_eq!(ed.problems.len(), 1);
    assert_eq!(ed.problems[0].reason.as_deref(), Some("no method"));
    assert_eq!(ed.problems[0].path, vec![Value::keyword("z")]);
}

// property 6: `every` validation effort is bounded by coll_check_limit
#[test]
fn every_sampling_is_bounded() {
    let prev = config::coll_check_limit();
    config::set_coll_check_limit(10);

    let s = Spec::every(preds::is_int(), CollOpts::default());
    // 1000 elements, step 100: position 1 is never sampled
    let mut items = int_vec(1000);
    items[1] = Value::from("hidden");
    let big = Value::Vector(items.clone());
    assert_eq!(conform(&s, &big), Some(big.clone()));

    // a sampled position still fails
    items[100] = Value::from("sampled");
    assert!(!valid(&s, &Value::Vector(items.clone())));

    // coll_of conforms every element and does catch it
    let all = Spec::coll_of(preds::is_int(), CollOpts::default());
    assert!(!valid(&all, &big));

    config::set_coll_check_limit(prev);
}

#[test]
fn every_does_not_rebuild() {
    let parse = Spec::conformer(Value::symbol("parse-int"), |v| match v {
        Value::String(s) => s.parse::<i64>().ok().map(Value::Int),
        _ => None,
    });
    let input = Value::Vector(vec![Value::from("1"), Value::from("2")]);
    // every returns the input unchanged even through a conformer
    let sampled = Spec::every(parse.clone(), CollOpts::default());
    assert_eq!(conform(&sampled, &input), Some(input.clone()));
    // coll_of rebuilds
    let all = Spec::coll_of(parse, CollOpts::default());
    assert_eq!(
        conform(&all, &input),
        Some(Value::Vector(vec![Value::Int(1), Value::Int(2)]))
    );
}

#[test]
fn explain_reports_are_bounded() {
    let prev = config::coll_error_limit();
    config::set_coll_error_limit(3);
    let s = Spec::coll_of(preds::is_int(), CollOpts::default());
    let bad = Value::Vector(vec![Value::from("a"); 10]);
    let ed = explain_data(&s, &bad).unwrap();
    assert_eq!(ed.problems.len(), 3);
    config::set_coll_error_limit(prev);
}

// property 7: presence failures and value failures are independent problems
#[test]
fn keys_problems_are_independent() {
    def(kw("p7/a"), preds::is_int()).unwrap();
    def(kw("p7/b"), preds::is_int()).unwrap();
    let s = Spec::keys(KeysForm::new().req(&["p7/a", "p7/b"]));

    let input = Value::map_of(vec![(kw("p7/a"), Value::from("bad"))]);
    let ed = explain_data(&s, &input).unwrap();
    assert_eq!(ed.problems.len(), 2);
    // one for the missing key
    assert!(ed.problems.iter().any(|p| {
        p.pred.to_string().contains(":p7/b") && p.path.is_empty()
    }));
    // one for the failing value
    assert!(ed
        .problems
        .iter()
        .any(|p| p.path == vec![Value::keyword("p7/a")] && p.pred == Value::symbol("int?")));
}

#[test]
fn map_of_checks_both_sides() {
    let s = Spec::map_of(
        preds::is_keyword(),
        preds::is_int(),
        false,
        CollOpts::default(),
    );
    let ok = Value::map_of(vec![(kw("a"), Value::Int(1))]);
    assert_eq!(conform(&s, &ok), Some(ok.clone()));

    let bad_val = Value::map_of(vec![(kw("a"), Value::from("x"))]);
    assert!(!valid(&s, &bad_val));
    let ed = explain_data(&s, &bad_val).unwrap();
    assert_eq!(ed.problems[0].in_path, vec![Value::keyword("a")]);

    let mut m = std::collections::BTreeMap::new();
    m.insert(Value::from("not-kw"), Value::Int(1));
    assert!(!valid(&s, &Value::Map(m)));
}

#[test]
fn coll_of_kind_and_counts() {
    let s = Spec::coll_of(
        preds::is_int(),
        CollOpts {
            kind: Some(CollKind::Vector),
            min_count: Some(2),
            max_count: Some(3),
            distinct: true,
            ..Default::default()
        },
    );
    assert!(valid(&s, &Value::Vector(int_vec(2))));
    assert!(!valid(&s, &Value::Vector(int_vec(1))));
    assert!(!valid(&s, &Value::Vector(int_vec(4))));
    assert!(!valid(&s, &Value::List(int_vec(2))));
    assert!(!valid(
        &s,
        &Value::Vector(vec![Value::Int(1), Value::Int(1)])
    ));
}

#[test]
fn multi_spec_catch_all_is_not_generated() {
    def(kw("catch-all/n"), preds::is_int()).unwrap();
    let methods = MultiMethods::new();
    methods.add(
        Value::keyword("only"),
        Spec::keys(KeysForm::new().req_un(&["catch-all/n"])),
    );
    // a catch-all entry keyed by the invalid sentinel is conformable but
    // never sampled
    methods.add(
        Value::Keyword(conforma::value::invalid_keyword()),
        preds::is_any(),
    );
    let s = Spec::multi_keyed(Value::symbol("catch-all"), kw("kind"), methods);
    let g = conforma::gen(&s).unwrap();
    for v in g.sample(20).unwrap() {
        assert_eq!(v.get_kw(&kw("kind")), Some(&Value::keyword("only")));
    }
}
