//! Standard predicate specs
//!
//! Ready-made leaf specs for the common value shapes. Each carries the
//! conventional symbolic form (`int?`, `string?`, ...) so `describe`,
//! `explain`, and generator lookup work without extra wiring.

use crate::spec::Spec;
use crate::value::Value;

pub fn is_any() -> Spec {
    Spec::pred("any?", |_| true)
}

pub fn is_nil() -> Spec {
    Spec::pred("nil?", Value::is_nil)
}

pub fn is_bool() -> Spec {
    Spec::pred("boolean?", |v| matches!(v, Value::Bool(_)))
}

pub fn is_int() -> Spec {
    Spec::pred("int?", |v| matches!(v, Value::Int(_)))
}

pub fn is_pos_int() -> Spec {
    Spec::pred("pos-int?", |v| matches!(v, Value::Int(i) if *i > 0))
}

pub fn is_nat_int() -> Spec {
    Spec::pred("nat-int?", |v| matches!(v, Value::Int(i) if *i >= 0))
}

pub fn is_neg_int() -> Spec {
    Spec::pred("neg-int?", |v| matches!(v, Value::Int(i) if *i < 0))
}

pub fn is_double() -> Spec {
    Spec::pred("double?", |v| matches!(v, Value::Float(_)))
}

pub fn is_number() -> Spec {
    Spec::pred("number?", |v| {
        matches!(v, Value::Int(_) | Value::Float(_))
    })
}

pub fn is_string() -> Spec {
    Spec::pred("string?", |v| matches!(v, Value::String(_)))
}

pub fn is_keyword() -> Spec {
    Spec::pred("keyword?", |v| matches!(v, Value::Keyword(_)))
}

pub fn is_symbol() -> Spec {
    Spec::pred("symbol?", |v| matches!(v, Value::Symbol(_)))
}

pub fn is_coll() -> Spec {
    Spec::pred("coll?", Value::is_coll)
}

pub fn is_map() -> Spec {
    Spec::pred("map?", |v| matches!(v, Value::Map(_)))
}

pub fn is_vector() -> Spec {
    Spec::pred("vector?", |v| matches!(v, Value::Vector(_)))
}

pub fn is_set() -> Spec {
    Spec::pred("set?", |v| matches!(v, Value::Set(_)))
}

pub fn is_seqable() -> Spec {
    Spec::pred("seqable?", Value::is_seqable)
}

pub fn is_fn() -> Spec {
    Spec::pred("fn?", |v| matches!(v, Value::Fn(_)))
}
