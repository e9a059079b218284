//! The universal value model
//!
//! Every piece of data the engine validates, conforms, or generates is a
//! [`Value`]. The enum mirrors the data shapes of a dynamic language:
//! scalars, keywords/symbols, ordered collections, maps, sets, and native
//! functions. Symbolic forms used by `describe`/`explain` are also `Value`s
//! (symbols and lists), so diagnostics are plain data.
//!
//! `Value` carries a total ordering (floats via `total_cmp`, functions by
//! pointer identity) so values can key maps and populate sets.

use crate::error::Result;
use serde::ser::{SerializeMap, SerializeSeq, Serializer};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// An optionally namespace-qualified name, e.g. `:app/user-id`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Keyword {
    /// Namespace part, `None` for bare keywords
    pub ns: Option<String>,

    /// Local name
    pub name: String,
}

impl Keyword {
    /// Qualified keyword `ns/name`
    pub fn new(ns: impl Into<String>, name: impl Into<String>) -> Self {
        Keyword {
            ns: Some(ns.into()),
            name: name.into(),
        }
    }

    /// Bare keyword with no namespace
    pub fn simple(name: impl Into<String>) -> Self {
        Keyword {
            ns: None,
            name: name.into(),
        }
    }

    /// Parse `"ns/name"` or `":ns/name"`; a missing slash yields a bare keyword
    pub fn parse(s: &str) -> Self {
        let s = s.strip_prefix(':').unwrap_or(s);
        match s.split_once('/') {
            Some((ns, name)) if !ns.is_empty() => Keyword::new(ns, name),
            _ => Keyword::simple(s),
        }
    }

    /// Whether the keyword carries a namespace
    pub fn is_qualified(&self) -> bool {
        self.ns.is_some()
    }

    /// The bare-name version of this keyword
    pub fn unqualified(&self) -> Keyword {
        Keyword::simple(self.name.clone())
    }
}

impl Serialize for Keyword {
    fn serialize<S: Serializer>(&self, ser: S) -> std::result::Result<S::Ok, S::Error> {
        ser.serialize_str(&self.to_string())
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.ns {
            Some(ns) => write!(f, ":{}/{}", ns, self.name),
            None => write!(f, ":{}", self.name),
        }
    }
}

impl From<&str> for Keyword {
    fn from(s: &str) -> Self {
        Keyword::parse(s)
    }
}

/// Shorthand for [`Keyword::parse`]
pub fn kw(s: &str) -> Keyword {
    Keyword::parse(s)
}

/// Reserved keyword standing in for the invalid sentinel where a value is
/// required, e.g. multi-spec catch-all dispatch keys
pub fn invalid_keyword() -> Keyword {
    Keyword::new("conforma", "invalid")
}

/// A native function value: a named callable over `Value` arguments
#[derive(Clone)]
pub struct NativeFn {
    /// Diagnostic name, if the function was registered under one
    pub name: Option<Keyword>,

    /// The callable itself
    pub f: Arc<dyn Fn(&[Value]) -> Result<Value> + Send + Sync>,
}

impl NativeFn {
    pub fn new(f: impl Fn(&[Value]) -> Result<Value> + Send + Sync + 'static) -> Self {
        NativeFn {
            name: None,
            f: Arc::new(f),
        }
    }

    pub fn named(
        name: Keyword,
        f: impl Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    ) -> Self {
        NativeFn {
            name: Some(name),
            f: Arc::new(f),
        }
    }

    /// Invoke with the given arguments
    pub fn call(&self, args: &[Value]) -> Result<Value> {
        (self.f)(args)
    }

    fn addr(&self) -> usize {
        Arc::as_ptr(&self.f) as *const () as usize
    }
}

impl fmt::Debug for NativeFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(n) => write!(f, "#fn[{}]", n),
            None => write!(f, "#fn[{:p}]", Arc::as_ptr(&self.f)),
        }
    }
}

/// A dynamic value
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    /// Bare symbol, used in symbolic forms (`int?`, `cat`, ...)
    Symbol(String),
    Keyword(Keyword),
    Vector(Vec<Value>),
    List(Vec<Value>),
    Map(BTreeMap<Value, Value>),
    Set(BTreeSet<Value>),
    Fn(NativeFn),
}

impl Value {
    /// Symbol form helper
    pub fn symbol(s: impl Into<String>) -> Value {
        Value::Symbol(s.into())
    }

    /// Keyword value from `"ns/name"` notation
    pub fn keyword(s: &str) -> Value {
        Value::Keyword(Keyword::parse(s))
    }

    /// String value helper
    pub fn string(s: impl Into<String>) -> Value {
        Value::String(s.into())
    }

    /// List form helper (used for symbolic forms like `(cat :a int?)`)
    pub fn form(items: Vec<Value>) -> Value {
        Value::List(items)
    }

    /// Map from keyword-keyed pairs
    pub fn map_of(pairs: Vec<(Keyword, Value)>) -> Value {
        Value::Map(
            pairs
                .into_iter()
                .map(|(k, v)| (Value::Keyword(k), v))
                .collect(),
        )
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Truthiness: everything except `nil` and `false`
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    /// Any collection variant
    pub fn is_coll(&self) -> bool {
        matches!(
            self,
            Value::Vector(_) | Value::List(_) | Value::Map(_) | Value::Set(_)
        )
    }

    /// Can the value be viewed as a sequence? (`nil` counts as the empty one)
    pub fn is_seqable(&self) -> bool {
        matches!(
            self,
            Value::Nil | Value::Vector(_) | Value::List(_) | Value::Map(_) | Value::Set(_)
        )
    }

    /// Sequence view: collections yield their elements (maps as `[k v]`
    /// pairs), `nil` yields the empty sequence, scalars yield `None`.
    pub fn as_seq(&self) -> Option<Vec<Value>> {
        match self {
            Value::Nil => Some(Vec::new()),
            Value::Vector(items) | Value::List(items) => Some(items.clone()),
            Value::Map(m) => Some(
                m.iter()
                    .map(|(k, v)| Value::Vector(vec![k.clone(), v.clone()]))
                    .collect(),
            ),
            Value::Set(s) => Some(s.iter().cloned().collect()),
            _ => None,
        }
    }

    /// Element count for collections, `None` for scalars
    pub fn count(&self) -> Option<usize> {
        match self {
            Value::Nil => Some(0),
            Value::Vector(items) | Value::List(items) => Some(items.len()),
            Value::Map(m) => Some(m.len()),
            Value::Set(s) => Some(s.len()),
            _ => None,
        }
    }

    /// Map lookup by value key
    pub fn map_get(&self, k: &Value) -> Option<&Value> {
        match self {
            Value::Map(m) => m.get(k),
            _ => None,
        }
    }

    /// Map lookup by keyword
    pub fn get_kw(&self, k: &Keyword) -> Option<&Value> {
        self.map_get(&Value::Keyword(k.clone()))
    }

    /// Whether a map value contains the key
    pub fn contains_key(&self, k: &Value) -> bool {
        matches!(self, Value::Map(m) if m.contains_key(k))
    }

    /// An empty collection of the same variant, if this is a collection
    pub fn empty_like(&self) -> Option<Value> {
        match self {
            Value::Vector(_) => Some(Value::Vector(Vec::new())),
            Value::List(_) => Some(Value::List(Vec::new())),
            Value::Map(_) => Some(Value::Map(BTreeMap::new())),
            Value::Set(_) => Some(Value::Set(BTreeSet::new())),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Nil => 0,
            Value::Bool(_) => 1,
            Value::Int(_) => 2,
            Value::Float(_) => 3,
            Value::String(_) => 4,
            Value::Symbol(_) => 5,
            Value::Keyword(_) => 6,
            Value::Vector(_) => 7,
            Value::List(_) => 8,
            Value::Map(_) => 9,
            Value::Set(_) => 10,
            Value::Fn(_) => 11,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        use Value::*;
        match (self, other) {
            (Nil, Nil) => Ordering::Equal,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Int(a), Int(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            (String(a), String(b)) => a.cmp(b),
            (Symbol(a), Symbol(b)) => a.cmp(b),
            (Keyword(a), Keyword(b)) => a.cmp(b),
            (Vector(a), Vector(b)) | (List(a), List(b)) => a.cmp(b),
            (Map(a), Map(b)) => a.cmp(b),
            (Set(a), Set(b)) => a.cmp(b),
            (Fn(a), Fn(b)) => a.addr().cmp(&b.addr()),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl std::hash::Hash for Value {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        use Value::*;
        self.rank().hash(state);
        match self {
            Nil => {}
            Bool(a) => a.hash(state),
            Int(a) => a.hash(state),
            Float(a) => a.to_bits().hash(state),
            String(a) => a.hash(state),
            Symbol(a) => a.hash(state),
            Keyword(a) => a.hash(state),
            Vector(a) | List(a) => a.hash(state),
            Map(a) => a.hash(state),
            Set(a) => a.hash(state),
            Fn(a) => a.addr().hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => {
                if x.fract() == 0.0 && x.is_finite() {
                    write!(f, "{:.1}", x)
                } else {
                    write!(f, "{}", x)
                }
            }
            Value::String(s) => write!(f, "{:?}", s),
            Value::Symbol(s) => write!(f, "{}", s),
            Value::Keyword(k) => write!(f, "{}", k),
            Value::Vector(items) => {
                write!(f, "[")?;
                write_joined(f, items)?;
                write!(f, "]")
            }
            Value::List(items) => {
                write!(f, "(")?;
                write_joined(f, items)?;
                write!(f, ")")
            }
            Value::Map(m) => {
                write!(f, "{{")?;
                for (i, (k, v)) in m.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} {}", k, v)?;
                }
                write!(f, "}}")
            }
            Value::Set(s) => {
                write!(f, "#{{")?;
                for (i, v) in s.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "}}")
            }
            Value::Fn(nf) => write!(f, "{:?}", nf),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, items: &[Value]) -> fmt::Result {
    for (i, v) in items.iter().enumerate() {
        if i > 0 {
            write!(f, " ")?;
        }
        write!(f, "{}", v)?;
    }
    Ok(())
}

// JSON-compatible serialization for the diagnostic surface. Keywords and
// symbols render as their text form; map keys are stringified.
impl Serialize for Value {
    fn serialize<S: Serializer>(&self, ser: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::Nil => ser.serialize_unit(),
            Value::Bool(b) => ser.serialize_bool(*b),
            Value::Int(i) => ser.serialize_i64(*i),
            Value::Float(x) => ser.serialize_f64(*x),
            Value::String(s) => ser.serialize_str(s),
            Value::Symbol(s) => ser.serialize_str(s),
            Value::Keyword(k) => ser.serialize_str(&k.to_string()),
            Value::Vector(items) | Value::List(items) => {
                let mut seq = ser.serialize_seq(Some(items.len()))?;
                for v in items {
                    seq.serialize_element(v)?;
                }
                seq.end()
            }
            Value::Set(s) => {
                let mut seq = ser.serialize_seq(Some(s.len()))?;
                for v in s {
                    seq.serialize_element(v)?;
                }
                seq.end()
            }
            Value::Map(m) => {
                let mut map = ser.serialize_map(Some(m.len()))?;
                for (k, v) in m {
                    map.serialize_entry(&k.to_string(), v)?;
                }
                map.end()
            }
            Value::Fn(nf) => ser.serialize_str(&format!("{:?}", nf)),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<Keyword> for Value {
    fn from(k: Keyword) -> Self {
        Value::Keyword(k)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Vector(items)
    }
}
