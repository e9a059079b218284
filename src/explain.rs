//! Structured diagnostics
//!
//! A failed conform can be explained as a vector of [`Problem`]s, each
//! locating one fault: `path` indexes into the conformed structure, `in_path`
//! indexes into the input value, `via` is the chain of named specs crossed on
//! the way down, and `pred` is the symbolic form of the predicate that
//! failed. [`ExplainData`] bundles the problems with the top-level spec form
//! and the offending value, and renders to the line-oriented text format.

use crate::value::{Keyword, Value};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// One diagnostic: a single predicate failure at a location
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Problem {
    /// Path into the conformed structure (keywords and indices)
    pub path: Vec<Value>,

    /// Symbolic form of the failing predicate
    pub pred: Value,

    /// The value that failed
    pub val: Value,

    /// Named specs traversed, outermost first
    pub via: Vec<Keyword>,

    /// Path into the input value
    #[serde(rename = "in")]
    pub in_path: Vec<Value>,

    /// Human-readable qualifier, e.g. "Insufficient input"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Additional per-problem data
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Value>,
}

impl Problem {
    pub fn new(
        path: Vec<Value>,
        pred: Value,
        val: Value,
        via: Vec<Keyword>,
        in_path: Vec<Value>,
    ) -> Self {
        Problem {
            path,
            pred,
            val,
            via,
            in_path,
            reason: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// The full explanation for a non-conforming value
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExplainData {
    /// Problems in traversal order
    pub problems: Vec<Problem>,

    /// Symbolic form of the top-level spec
    pub spec: Value,

    /// The original input value
    pub value: Value,
}

impl ExplainData {
    /// Render to the line-oriented text format. `None` (a valid input)
    /// renders as `Success!`.
    pub fn print(ed: Option<&ExplainData>) -> String {
        let mut out = String::new();
        match ed {
            None => out.push_str("Success!\n"),
            Some(ed) => {
                for p in &ed.problems {
                    if !p.in_path.is_empty() {
                        let _ = write!(out, "In: {} ", Value::Vector(p.in_path.clone()));
                    }
                    let _ = write!(out, "val: {} fails", p.val);
                    if let Some(last) = p.via.last() {
                        let _ = write!(out, " spec: {}", last);
                    }
                    if !p.path.is_empty() {
                        let _ = write!(out, " at: {}", Value::Vector(p.path.clone()));
                    }
                    let _ = write!(out, " predicate: {}", p.pred);
                    if let Some(reason) = &p.reason {
                        let _ = write!(out, ", {}", reason);
                    }
                    out.push('\n');
                    for (k, v) in &p.extra {
                        let _ = writeln!(out, "\t{} {}", k, v);
                    }
                }
                let _ = writeln!(out, ":conforma/spec {}", ed.spec);
                let _ = writeln!(out, ":conforma/value {}", ed.value);
            }
        }
        out
    }
}

impl std::fmt::Display for ExplainData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&ExplainData::print(Some(self)))
    }
}
