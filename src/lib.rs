// Production-quality lints
#![warn(
    clippy::todo,
    clippy::unimplemented,
    clippy::dbg_macro,
    clippy::print_stdout,
    clippy::print_stderr
)]
// Deny truly dangerous patterns
#![deny(clippy::mem_forget)]
// Allow common patterns in library code
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

//! # Conforma — runtime data specification and validation
//!
//! A *spec* is a first-class description of the shape of a value. Specs
//! validate values, **conform** them (returning a destructured canonical
//! form), **unform** them (round-trip back to the input shape), **explain**
//! failures as structured diagnostics, and **generate** sample values.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use conforma::{conform, explain_str, preds, regex, Spec};
//! use conforma::value::{kw, Value};
//!
//! // a sequence spec: any number of ints followed by a string
//! let s = regex::cat(vec![
//!     (kw("xs"), regex::star(preds::is_int())),
//!     (kw("s"), preds::is_string()),
//! ]);
//!
//! let input = Value::Vector(vec![
//!     Value::Int(1), Value::Int(2), Value::Int(3), Value::from("x"),
//! ]);
//! // conform destructures: {:xs [1 2 3], :s "x"}
//! let conformed = conform(&s, &input).unwrap();
//!
//! // failures explain themselves
//! let bad = Value::Vector(vec![Value::Int(1), Value::Bool(true)]);
//! println!("{}", explain_str(&s, &bad));
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                                                              │
//! │  SPEC (predicates + combinators + sequence regexes)          │
//! │       │                                                      │
//! │       ├──► conform(spec, x)      ──► destructured value      │
//! │       ├──► unform(spec, y)       ──► original shape          │
//! │       ├──► explain_data(spec, x) ──► Problems                │
//! │       └──► gen(spec)             ──► random valid values     │
//! │                                                              │
//! │  REGISTRY (name → spec, alias chains, recursion)             │
//! │                                                              │
//! │  INSTRUMENT (var → arg-checking wrapper)                     │
//! │                                                              │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Sequence matching uses Brzozowski derivatives over a tagged op tree
//! (`regex::cat`/`alt`/`star`/`plus`/`maybe`/`amp`), producing destructured
//! results keyed by the part tags. Recursive specs are expressed through
//! registry names resolved at operation time; generation bounds recursive
//! descent with a per-call budget.

// Core modules
pub mod coll;
pub mod config;
pub mod error;
pub mod explain;
pub mod fspec;
pub mod gen;
pub mod instrument;
pub mod keys;
pub mod preds;
pub mod regex;
pub mod registry;
pub mod spec;
pub mod value;

// Re-exports
pub use coll::{CollKind, CollOpts, MultiMethods, Retag};
pub use error::{Error, Result};
pub use explain::{ExplainData, Problem};
pub use gen::{Gen, GenFn, Overrides, RecursionMap};
pub use keys::{KeyReq, KeysForm};
pub use registry::{def, fdef, get_spec, registry, resolve, resolve_strict};
pub use spec::{
    assert_conform, conform, exercise, explain_data, explain_str, form, gen, gen_with, unform,
    valid, Spec,
};
pub use value::{kw, Keyword, NativeFn, Value};

pub use instrument::{
    call_var, defvar, exercise_fn, instrument, instrument_all, unstrument, unstrument_all,
    InstrumentOpts,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
