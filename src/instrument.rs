//! Instrumentation
//!
//! Named callables live in a process-wide var table. `instrument` swaps a
//! var's binding for a wrapper that conforms the argument list against the
//! var's registered fspec before delegating to the original (with the
//! original, unconformed arguments). `unstrument` restores the original
//! binding only if the wrapper is still current, so user re-bindings
//! survive.
//!
//! A thread-local flag suppresses nested checking while a wrapped call is
//! in flight.

use crate::config;
use crate::error::{Error, Result};
use crate::gen::Overrides;
use crate::registry;
use crate::spec::{explain_data, gen_with, Spec};
use crate::value::{Keyword, NativeFn, Value};
use log::debug;
use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};
use std::cell::Cell;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

static VARS: Lazy<RwLock<HashMap<Keyword, Arc<RwLock<NativeFn>>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

struct Instrumented {
    raw: NativeFn,
    wrapped: NativeFn,
}

static INSTRUMENTED: Lazy<Mutex<HashMap<Keyword, Instrumented>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

thread_local! {
    static IN_CHECK: Cell<bool> = const { Cell::new(false) };
}

/// Register (or re-bind) a named callable
pub fn defvar(name: Keyword, f: NativeFn) -> Result<()> {
    if !name.is_qualified() {
        return Err(Error::NotNamespaced(name));
    }
    let mut vars = VARS.write();
    match vars.get(&name) {
        Some(cell) => *cell.write() = NativeFn { name: Some(name), ..f },
        None => {
            let named = NativeFn {
                name: Some(name.clone()),
                ..f
            };
            vars.insert(name, Arc::new(RwLock::new(named)));
        }
    }
    Ok(())
}

/// Current binding of a named callable
pub fn var_fn(name: &Keyword) -> Option<NativeFn> {
    VARS.read().get(name).map(|cell| cell.read().clone())
}

/// Invoke a named callable with the given arguments
pub fn call_var(name: &Keyword, args: &[Value]) -> Result<Value> {
    match var_fn(name) {
        Some(f) => f.call(args),
        None => Err(Error::UnresolvableSpec(name.clone())),
    }
}

/// Options for [`instrument`]
#[derive(Default)]
pub struct InstrumentOpts {
    /// Per-var spec override (instead of the registered one)
    pub spec: HashMap<Keyword, Spec>,

    /// Vars to replace with a pure generator of their ret spec
    pub stub: HashSet<Keyword>,

    /// Vars whose body is substituted entirely (arg checking retained)
    pub replace: HashMap<Keyword, NativeFn>,

    /// Generator overrides for stubbed vars
    pub gen: Overrides,
}

fn swap_binding(name: &Keyword, f: NativeFn) {
    if let Some(cell) = VARS.read().get(name) {
        *cell.write() = f;
    }
}

/// Wrap the named vars with argument-conforming checks. Returns the names
/// actually instrumented (vars without an fspec are skipped).
pub fn instrument(names: &[Keyword], opts: &InstrumentOpts) -> Result<Vec<Keyword>> {
    let mut done = Vec::new();
    let mut table = INSTRUMENTED.lock();
    for name in names {
        let fspec = match opts.spec.get(name).cloned().or_else(|| registry::get_spec(name)) {
            Some(s) => s,
            None => continue,
        };
        let args_spec = match fspec.fspec_args() {
            Some(a) => a,
            None => continue,
        };
        let current = match var_fn(name) {
            Some(f) => f,
            None => continue,
        };
        // never wrap a wrapper: the raw binding survives re-instrumentation
        let raw = match table.get(name) {
            Some(entry) => entry.raw.clone(),
            None => current,
        };
        let base = if opts.stub.contains(name) {
            stub_fn(name, &fspec, &opts.gen)?
        } else if let Some(replacement) = opts.replace.get(name) {
            replacement.clone()
        } else {
            raw.clone()
        };
        let wrapped = wrap(name.clone(), args_spec, base);
        debug!("instrumenting {}", name);
        swap_binding(name, wrapped.clone());
        table.insert(
            name.clone(),
            Instrumented {
                raw,
                wrapped,
            },
        );
        done.push(name.clone());
    }
    Ok(done)
}

/// Instrument every registered var that has an fspec
pub fn instrument_all(opts: &InstrumentOpts) -> Result<Vec<Keyword>> {
    let names: Vec<Keyword> = VARS.read().keys().cloned().collect();
    instrument(&names, opts)
}

/// Restore original bindings. A var whose binding was changed after
/// instrumentation is left alone. Returns the names restored.
pub fn unstrument(names: &[Keyword]) -> Vec<Keyword> {
    let mut done = Vec::new();
    let mut table = INSTRUMENTED.lock();
    for name in names {
        if let Some(entry) = table.remove(name) {
            let still_current = var_fn(name)
                .map(|f| Value::Fn(f) == Value::Fn(entry.wrapped.clone()))
                .unwrap_or(false);
            if still_current {
                debug!("unstrumenting {}", name);
                swap_binding(name, entry.raw);
                done.push(name.clone());
            }
        }
    }
    done
}

/// Restore every instrumented var
pub fn unstrument_all() -> Vec<Keyword> {
    let names: Vec<Keyword> = INSTRUMENTED.lock().keys().cloned().collect();
    unstrument(&names)
}

fn wrap(name: Keyword, args_spec: Spec, base: NativeFn) -> NativeFn {
    NativeFn::named(name.clone(), move |args| {
        let skip = !config::instrument_enabled() || IN_CHECK.with(|c| c.get());
        if !skip {
            let args_val = Value::Vector(args.to_vec());
            IN_CHECK.with(|c| c.set(true));
            let ed = match args_spec.conform(&args_val) {
                Some(_) => None,
                None => explain_data(&args_spec, &args_val),
            };
            IN_CHECK.with(|c| c.set(false));
            if let Some(ed) = ed {
                return Err(Error::InstrumentCheck {
                    name: name.clone(),
                    explain: Box::new(ed),
                    args: args.to_vec(),
                });
            }
        }
        // delegate with the original arguments, not the conformed ones
        IN_CHECK.with(|c| c.set(true));
        let out = base.call(args);
        IN_CHECK.with(|c| c.set(false));
        out
    })
}

/// Pure generator of the var's ret spec, standing in for its body
fn stub_fn(name: &Keyword, fspec: &Spec, overrides: &Overrides) -> Result<NativeFn> {
    let resolved = fspec
        .resolved()
        .ok_or_else(|| Error::UnresolvableSpec(name.clone()))?;
    let ret = match &resolved.kind {
        crate::spec::SpecKind::FSpec(f) => f
            .ret
            .clone()
            .ok_or_else(|| Error::NoFnSpec(name.clone()))?,
        _ => return Err(Error::NoFnSpec(name.clone())),
    };
    let g = gen_with(&ret, overrides)?;
    Ok(NativeFn::new(move |_| g.generate()))
}

/// Sample the registered fspec's args generator `n` times, invoke the named
/// callable, and return `(args, ret)` pairs
pub fn exercise_fn(name: &Keyword, n: usize) -> Result<Vec<(Value, Value)>> {
    let fspec = registry::resolve_strict(name)?;
    let args_spec = fspec
        .fspec_args()
        .ok_or_else(|| Error::NoArgsSpec(name.clone()))?;
    let f = var_fn(name).ok_or_else(|| Error::UnresolvableSpec(name.clone()))?;
    let g = crate::spec::gen(&args_spec)?;
    let mut out = Vec::with_capacity(n);
    for args_val in g.sample(n)? {
        let args = args_val.as_seq().unwrap_or_default();
        let ret = f.call(&args)?;
        out.push((args_val, ret));
    }
    Ok(out)
}
