//! The spec registry
//!
//! A process-global table mapping namespace-qualified names to specs.
//! Aliases are stored as named references and resolution walks the chain
//! until a concrete spec is reached; the resolved spec remembers the name it
//! was looked up under for diagnostics.
//!
//! Reads take an atomic snapshot of an immutable map; registration swaps in
//! a fresh copy, so readers never observe a partially-updated table.

use crate::error::{Error, Result};
use crate::fspec::FnSpec;
use crate::spec::{Spec, SpecKind};
use crate::value::Keyword;
use log::debug;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

static REGISTRY: Lazy<RwLock<Arc<HashMap<Keyword, Spec>>>> =
    Lazy::new(|| RwLock::new(Arc::new(HashMap::new())));

/// Register a spec under a namespace-qualified name. Registering a named
/// reference creates an alias.
pub fn def(name: Keyword, spec: Spec) -> Result<()> {
    if !name.is_qualified() {
        return Err(Error::NotNamespaced(name));
    }
    debug!("registering spec {}", name);
    let mut guard = REGISTRY.write();
    let mut next = HashMap::clone(&guard);
    next.insert(name, spec);
    *guard = Arc::new(next);
    Ok(())
}

/// Register a function contract: shorthand for `def(name, fspec(...))`
pub fn fdef(
    name: Keyword,
    args: Option<Spec>,
    ret: Option<Spec>,
    fn_spec: Option<Spec>,
) -> Result<()> {
    def(name, FnSpec::spec(args, ret, fn_spec))
}

/// Current registry snapshot
pub fn registry() -> Arc<HashMap<Keyword, Spec>> {
    REGISTRY.read().clone()
}

/// Raw lookup, one step (aliases are returned as references)
pub fn get_spec(name: &Keyword) -> Option<Spec> {
    registry().get(name).cloned()
}

/// Walk the alias chain starting at `name` until a concrete spec is
/// reached. The result carries `name` for diagnostics. `None` when the
/// chain ends at nothing (or cycles).
pub fn resolve(name: &Keyword) -> Option<Spec> {
    let snapshot = registry();
    let mut seen = HashSet::new();
    let mut k = name.clone();
    loop {
        if !seen.insert(k.clone()) {
            return None;
        }
        let spec = snapshot.get(&k)?;
        match &spec.kind {
            SpecKind::Ref(next) => k = next.clone(),
            _ => return Some(spec.clone().with_name(name.clone())),
        }
    }
}

/// Like [`resolve`], but an unresolvable name is an error
pub fn resolve_strict(name: &Keyword) -> Result<Spec> {
    resolve(name).ok_or_else(|| Error::UnresolvableSpec(name.clone()))
}
