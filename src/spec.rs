//! The spec algebra — core types and the six-operation surface
//!
//! A [`Spec`] is a first-class description of the shape of a value. Every
//! spec supports the same six operations:
//!
//! - `conform(x)` — validate AND destructure; `None` means invalid
//! - `unform(y)` — invert conform
//! - `explain` — structured diagnostics for a failing value
//! - `gen` — a random generator of valid values
//! - `describe` — symbolic data form
//! - `with_gen` — attach a replacement generator
//!
//! Structural specs hold their children as `Spec` values; recursion is
//! expressed through named references resolved against the registry at
//! operation time, so spec graphs are never cyclic.

use crate::coll::{EverySpec, MultiSpec, TupleSpec};
use crate::error::{Error, Result};
use crate::explain::{ExplainData, Problem};
use crate::fspec::FnSpec;
use crate::gen::{gen_for_pred, Gen, GenFn, Overrides, RecursionMap, SUCH_THAT_TRIES};
use crate::keys::KeysSpec;
use crate::regex::ROp;
use crate::registry;
use crate::value::{Keyword, Value};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Fresh stable id for a branching op (used by the generation recursion
/// budget)
pub(crate) fn next_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

pub(crate) type PredRaw = Arc<dyn Fn(&Value) -> bool + Send + Sync>;
pub(crate) type ConformerRaw = Arc<dyn Fn(&Value) -> Option<Value> + Send + Sync>;
pub(crate) type UnformRaw = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

/// Leaf executable: plain predicate or conformer
#[derive(Clone)]
pub(crate) enum PredFn {
    /// Truthy check; conform returns the input unchanged
    Pred(PredRaw),
    /// Transforming check; conform returns the transformed value
    Conformer(ConformerRaw),
}

/// Leaf spec: a single predicate or conformer with its symbolic form
pub struct PredSpec {
    pub(crate) form: Value,
    pub(crate) f: PredFn,
    pub(crate) unf: Option<UnformRaw>,
}

/// `and` — every sub-spec must match; conformed values thread left to right
pub struct AndSpec {
    pub(crate) forms: Vec<Value>,
    pub(crate) preds: Vec<Spec>,
}

/// `or` — tagged alternation; conform yields `[tag conformed]`
pub struct OrSpec {
    pub(crate) keys: Vec<Keyword>,
    pub(crate) forms: Vec<Value>,
    pub(crate) preds: Vec<Spec>,
    pub(crate) id: u64,
}

/// `merge` — conjunction of map-shaped specs whose conforms are merged
pub struct MergeSpec {
    pub(crate) forms: Vec<Value>,
    pub(crate) preds: Vec<Spec>,
}

/// The spec variants
#[derive(Clone)]
pub(crate) enum SpecKind {
    /// Registry reference, resolved at operation time
    Ref(Keyword),
    Pred(Arc<PredSpec>),
    And(Arc<AndSpec>),
    Or(Arc<OrSpec>),
    Merge(Arc<MergeSpec>),
    Nilable(Arc<Spec>),
    Keys(Arc<KeysSpec>),
    Tuple(Arc<TupleSpec>),
    Every(Arc<EverySpec>),
    Multi(Arc<MultiSpec>),
    /// Sequence regex; splices into an enclosing regex
    Regex(Arc<ROp>),
    /// Splice barrier: delegates every operation but never splices, so a
    /// wrapped regex matches a single (nested) sequence element
    Wrap(Arc<Spec>),
    FSpec(Arc<FnSpec>),
}

/// A data specification
#[derive(Clone)]
pub struct Spec {
    pub(crate) kind: SpecKind,
    pub(crate) gfn: Option<GenFn>,
    pub(crate) name: Option<Keyword>,
}

impl fmt::Debug for Spec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Spec({})", self.describe())
    }
}

impl Spec {
    pub(crate) fn from_kind(kind: SpecKind) -> Spec {
        Spec {
            kind,
            gfn: None,
            name: None,
        }
    }

    // ---- constructors -------------------------------------------------

    /// Leaf predicate spec with a symbol form, e.g. `Spec::pred("even?", f)`
    pub fn pred(sym: &str, f: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Spec {
        Spec::pred_form(Value::symbol(sym), f)
    }

    /// Leaf predicate spec with an explicit symbolic form
    pub fn pred_form(form: Value, f: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Spec {
        Spec::from_kind(SpecKind::Pred(Arc::new(PredSpec {
            form,
            f: PredFn::Pred(Arc::new(f)),
            unf: None,
        })))
    }

    /// Conformer: returns the transformed value, or `None` for invalid
    pub fn conformer(
        form: Value,
        f: impl Fn(&Value) -> Option<Value> + Send + Sync + 'static,
    ) -> Spec {
        Spec::from_kind(SpecKind::Pred(Arc::new(PredSpec {
            form,
            f: PredFn::Conformer(Arc::new(f)),
            unf: None,
        })))
    }

    /// Conformer with a paired inverse for unform
    pub fn conformer_with_unform(
        form: Value,
        f: impl Fn(&Value) -> Option<Value> + Send + Sync + 'static,
        unf: impl Fn(&Value) -> Value + Send + Sync + 'static,
    ) -> Spec {
        Spec::from_kind(SpecKind::Pred(Arc::new(PredSpec {
            form,
            f: PredFn::Conformer(Arc::new(f)),
            unf: Some(Arc::new(unf)),
        })))
    }

    /// Reference to a registered spec, resolved at operation time
    pub fn named(name: impl Into<Keyword>) -> Spec {
        Spec::from_kind(SpecKind::Ref(name.into()))
    }

    /// Membership in a literal value set; generates by picking elements
    pub fn value_set(items: BTreeSet<Value>) -> Spec {
        let form = Value::Set(items.clone());
        let members = items.clone();
        let spec = Spec::pred_form(form, move |v| members.contains(v));
        let gen_items: Vec<Value> = items.into_iter().collect();
        spec.with_gen(Arc::new(move || Gen::elements(gen_items.clone())))
    }

    /// `and` of sub-specs; conform threads each result into the next
    pub fn and(preds: Vec<Spec>) -> Spec {
        let forms = preds.iter().map(|p| p.describe()).collect();
        Spec::from_kind(SpecKind::And(Arc::new(AndSpec { forms, preds })))
    }

    /// Tagged `or` of sub-specs
    pub fn or(branches: Vec<(Keyword, Spec)>) -> Spec {
        let mut keys = Vec::with_capacity(branches.len());
        let mut forms = Vec::with_capacity(branches.len());
        let mut preds = Vec::with_capacity(branches.len());
        for (k, p) in branches {
            forms.push(p.describe());
            keys.push(k);
            preds.push(p);
        }
        Spec::from_kind(SpecKind::Or(Arc::new(OrSpec {
            keys,
            forms,
            preds,
            id: next_id(),
        })))
    }

    /// `merge` of map-shaped specs
    pub fn merge(preds: Vec<Spec>) -> Spec {
        let forms = preds.iter().map(|p| p.describe()).collect();
        Spec::from_kind(SpecKind::Merge(Arc::new(MergeSpec { forms, preds })))
    }

    /// Matches `nil` or the wrapped spec
    pub fn nilable(inner: Spec) -> Spec {
        Spec::from_kind(SpecKind::Nilable(Arc::new(inner)))
    }

    /// Wrap a spec (typically a regex or a name referencing one) so that
    /// inside an enclosing regex it matches one nested sequence element
    /// instead of splicing
    pub fn nested(self) -> Spec {
        Spec::from_kind(SpecKind::Wrap(Arc::new(self)))
    }

    // ---- identity -----------------------------------------------------

    /// Attach a replacement generator constructor
    pub fn with_gen(mut self, gfn: GenFn) -> Spec {
        self.gfn = Some(gfn);
        self
    }

    pub(crate) fn with_name(mut self, name: Keyword) -> Spec {
        self.name = Some(name);
        self
    }

    /// The registry name this spec was resolved under, if any
    pub fn name(&self) -> Option<&Keyword> {
        self.name.as_ref()
    }

    /// Resolve a `Ref` chain against the registry; other kinds return
    /// themselves. `None` when a name is unregistered.
    pub(crate) fn resolved(&self) -> Option<Spec> {
        match &self.kind {
            SpecKind::Ref(k) => registry::resolve(k).map(|s| s.with_name(k.clone())),
            _ => Some(self.clone()),
        }
    }

    /// Like [`Spec::resolved`], but an unregistered name is an error
    pub(crate) fn resolved_strict(&self) -> Result<Spec> {
        match &self.kind {
            SpecKind::Ref(k) => self
                .resolved()
                .ok_or_else(|| Error::UnresolvableSpec(k.clone())),
            _ => Ok(self.clone()),
        }
    }

    // ---- the six operations -------------------------------------------

    /// Validate and destructure; `None` is the invalid result
    pub fn conform(&self, x: &Value) -> Option<Value> {
        match &self.kind {
            SpecKind::Ref(_) => self.resolved().and_then(|s| s.conform(x)),
            SpecKind::Pred(p) => p.conform(x),
            SpecKind::And(a) => {
                let mut ret = x.clone();
                for p in &a.preds {
                    ret = p.conform(&ret)?;
                }
                Some(ret)
            }
            SpecKind::Or(o) => {
                for (k, p) in o.keys.iter().zip(&o.preds) {
                    if let Some(v) = p.conform(x) {
                        return Some(Value::Vector(vec![Value::Keyword(k.clone()), v]));
                    }
                }
                None
            }
            SpecKind::Merge(m) => {
                let mut merged = std::collections::BTreeMap::new();
                for p in &m.preds {
                    match p.conform(x)? {
                        Value::Map(entries) => merged.extend(entries),
                        _ => return None,
                    }
                }
                Some(Value::Map(merged))
            }
            SpecKind::Nilable(inner) => {
                if x.is_nil() {
                    Some(Value::Nil)
                } else {
                    inner.conform(x)
                }
            }
            SpecKind::Keys(k) => k.conform(x),
            SpecKind::Tuple(t) => t.conform(x),
            SpecKind::Every(e) => e.conform(x),
            SpecKind::Multi(m) => m.conform(x),
            SpecKind::Regex(op) => crate::regex::regex_conform(op, x),
            SpecKind::Wrap(inner) => inner.conform(x),
            SpecKind::FSpec(f) => f.conform(x),
        }
    }

    /// Invert conform
    pub fn unform(&self, y: &Value) -> Result<Value> {
        match &self.kind {
            SpecKind::Ref(_) => self.resolved_strict()?.unform(y),
            SpecKind::Pred(p) => p.unform(y),
            SpecKind::And(a) => {
                let mut ret = y.clone();
                for p in a.preds.iter().rev() {
                    ret = p.unform(&ret)?;
                }
                Ok(ret)
            }
            SpecKind::Or(o) => {
                let items = match y {
                    Value::Vector(items) | Value::List(items) if items.len() == 2 => items,
                    _ => {
                        return Err(Error::Other(format!(
                            "or unform expects a [tag value] pair, got: {}",
                            y
                        )))
                    }
                };
                let tag = match &items[0] {
                    Value::Keyword(k) => k,
                    other => {
                        return Err(Error::Other(format!("or unform tag must be a keyword: {}", other)))
                    }
                };
                match o.keys.iter().position(|k| k == tag) {
                    Some(i) => o.preds[i].unform(&items[1]),
                    None => Err(Error::Other(format!("no or branch tagged {}", tag))),
                }
            }
            SpecKind::Merge(m) => {
                let mut merged = std::collections::BTreeMap::new();
                for p in m.preds.iter().rev() {
                    match p.unform(y)? {
                        Value::Map(entries) => {
                            for (k, v) in entries {
                                merged.entry(k).or_insert(v);
                            }
                        }
                        other => {
                            return Err(Error::Other(format!(
                                "merge unform expects maps, got: {}",
                                other
                            )))
                        }
                    }
                }
                Ok(Value::Map(merged))
            }
            SpecKind::Nilable(inner) => {
                if y.is_nil() {
                    Ok(Value::Nil)
                } else {
                    inner.unform(y)
                }
            }
            SpecKind::Keys(k) => k.unform(y),
            SpecKind::Tuple(t) => t.unform(y),
            SpecKind::Every(e) => e.unform(y),
            SpecKind::Multi(m) => m.unform(y),
            SpecKind::Regex(op) => crate::regex::regex_unform(op, y),
            SpecKind::Wrap(inner) => inner.unform(y),
            SpecKind::FSpec(_) => Ok(y.clone()),
        }
    }

    /// Collect problems for a failing value; empty means valid
    pub(crate) fn explain1(
        &self,
        path: &[Value],
        via: &[Keyword],
        in_path: &[Value],
        x: &Value,
    ) -> Vec<Problem> {
        match &self.kind {
            SpecKind::Ref(k) => {
                let mut via = via.to_vec();
                via.push(k.clone());
                match registry::resolve(k) {
                    Some(s) => s.explain1(path, &via, in_path, x),
                    None => vec![Problem::new(
                        path.to_vec(),
                        Value::Keyword(k.clone()),
                        x.clone(),
                        via,
                        in_path.to_vec(),
                    )
                    .with_reason("Unable to resolve spec")],
                }
            }
            SpecKind::Pred(p) => {
                if p.conform(x).is_some() {
                    Vec::new()
                } else {
                    vec![Problem::new(
                        path.to_vec(),
                        p.form.clone(),
                        x.clone(),
                        via.to_vec(),
                        in_path.to_vec(),
                    )]
                }
            }
            SpecKind::And(a) => explain_pred_list(&a.preds, path, via, in_path, x),
            SpecKind::Or(o) => {
                if self.conform(x).is_some() {
                    return Vec::new();
                }
                let mut probs = Vec::new();
                for (k, p) in o.keys.iter().zip(&o.preds) {
                    let mut branch_path = path.to_vec();
                    branch_path.push(Value::Keyword(k.clone()));
                    probs.extend(p.explain1(&branch_path, via, in_path, x));
                }
                probs
            }
            SpecKind::Merge(m) => {
                let mut probs = Vec::new();
                for p in &m.preds {
                    probs.extend(p.explain1(path, via, in_path, x));
                }
                probs
            }
            SpecKind::Nilable(inner) => {
                if self.conform(x).is_some() {
                    return Vec::new();
                }
                let mut probs = Vec::new();
                let mut pred_path = path.to_vec();
                pred_path.push(Value::keyword("conforma/pred"));
                probs.extend(inner.explain1(&pred_path, via, in_path, x));
                let mut nil_path = path.to_vec();
                nil_path.push(Value::keyword("conforma/nil"));
                probs.push(Problem::new(
                    nil_path,
                    Value::symbol("nil?"),
                    x.clone(),
                    via.to_vec(),
                    in_path.to_vec(),
                ));
                probs
            }
            SpecKind::Keys(k) => k.explain(path, via, in_path, x),
            SpecKind::Tuple(t) => t.explain(path, via, in_path, x),
            SpecKind::Every(e) => e.explain(path, via, in_path, x),
            SpecKind::Multi(m) => m.explain(path, via, in_path, x),
            SpecKind::Regex(op) => crate::regex::regex_explain(op, path, via, in_path, x),
            SpecKind::Wrap(inner) => inner.explain1(path, via, in_path, x),
            SpecKind::FSpec(f) => f.explain(path, via, in_path, x),
        }
    }

    /// Construct a generator. `Ok(None)` means this branch has no generator
    /// (recursion cutoff or unknown predicate); callers decide whether that
    /// is an error.
    pub(crate) fn gen0(
        &self,
        overrides: &Overrides,
        path: &[Value],
        rmap: &RecursionMap,
    ) -> Result<Option<Gen>> {
        if let Some(gfn) = &self.gfn {
            return Ok(Some(gfn()?));
        }
        match &self.kind {
            SpecKind::Ref(_) => self.resolved_strict()?.gen0(overrides, path, rmap),
            SpecKind::Pred(p) => Ok(gen_for_pred(&p.form)),
            SpecKind::And(a) => match a.preds.first() {
                Some(first) => {
                    let (first, overrides, path, rmap, form) = (
                        first.clone(),
                        overrides.clone(),
                        path.to_vec(),
                        rmap.clone(),
                        a.forms[0].clone(),
                    );
                    Ok(Some(Gen::delay(move || {
                        gensub(&first, &overrides, &path, &rmap, &form)
                    })))
                }
                None => Ok(None),
            },
            SpecKind::Or(o) => {
                let rmap = rmap.inck(o.id);
                let mut gens = Vec::new();
                for ((k, p), f) in o.keys.iter().zip(&o.preds).zip(&o.forms) {
                    let kv = Value::Keyword(k.clone());
                    if rmap.cut_off(o.id, path, &kv) {
                        continue;
                    }
                    let mut branch_path = path.to_vec();
                    branch_path.push(kv);
                    let (p, overrides, rmap, f) =
                        (p.clone(), overrides.clone(), rmap.clone(), f.clone());
                    gens.push(Gen::delay(move || {
                        gensub(&p, &overrides, &branch_path, &rmap, &f)
                    }));
                }
                if gens.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(Gen::one_of(gens)?))
                }
            }
            SpecKind::Merge(m) => {
                let mut gens = Vec::new();
                for (p, f) in m.preds.iter().zip(&m.forms) {
                    let (p, overrides, path, rmap, f) = (
                        p.clone(),
                        overrides.clone(),
                        path.to_vec(),
                        rmap.clone(),
                        f.clone(),
                    );
                    gens.push(Gen::delay(move || gensub(&p, &overrides, &path, &rmap, &f)));
                }
                Ok(Some(Gen::tuple(gens).fmap(|v| {
                    let mut merged = std::collections::BTreeMap::new();
                    if let Value::Vector(maps) = v {
                        for m in maps {
                            if let Value::Map(entries) = m {
                                merged.extend(entries);
                            }
                        }
                    }
                    Value::Map(merged)
                })))
            }
            SpecKind::Nilable(inner) => {
                let (inner, overrides, path, rmap) = (
                    inner.as_ref().clone(),
                    overrides.clone(),
                    path.to_vec(),
                    rmap.clone(),
                );
                let form = inner.describe();
                let sub = Gen::delay(move || gensub(&inner, &overrides, &path, &rmap, &form));
                Ok(Some(Gen::frequency(vec![
                    (1, Gen::pure(Value::Nil)),
                    (9, sub),
                ])?))
            }
            SpecKind::Keys(k) => k.gen0(overrides, path, rmap),
            SpecKind::Tuple(t) => t.gen0(overrides, path, rmap),
            SpecKind::Every(e) => e.gen0(overrides, path, rmap),
            SpecKind::Multi(m) => m.gen0(overrides, path, rmap),
            SpecKind::Regex(op) => crate::regex::regex_gen(op, overrides, path, rmap),
            SpecKind::Wrap(inner) => inner.gen0(overrides, path, rmap),
            SpecKind::FSpec(f) => f.gen0(),
        }
    }

    /// Symbolic data representation
    pub fn describe(&self) -> Value {
        match &self.kind {
            SpecKind::Ref(k) => Value::Keyword(k.clone()),
            SpecKind::Pred(p) => p.form.clone(),
            SpecKind::And(a) => {
                let mut items = vec![Value::symbol("and")];
                items.extend(a.forms.iter().cloned());
                Value::form(items)
            }
            SpecKind::Or(o) => {
                let mut items = vec![Value::symbol("or")];
                for (k, f) in o.keys.iter().zip(&o.forms) {
                    items.push(Value::Keyword(k.clone()));
                    items.push(f.clone());
                }
                Value::form(items)
            }
            SpecKind::Merge(m) => {
                let mut items = vec![Value::symbol("merge")];
                items.extend(m.forms.iter().cloned());
                Value::form(items)
            }
            SpecKind::Nilable(inner) => {
                Value::form(vec![Value::symbol("nilable"), inner.describe()])
            }
            SpecKind::Keys(k) => k.describe(),
            SpecKind::Tuple(t) => t.describe(),
            SpecKind::Every(e) => e.describe(),
            SpecKind::Multi(m) => m.describe(),
            SpecKind::Regex(op) => crate::regex::op_describe(op),
            SpecKind::Wrap(inner) => {
                Value::form(vec![Value::symbol("spec"), inner.describe()])
            }
            SpecKind::FSpec(f) => f.describe(),
        }
    }
}

impl PredSpec {
    pub(crate) fn conform(&self, x: &Value) -> Option<Value> {
        match &self.f {
            PredFn::Pred(p) => {
                if p(x) {
                    Some(x.clone())
                } else {
                    None
                }
            }
            PredFn::Conformer(c) => c(x),
        }
    }

    pub(crate) fn unform(&self, y: &Value) -> Result<Value> {
        match &self.f {
            PredFn::Pred(_) => Ok(y.clone()),
            PredFn::Conformer(_) => match &self.unf {
                Some(unf) => Ok(unf(y)),
                None => Err(Error::NonInvertible(self.form.clone())),
            },
        }
    }
}

/// Thread `x` through a list of specs' conforms; `None` on first failure.
/// The regex `&` op and `and` share this.
pub(crate) fn and_preds(x: &Value, preds: &[Spec]) -> Option<Value> {
    let mut ret = x.clone();
    for p in preds {
        ret = p.conform(&ret)?;
    }
    Some(ret)
}

/// Explain an `and`-style chain: thread conforms and explain the first
/// failing sub-spec against the value it actually saw
pub(crate) fn explain_pred_list(
    preds: &[Spec],
    path: &[Value],
    via: &[Keyword],
    in_path: &[Value],
    x: &Value,
) -> Vec<Problem> {
    let mut ret = x.clone();
    for p in preds {
        match p.conform(&ret) {
            Some(next) => ret = next,
            None => return p.explain1(path, via, in_path, &ret),
        }
    }
    Vec::new()
}

/// Resolve a spec and produce its generator: override by name, then by
/// path, then the spec's own generator; the result is filtered by validity
pub(crate) fn gensub(
    spec: &Spec,
    overrides: &Overrides,
    path: &[Value],
    rmap: &RecursionMap,
    form: &Value,
) -> Result<Gen> {
    let spec = spec.resolved_strict()?;
    let from_override = spec
        .name()
        .and_then(|n| overrides.lookup_name(n))
        .or_else(|| overrides.lookup_path(path));
    let g = match from_override {
        Some(gfn) => Some(gfn()?),
        None => spec.gen0(overrides, path, rmap)?,
    };
    match g {
        Some(g) => {
            let check = spec.clone();
            Ok(g.such_that(move |v| check.conform(v).is_some(), SUCH_THAT_TRIES))
        }
        None => Err(Error::NoGenerator {
            path: path.to_vec(),
            form: form.clone(),
        }),
    }
}

// ---- public operations ------------------------------------------------

/// Validate and destructure `x`; `None` is the invalid result
pub fn conform(spec: &Spec, x: &Value) -> Option<Value> {
    spec.conform(x)
}

/// Does `x` satisfy the spec?
pub fn valid(spec: &Spec, x: &Value) -> bool {
    spec.conform(x).is_some()
}

/// Round a conformed value back to its input shape
pub fn unform(spec: &Spec, y: &Value) -> Result<Value> {
    spec.unform(y)
}

/// Structured diagnostics; `None` when `x` is valid
pub fn explain_data(spec: &Spec, x: &Value) -> Option<ExplainData> {
    let problems = spec.explain1(&[], &[], &[], x);
    if problems.is_empty() {
        None
    } else {
        Some(ExplainData {
            problems,
            spec: spec.describe(),
            value: x.clone(),
        })
    }
}

/// Text rendering of the explanation (`Success!` when valid)
pub fn explain_str(spec: &Spec, x: &Value) -> String {
    ExplainData::print(explain_data(spec, x).as_ref())
}

/// Symbolic data representation of the spec
pub fn form(spec: &Spec) -> Value {
    spec.describe()
}

/// A generator of valid values
pub fn gen(spec: &Spec) -> Result<Gen> {
    gen_with(spec, &Overrides::new())
}

/// A generator of valid values, with overrides by spec name or path
pub fn gen_with(spec: &Spec, overrides: &Overrides) -> Result<Gen> {
    let rmap = RecursionMap::new(crate::config::recursion_limit());
    gensub(spec, overrides, &[], &rmap, &spec.describe())
}

/// `n` sampled values paired with their conformed forms
pub fn exercise(spec: &Spec, n: usize, overrides: &Overrides) -> Result<Vec<(Value, Value)>> {
    let g = gen_with(spec, overrides)?;
    let vals = g.sample(n)?;
    let mut out = Vec::with_capacity(vals.len());
    for v in vals {
        let c = spec.conform(&v).ok_or_else(|| {
            Error::Other(format!("generated value failed to conform: {}", v))
        })?;
        out.push((v, c));
    }
    Ok(out)
}

/// Conform or produce the explain payload as an error; instrumentation and
/// callers wanting exceptions use this
pub fn assert_conform(spec: &Spec, x: &Value) -> Result<Value> {
    match spec.conform(x) {
        Some(c) => Ok(c),
        None => {
            let ed = explain_data(spec, x).unwrap_or(ExplainData {
                problems: Vec::new(),
                spec: spec.describe(),
                value: x.clone(),
            });
            Err(Error::Other(ExplainData::print(Some(&ed))))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preds;
    use crate::value::kw;

    #[test]
    fn test_pred_conform() {
        let s = preds::is_int();
        assert_eq!(s.conform(&Value::Int(3)), Some(Value::Int(3)));
        assert_eq!(s.conform(&Value::from("x")), None);
    }

    #[test]
    fn test_conformer_and_unform() {
        // string -> int conformer with inverse
        let s = Spec::conformer_with_unform(
            Value::symbol("parse-int"),
            |v| match v {
                Value::String(s) => s.parse::<i64>().ok().map(Value::Int),
                _ => None,
            },
            |v| Value::String(v.to_string()),
        );
        assert_eq!(s.conform(&Value::from("42")), Some(Value::Int(42)));
        assert_eq!(s.conform(&Value::from("x")), None);
        assert_eq!(s.unform(&Value::Int(42)).unwrap(), Value::from("42"));
    }

    #[test]
    fn test_conformer_without_unform_errors() {
        let s = Spec::conformer(Value::symbol("parse-int"), |v| match v {
            Value::String(s) => s.parse::<i64>().ok().map(Value::Int),
            _ => None,
        });
        assert!(matches!(
            s.unform(&Value::Int(42)),
            Err(Error::NonInvertible(_))
        ));
    }

    #[test]
    fn test_and_threads_conform() {
        let parse = Spec::conformer(Value::symbol("parse-int"), |v| match v {
            Value::String(s) => s.parse::<i64>().ok().map(Value::Int),
            _ => None,
        });
        let s = Spec::and(vec![preds::is_string(), parse, preds::is_int()]);
        assert_eq!(s.conform(&Value::from("7")), Some(Value::Int(7)));
        assert_eq!(s.conform(&Value::Int(7)), None);
    }

    #[test]
    fn test_or_tags_and_unforms() {
        let s = Spec::or(vec![
            (kw("i"), preds::is_int()),
            (kw("s"), preds::is_string()),
        ]);
        assert_eq!(
            s.conform(&Value::Int(3)),
            Some(Value::Vector(vec![Value::keyword("i"), Value::Int(3)]))
        );
        let tagged = Value::Vector(vec![Value::keyword("s"), Value::from("q")]);
        assert_eq!(s.unform(&tagged).unwrap(), Value::from("q"));
        assert_eq!(s.conform(&Value::Bool(true)), None);
    }

    #[test]
    fn test_or_explain_has_branch_paths() {
        let s = Spec::or(vec![
            (kw("i"), preds::is_int()),
            (kw("s"), preds::is_string()),
        ]);
        let probs = s.explain1(&[], &[], &[], &Value::Bool(true));
        assert_eq!(probs.len(), 2);
        assert_eq!(probs[0].path, vec![Value::keyword("i")]);
        assert_eq!(probs[1].path, vec![Value::keyword("s")]);
    }

    #[test]
    fn test_and_explain_stops_at_first_failure() {
        let s = Spec::and(vec![preds::is_int(), Spec::pred("pos?", |v| {
            matches!(v, Value::Int(i) if *i > 0)
        })]);
        let probs = s.explain1(&[], &[], &[], &Value::from("x"));
        assert_eq!(probs.len(), 1);
        assert_eq!(probs[0].pred, Value::symbol("int?"));
    }

    #[test]
    fn test_nilable() {
        let s = Spec::nilable(preds::is_int());
        assert_eq!(s.conform(&Value::Nil), Some(Value::Nil));
        assert_eq!(s.conform(&Value::Int(1)), Some(Value::Int(1)));
        assert_eq!(s.conform(&Value::from("x")), None);
        assert_eq!(
            s.describe().to_string(),
            "(nilable int?)"
        );
    }

    #[test]
    fn test_value_set_spec() {
        let mut items = BTreeSet::new();
        items.insert(Value::keyword("red"));
        items.insert(Value::keyword("blue"));
        let s = Spec::value_set(items);
        assert!(valid(&s, &Value::keyword("red")));
        assert!(!valid(&s, &Value::keyword("green")));
        let g = gen(&s).unwrap();
        for v in g.sample(20).unwrap() {
            assert!(valid(&s, &v));
        }
    }

    #[test]
    fn test_explain_data_none_when_valid() {
        let s = preds::is_int();
        assert!(explain_data(&s, &Value::Int(1)).is_none());
        assert_eq!(explain_str(&s, &Value::Int(1)), "Success!\n");
    }

    #[test]
    fn test_merge_conform() {
        let a = Spec::keys(crate::keys::KeysForm::new().req_un(&["app/x"]));
        let b = Spec::keys(crate::keys::KeysForm::new().req_un(&["app/y"]));
        crate::registry::def(kw("app/x"), preds::is_int()).unwrap();
        crate::registry::def(kw("app/y"), preds::is_int()).unwrap();
        let s = Spec::merge(vec![a, b]);
        let m = Value::map_of(vec![(kw("x"), Value::Int(1)), (kw("y"), Value::Int(2))]);
        assert_eq!(s.conform(&m), Some(m.clone()));
        let missing = Value::map_of(vec![(kw("x"), Value::Int(1))]);
        assert_eq!(s.conform(&missing), None);
    }
}
