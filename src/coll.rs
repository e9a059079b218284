//! Collection and dispatch specs
//!
//! `tuple` checks fixed positions; `every` samples elements without
//! rebuilding; `coll_of` conforms every element and rebuilds the
//! collection; `map_of` is `coll_of` over `[k v]` entries; `multi`
//! dispatches on a tag function through a method table.

use crate::config;
use crate::error::{Error, Result};
use crate::explain::Problem;
use crate::gen::{DistinctOpts, Gen, Overrides, RecursionMap};
use crate::spec::{gensub, next_id, Spec, SpecKind};
use crate::value::{Keyword, Value};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Fixed-arity positional spec
pub struct TupleSpec {
    preds: Vec<Spec>,
    forms: Vec<Value>,
}

impl Spec {
    /// Vector of exactly `preds.len()` positions, each with its own spec
    pub fn tuple(preds: Vec<Spec>) -> Spec {
        let forms = preds.iter().map(|p| p.describe()).collect();
        Spec::from_kind(SpecKind::Tuple(Arc::new(TupleSpec { preds, forms })))
    }
}

impl TupleSpec {
    fn count_form(&self) -> Value {
        Value::form(vec![
            Value::symbol("="),
            Value::form(vec![Value::symbol("count"), Value::symbol("%")]),
            Value::Int(self.preds.len() as i64),
        ])
    }

    pub(crate) fn conform(&self, x: &Value) -> Option<Value> {
        let items = match x {
            Value::Vector(items) => items,
            _ => return None,
        };
        if items.len() != self.preds.len() {
            return None;
        }
        let mut out = Vec::with_capacity(items.len());
        for (p, v) in self.preds.iter().zip(items) {
            out.push(p.conform(v)?);
        }
        Some(Value::Vector(out))
    }

    pub(crate) fn unform(&self, y: &Value) -> Result<Value> {
        let items = match y {
            Value::Vector(items) if items.len() == self.preds.len() => items,
            _ => {
                return Err(Error::Other(format!(
                    "tuple unform expects a {}-element vector, got: {}",
                    self.preds.len(),
                    y
                )))
            }
        };
        let mut out = Vec::with_capacity(items.len());
        for (p, v) in self.preds.iter().zip(items) {
            out.push(p.unform(v)?);
        }
        Ok(Value::Vector(out))
    }

    pub(crate) fn explain(
        &self,
        path: &[Value],
        via: &[Keyword],
        in_path: &[Value],
        x: &Value,
    ) -> Vec<Problem> {
        let items = match x {
            Value::Vector(items) => items,
            _ => {
                return vec![Problem::new(
                    path.to_vec(),
                    Value::symbol("vector?"),
                    x.clone(),
                    via.to_vec(),
                    in_path.to_vec(),
                )]
            }
        };
        if items.len() != self.preds.len() {
            return vec![Problem::new(
                path.to_vec(),
                self.count_form(),
                x.clone(),
                via.to_vec(),
                in_path.to_vec(),
            )];
        }
        let mut probs = Vec::new();
        for (i, (p, v)) in self.preds.iter().zip(items).enumerate() {
            if p.conform(v).is_none() {
                let mut ipath = path.to_vec();
                ipath.push(Value::Int(i as i64));
                let mut iin = in_path.to_vec();
                iin.push(Value::Int(i as i64));
                probs.extend(p.explain1(&ipath, via, &iin, v));
            }
        }
        probs
    }

    pub(crate) fn gen0(
        &self,
        overrides: &Overrides,
        path: &[Value],
        rmap: &RecursionMap,
    ) -> Result<Option<Gen>> {
        let mut gens = Vec::with_capacity(self.preds.len());
        for (i, (p, f)) in self.preds.iter().zip(&self.forms).enumerate() {
            let mut ipath = path.to_vec();
            ipath.push(Value::Int(i as i64));
            let (p, overrides, rmap, f) =
                (p.clone(), overrides.clone(), rmap.clone(), f.clone());
            gens.push(Gen::delay(move || gensub(&p, &overrides, &ipath, &rmap, &f)));
        }
        Ok(Some(Gen::tuple(gens)))
    }

    pub(crate) fn describe(&self) -> Value {
        let mut items = vec![Value::symbol("tuple")];
        items.extend(self.forms.iter().cloned());
        Value::form(items)
    }
}

/// Collection kind constraint for `every`/`coll_of`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollKind {
    Vector,
    List,
    Map,
    Set,
    Seqable,
}

impl CollKind {
    fn matches(&self, x: &Value) -> bool {
        match self {
            CollKind::Vector => matches!(x, Value::Vector(_)),
            CollKind::List => matches!(x, Value::List(_)),
            CollKind::Map => matches!(x, Value::Map(_)),
            CollKind::Set => matches!(x, Value::Set(_)),
            CollKind::Seqable => x.is_seqable(),
        }
    }

    fn form(&self) -> Value {
        Value::symbol(match self {
            CollKind::Vector => "vector?",
            CollKind::List => "list?",
            CollKind::Map => "map?",
            CollKind::Set => "set?",
            CollKind::Seqable => "seqable?",
        })
    }
}

/// Options shared by `every`, `coll_of`, and `map_of`
#[derive(Debug, Clone, Copy, Default)]
pub struct CollOpts {
    pub kind: Option<CollKind>,
    pub count: Option<usize>,
    pub min_count: Option<usize>,
    pub max_count: Option<usize>,
    pub distinct: bool,
    /// Rebuild target for `coll_of`; defaults to the input's own kind
    pub into: Option<CollKind>,
    /// Upper bound on generated element count (default 20)
    pub gen_max: Option<usize>,
}

/// Homogeneous-collection spec
pub struct EverySpec {
    pred: Spec,
    form: Value,
    /// Key/value specs when this is a `map_of`
    kv: Option<(Spec, Spec)>,
    opts: CollOpts,
    conform_all: bool,
    conform_keys: bool,
    describe_name: &'static str,
}

impl Spec {
    /// Sampled validation of collection elements; conform never rebuilds
    pub fn every(pred: Spec, opts: CollOpts) -> Spec {
        let form = pred.describe();
        Spec::from_kind(SpecKind::Every(Arc::new(EverySpec {
            pred,
            form,
            kv: None,
            opts,
            conform_all: false,
            conform_keys: false,
            describe_name: "every",
        })))
    }

    /// Conform every element and rebuild the collection
    pub fn coll_of(pred: Spec, opts: CollOpts) -> Spec {
        let form = pred.describe();
        Spec::from_kind(SpecKind::Every(Arc::new(EverySpec {
            pred,
            form,
            kv: None,
            opts,
            conform_all: true,
            conform_keys: false,
            describe_name: "coll-of",
        })))
    }

    /// Map whose keys and values are independently specced; keys pass
    /// through verbatim unless `conform_keys`
    pub fn map_of(kpred: Spec, vpred: Spec, conform_keys: bool, opts: CollOpts) -> Spec {
        let form = Value::form(vec![
            Value::symbol("tuple"),
            kpred.describe(),
            vpred.describe(),
        ]);
        let pred = Spec::tuple(vec![kpred.clone(), vpred.clone()]);
        Spec::from_kind(SpecKind::Every(Arc::new(EverySpec {
            pred,
            form,
            kv: Some((kpred, vpred)),
            opts: CollOpts {
                kind: Some(CollKind::Map),
                ..opts
            },
            conform_all: true,
            conform_keys,
            describe_name: "map-of",
        })))
    }
}

impl EverySpec {
    /// Collection-level predicate: kind, count bounds, distinctness.
    /// Returns the symbolic form of the first failing check.
    fn coll_problem(&self, x: &Value) -> Option<Value> {
        let kind = self.opts.kind.unwrap_or(CollKind::Seqable);
        if !kind.matches(x) {
            return Some(kind.form());
        }
        let n = x.count().unwrap_or(0);
        if let Some(c) = self.opts.count {
            if n != c {
                return Some(Value::form(vec![
                    Value::symbol("="),
                    Value::Int(c as i64),
                    Value::form(vec![Value::symbol("count"), Value::symbol("%")]),
                ]));
            }
        }
        if self.opts.min_count.map_or(false, |m| n < m)
            || self.opts.max_count.map_or(false, |m| n > m)
        {
            return Some(Value::form(vec![
                Value::symbol("<="),
                Value::Int(self.opts.min_count.unwrap_or(0) as i64),
                Value::form(vec![Value::symbol("count"), Value::symbol("%")]),
                Value::Int(self.opts.max_count.unwrap_or(usize::MAX) as i64),
            ]));
        }
        if self.opts.distinct && n > 0 {
            if let Some(items) = x.as_seq() {
                let set: std::collections::BTreeSet<_> = items.iter().collect();
                if set.len() != items.len() {
                    return Some(Value::symbol("distinct?"));
                }
            }
        }
        None
    }

    pub(crate) fn conform(&self, x: &Value) -> Option<Value> {
        if self.coll_problem(x).is_some() {
            return None;
        }
        if !self.conform_all {
            // sampled validation: step across indexed collections, prefix
            // otherwise; the input is returned unchanged
            let items = x.as_seq()?;
            let limit = config::coll_check_limit();
            if matches!(x, Value::Vector(_)) {
                let step = (items.len() / limit).max(1);
                let mut i = 0;
                while i < items.len() {
                    self.pred.conform(&items[i])?;
                    i += step;
                }
            } else {
                for v in items.iter().take(limit) {
                    self.pred.conform(v)?;
                }
            }
            return Some(x.clone());
        }
        // conform-all: rebuild
        match x {
            Value::Map(entries) => {
                let mut out = BTreeMap::new();
                for (k, v) in entries {
                    let (ck, cv) = match &self.kv {
                        Some((kp, vp)) => (kp.conform(k)?, vp.conform(v)?),
                        None => {
                            // generic coll-of over a map conforms entries
                            let pair = Value::Vector(vec![k.clone(), v.clone()]);
                            match self.pred.conform(&pair)? {
                                Value::Vector(kv) if kv.len() == 2 => {
                                    let mut it = kv.into_iter();
                                    (it.next().unwrap(), it.next().unwrap())
                                }
                                _ => return None,
                            }
                        }
                    };
                    let key = if self.conform_keys { ck } else { k.clone() };
                    out.insert(key, cv);
                }
                self.rebuild_into(Value::Map(out), x)
            }
            Value::Vector(items) | Value::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for v in items {
                    out.push(self.pred.conform(v)?);
                }
                let built = if matches!(x, Value::Vector(_)) {
                    Value::Vector(out)
                } else {
                    Value::List(out)
                };
                self.rebuild_into(built, x)
            }
            Value::Set(items) => {
                let mut out = std::collections::BTreeSet::new();
                for v in items {
                    out.insert(self.pred.conform(v)?);
                }
                self.rebuild_into(Value::Set(out), x)
            }
            _ => None,
        }
    }

    /// Re-pour a rebuilt collection into the `into` target kind, if given
    fn rebuild_into(&self, built: Value, _original: &Value) -> Option<Value> {
        let target = match self.opts.into {
            None => return Some(built),
            Some(t) => t,
        };
        let items = built.as_seq()?;
        Some(match target {
            CollKind::Vector | CollKind::Seqable => Value::Vector(items),
            CollKind::List => Value::List(items),
            CollKind::Set => Value::Set(items.into_iter().collect()),
            CollKind::Map => {
                let mut m = BTreeMap::new();
                for pair in items {
                    match pair {
                        Value::Vector(kv) if kv.len() == 2 => {
                            let mut it = kv.into_iter();
                            m.insert(it.next().unwrap(), it.next().unwrap());
                        }
                        _ => return None,
                    }
                }
                Value::Map(m)
            }
        })
    }

    pub(crate) fn unform(&self, y: &Value) -> Result<Value> {
        if !self.conform_all {
            return Ok(y.clone());
        }
        match y {
            Value::Map(entries) => {
                let mut out = BTreeMap::new();
                for (k, v) in entries {
                    let (uk, uv) = match &self.kv {
                        Some((kp, vp)) => {
                            let uk = if self.conform_keys {
                                kp.unform(k)?
                            } else {
                                k.clone()
                            };
                            (uk, vp.unform(v)?)
                        }
                        None => (k.clone(), self.pred.unform(v)?),
                    };
                    out.insert(uk, uv);
                }
                Ok(Value::Map(out))
            }
            Value::Vector(items) => Ok(Value::Vector(
                items
                    .iter()
                    .map(|v| self.pred.unform(v))
                    .collect::<Result<_>>()?,
            )),
            Value::List(items) => Ok(Value::List(
                items
                    .iter()
                    .map(|v| self.pred.unform(v))
                    .collect::<Result<_>>()?,
            )),
            Value::Set(items) => Ok(Value::Set(
                items
                    .iter()
                    .map(|v| self.pred.unform(v))
                    .collect::<Result<_>>()?,
            )),
            _ => Ok(y.clone()),
        }
    }

    pub(crate) fn explain(
        &self,
        path: &[Value],
        via: &[Keyword],
        in_path: &[Value],
        x: &Value,
    ) -> Vec<Problem> {
        if let Some(form) = self.coll_problem(x) {
            return vec![Problem::new(
                path.to_vec(),
                form,
                x.clone(),
                via.to_vec(),
                in_path.to_vec(),
            )];
        }
        let items = match x.as_seq() {
            Some(items) => items,
            None => return Vec::new(),
        };
        let is_map = matches!(x, Value::Map(_));
        let limit = config::coll_error_limit();
        let mut probs = Vec::new();
        for (i, v) in items.iter().enumerate() {
            if probs.len() >= limit {
                break;
            }
            if self.pred.conform(v).is_none() {
                // maps index by key, sequences by position
                let idx = if is_map {
                    match v {
                        Value::Vector(kv) if kv.len() == 2 => kv[0].clone(),
                        _ => Value::Int(i as i64),
                    }
                } else {
                    Value::Int(i as i64)
                };
                let mut iin = in_path.to_vec();
                iin.push(idx);
                probs.extend(self.pred.explain1(path, via, &iin, v));
            }
        }
        probs.truncate(limit);
        probs
    }

    pub(crate) fn gen0(
        &self,
        overrides: &Overrides,
        path: &[Value],
        rmap: &RecursionMap,
    ) -> Result<Option<Gen>> {
        let gen_max = self.opts.gen_max.unwrap_or(20);
        if let Some((kp, vp)) = &self.kv {
            let kform = kp.describe();
            let vform = vp.describe();
            let kgen = {
                let (kp, overrides, path, rmap) =
                    (kp.clone(), overrides.clone(), path.to_vec(), rmap.clone());
                Gen::delay(move || gensub(&kp, &overrides, &path, &rmap, &kform))
            };
            let vgen = {
                let (vp, overrides, path, rmap) =
                    (vp.clone(), overrides.clone(), path.to_vec(), rmap.clone());
                Gen::delay(move || gensub(&vp, &overrides, &path, &rmap, &vform))
            };
            let n = self.opts.count;
            let min = self.opts.min_count.unwrap_or(0);
            let max = self.opts.max_count.unwrap_or(min + gen_max);
            let pair = Gen::tuple(vec![kgen, vgen]);
            let pairs = match n {
                Some(c) => Gen::vector(pair, c, c),
                None => Gen::vector(pair, min, max),
            };
            return Ok(Some(pairs.fmap(|v| {
                let mut m = BTreeMap::new();
                if let Value::Vector(entries) = v {
                    for e in entries {
                        if let Value::Vector(kv) = e {
                            if kv.len() == 2 {
                                m.insert(kv[0].clone(), kv[1].clone());
                            }
                        }
                    }
                }
                Value::Map(m)
            })));
        }

        let eform = self.form.clone();
        let egen = {
            let (p, overrides, path, rmap) = (
                self.pred.clone(),
                overrides.clone(),
                path.to_vec(),
                rmap.clone(),
            );
            Gen::delay(move || gensub(&p, &overrides, &path, &rmap, &eform))
        };
        let base = if self.opts.distinct {
            Gen::vector_distinct(
                egen,
                DistinctOpts {
                    min: Some(self.opts.min_count.unwrap_or(0)),
                    max: Some(
                        self.opts
                            .max_count
                            .unwrap_or(self.opts.min_count.unwrap_or(0) + gen_max),
                    ),
                    num: self.opts.count,
                    max_tries: None,
                },
            )
        } else {
            match self.opts.count {
                Some(c) => Gen::vector(egen, c, c),
                None => {
                    let min = self.opts.min_count.unwrap_or(0);
                    let max = self.opts.max_count.unwrap_or(min + gen_max);
                    Gen::vector(egen, min, max)
                }
            }
        };
        let target = self.opts.into.or(self.opts.kind).unwrap_or(CollKind::Vector);
        Ok(Some(match target {
            CollKind::Vector | CollKind::Seqable => base,
            CollKind::List => base.fmap(|v| match v {
                Value::Vector(items) => Value::List(items),
                other => other,
            }),
            CollKind::Set => base.fmap(|v| match v {
                Value::Vector(items) => Value::Set(items.into_iter().collect()),
                other => other,
            }),
            CollKind::Map => base.fmap(|v| {
                let mut m = BTreeMap::new();
                if let Value::Vector(pairs) = v {
                    for pair in pairs {
                        if let Value::Vector(kv) = pair {
                            if kv.len() == 2 {
                                m.insert(kv[0].clone(), kv[1].clone());
                            }
                        }
                    }
                }
                Value::Map(m)
            }),
        }))
    }

    pub(crate) fn describe(&self) -> Value {
        let mut items = vec![Value::symbol(self.describe_name)];
        match &self.kv {
            Some((kp, vp)) => {
                items.push(kp.describe());
                items.push(vp.describe());
            }
            None => items.push(self.form.clone()),
        }
        if let Some(kind) = self.opts.kind {
            items.push(Value::keyword("kind"));
            items.push(kind.form());
        }
        if let Some(c) = self.opts.count {
            items.push(Value::keyword("count"));
            items.push(Value::Int(c as i64));
        }
        if self.opts.distinct {
            items.push(Value::keyword("distinct"));
            items.push(Value::Bool(true));
        }
        Value::form(items)
    }
}

/// Retagging policy for generated multi-spec values
#[derive(Clone)]
pub enum Retag {
    /// Assoc the dispatch tag under this key
    Key(Keyword),
    /// Arbitrary `(value, tag) → value` function
    Fn(Arc<dyn Fn(Value, &Value) -> Value + Send + Sync>),
}

/// Mutable dispatch table backing a multi-spec
#[derive(Clone, Default)]
pub struct MultiMethods(Arc<RwLock<BTreeMap<Value, Spec>>>);

impl MultiMethods {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the spec for a dispatch value
    pub fn add(&self, tag: Value, spec: Spec) -> &Self {
        self.0.write().insert(tag, spec);
        self
    }

    pub fn method(&self, tag: &Value) -> Option<Spec> {
        self.0.read().get(tag).cloned()
    }

    pub fn entries(&self) -> Vec<(Value, Spec)> {
        self.0
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// Multi-dispatch spec
pub struct MultiSpec {
    form: Value,
    dispatch: Arc<dyn Fn(&Value) -> Value + Send + Sync>,
    methods: MultiMethods,
    retag: Retag,
    id: u64,
}

impl Spec {
    /// Dispatch on an arbitrary tag function through a method table
    pub fn multi(
        form: Value,
        dispatch: impl Fn(&Value) -> Value + Send + Sync + 'static,
        methods: MultiMethods,
        retag: Retag,
    ) -> Spec {
        Spec::from_kind(SpecKind::Multi(Arc::new(MultiSpec {
            form,
            dispatch: Arc::new(dispatch),
            methods,
            retag,
            id: next_id(),
        })))
    }

    /// Common case: dispatch on a map key, retag by assoc-ing that key
    pub fn multi_keyed(form: Value, tag_key: Keyword, methods: MultiMethods) -> Spec {
        let key = tag_key.clone();
        Spec::multi(
            form,
            move |x| x.get_kw(&key).cloned().unwrap_or(Value::Nil),
            methods,
            Retag::Key(tag_key),
        )
    }
}

impl MultiSpec {
    pub(crate) fn conform(&self, x: &Value) -> Option<Value> {
        let tag = (self.dispatch)(x);
        self.methods.method(&tag)?.conform(x)
    }

    pub(crate) fn unform(&self, y: &Value) -> Result<Value> {
        let tag = (self.dispatch)(y);
        match self.methods.method(&tag) {
            Some(spec) => spec.unform(y),
            None => Err(Error::Other(format!(
                "no method in multi-spec {} for dispatch value {}",
                self.form, tag
            ))),
        }
    }

    pub(crate) fn explain(
        &self,
        path: &[Value],
        via: &[Keyword],
        in_path: &[Value],
        x: &Value,
    ) -> Vec<Problem> {
        let tag = (self.dispatch)(x);
        let mut tpath = path.to_vec();
        tpath.push(tag.clone());
        match self.methods.method(&tag) {
            Some(spec) => spec.explain1(&tpath, via, in_path, x),
            None => vec![Problem::new(
                tpath,
                self.form.clone(),
                x.clone(),
                via.to_vec(),
                in_path.to_vec(),
            )
            .with_reason("no method")],
        }
    }

    pub(crate) fn gen0(
        &self,
        overrides: &Overrides,
        path: &[Value],
        rmap: &RecursionMap,
    ) -> Result<Option<Gen>> {
        let rmap = rmap.inck(self.id);
        let invalid = Value::Keyword(crate::value::invalid_keyword());
        let mut gens = Vec::new();
        for (tag, spec) in self.methods.entries() {
            // catch-all methods registered under the invalid sentinel are
            // never generated
            if tag == invalid {
                continue;
            }
            if rmap.cut_off(self.id, path, &tag) {
                continue;
            }
            let mut tpath = path.to_vec();
            tpath.push(tag.clone());
            let form = spec.describe();
            let retag = self.retag.clone();
            let (spec, overrides, rmap) = (spec, overrides.clone(), rmap.clone());
            let sub = Gen::delay(move || gensub(&spec, &overrides, &tpath, &rmap, &form));
            let tag_for_fmap = tag.clone();
            let retagged = sub.fmap(move |v| match &retag {
                Retag::Key(k) => match v {
                    Value::Map(mut m) => {
                        m.insert(Value::Keyword(k.clone()), tag_for_fmap.clone());
                        Value::Map(m)
                    }
                    other => other,
                },
                Retag::Fn(f) => f(v, &tag_for_fmap),
            });
            gens.push(retagged);
        }
        if gens.is_empty() {
            Ok(None)
        } else {
            Ok(Some(Gen::one_of(gens)?))
        }
    }

    pub(crate) fn describe(&self) -> Value {
        let retag = match &self.retag {
            Retag::Key(k) => Value::Keyword(k.clone()),
            Retag::Fn(_) => Value::symbol("retag-fn"),
        };
        Value::form(vec![Value::symbol("multi-spec"), self.form.clone(), retag])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preds;
    use crate::spec::{conform, valid};
    use crate::value::kw;

    #[test]
    fn test_tuple_conform() {
        let s = Spec::tuple(vec![preds::is_int(), preds::is_string()]);
        let ok = Value::Vector(vec![Value::Int(1), Value::from("a")]);
        assert_eq!(conform(&s, &ok), Some(ok.clone()));
        assert_eq!(conform(&s, &Value::Vector(vec![Value::Int(1)])), None);
    }

    #[test]
    fn test_tuple_count_explain() {
        let s = Spec::tuple(vec![preds::is_int(), preds::is_string()]);
        let probs = s.explain1(&[], &[], &[], &Value::Vector(vec![Value::Int(1)]));
        assert_eq!(probs.len(), 1);
        assert_eq!(probs[0].pred.to_string(), "(= (count %) 2)");
    }

    #[test]
    fn test_tuple_position_explain() {
        let s = Spec::tuple(vec![preds::is_int(), preds::is_string()]);
        let bad = Value::Vector(vec![Value::Int(1), Value::Int(2)]);
        let probs = s.explain1(&[], &[], &[], &bad);
        assert_eq!(probs.len(), 1);
        assert_eq!(probs[0].path, vec![Value::Int(1)]);
        assert_eq!(probs[0].in_path, vec![Value::Int(1)]);
        assert_eq!(probs[0].pred, Value::symbol("string?"));
    }

    #[test]
    fn test_every_samples_without_rebuild() {
        let s = Spec::every(preds::is_int(), CollOpts::default());
        let ok = Value::Vector(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(conform(&s, &ok), Some(ok.clone()));
        let bad = Value::Vector(vec![Value::Int(1), Value::from("x")]);
        assert!(!valid(&s, &bad));
        assert!(!valid(&s, &Value::Int(1)));
    }

    #[test]
    fn test_every_count_bounds() {
        let s = Spec::every(
            preds::is_int(),
            CollOpts {
                min_count: Some(2),
                max_count: Some(3),
                ..Default::default()
            },
        );
        assert!(!valid(&s, &Value::Vector(vec![Value::Int(1)])));
        assert!(valid(&s, &Value::Vector(vec![Value::Int(1), Value::Int(2)])));
    }

    #[test]
    fn test_every_distinct() {
        let s = Spec::every(
            preds::is_int(),
            CollOpts {
                distinct: true,
                ..Default::default()
            },
        );
        assert!(valid(&s, &Value::Vector(vec![Value::Int(1), Value::Int(2)])));
        assert!(!valid(&s, &Value::Vector(vec![Value::Int(1), Value::Int(1)])));
    }

    #[test]
    fn test_coll_of_rebuilds_with_conformer() {
        let parse = Spec::conformer(Value::symbol("parse-int"), |v| match v {
            Value::String(s) => s.parse::<i64>().ok().map(Value::Int),
            _ => None,
        });
        let s = Spec::coll_of(parse, CollOpts::default());
        let input = Value::Vector(vec![Value::from("1"), Value::from("2")]);
        assert_eq!(
            conform(&s, &input),
            Some(Value::Vector(vec![Value::Int(1), Value::Int(2)]))
        );
    }

    #[test]
    fn test_coll_of_into_set() {
        let s = Spec::coll_of(
            preds::is_int(),
            CollOpts {
                into: Some(CollKind::Set),
                ..Default::default()
            },
        );
        let input = Value::Vector(vec![Value::Int(1), Value::Int(1), Value::Int(2)]);
        let conformed = conform(&s, &input).unwrap();
        assert_eq!(conformed.count(), Some(2));
        assert!(matches!(conformed, Value::Set(_)));
    }

    #[test]
    fn test_map_of() {
        let s = Spec::map_of(preds::is_keyword(), preds::is_int(), false, CollOpts::default());
        let ok = Value::map_of(vec![(kw("a"), Value::Int(1)), (kw("b"), Value::Int(2))]);
        assert_eq!(conform(&s, &ok), Some(ok.clone()));
        let bad = Value::map_of(vec![(kw("a"), Value::from("x"))]);
        assert!(!valid(&s, &bad));
        let probs = s.explain1(&[], &[], &[], &bad);
        assert_eq!(probs[0].in_path, vec![Value::keyword("a")]);
    }

    #[test]
    fn test_map_of_conform_keys() {
        let parse = Spec::conformer(Value::symbol("name-kw"), |v| match v {
            Value::String(s) => Some(Value::Keyword(kw(s))),
            _ => None,
        });
        let s = Spec::map_of(parse, preds::is_int(), true, CollOpts::default());
        let mut m = BTreeMap::new();
        m.insert(Value::from("a"), Value::Int(1));
        let conformed = conform(&s, &Value::Map(m)).unwrap();
        assert!(conformed.contains_key(&Value::keyword("a")));
    }

    #[test]
    fn test_multi_spec_dispatch() {
        let methods = MultiMethods::new();
        crate::registry::def(kw("multi-test/kind"), preds::is_keyword()).unwrap();
        crate::registry::def(kw("multi-test/n"), preds::is_int()).unwrap();
        crate::registry::def(kw("multi-test/s"), preds::is_string()).unwrap();
        methods.add(
            Value::keyword("a"),
            Spec::keys(crate::keys::KeysForm::new().req_un(&["multi-test/kind", "multi-test/n"])),
        );
        methods.add(
            Value::keyword("b"),
            Spec::keys(crate::keys::KeysForm::new().req_un(&["multi-test/kind", "multi-test/s"])),
        );
        let s = Spec::multi_keyed(Value::symbol("kind-mm"), kw("kind"), methods);

        let ok = Value::map_of(vec![
            (kw("kind"), Value::keyword("a")),
            (kw("n"), Value::Int(1)),
        ]);
        assert_eq!(conform(&s, &ok), Some(ok.clone()));

        let unknown = Value::map_of(vec![(kw("kind"), Value::keyword("z"))]);
        assert_eq!(conform(&s, &unknown), None);
        let probs = s.explain1(&[], &[], &[], &unknown);
        assert_eq!(probs.len(), 1);
        assert_eq!(probs[0].reason.as_deref(), Some("no method"));
        assert_eq!(probs[0].path, vec![Value::keyword("z")]);
    }

    #[test]
    fn test_multi_spec_gen_retags() {
        let methods = MultiMethods::new();
        crate::registry::def(kw("multi-gen/kind"), preds::is_keyword()).unwrap();
        crate::registry::def(kw("multi-gen/n"), preds::is_int()).unwrap();
        methods.add(
            Value::keyword("a"),
            Spec::keys(crate::keys::KeysForm::new().req_un(&["multi-gen/n"])),
        );
        let s = Spec::multi_keyed(Value::symbol("kind-mm"), kw("kind"), methods);
        let g = crate::spec::gen(&s).unwrap();
        for v in g.sample(10).unwrap() {
            assert_eq!(v.get_kw(&kw("kind")), Some(&Value::keyword("a")));
        }
    }
}
