//! Keyed-map specs
//!
//! A `keys` spec validates maps whose values are specced by their keys: a
//! key's spec is whatever the registry holds under that (qualified) name.
//! Required keys may be grouped with `and`/`or` logic; the unqualified
//! variants check presence by bare local name while still dispatching the
//! value to the fully-qualified spec.

use crate::error::Result;
use crate::explain::Problem;
use crate::gen::{Gen, Overrides, RecursionMap};
use crate::registry;
use crate::spec::{gensub, next_id, Spec, SpecKind};
use crate::value::{Keyword, Value};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A required-key expression: a key, or an `and`/`or` group of them
#[derive(Debug, Clone, PartialEq)]
pub enum KeyReq {
    Key(Keyword),
    And(Vec<KeyReq>),
    Or(Vec<KeyReq>),
}

impl KeyReq {
    /// All keywords mentioned anywhere in the expression
    fn keywords(&self, out: &mut Vec<Keyword>) {
        match self {
            KeyReq::Key(k) => out.push(k.clone()),
            KeyReq::And(gs) | KeyReq::Or(gs) => {
                for g in gs {
                    g.keywords(out);
                }
            }
        }
    }

    /// Presence check against a map; `un` checks by bare local name
    fn satisfied(&self, x: &Value, un: bool) -> bool {
        match self {
            KeyReq::Key(k) => {
                let map_key = if un { k.unqualified() } else { k.clone() };
                x.contains_key(&Value::Keyword(map_key))
            }
            KeyReq::And(gs) => gs.iter().all(|g| g.satisfied(x, un)),
            KeyReq::Or(gs) => gs.iter().any(|g| g.satisfied(x, un)),
        }
    }

    /// Symbolic predicate form, e.g. `(contains? % :app/a)`
    fn form(&self, un: bool) -> Value {
        match self {
            KeyReq::Key(k) => {
                let map_key = if un { k.unqualified() } else { k.clone() };
                Value::form(vec![
                    Value::symbol("contains?"),
                    Value::symbol("%"),
                    Value::Keyword(map_key),
                ])
            }
            KeyReq::And(gs) => {
                let mut items = vec![Value::symbol("and")];
                items.extend(gs.iter().map(|g| g.form(un)));
                Value::form(items)
            }
            KeyReq::Or(gs) => {
                let mut items = vec![Value::symbol("or")];
                items.extend(gs.iter().map(|g| g.form(un)));
                Value::form(items)
            }
        }
    }
}

/// Builder for [`Spec::keys`]
#[derive(Debug, Clone, Default)]
pub struct KeysForm {
    pub req: Vec<KeyReq>,
    pub opt: Vec<Keyword>,
    pub req_un: Vec<KeyReq>,
    pub opt_un: Vec<Keyword>,
}

impl KeysForm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Required qualified keys
    pub fn req(mut self, names: &[&str]) -> Self {
        self.req
            .extend(names.iter().map(|n| KeyReq::Key(Keyword::parse(n))));
        self
    }

    /// Required qualified key group (use [`KeyReq::And`]/[`KeyReq::Or`])
    pub fn req_group(mut self, group: KeyReq) -> Self {
        self.req.push(group);
        self
    }

    /// Optional qualified keys
    pub fn opt(mut self, names: &[&str]) -> Self {
        self.opt.extend(names.iter().map(|n| Keyword::parse(n)));
        self
    }

    /// Required keys checked by bare name, specced by qualified name
    pub fn req_un(mut self, names: &[&str]) -> Self {
        self.req_un
            .extend(names.iter().map(|n| KeyReq::Key(Keyword::parse(n))));
        self
    }

    /// Required unqualified key group
    pub fn req_un_group(mut self, group: KeyReq) -> Self {
        self.req_un.push(group);
        self
    }

    /// Optional keys checked by bare name, specced by qualified name
    pub fn opt_un(mut self, names: &[&str]) -> Self {
        self.opt_un.extend(names.iter().map(|n| Keyword::parse(n)));
        self
    }
}

/// The keyed-map spec
pub struct KeysSpec {
    form: KeysForm,
    /// map key (as it appears in the data) → spec name
    key_to_spec: BTreeMap<Value, Keyword>,
    id: u64,
}

impl Spec {
    /// Map spec: required/optional keys with registry-dispatched value specs
    pub fn keys(form: KeysForm) -> Spec {
        let mut key_to_spec = BTreeMap::new();
        let mut un_names = Vec::new();
        for g in &form.req_un {
            g.keywords(&mut un_names);
        }
        un_names.extend(form.opt_un.iter().cloned());
        for name in un_names {
            key_to_spec.insert(Value::Keyword(name.unqualified()), name);
        }
        Spec::from_kind(SpecKind::Keys(Arc::new(KeysSpec {
            form,
            key_to_spec,
            id: next_id(),
        })))
    }
}

impl KeysSpec {
    /// The spec name governing a map key, if any: unqualified keys map to
    /// their qualified spec, qualified keys name their own spec
    fn spec_name_for(&self, map_key: &Value) -> Option<Keyword> {
        if let Some(name) = self.key_to_spec.get(map_key) {
            return Some(name.clone());
        }
        match map_key {
            Value::Keyword(k) if k.is_qualified() => Some(k.clone()),
            _ => None,
        }
    }

    fn presence_ok(&self, x: &Value) -> bool {
        self.form.req.iter().all(|g| g.satisfied(x, false))
            && self.form.req_un.iter().all(|g| g.satisfied(x, true))
    }

    pub(crate) fn conform(&self, x: &Value) -> Option<Value> {
        let entries = match x {
            Value::Map(m) => m,
            _ => return None,
        };
        if !self.presence_ok(x) {
            return None;
        }
        let mut out = BTreeMap::new();
        for (k, v) in entries {
            let cv = match self.spec_name_for(k).and_then(|n| registry::resolve(&n)) {
                Some(spec) => spec.conform(v)?,
                None => v.clone(),
            };
            out.insert(k.clone(), cv);
        }
        Some(Value::Map(out))
    }

    pub(crate) fn unform(&self, y: &Value) -> Result<Value> {
        let entries = match y {
            Value::Map(m) => m,
            _ => return Ok(y.clone()),
        };
        let mut out = BTreeMap::new();
        for (k, v) in entries {
            let uv = match self.spec_name_for(k).and_then(|n| registry::resolve(&n)) {
                Some(spec) => spec.unform(v)?,
                None => v.clone(),
            };
            out.insert(k.clone(), uv);
        }
        Ok(Value::Map(out))
    }

    pub(crate) fn explain(
        &self,
        path: &[Value],
        via: &[Keyword],
        in_path: &[Value],
        x: &Value,
    ) -> Vec<Problem> {
        let entries = match x {
            Value::Map(m) => m,
            _ => {
                return vec![Problem::new(
                    path.to_vec(),
                    Value::symbol("map?"),
                    x.clone(),
                    via.to_vec(),
                    in_path.to_vec(),
                )]
            }
        };
        let mut probs = Vec::new();
        // one problem per unsatisfied required-key predicate
        for g in &self.form.req {
            if !g.satisfied(x, false) {
                probs.push(Problem::new(
                    path.to_vec(),
                    g.form(false),
                    x.clone(),
                    via.to_vec(),
                    in_path.to_vec(),
                ));
            }
        }
        for g in &self.form.req_un {
            if !g.satisfied(x, true) {
                probs.push(Problem::new(
                    path.to_vec(),
                    g.form(true),
                    x.clone(),
                    via.to_vec(),
                    in_path.to_vec(),
                ));
            }
        }
        // one problem subtree per failing key value, attributed to the
        // key's registered spec name
        for (k, v) in entries {
            if let Some(name) = self.spec_name_for(k) {
                if let Some(spec) = registry::resolve(&name) {
                    if spec.conform(v).is_none() {
                        let mut kpath = path.to_vec();
                        kpath.push(k.clone());
                        let mut kin = in_path.to_vec();
                        kin.push(k.clone());
                        probs.extend(Spec::named(name).explain1(&kpath, via, &kin, v));
                    }
                }
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
        let rmap = rmap.inck(self.id);

        let mut req_names = Vec::new();
        for g in &self.form.req {
            g.keywords(&mut req_names);
        }
        let mut req_un_names = Vec::new();
        for g in &self.form.req_un {
            g.keywords(&mut req_un_names);
        }

        // (map key, spec name) pairs
        let req_keys: Vec<(Value, Keyword)> = req_names
            .iter()
            .map(|n| (Value::Keyword(n.clone()), n.clone()))
            .chain(
                req_un_names
                    .iter()
                    .map(|n| (Value::Keyword(n.unqualified()), n.clone())),
            )
            .collect();
        let opt_keys: Vec<(Value, Keyword)> = self
            .form
            .opt
            .iter()
            .map(|n| (Value::Keyword(n.clone()), n.clone()))
            .chain(
                self.form
                    .opt_un
                    .iter()
                    .map(|n| (Value::Keyword(n.unqualified()), n.clone())),
            )
            .collect();

        let key_gen = |map_key: &Value, name: &Keyword| -> Option<Gen> {
            if rmap.cut_off(self.id, path, &Value::Keyword(name.clone())) {
                return None;
            }
            let mut kpath = path.to_vec();
            kpath.push(map_key.clone());
            let (spec, overrides, rmap, form) = (
                Spec::named(name.clone()),
                overrides.clone(),
                rmap.clone(),
                Value::Keyword(name.clone()),
            );
            Some(Gen::delay(move || {
                gensub(&spec, &overrides, &kpath, &rmap, &form)
            }))
        };

        let mut req_pairs = Vec::with_capacity(req_keys.len());
        for (map_key, name) in &req_keys {
            match key_gen(map_key, name) {
                Some(g) => req_pairs.push((map_key.clone(), g)),
                // a required key cut off by the recursion budget means this
                // whole branch cannot generate
                None => return Ok(None),
            }
        }
        let opt_pairs: Vec<(Value, Gen)> = opt_keys
            .iter()
            .filter_map(|(map_key, name)| key_gen(map_key, name).map(|g| (map_key.clone(), g)))
            .collect();

        Ok(Some(Gen::new(move |rng, size| {
            let mut m = BTreeMap::new();
            for (k, g) in &req_pairs {
                m.insert(k.clone(), g.call(rng, size)?);
            }
            let mut idxs: Vec<usize> = (0..opt_pairs.len()).collect();
            idxs.shuffle(rng);
            let n = rng.gen_range(0..=opt_pairs.len());
            for &i in idxs.iter().take(n) {
                let (k, g) = &opt_pairs[i];
                m.insert(k.clone(), g.call(rng, size)?);
            }
            Ok(Value::Map(m))
        })))
    }

    pub(crate) fn describe(&self) -> Value {
        let mut items = vec![Value::symbol("keys")];
        let group_vec = |gs: &[KeyReq], un: bool| {
            Value::Vector(
                gs.iter()
                    .map(|g| match g {
                        KeyReq::Key(k) => Value::Keyword(k.clone()),
                        other => other.form(un),
                    })
                    .collect(),
            )
        };
        if !self.form.req.is_empty() {
            items.push(Value::keyword("req"));
            items.push(group_vec(&self.form.req, false));
        }
        if !self.form.opt.is_empty() {
            items.push(Value::keyword("opt"));
            items.push(Value::Vector(
                self.form.opt.iter().cloned().map(Value::Keyword).collect(),
            ));
        }
        if !self.form.req_un.is_empty() {
            items.push(Value::keyword("req-un"));
            items.push(group_vec(&self.form.req_un, false));
        }
        if !self.form.opt_un.is_empty() {
            items.push(Value::keyword("opt-un"));
            items.push(Value::Vector(
                self.form
                    .opt_un
                    .iter()
                    .cloned()
                    .map(Value::Keyword)
                    .collect(),
            ));
        }
        Value::form(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preds;
    use crate::spec::valid;
    use crate::value::kw;

    fn setup() {
        registry::def(kw("keys-test/a"), preds::is_int()).unwrap();
        registry::def(kw("keys-test/b"), preds::is_int()).unwrap();
        registry::def(kw("keys-test/c"), preds::is_int()).unwrap();
        registry::def(kw("keys-test/d"), preds::is_string()).unwrap();
    }

    #[test]
    fn test_req_and_or_group() {
        setup();
        let s = Spec::keys(
            KeysForm::new()
                .req(&["keys-test/a"])
                .req_group(KeyReq::Or(vec![
                    KeyReq::Key(kw("keys-test/b")),
                    KeyReq::And(vec![
                        KeyReq::Key(kw("keys-test/c")),
                        KeyReq::Key(kw("keys-test/d")),
                    ]),
                ]))
                .opt(&["keys-test/d"]),
        );
        let ok = Value::map_of(vec![
            (kw("keys-test/a"), Value::Int(1)),
            (kw("keys-test/b"), Value::Int(2)),
        ]);
        assert_eq!(s.conform(&ok), Some(ok.clone()));

        let ok2 = Value::map_of(vec![
            (kw("keys-test/a"), Value::Int(1)),
            (kw("keys-test/c"), Value::Int(3)),
            (kw("keys-test/d"), Value::from("x")),
        ]);
        assert!(valid(&s, &ok2));

        let missing_group = Value::map_of(vec![(kw("keys-test/a"), Value::Int(1))]);
        assert_eq!(s.conform(&missing_group), None);
        let probs = s.explain1(&[], &[], &[], &missing_group);
        assert_eq!(probs.len(), 1);
        // names the unsatisfied group predicate
        let text = probs[0].pred.to_string();
        assert!(text.starts_with("(or (contains? % :keys-test/b)"));
    }

    #[test]
    fn test_value_conform_and_failure() {
        setup();
        let s = Spec::keys(KeysForm::new().req(&["keys-test/a"]));
        let bad = Value::map_of(vec![(kw("keys-test/a"), Value::from("no"))]);
        assert_eq!(s.conform(&bad), None);
        let probs = s.explain1(&[], &[], &[], &bad);
        assert_eq!(probs.len(), 1);
        assert_eq!(probs[0].path, vec![Value::keyword("keys-test/a")]);
        assert_eq!(probs[0].in_path, vec![Value::keyword("keys-test/a")]);
        assert_eq!(probs[0].via.last(), Some(&kw("keys-test/a")));
    }

    #[test]
    fn test_unregistered_keys_pass_through() {
        setup();
        let s = Spec::keys(KeysForm::new().req(&["keys-test/a"]));
        let extra = Value::map_of(vec![
            (kw("keys-test/a"), Value::Int(1)),
            (kw("keys-test/unknown-key"), Value::from("anything")),
        ]);
        assert_eq!(s.conform(&extra), Some(extra.clone()));
    }

    #[test]
    fn test_req_un_checks_bare_name() {
        setup();
        let s = Spec::keys(KeysForm::new().req_un(&["keys-test/a"]));
        let ok = Value::map_of(vec![(kw("a"), Value::Int(1))]);
        assert!(valid(&s, &ok));
        // qualified key does not satisfy the unqualified requirement
        let qualified = Value::map_of(vec![(kw("keys-test/a"), Value::Int(1))]);
        assert!(!valid(&s, &qualified));
        // the bare key's value is still checked against the qualified spec
        let bad = Value::map_of(vec![(kw("a"), Value::from("no"))]);
        assert!(!valid(&s, &bad));
    }

    #[test]
    fn test_non_map_is_invalid() {
        let s = Spec::keys(KeysForm::new());
        assert_eq!(s.conform(&Value::Int(1)), None);
        let probs = s.explain1(&[], &[], &[], &Value::Int(1));
        assert_eq!(probs[0].pred, Value::symbol("map?"));
    }

    #[test]
    fn test_gen_includes_required_keys() {
        setup();
        let s = Spec::keys(KeysForm::new().req(&["keys-test/a"]).opt(&["keys-test/d"]));
        let g = crate::spec::gen(&s).unwrap();
        for v in g.sample(20).unwrap() {
            assert!(valid(&s, &v), "generated {} fails the keys spec", v);
            assert!(v.contains_key(&Value::keyword("keys-test/a")));
        }
    }
}
