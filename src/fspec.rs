//! Function contracts
//!
//! An fspec holds up to three sub-specs: `args` (a sequence regex over the
//! argument list), `ret` (the return value), and `fn` (a predicate over the
//! map `{:args conformed-args, :ret conformed-ret}` relating the two).
//!
//! Conforming a function against an fspec is generative: argument lists are
//! sampled, the candidate is invoked, and the results are checked. Explain
//! re-samples fresh arguments, so a failure seen by conform may not
//! reproduce there.

use crate::config;
use crate::error::Result;
use crate::explain::Problem;
use crate::gen::Gen;
use crate::spec::{gen as spec_gen, Spec, SpecKind};
use crate::value::{kw, Keyword, NativeFn, Value};
use std::sync::Arc;

/// A function contract
pub struct FnSpec {
    pub(crate) args: Option<Spec>,
    pub(crate) ret: Option<Spec>,
    pub(crate) fn_spec: Option<Spec>,
}

impl FnSpec {
    /// Build the fspec as a Spec value
    pub fn spec(args: Option<Spec>, ret: Option<Spec>, fn_spec: Option<Spec>) -> Spec {
        Spec::from_kind(SpecKind::FSpec(Arc::new(FnSpec {
            args,
            ret,
            fn_spec,
        })))
    }
}

impl Spec {
    /// Function contract over args / ret / fn relation
    pub fn fspec(args: Option<Spec>, ret: Option<Spec>, fn_spec: Option<Spec>) -> Spec {
        FnSpec::spec(args, ret, fn_spec)
    }

    /// The args spec, when this (or what it resolves to) is an fspec
    pub fn fspec_args(&self) -> Option<Spec> {
        let resolved = self.resolved()?;
        match &resolved.kind {
            SpecKind::FSpec(f) => f.args.clone(),
            _ => None,
        }
    }
}

impl FnSpec {
    /// One generative trial: sample args, check the call. Returns the
    /// failing argument list, or `None` when the trial passes.
    fn trial(&self, f: &NativeFn, args_val: &Value) -> Option<Value> {
        let args_spec = self.args.as_ref()?;
        let conformed_args = match args_spec.conform(args_val) {
            Some(c) => c,
            None => return Some(args_val.clone()),
        };
        let arg_items = args_val.as_seq().unwrap_or_default();
        let ret_val = match f.call(&arg_items) {
            Ok(v) => v,
            Err(_) => return Some(args_val.clone()),
        };
        let conformed_ret = match &self.ret {
            Some(rs) => match rs.conform(&ret_val) {
                Some(c) => c,
                None => return Some(args_val.clone()),
            },
            None => ret_val,
        };
        if let Some(fs) = &self.fn_spec {
            let pair = Value::map_of(vec![
                (kw("args"), conformed_args),
                (kw("ret"), conformed_ret),
            ]);
            if fs.conform(&pair).is_none() {
                return Some(args_val.clone());
            }
        }
        None
    }

    /// Search for a counterexample over `fspec_iterations` sampled argument
    /// lists; `None` means every trial passed
    fn counterexample(&self, f: &NativeFn) -> Option<Value> {
        let args_spec = self.args.as_ref()?;
        let g = match spec_gen(args_spec) {
            Ok(g) => g,
            // no argument generator: nothing can be verified
            Err(_) => return None,
        };
        let samples = match g.sample(config::fspec_iterations()) {
            Ok(s) => s,
            Err(_) => return None,
        };
        samples.into_iter().find_map(|args| self.trial(f, &args))
    }

    pub(crate) fn conform(&self, x: &Value) -> Option<Value> {
        let f = match x {
            Value::Fn(f) => f,
            _ => return None,
        };
        if self.args.is_none() {
            return None;
        }
        match self.counterexample(f) {
            None => Some(x.clone()),
            Some(_) => None,
        }
    }

    pub(crate) fn explain(
        &self,
        path: &[Value],
        via: &[Keyword],
        in_path: &[Value],
        x: &Value,
    ) -> Vec<Problem> {
        let f = match x {
            Value::Fn(f) => f,
            _ => {
                return vec![Problem::new(
                    path.to_vec(),
                    Value::symbol("fn?"),
                    x.clone(),
                    via.to_vec(),
                    in_path.to_vec(),
                )]
            }
        };
        match self.counterexample(f) {
            None => Vec::new(),
            Some(args) => vec![Problem::new(
                path.to_vec(),
                Value::form(vec![Value::symbol("apply"), Value::symbol("fn")]),
                args,
                via.to_vec(),
                in_path.to_vec(),
            )],
        }
    }

    /// Stub callable: asserts its arguments conform, then returns a fresh
    /// generated value from the ret spec
    pub(crate) fn gen0(&self) -> Result<Option<Gen>> {
        let ret = match &self.ret {
            Some(r) => r.clone(),
            None => return Ok(None),
        };
        let args = self.args.clone();
        let ret_gen = spec_gen(&ret)?;
        let stub = NativeFn::new(move |call_args| {
            if let Some(args_spec) = &args {
                let args_val = Value::Vector(call_args.to_vec());
                crate::spec::assert_conform(args_spec, &args_val)?;
            }
            ret_gen.generate()
        });
        Ok(Some(Gen::pure(Value::Fn(stub))))
    }

    pub(crate) fn describe(&self) -> Value {
        let mut items = vec![Value::symbol("fspec")];
        if let Some(a) = &self.args {
            items.push(Value::keyword("args"));
            items.push(a.describe());
        }
        if let Some(r) = &self.ret {
            items.push(Value::keyword("ret"));
            items.push(r.describe());
        }
        if let Some(f) = &self.fn_spec {
            items.push(Value::keyword("fn"));
            items.push(f.describe());
        }
        Value::form(items)
    }
}
