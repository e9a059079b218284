//! Generator bridge
//!
//! A compact random-value generator library consumed by the spec algebra:
//! monadic combinators over a seedable rng plus a sizing parameter. Specs
//! obtain generators through [`gen_for_pred`] (standard predicates), their
//! attached override, or their structural `gen` implementation.
//!
//! Generators do not shrink; `quick_check` reports the first raw
//! counterexample.

use crate::error::{Error, Result};
use crate::value::{Keyword, Value};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

/// Default size passed to a generator when none is specified
const DEFAULT_SIZE: usize = 30;

/// Tries used when filtering a generator through a predicate
pub const SUCH_THAT_TRIES: usize = 100;

/// A random value generator: rng + size → value
#[derive(Clone)]
pub struct Gen(Arc<dyn Fn(&mut StdRng, usize) -> Result<Value> + Send + Sync>);

/// A deferred generator constructor, as attached to specs via `with_gen`
pub type GenFn = Arc<dyn Fn() -> Result<Gen> + Send + Sync>;

/// Options for [`Gen::double`]
#[derive(Debug, Clone, Copy, Default)]
pub struct DoubleOpts {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

/// Options for [`Gen::vector_distinct`]
#[derive(Debug, Clone, Copy, Default)]
pub struct DistinctOpts {
    pub min: Option<usize>,
    pub max: Option<usize>,
    pub num: Option<usize>,
    pub max_tries: Option<usize>,
}

impl Gen {
    pub fn new(f: impl Fn(&mut StdRng, usize) -> Result<Value> + Send + Sync + 'static) -> Self {
        Gen(Arc::new(f))
    }

    /// Run the generator once
    pub fn call(&self, rng: &mut StdRng, size: usize) -> Result<Value> {
        (self.0)(rng, size)
    }

    /// Generator that always yields `x`
    pub fn pure(x: Value) -> Gen {
        Gen::new(move |_, _| Ok(x.clone()))
    }

    /// Map a function over the generated value
    pub fn fmap(&self, f: impl Fn(Value) -> Value + Send + Sync + 'static) -> Gen {
        let g = self.clone();
        Gen::new(move |rng, size| Ok(f(g.call(rng, size)?)))
    }

    /// Feed the generated value into a generator-producing function
    pub fn bind(&self, f: impl Fn(Value) -> Gen + Send + Sync + 'static) -> Gen {
        let g = self.clone();
        Gen::new(move |rng, size| f(g.call(rng, size)?).call(rng, size))
    }

    /// Retry until `pred` holds, up to `max_tries`
    pub fn such_that(
        &self,
        pred: impl Fn(&Value) -> bool + Send + Sync + 'static,
        max_tries: usize,
    ) -> Gen {
        let g = self.clone();
        Gen::new(move |rng, size| {
            for _ in 0..max_tries {
                let v = g.call(rng, size)?;
                if pred(&v) {
                    return Ok(v);
                }
            }
            Err(Error::SuchThatExhausted { tries: max_tries })
        })
    }

    /// Pick one of the generators uniformly
    pub fn one_of(gens: Vec<Gen>) -> Result<Gen> {
        if gens.is_empty() {
            return Err(Error::Other("one_of requires at least one generator".into()));
        }
        Ok(Gen::new(move |rng, size| {
            let i = rng.gen_range(0..gens.len());
            gens[i].call(rng, size)
        }))
    }

    /// Pick a generator with probability proportional to its weight
    pub fn frequency(weighted: Vec<(u32, Gen)>) -> Result<Gen> {
        let total: u32 = weighted.iter().map(|(w, _)| w).sum();
        if total == 0 {
            return Err(Error::Other("frequency requires positive weights".into()));
        }
        Ok(Gen::new(move |rng, size| {
            let mut roll = rng.gen_range(0..total);
            for (w, g) in &weighted {
                if roll < *w {
                    return g.call(rng, size);
                }
                roll -= w;
            }
            unreachable!("roll bounded by total weight")
        }))
    }

    /// Pick one of the values uniformly
    pub fn elements(items: Vec<Value>) -> Result<Gen> {
        if items.is_empty() {
            return Err(Error::Other("elements requires a non-empty collection".into()));
        }
        Ok(Gen::new(move |rng, _| {
            Ok(items[rng.gen_range(0..items.len())].clone())
        }))
    }

    /// Fixed-arity vector: one value per generator
    pub fn tuple(gens: Vec<Gen>) -> Gen {
        Gen::new(move |rng, size| {
            let mut out = Vec::with_capacity(gens.len());
            for g in &gens {
                out.push(g.call(rng, size)?);
            }
            Ok(Value::Vector(out))
        })
    }

    /// Vector of `min..=max` values from `g`
    pub fn vector(g: Gen, min: usize, max: usize) -> Gen {
        Gen::new(move |rng, size| {
            let hi = max.max(min);
            let n = rng.gen_range(min..=hi);
            let mut out = Vec::with_capacity(n);
            for _ in 0..n {
                out.push(g.call(rng, size)?);
            }
            Ok(Value::Vector(out))
        })
    }

    /// Vector of distinct values from `g`
    pub fn vector_distinct(g: Gen, opts: DistinctOpts) -> Gen {
        Gen::new(move |rng, size| {
            let (lo, hi) = match opts.num {
                Some(n) => (n, n),
                None => (opts.min.unwrap_or(0), opts.max.unwrap_or(opts.min.unwrap_or(0) + size)),
            };
            let n = rng.gen_range(lo..=hi.max(lo));
            let tries = opts.max_tries.unwrap_or(SUCH_THAT_TRIES);
            let mut seen = BTreeSet::new();
            let mut out = Vec::with_capacity(n);
            let mut attempts = 0;
            while out.len() < n {
                let v = g.call(rng, size)?;
                if seen.insert(v.clone()) {
                    out.push(v);
                } else {
                    attempts += 1;
                    if attempts >= tries {
                        return Err(Error::SuchThatExhausted { tries });
                    }
                }
            }
            Ok(Value::Vector(out))
        })
    }

    /// Map with fixed keys, one generator per key
    pub fn hash_map(pairs: Vec<(Value, Gen)>) -> Gen {
        Gen::new(move |rng, size| {
            let mut m = BTreeMap::new();
            for (k, g) in &pairs {
                m.insert(k.clone(), g.call(rng, size)?);
            }
            Ok(Value::Map(m))
        })
    }

    /// Integer uniformly in `lo..=hi`
    pub fn choose(lo: i64, hi: i64) -> Gen {
        Gen::new(move |rng, _| Ok(Value::Int(rng.gen_range(lo..=hi.max(lo)))))
    }

    /// Size-scaled integer, optionally clamped
    pub fn large_integer(min: Option<i64>, max: Option<i64>) -> Gen {
        Gen::new(move |rng, size| {
            let span = ((size as i64) + 1).saturating_mul(1_000);
            let lo = min.unwrap_or(-span);
            let hi = max.unwrap_or(span).max(lo);
            Ok(Value::Int(rng.gen_range(lo..=hi)))
        })
    }

    /// Finite double, optionally clamped
    pub fn double(opts: DoubleOpts) -> Gen {
        Gen::new(move |rng, size| {
            let span = (size as f64 + 1.0) * 1_000.0;
            let lo = opts.min.unwrap_or(-span);
            let hi = opts.max.unwrap_or(span).max(lo);
            Ok(Value::Float(rng.gen_range(lo..=hi)))
        })
    }

    /// Random boolean
    pub fn boolean() -> Gen {
        Gen::new(|rng, _| Ok(Value::Bool(rng.gen())))
    }

    /// Short alphanumeric string
    pub fn string_alphanumeric() -> Gen {
        Gen::new(|rng, size| {
            let n = rng.gen_range(0..=size.min(20));
            let s: String = (0..n)
                .map(|_| {
                    let chars = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
                    chars[rng.gen_range(0..chars.len())] as char
                })
                .collect();
            Ok(Value::String(s))
        })
    }

    /// Bare keyword with a short alphabetic name
    pub fn keyword() -> Gen {
        Gen::new(|rng, _| {
            let n = rng.gen_range(1..=8);
            let s: String = (0..n)
                .map(|_| {
                    let chars = b"abcdefghijklmnopqrstuvwxyz";
                    chars[rng.gen_range(0..chars.len())] as char
                })
                .collect();
            Ok(Value::Keyword(Keyword::simple(s)))
        })
    }

    /// Bare symbol with a short alphabetic name
    pub fn symbol() -> Gen {
        Gen::keyword().fmap(|v| match v {
            Value::Keyword(k) => Value::Symbol(k.name),
            other => other,
        })
    }

    /// Defer generator construction until first use
    pub fn delay(thunk: impl Fn() -> Result<Gen> + Send + Sync + 'static) -> Gen {
        Gen::new(move |rng, size| thunk()?.call(rng, size))
    }

    /// Concatenate sequence generators: each must yield a sequence value;
    /// the results are appended into one vector
    pub fn seq_cat(gens: Vec<Gen>) -> Gen {
        Gen::new(move |rng, size| {
            let mut out = Vec::new();
            for g in &gens {
                let v = g.call(rng, size)?;
                match v.as_seq() {
                    Some(items) => out.extend(items),
                    None => {
                        return Err(Error::Other(format!(
                            "seq_cat expects sequence values, got: {}",
                            v
                        )))
                    }
                }
            }
            Ok(Value::Vector(out))
        })
    }

    /// Any value: scalars at small sizes, shallow collections otherwise
    pub fn any() -> Gen {
        Gen::new(|rng, size| gen_any(rng, size))
    }

    /// One value using a fresh entropy-seeded rng
    pub fn generate(&self) -> Result<Value> {
        let mut rng = StdRng::from_entropy();
        self.call(&mut rng, DEFAULT_SIZE)
    }

    /// One value using a fixed seed
    pub fn generate_seeded(&self, seed: u64) -> Result<Value> {
        let mut rng = StdRng::seed_from_u64(seed);
        self.call(&mut rng, DEFAULT_SIZE)
    }

    /// `n` values with growing sizes
    pub fn sample(&self, n: usize) -> Result<Vec<Value>> {
        let mut rng = StdRng::from_entropy();
        self.sample_with(&mut rng, n)
    }

    /// `n` values with growing sizes from the given rng
    pub fn sample_with(&self, rng: &mut StdRng, n: usize) -> Result<Vec<Value>> {
        (0..n).map(|i| self.call(rng, i.min(100))).collect()
    }
}

fn gen_any(rng: &mut StdRng, size: usize) -> Result<Value> {
    let scalar_only = size < 4;
    let roll = rng.gen_range(0..if scalar_only { 6 } else { 8 });
    match roll {
        0 => Ok(Value::Nil),
        1 => Ok(Value::Bool(rng.gen())),
        2 => Ok(Value::Int(rng.gen_range(-1000..=1000))),
        3 => Ok(Value::Float(rng.gen_range(-1000.0..=1000.0))),
        4 => Gen::string_alphanumeric().call(rng, size),
        5 => Gen::keyword().call(rng, size),
        6 => {
            let n = rng.gen_range(0..=3);
            let items = (0..n)
                .map(|_| gen_any(rng, size / 2))
                .collect::<Result<Vec<_>>>()?;
            Ok(Value::Vector(items))
        }
        _ => {
            let n = rng.gen_range(0..=3);
            let mut m = BTreeMap::new();
            for _ in 0..n {
                let k = Gen::keyword().call(rng, size)?;
                m.insert(k, gen_any(rng, size / 2)?);
            }
            Ok(Value::Map(m))
        }
    }
}

/// Generator for a standard predicate's symbolic form, if one is known
pub fn gen_for_pred(form: &Value) -> Option<Gen> {
    let sym = match form {
        Value::Symbol(s) => s.as_str(),
        Value::Set(items) => {
            return Gen::elements(items.iter().cloned().collect()).ok();
        }
        _ => return None,
    };
    match sym {
        "any?" => Some(Gen::any()),
        "nil?" => Some(Gen::pure(Value::Nil)),
        "boolean?" => Some(Gen::boolean()),
        "int?" | "integer?" => Some(Gen::large_integer(None, None)),
        "pos-int?" => Some(Gen::large_integer(Some(1), None)),
        "nat-int?" => Some(Gen::large_integer(Some(0), None)),
        "neg-int?" => Some(Gen::large_integer(None, Some(-1))),
        "double?" | "float?" => Some(Gen::double(DoubleOpts::default())),
        "number?" => {
            Gen::one_of(vec![
                Gen::large_integer(None, None),
                Gen::double(DoubleOpts::default()),
            ])
            .ok()
        }
        "string?" => Some(Gen::string_alphanumeric()),
        "keyword?" => Some(Gen::keyword()),
        "symbol?" => Some(Gen::symbol()),
        "vector?" => Some(Gen::vector(Gen::any(), 0, 3)),
        "coll?" | "seqable?" => Some(Gen::vector(Gen::any(), 0, 3)),
        "map?" => Some(
            Gen::vector(Gen::tuple(vec![Gen::keyword(), Gen::any()]), 0, 3).fmap(|v| {
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
        ),
        "set?" => Some(Gen::vector(Gen::any(), 0, 3).fmap(|v| match v {
            Value::Vector(items) => Value::Set(items.into_iter().collect()),
            other => other,
        })),
        "fn?" => Some(Gen::pure(Value::Fn(crate::value::NativeFn::new(|_| {
            Ok(Value::Nil)
        })))),
        _ => None,
    }
}

/// Run `n` trials of `prop` against values from `g`; returns the first
/// counterexample, or `None` if all trials pass
pub fn quick_check(
    n: usize,
    g: &Gen,
    prop: impl Fn(&Value) -> bool,
) -> Result<Option<Value>> {
    let mut rng = StdRng::from_entropy();
    for i in 0..n {
        let v = g.call(&mut rng, i.min(100))?;
        if !prop(&v) {
            return Ok(Some(v));
        }
    }
    Ok(None)
}

/// Generator overrides passed to `gen`/`exercise`: keyed by spec name or by
/// generation path
#[derive(Clone, Default)]
pub struct Overrides {
    by_name: HashMap<Keyword, GenFn>,
    by_path: HashMap<Vec<Value>, GenFn>,
}

impl Overrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the generator for every occurrence of a named spec
    pub fn for_name(mut self, name: Keyword, gfn: GenFn) -> Self {
        self.by_name.insert(name, gfn);
        self
    }

    /// Override the generator at an exact generation path
    pub fn for_path(mut self, path: Vec<Value>, gfn: GenFn) -> Self {
        self.by_path.insert(path, gfn);
        self
    }

    pub fn lookup_name(&self, name: &Keyword) -> Option<&GenFn> {
        self.by_name.get(name)
    }

    pub fn lookup_path(&self, path: &[Value]) -> Option<&GenFn> {
        self.by_path.get(path)
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty() && self.by_path.is_empty()
    }
}

/// Per-call recursion budget: counts visits of branching-op ids along the
/// current generation path
#[derive(Debug, Clone)]
pub struct RecursionMap {
    limit: usize,
    counts: BTreeMap<u64, usize>,
}

impl RecursionMap {
    pub fn new(limit: usize) -> Self {
        RecursionMap {
            limit,
            counts: BTreeMap::new(),
        }
    }

    /// Copy with the count for `id` incremented
    pub fn inck(&self, id: u64) -> Self {
        let mut next = self.clone();
        *next.counts.entry(id).or_insert(0) += 1;
        next
    }

    /// A branch at `id` is cut off once its count exceeds the limit AND the
    /// key already appears on the current path (a genuinely recursive
    /// descent, not mere repetition)
    pub fn cut_off(&self, id: u64, path: &[Value], k: &Value) -> bool {
        self.counts.get(&id).copied().unwrap_or(0) > self.limit && path.contains(k)
    }

    /// Count-only check, used by repetition ops whose id is its own key
    pub fn over_limit(&self, id: u64) -> bool {
        self.counts.get(&id).copied().unwrap_or(0) > self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    #[test]
    fn test_pure_and_fmap() {
        let g = Gen::pure(Value::Int(1)).fmap(|v| match v {
            Value::Int(i) => Value::Int(i + 1),
            other => other,
        });
        assert_eq!(g.call(&mut rng(), 0).unwrap(), Value::Int(2));
    }

    #[test]
    fn test_choose_in_range() {
        let g = Gen::choose(3, 7);
        let mut r = rng();
        for _ in 0..50 {
            match g.call(&mut r, 0).unwrap() {
                Value::Int(i) => assert!((3..=7).contains(&i)),
                other => panic!("expected int, got {}", other),
            }
        }
    }

    #[test]
    fn test_such_that_exhaustion() {
        let g = Gen::pure(Value::Int(1)).such_that(|_| false, 5);
        assert!(matches!(
            g.call(&mut rng(), 0),
            Err(Error::SuchThatExhausted { tries: 5 })
        ));
    }

    #[test]
    fn test_tuple_shape() {
        let g = Gen::tuple(vec![Gen::pure(Value::Int(1)), Gen::boolean()]);
        match g.call(&mut rng(), 0).unwrap() {
            Value::Vector(items) => {
                assert_eq!(items.len(), 2);
                assert_eq!(items[0], Value::Int(1));
            }
            other => panic!("expected vector, got {}", other),
        }
    }

    #[test]
    fn test_vector_distinct() {
        let g = Gen::vector_distinct(
            Gen::choose(0, 1000),
            DistinctOpts {
                num: Some(5),
                ..Default::default()
            },
        );
        match g.call(&mut rng(), 10).unwrap() {
            Value::Vector(items) => {
                let set: BTreeSet<_> = items.iter().collect();
                assert_eq!(set.len(), 5);
            }
            other => panic!("expected vector, got {}", other),
        }
    }

    #[test]
    fn test_seq_cat() {
        let g = Gen::seq_cat(vec![
            Gen::pure(Value::Vector(vec![Value::Int(1)])),
            Gen::pure(Value::Vector(vec![Value::Int(2), Value::Int(3)])),
        ]);
        assert_eq!(
            g.call(&mut rng(), 0).unwrap(),
            Value::Vector(vec![Value::Int(1), Value::Int(2), Value::Int(3)])
        );
    }

    #[test]
    fn test_gen_for_pred_int() {
        let g = gen_for_pred(&Value::symbol("pos-int?")).unwrap();
        let mut r = rng();
        for _ in 0..20 {
            match g.call(&mut r, 10).unwrap() {
                Value::Int(i) => assert!(i >= 1),
                other => panic!("expected int, got {}", other),
            }
        }
    }

    #[test]
    fn test_recursion_map() {
        let rmap = RecursionMap::new(2);
        let id = 7;
        let k = Value::keyword("app/tree");
        let path = vec![k.clone()];
        let rmap = rmap.inck(id).inck(id).inck(id);
        assert!(rmap.cut_off(id, &path, &k));
        // not cut off when the key is absent from the path
        assert!(!rmap.cut_off(id, &[], &k));
    }

    #[test]
    fn test_quick_check_counterexample() {
        let g = Gen::choose(0, 10);
        let cx = quick_check(100, &g, |v| !matches!(v, Value::Int(i) if *i > 5)).unwrap();
        assert!(cx.is_some());
    }
}
