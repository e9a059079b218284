//! Process-wide tunables
//!
//! Thresholds bounding generator recursion, generative fspec checking, and
//! collection validation. Each is a process-wide default readable at any
//! call site; operations that accept explicit options override them per
//! call.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

static RECURSION_LIMIT: AtomicUsize = AtomicUsize::new(4);
static FSPEC_ITERATIONS: AtomicUsize = AtomicUsize::new(21);
static COLL_CHECK_LIMIT: AtomicUsize = AtomicUsize::new(101);
static COLL_ERROR_LIMIT: AtomicUsize = AtomicUsize::new(20);
static INSTRUMENT_ENABLED: AtomicBool = AtomicBool::new(true);

/// Max revisits of a branching-op id on a recursive generation path before
/// that branch is cut off
pub fn recursion_limit() -> usize {
    RECURSION_LIMIT.load(Ordering::Relaxed)
}

pub fn set_recursion_limit(n: usize) {
    RECURSION_LIMIT.store(n, Ordering::Relaxed);
}

/// Number of generative trials used when conforming a function against an
/// fspec
pub fn fspec_iterations() -> usize {
    FSPEC_ITERATIONS.load(Ordering::Relaxed)
}

pub fn set_fspec_iterations(n: usize) {
    FSPEC_ITERATIONS.store(n, Ordering::Relaxed);
}

/// Max elements sampled when validating a collection with `every`
pub fn coll_check_limit() -> usize {
    COLL_CHECK_LIMIT.load(Ordering::Relaxed)
}

pub fn set_coll_check_limit(n: usize) {
    COLL_CHECK_LIMIT.store(n, Ordering::Relaxed);
}

/// Max problems reported when explaining a collection failure
pub fn coll_error_limit() -> usize {
    COLL_ERROR_LIMIT.load(Ordering::Relaxed)
}

pub fn set_coll_error_limit(n: usize) {
    COLL_ERROR_LIMIT.store(n, Ordering::Relaxed);
}

/// Dynamic switch for instrumentation wrappers; when off, wrapped functions
/// delegate without checking
pub fn instrument_enabled() -> bool {
    INSTRUMENT_ENABLED.load(Ordering::Relaxed)
}

pub fn set_instrument_enabled(on: bool) {
    INSTRUMENT_ENABLED.store(on, Ordering::Relaxed);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        assert_eq!(recursion_limit(), 4);
        assert_eq!(fspec_iterations(), 21);
        assert_eq!(coll_check_limit(), 101);
        assert_eq!(coll_error_limit(), 20);
        assert!(instrument_enabled());
    }
}
