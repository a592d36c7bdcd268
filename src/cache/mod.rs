//! Memoized derived-state layer
//!
//! The host re-creates its input objects on every update cycle, so identity
//! says nothing about whether inputs changed. Each cache node instead keeps
//! an owned fingerprint of its last inputs and compares the next inputs
//! against it with an equality predicate (deep `PartialEq` by default). On a
//! match the previous result is returned as the same `Arc`.

pub mod derived;
pub mod keyed;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

pub use derived::{AnalyticsInputs, DerivedSnapshot, DerivedState, Selection};
pub use keyed::KeyedMemo;

/// Equality predicate deciding whether stored inputs can be reused
pub type Equality<I> = fn(&I, &I) -> bool;

/// Inputs fingerprint plus the result computed from them. Replaced whole,
/// never mutated in place.
#[derive(Debug)]
pub struct CacheEntry<I, O> {
    pub inputs: I,
    pub result: Arc<O>,
}

/// Hit/miss counters of one cache node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub name: &'static str,
    pub hits: u64,
    pub misses: u64,
}

/// Single-entry memo with a custom equality predicate
///
/// # Example
/// ```
/// use market_spatial_analytics::cache::Memo;
/// use std::sync::Arc;
///
/// let memo: Memo<Vec<f64>, f64> = Memo::new("sum");
/// let first = memo.get_or_compute(&vec![1.0, 2.0], |v| v.iter().sum());
/// let second = memo.get_or_compute(&vec![1.0, 2.0], |v| v.iter().sum());
/// assert!(Arc::ptr_eq(&first, &second));
/// ```
pub struct Memo<I, O> {
    name: &'static str,
    entry: Mutex<Option<CacheEntry<I, O>>>,
    eq: Equality<I>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<I: Clone + PartialEq, O> Memo<I, O> {
    /// Memo comparing inputs by deep value equality
    pub fn new(name: &'static str) -> Self {
        Self::with_equality(name, <I as PartialEq>::eq)
    }
}

impl<I: Clone, O> Memo<I, O> {
    pub fn with_equality(name: &'static str, eq: Equality<I>) -> Self {
        Self {
            name,
            entry: Mutex::new(None),
            eq,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Return the stored result when `inputs` equal the stored fingerprint,
    /// otherwise run `compute` and replace the entry.
    ///
    /// The node lock is held while `compute` runs.
    pub fn get_or_compute<F>(&self, inputs: &I, compute: F) -> Arc<O>
    where
        F: FnOnce(&I) -> O,
    {
        let mut entry = self.entry.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(existing) = entry.as_ref() {
            if (self.eq)(&existing.inputs, inputs) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(node = self.name, "Cache hit");
                return Arc::clone(&existing.result);
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(node = self.name, "Cache miss, recomputing");

        let result = Arc::new(compute(inputs));
        *entry = Some(CacheEntry {
            inputs: inputs.clone(),
            result: Arc::clone(&result),
        });
        result
    }

    /// Drop the stored entry; the next call recomputes
    pub fn invalidate(&self) {
        let mut entry = self.entry.lock().unwrap_or_else(PoisonError::into_inner);
        *entry = None;
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            name: self.name,
            hits: self.hits(),
            misses: self.misses(),
        }
    }
}
