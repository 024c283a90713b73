//! Per-type recycling allocator for hot-path frame and body objects.
//!
//! A [`Pool`] hands out [`Pooled`] handles and takes them back through
//! [`Pool::free`], the single release path. Freeing empties the handle, so a
//! second `free` of the same handle is detected and treated as fatal: a
//! corrupted free-list cannot be repaired after the fact.
//!
//! Pools are not shared between threads. Each connection (or worker) owns its
//! own set; wrap a pool in a lock if it must be reached from several threads.
//!
//! ```
//! use skein_core::pool::{Pool, Reset};
//!
//! #[derive(Default)]
//! struct User {
//!     id: u32,
//! }
//!
//! impl Reset for User {
//!     fn reset(&mut self) {
//!         self.id = 0;
//!     }
//! }
//!
//! let mut pool = Pool::<User>::with_reset("User");
//! let mut user = pool.get();
//! user.id = 7;
//! pool.free(&mut user);
//! assert_eq!(pool.stats().outstanding, 0);
//! ```

use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Restores an instance to its default-zero state before it is recycled.
pub trait Reset {
    fn reset(&mut self);
}

/// Counters shared between a pool and the registry observing it.
#[derive(Debug)]
pub struct PoolCounters {
    name: &'static str,
    outstanding: AtomicU64,
    reused: AtomicU64,
    newed: AtomicU64,
}

impl PoolCounters {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            outstanding: AtomicU64::new(0),
            reused: AtomicU64::new(0),
            newed: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn snapshot(&self) -> PoolStats {
        PoolStats {
            name: self.name,
            outstanding: self.outstanding.load(Ordering::Acquire),
            reused: self.reused.load(Ordering::Acquire),
            newed: self.newed.load(Ordering::Acquire),
        }
    }
}

/// Point-in-time view of a pool's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub name: &'static str,
    /// Handles handed out and not yet freed.
    pub outstanding: u64,
    /// `get()` calls served from the free-list.
    pub reused: u64,
    /// `get()` calls that constructed a new instance.
    pub newed: u64,
}

/// A handle to a pooled instance.
///
/// The handle is emptied when freed; touching it afterwards is a contract
/// violation and panics. Dropping a handle without freeing it leaks it from
/// the pool's point of view (it stays in `outstanding`).
pub struct Pooled<T> {
    inner: Option<Box<T>>,
    // false for handles built directly rather than taken from a pool
    counted: bool,
}

impl<T> Pooled<T> {
    /// Wraps a directly constructed value. Freeing it into a pool recycles
    /// its allocation without touching the pool's counters.
    pub fn new(value: T) -> Self {
        Self {
            inner: Some(Box::new(value)),
            counted: false,
        }
    }

    pub fn is_freed(&self) -> bool {
        self.inner.is_none()
    }
}

impl<T> Deref for Pooled<T> {
    type Target = T;

    fn deref(&self) -> &T {
        match self.inner.as_deref() {
            Some(value) => value,
            None => panic!("object pool use after free"),
        }
    }
}

impl<T> DerefMut for Pooled<T> {
    fn deref_mut(&mut self) -> &mut T {
        match self.inner.as_deref_mut() {
            Some(value) => value,
            None => panic!("object pool use after free"),
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Pooled<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.inner {
            Some(value) => value.fmt(f),
            None => f.write_str("<freed>"),
        }
    }
}

impl<T: PartialEq> PartialEq for Pooled<T> {
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner
    }
}

impl<T: Clone> Clone for Pooled<T> {
    /// Clones into a detached handle.
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            counted: false,
        }
    }
}

/// Free-list allocator for one type.
pub struct Pool<T> {
    freelist: VecDeque<Box<T>>,
    reset: Option<fn(&mut T)>,
    counters: Arc<PoolCounters>,
}

impl<T: Default> Pool<T> {
    /// A pool that recycles instances as-is.
    pub fn new(name: &'static str) -> Self {
        Self::build(name, None)
    }

    fn build(name: &'static str, reset: Option<fn(&mut T)>) -> Self {
        debug!(pool = name, resets = reset.is_some(), "creating object pool");
        Self {
            freelist: VecDeque::new(),
            reset,
            counters: Arc::new(PoolCounters::new(name)),
        }
    }

    /// Returns a recycled instance if one is free, else a new one.
    pub fn get(&mut self) -> Pooled<T> {
        self.counters.outstanding.fetch_add(1, Ordering::AcqRel);
        let boxed = match self.freelist.pop_front() {
            Some(boxed) => {
                self.counters.reused.fetch_add(1, Ordering::AcqRel);
                boxed
            }
            None => {
                self.counters.newed.fetch_add(1, Ordering::AcqRel);
                Box::default()
            }
        };
        Pooled {
            inner: Some(boxed),
            counted: true,
        }
    }
}

impl<T: Default + Reset> Pool<T> {
    /// A pool that calls [`Reset::reset`] on every instance it takes back.
    pub fn with_reset(name: &'static str) -> Self {
        Self::build(name, Some(<T as Reset>::reset))
    }
}

impl<T> Pool<T> {
    /// Returns `obj` to the free-list.
    ///
    /// # Panics
    ///
    /// Panics if `obj` was already freed (double free).
    pub fn free(&mut self, obj: &mut Pooled<T>) {
        let Some(mut boxed) = obj.inner.take() else {
            panic!("object pool double free ({})", self.counters.name);
        };
        if let Some(reset) = self.reset {
            reset(boxed.as_mut());
        }
        if obj.counted {
            self.counters.outstanding.fetch_sub(1, Ordering::AcqRel);
        }
        self.freelist.push_back(boxed);
    }

    pub fn name(&self) -> &'static str {
        self.counters.name
    }

    pub fn stats(&self) -> PoolStats {
        self.counters.snapshot()
    }

    /// Number of instances waiting on the free-list.
    pub fn idle(&self) -> usize {
        self.freelist.len()
    }

    /// Shared counters, for registration with a [`PoolRegistry`].
    pub fn counters(&self) -> Arc<PoolCounters> {
        Arc::clone(&self.counters)
    }
}

impl<T> std::fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("stats", &self.stats())
            .field("idle", &self.freelist.len())
            .finish()
    }
}

/// Diagnostics view over a set of pools, keyed by type name.
///
/// Owned by whoever wants the diagnostics; never consulted on the hot path.
#[derive(Debug, Default)]
pub struct PoolRegistry {
    pools: BTreeMap<&'static str, Arc<PoolCounters>>,
}

impl PoolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T>(&mut self, pool: &Pool<T>) {
        self.pools.insert(pool.name(), pool.counters());
    }

    pub fn stats(&self, name: &str) -> Option<PoolStats> {
        self.pools.get(name).map(|counters| counters.snapshot())
    }

    pub fn snapshot(&self) -> Vec<PoolStats> {
        self.pools.values().map(|counters| counters.snapshot()).collect()
    }

    /// Pools with handles still outstanding.
    pub fn leaks(&self) -> Vec<PoolStats> {
        self.snapshot()
            .into_iter()
            .filter(|stats| stats.outstanding > 0)
            .collect()
    }

    /// Logs every pool with outstanding handles. Returns how many were found.
    pub fn report_leaks(&self) -> usize {
        let leaks = self.leaks();
        for stats in &leaks {
            warn!(
                pool = stats.name,
                outstanding = stats.outstanding,
                "pooled objects not returned"
            );
        }
        leaks.len()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.snapshot())
    }
}
