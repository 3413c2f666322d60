//! The concurrent holder of "the current snapshot".
//!
//! [`StateStore`] owns exactly one `Arc<S>` behind a [`RwLock`]. Reads clone
//! the `Arc` under a shared lock. Writes follow a fixed discipline:
//!
//! 1. take the shared lock, clone the current `Arc`, release;
//! 2. run the caller's pure transformation with **no lock held**;
//! 3. take the exclusive lock, swap in the new `Arc`, release.
//!
//! Step 3 only commits if the snapshot read in step 1 is still current. If a
//! concurrent commit replaced it, the transformation is re-derived from the
//! newer snapshot, so every committed snapshot descends from the one before
//! it and no update is lost. A transformation that fails or panics is never
//! re-run and never reaches step 3.
//!
//! Readers always observe a fully constructed snapshot: construction happens
//! off-lock and the swap is a single pointer store.

use std::any::Any;
use std::convert::Infallible;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::mergeable::{Mergeable, Reconciled};

/// Errors surfaced by [`StateStore::apply_isolated`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The transformation panicked; the store kept its previous snapshot.
    #[error("transformation panicked: {message}")]
    TransformPanicked {
        /// The panic payload, if it was a string.
        message: String,
    },
}

/// Counters describing store activity since construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StoreStats {
    /// Snapshots committed.
    pub commits: u64,
    /// Transformations re-run because their input went stale.
    pub rederivations: u64,
}

/// A concurrency-safe cell holding one immutable snapshot.
///
/// Share it between threads or tasks behind an [`Arc`]. The lock is never
/// held while user code runs, so it is safe to use from async handlers
/// without `.await`-ing inside a critical section.
#[derive(Debug)]
pub struct StateStore<S> {
    current: RwLock<Arc<S>>,
    commits: AtomicU64,
    rederivations: AtomicU64,
}

impl<S> StateStore<S>
where
    S: Send + Sync + 'static,
{
    /// Create a store holding `initial`.
    pub fn new(initial: S) -> Self {
        Self {
            current: RwLock::new(Arc::new(initial)),
            commits: AtomicU64::new(0),
            rederivations: AtomicU64::new(0),
        }
    }

    /// The current snapshot.
    ///
    /// Returns a shared handle; later commits do not affect it.
    pub fn read(&self) -> Arc<S> {
        Arc::clone(&self.read_guard())
    }

    /// Activity counters.
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            commits: self.commits.load(Ordering::Relaxed),
            rederivations: self.rederivations.load(Ordering::Relaxed),
        }
    }

    /// Derive and commit a new snapshot, returning it.
    ///
    /// `f` runs without any lock held and may run more than once if a
    /// concurrent commit lands first. A panic in `f` propagates to the
    /// caller and leaves the store untouched.
    pub fn apply<F>(&self, f: F) -> Arc<S>
    where
        F: Fn(&S) -> S,
    {
        self.update(|current| (f(current), ())).0
    }

    /// Like [`apply`](Self::apply), but `f` may refuse.
    ///
    /// An `Err` from `f` is returned as-is; the exclusive lock is not taken
    /// and the current snapshot is unchanged.
    pub fn try_apply<F, E>(&self, f: F) -> Result<Arc<S>, E>
    where
        F: Fn(&S) -> Result<S, E>,
    {
        self.try_update(|current| f(current).map(|next| (next, ())))
            .map(|(committed, ())| committed)
    }

    /// Like [`apply`](Self::apply), but a panic in `f` is caught and
    /// reported as [`StoreError::TransformPanicked`].
    pub fn apply_isolated<F>(&self, f: F) -> Result<Arc<S>, StoreError>
    where
        F: Fn(&S) -> S,
    {
        self.try_apply(|current| {
            panic::catch_unwind(AssertUnwindSafe(|| f(current))).map_err(|payload| {
                let message = panic_message(&*payload);
                warn!(%message, "transformation panicked, snapshot left unchanged");
                StoreError::TransformPanicked { message }
            })
        })
    }

    /// Derive a new snapshot plus a side value from the committing attempt.
    pub fn update<F, T>(&self, f: F) -> (Arc<S>, T)
    where
        F: Fn(&S) -> (S, T),
    {
        match self.try_update(|current| Ok::<_, Infallible>(f(current))) {
            Ok(committed) => committed,
            Err(never) => match never {},
        }
    }

    /// The primitive every write goes through.
    ///
    /// Returns the committed snapshot and the side value produced by the
    /// attempt that committed.
    pub fn try_update<F, T, E>(&self, f: F) -> Result<(Arc<S>, T), E>
    where
        F: Fn(&S) -> Result<(S, T), E>,
    {
        let mut base = self.read();
        loop {
            let (next, output) = f(base.as_ref())?;
            let next = Arc::new(next);

            let mut current = self.write_guard();
            if Arc::ptr_eq(&current, &base) {
                *current = Arc::clone(&next);
                drop(current);
                let commits = self.commits.fetch_add(1, Ordering::Relaxed).saturating_add(1);
                debug!(commits, "snapshot committed");
                return Ok((next, output));
            }

            base = Arc::clone(&current);
            drop(current);
            self.rederivations.fetch_add(1, Ordering::Relaxed);
            trace!("snapshot replaced during transformation, re-deriving");
        }
    }

    // The critical sections only clone or store an `Arc`, so a poisoned lock
    // still guards a whole snapshot.
    fn read_guard(&self) -> RwLockReadGuard<'_, Arc<S>> {
        self.current.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, Arc<S>> {
        self.current.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<S> StateStore<S>
where
    S: Mergeable,
{
    /// Merge `other` into the current snapshot and commit the result.
    ///
    /// Conflicts are those observed by the attempt that committed.
    pub fn merge(&self, other: &S) -> Reconciled<Arc<S>, S::Conflict> {
        let (merged, conflicts) = self.update(|current| {
            let outcome = current.reconcile(other);
            (outcome.merged, outcome.conflicts)
        });
        Reconciled { merged, conflicts }
    }
}

impl<S> Default for StateStore<S>
where
    S: Default + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(S::default())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| String::from("non-string panic payload"))
}
