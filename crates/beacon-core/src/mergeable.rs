//! The merge contract shared by every snapshot shape.
//!
//! A [`Mergeable`] value is an immutable snapshot that can be combined with
//! another snapshot of the same shape. Replicas that evolve independently
//! reconcile by exchanging snapshots and merging them, with no coordination
//! protocol in between.
//!
//! # Laws
//!
//! Implementations must satisfy, for snapshots that do not disagree on the
//! same key:
//!
//! - **Associativity:** `a.merge(&b).merge(&c) == a.merge(&b.merge(&c))`
//! - **Commutativity:** `a.merge(&b) == b.merge(&a)`
//! - **Idempotence:** `a.merge(&a) == a`
//!
//! and unconditionally:
//!
//! - **Non-mutation:** neither operand changes.
//!
//! When two snapshots *do* disagree on a key, each shape applies a fixed,
//! documented policy. [`Mergeable::reconcile`] reports every place where that
//! policy discarded information so callers can log or surface it.

/// The result of reconciling two snapshots.
///
/// `merged` is always exactly what [`Mergeable::merge`] would return.
/// `conflicts` lists the disagreements the merge policy resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled<S, C> {
    /// The merged snapshot.
    pub merged: S,
    /// Every conflict the merge policy resolved, in discovery order.
    pub conflicts: Vec<C>,
}

impl<S, C> Reconciled<S, C> {
    /// Whether the two operands agreed everywhere they overlapped.
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty()
    }

    /// Transform the merged snapshot while keeping the conflict list.
    pub fn map<T>(self, f: impl FnOnce(S) -> T) -> Reconciled<T, C> {
        Reconciled {
            merged: f(self.merged),
            conflicts: self.conflicts,
        }
    }
}

/// An immutable snapshot with an associative, idempotent merge.
pub trait Mergeable: Clone + PartialEq + Send + Sync + 'static {
    /// Description of one disagreement resolved during a merge.
    type Conflict: Clone + core::fmt::Debug + Send + Sync + 'static;

    /// Merge `other` into a new snapshot and report resolved conflicts.
    ///
    /// Must never mutate either operand.
    fn reconcile(&self, other: &Self) -> Reconciled<Self, Self::Conflict>;

    /// Merge `other` into a new snapshot, discarding the conflict report.
    fn merge(&self, other: &Self) -> Self {
        self.reconcile(other).merged
    }
}

/// Merge two snapshots as a plain binary function.
///
/// This is the `(S, S) -> S` form consumed by property-testing harnesses.
pub fn merge<S: Mergeable>(a: &S, b: &S) -> S {
    a.merge(b)
}
