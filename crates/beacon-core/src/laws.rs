//! Executable checks for the merge laws.
//!
//! Each check takes concrete snapshots and returns `Ok(())` or the
//! [`LawViolation`] it found. Property tests feed them generated inputs; the
//! todo server's `/verify` endpoint runs [`check_idempotent`] against the live
//! snapshot.

use std::thread;

use crate::mergeable::{Mergeable, merge};

/// A merge law that did not hold for the supplied inputs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LawViolation {
    /// Merging changed one of the operands.
    #[error("merge mutated its {operand} operand")]
    Mutated {
        /// `"left"` or `"right"`.
        operand: &'static str,
    },

    /// `a.merge(a) != a`.
    #[error("merge is not idempotent")]
    NotIdempotent,

    /// `a.merge(b) != b.merge(a)`.
    #[error("merge is not commutative")]
    NotCommutative,

    /// `(a.merge(b)).merge(c) != a.merge(b.merge(c))`.
    #[error("merge is not associative")]
    NotAssociative,

    /// A thread computed a different result from the sequential fold.
    #[error("merge on worker {worker} diverged from the sequential result")]
    ParallelDivergence {
        /// Index of the diverging worker.
        worker: usize,
    },

    /// A worker thread panicked while merging.
    #[error("merge panicked on worker {worker}")]
    ParallelPanic {
        /// Index of the panicking worker.
        worker: usize,
    },
}

/// `a` and `b` are unchanged after merging them.
pub fn check_non_mutating<S: Mergeable>(a: &S, b: &S) -> Result<(), LawViolation> {
    let (a_before, b_before) = (a.clone(), b.clone());
    let _merged = merge(a, b);
    if *a != a_before {
        return Err(LawViolation::Mutated { operand: "left" });
    }
    if *b != b_before {
        return Err(LawViolation::Mutated { operand: "right" });
    }
    Ok(())
}

/// `a.merge(a) == a`.
pub fn check_idempotent<S: Mergeable>(a: &S) -> Result<(), LawViolation> {
    if merge(a, a) == *a {
        Ok(())
    } else {
        Err(LawViolation::NotIdempotent)
    }
}

/// `a.merge(b) == b.merge(a)`.
pub fn check_commutative<S: Mergeable>(a: &S, b: &S) -> Result<(), LawViolation> {
    if merge(a, b) == merge(b, a) {
        Ok(())
    } else {
        Err(LawViolation::NotCommutative)
    }
}

/// `(a.merge(b)).merge(c) == a.merge(b.merge(c))`.
pub fn check_associative<S: Mergeable>(a: &S, b: &S, c: &S) -> Result<(), LawViolation> {
    if merge(&merge(a, b), c) == merge(a, &merge(b, c)) {
        Ok(())
    } else {
        Err(LawViolation::NotAssociative)
    }
}

/// All four laws for three operands that never disagree on a key.
pub fn check_semilattice<S: Mergeable>(a: &S, b: &S, c: &S) -> Result<(), LawViolation> {
    check_non_mutating(a, b)?;
    check_idempotent(a)?;
    check_commutative(a, b)?;
    check_associative(a, b, c)
}

/// Fold `inputs` with merge on `workers` threads at once, all sharing the
/// same inputs, and compare each result with the sequential fold.
pub fn check_parallel_safe<S: Mergeable>(inputs: &[S], workers: usize) -> Result<(), LawViolation> {
    let Some(expected) = fold(inputs) else {
        return Ok(());
    };

    thread::scope(|scope| {
        let handles: Vec<_> = (0..workers)
            .map(|worker| (worker, scope.spawn(move || fold(inputs))))
            .collect();

        for (worker, handle) in handles {
            match handle.join() {
                Ok(Some(result)) if result == expected => {}
                Ok(_) => return Err(LawViolation::ParallelDivergence { worker }),
                Err(_) => return Err(LawViolation::ParallelPanic { worker }),
            }
        }
        Ok(())
    })
}

fn fold<S: Mergeable>(inputs: &[S]) -> Option<S> {
    let (first, rest) = inputs.split_first()?;
    Some(rest.iter().fold(first.clone(), |acc, next| acc.merge(next)))
}
