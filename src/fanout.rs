//! Concurrent fan-out where only some branches are allowed to fail the whole.
//!
//! Every branch runs to completion before the caller sees anything; a failing
//! best-effort branch is reported in its `Settled` entry, a failing critical
//! branch turns the whole call into `Err`.

use futures::future::{BoxFuture, FutureExt, join_all};
use std::future::Future;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Criticality {
    Critical,
    BestEffort,
}

pub struct Branch<'a, T, E> {
    label: &'static str,
    criticality: Criticality,
    future: BoxFuture<'a, Result<T, E>>,
}

impl<'a, T, E> Branch<'a, T, E> {
    pub fn critical<F>(label: &'static str, future: F) -> Self
    where
        F: Future<Output = Result<T, E>> + Send + 'a,
    {
        Self {
            label,
            criticality: Criticality::Critical,
            future: future.boxed(),
        }
    }

    pub fn best_effort<F>(label: &'static str, future: F) -> Self
    where
        F: Future<Output = Result<T, E>> + Send + 'a,
    {
        Self {
            label,
            criticality: Criticality::BestEffort,
            future: future.boxed(),
        }
    }
}

#[derive(Debug)]
pub struct Settled<T, E> {
    pub label: &'static str,
    pub outcome: Result<T, E>,
}

#[derive(Debug, Error)]
#[error("critical branch `{label}` failed: {error}")]
pub struct CriticalFailure<E> {
    pub label: &'static str,
    pub error: E,
}

/// Drives all branches concurrently and waits for every one of them.
///
/// Returns the settled branches in input order, or the first failed critical
/// branch (in input order).
pub async fn settle_all<'a, T, E>(
    branches: Vec<Branch<'a, T, E>>,
) -> Result<Vec<Settled<T, E>>, CriticalFailure<E>> {
    let mut meta = Vec::with_capacity(branches.len());
    let mut futures = Vec::with_capacity(branches.len());
    for branch in branches {
        meta.push((branch.label, branch.criticality));
        futures.push(branch.future);
    }

    let outcomes = join_all(futures).await;

    let mut settled = Vec::with_capacity(outcomes.len());
    let mut failure = None;
    for ((label, criticality), outcome) in meta.into_iter().zip(outcomes) {
        match (criticality, outcome) {
            (Criticality::Critical, Err(error)) if failure.is_none() => {
                failure = Some(CriticalFailure { label, error });
            }
            (_, outcome) => settled.push(Settled { label, outcome }),
        }
    }

    match failure {
        Some(failure) => Err(failure),
        None => Ok(settled),
    }
}

/// Takes the outcome of the branch called `label` out of a settled set.
pub fn take<T, E>(settled: &mut Vec<Settled<T, E>>, label: &str) -> Option<Result<T, E>> {
    let index = settled.iter().position(|branch| branch.label == label)?;
    Some(settled.remove(index).outcome)
}
