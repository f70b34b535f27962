//! The contract every bucket backend satisfies.
//!
//! A storage maps a [`BucketName`] to a non-negative
//! integer and knows nothing about capacities, watchers or refill loops. One
//! storage instance is meant to be shared (behind an [`Arc`](std::sync::Arc)) by
//! every bucket that uses it.
//!
//! # Atomicity
//!
//! - [`Storage::take`] must be atomic with respect to every other `take` and `put`
//!   on the same name, across processes for shared backends.
//! - [`Storage::take_all`] must read and reset in one atomic step.
//! - [`Storage::put`] only needs to be an atomic increment. A concurrent `take` that
//!   reads just before the increment lands and reports
//!   [`BucketError::InsufficientTokens`] is accepted behaviour.

use std::future::Future;

use crate::{BucketError, BucketName};

/// Backend for bucket token counts.
pub trait Storage: Send + Sync + 'static {
    /// Check the backend is reachable.
    fn ping(&self) -> impl Future<Output = Result<(), BucketError>> + Send;

    /// Initialize `name` to `capacity` if it does not exist yet.
    ///
    /// Backends may refuse to adopt an existing value they consider incompatible
    /// and return [`BucketError::CreationConflict`].
    fn create(
        &self,
        name: &BucketName,
        capacity: u64,
    ) -> impl Future<Output = Result<(), BucketError>> + Send;

    /// Decrement `name` by `tokens` if it holds at least that many.
    ///
    /// Otherwise fail with [`BucketError::InsufficientTokens`] and leave the count
    /// untouched.
    fn take(
        &self,
        name: &BucketName,
        tokens: u64,
    ) -> impl Future<Output = Result<(), BucketError>> + Send;

    /// Increment `name` by `amount`.
    fn put(
        &self,
        name: &BucketName,
        amount: u64,
    ) -> impl Future<Output = Result<(), BucketError>> + Send;

    /// Current count of `name`. A missing name counts as `0`.
    fn count(&self, name: &BucketName) -> impl Future<Output = Result<u64, BucketError>> + Send;

    /// Reset `name` to `0`, returning what it held.
    fn take_all(
        &self,
        name: &BucketName,
    ) -> impl Future<Output = Result<u64, BucketError>> + Send;

    /// Overwrite `name` with `value`.
    fn set(
        &self,
        name: &BucketName,
        value: u64,
    ) -> impl Future<Output = Result<(), BucketError>> + Send;
}
