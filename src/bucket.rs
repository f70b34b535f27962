use std::{sync::Arc, time::Duration};

use futures::{FutureExt, Stream, StreamExt};

use crate::{
    BucketError, BucketName, FillMode, MemoryStorage, Storage,
    runtime::{new_interval, sleep, spawn_task, tick},
    watchable::{CancelReceiver, WatchSignal, Watchable, resolved, watchable},
};

/// Cadence at which [`Bucket::watch`] retries its `take` unless configured
/// otherwise.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Configuration for [`Bucket::with_options`].
#[derive(Clone, Debug)]
pub struct BucketOptions {
    /// Key of the bucket in its storage.
    pub name: BucketName,
    /// Tokens the bucket starts with if the storage does not hold it yet.
    ///
    /// Also the ceiling for fill targets. It is not a ceiling for `put`.
    pub capacity: u64,
    /// Retry cadence of [`Bucket::watch`]. Must be non-zero.
    pub poll_interval: Duration,
}

impl BucketOptions {
    /// Options with the default poll interval.
    pub fn new(name: BucketName, capacity: u64) -> Self {
        Self {
            name,
            capacity,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// A named token count in a (possibly shared) [`Storage`].
///
/// Buckets are cheap: a name, a capacity and an [`Arc`] to the storage. Many buckets,
/// including buckets with the same name, can point at one storage; same-named
/// buckets share their count.
///
/// # Capacity
///
/// `capacity` seeds the count when the bucket is first created and caps the target
/// of [`Bucket::fill`]. [`Bucket::put`] may raise the count above it without limit.
///
/// # Background loops
///
/// [`Bucket::watch`], [`Bucket::fill`] and [`Bucket::dynamic_fill`] each spawn one
/// task on the runtime (tokio or smol, per crate features) and must be called from
/// within it. Each task talks to the bucket only through storage and reports once
/// through the returned [`Watchable`].
///
/// # Examples
///
/// ```ignore
/// use std::{sync::Arc, time::Duration};
/// use tokenpail::{Bucket, BucketName, MemoryStorage, WatchOutcome};
///
/// let storage = Arc::new(MemoryStorage::new());
/// let bucket = Bucket::new(BucketName::try_from("uploads")?, 10, storage).await?;
///
/// bucket.take(3).await?;
/// assert_eq!(bucket.count().await?, 7);
///
/// // Wait up to a minute for 20 tokens to become available.
/// let result = bucket.watch(20, Duration::from_secs(60)).await;
/// ```
pub struct Bucket<S: Storage = MemoryStorage> {
    name: BucketName,
    capacity: u64,
    poll_interval: Duration,
    storage: Arc<S>,
}

impl Bucket<MemoryStorage> {
    /// Create a bucket on its own, unshared [`MemoryStorage`].
    pub async fn new_in_memory(name: BucketName, capacity: u64) -> Result<Self, BucketError> {
        Self::new(name, capacity, Arc::new(MemoryStorage::new())).await
    }
}

impl<S: Storage> Bucket<S> {
    /// Create a bucket, seeding it with `capacity` tokens if `name` is new.
    ///
    /// Pings the storage, then creates the name in it. Fails with
    /// [`BucketError::Connectivity`] if the storage is unreachable, or with
    /// [`BucketError::CreationConflict`] if the storage refuses the existing value.
    pub async fn new(
        name: BucketName,
        capacity: u64,
        storage: Arc<S>,
    ) -> Result<Self, BucketError> {
        Self::with_options(BucketOptions::new(name, capacity), storage).await
    }

    /// Create a bucket from options. See [`Bucket::new`].
    ///
    /// Fails with [`BucketError::InvalidInterval`] if `poll_interval` is zero.
    pub async fn with_options(options: BucketOptions, storage: Arc<S>) -> Result<Self, BucketError> {
        if options.poll_interval.is_zero() {
            return Err(BucketError::InvalidInterval);
        }

        storage.ping().await?;
        storage.create(&options.name, options.capacity).await?;

        Ok(Self {
            name: options.name,
            capacity: options.capacity,
            poll_interval: options.poll_interval,
            storage,
        })
    }

    /// Name of the bucket.
    pub fn name(&self) -> &BucketName {
        &self.name
    }

    /// Creation-time capacity.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Storage the bucket lives in.
    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    /// Remove `tokens` if at least that many are available.
    ///
    /// Fails with [`BucketError::InsufficientTokens`] otherwise, leaving the count
    /// as it was.
    pub async fn take(&self, tokens: u64) -> Result<(), BucketError> {
        self.storage.take(&self.name, tokens).await
    }

    /// Add `amount` tokens, regardless of capacity.
    pub async fn put(&self, amount: u64) -> Result<(), BucketError> {
        self.storage.put(&self.name, amount).await
    }

    /// Current number of tokens.
    pub async fn count(&self) -> Result<u64, BucketError> {
        self.storage.count(&self.name).await
    }

    /// Remove every token, returning how many there were.
    pub async fn take_all(&self) -> Result<u64, BucketError> {
        self.storage.take_all(&self.name).await
    }

    /// Keep trying to take `tokens` until it succeeds or `timeout` elapses.
    ///
    /// One attempt is made every poll interval, the first one interval from now.
    /// The returned [`Watchable`] resolves with:
    ///
    /// - `Ok(WatchOutcome::Completed)` once a `take` succeeded
    /// - `Err(BucketError::Timeout(timeout))` if the deadline passed first
    /// - the cancel payload if cancelled first
    /// - the storage error if an attempt failed for another reason than
    ///   insufficient tokens
    pub fn watch(&self, tokens: u64, timeout: Duration) -> Watchable {
        let (watchable, signal, cancel_rx) = watchable();

        spawn_task(watch_loop(
            self.storage.clone(),
            self.name.clone(),
            self.poll_interval,
            tokens,
            timeout,
            signal,
            cancel_rx,
        ));

        watchable
    }

    /// Every `interval`, overwrite the count with `min(rate, capacity)`.
    ///
    /// Runs until cancelled or until a tick fails; a failing tick resolves the
    /// watchable with [`BucketError::Refill`]. A zero `interval` starts no loop and
    /// resolves with [`BucketError::InvalidInterval`].
    pub fn fill(&self, rate: u64, interval: Duration) -> Watchable {
        self.fill_with(rate, interval, FillMode::Overwrite)
    }

    /// [`Bucket::fill`] with an explicit [`FillMode`].
    pub fn fill_with(&self, rate: u64, interval: Duration, mode: FillMode) -> Watchable {
        if interval.is_zero() {
            tracing::debug!(bucket = %self.name, "Refusing fill with zero interval");
            return resolved(Err(BucketError::InvalidInterval));
        }

        let (watchable, signal, cancel_rx) = watchable();

        spawn_task(fill_loop(
            self.storage.clone(),
            self.name.clone(),
            self.fill_target(rate),
            mode,
            interval,
            signal,
            cancel_rx,
        ));

        watchable
    }

    /// Refill to `min(rate, capacity)` each time `trigger` yields an item.
    ///
    /// Lets an outside scheduler decide when refills happen. The watchable resolves
    /// with `Ok(WatchOutcome::Completed)` when the trigger ends, and otherwise as for
    /// [`Bucket::fill`].
    pub fn dynamic_fill<T>(&self, rate: u64, trigger: T) -> Watchable
    where
        T: Stream + Send + Unpin + 'static,
    {
        self.dynamic_fill_with(rate, trigger, FillMode::Overwrite)
    }

    /// [`Bucket::dynamic_fill`] with an explicit [`FillMode`].
    pub fn dynamic_fill_with<T>(&self, rate: u64, trigger: T, mode: FillMode) -> Watchable
    where
        T: Stream + Send + Unpin + 'static,
    {
        let (watchable, signal, cancel_rx) = watchable();

        spawn_task(dynamic_fill_loop(
            self.storage.clone(),
            self.name.clone(),
            self.fill_target(rate),
            mode,
            trigger.map(|_| ()),
            signal,
            cancel_rx,
        ));

        watchable
    }

    fn fill_target(&self, rate: u64) -> u64 {
        rate.min(self.capacity)
    }
}

impl<S: Storage> Clone for Bucket<S> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            capacity: self.capacity,
            poll_interval: self.poll_interval,
            storage: self.storage.clone(),
        }
    }
}

impl<S: Storage> std::fmt::Debug for Bucket<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bucket")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

async fn watch_loop<S: Storage>(
    storage: Arc<S>,
    name: BucketName,
    poll_interval: Duration,
    tokens: u64,
    timeout: Duration,
    mut signal: WatchSignal,
    mut cancel_rx: CancelReceiver,
) {
    let mut interval = new_interval(poll_interval);
    let deadline = sleep(timeout).fuse();
    futures::pin_mut!(deadline);

    loop {
        let next_tick = tick(&mut interval).fuse();
        futures::pin_mut!(next_tick);

        futures::select! {
            () = next_tick => {
                if signal.is_abandoned() {
                    tracing::debug!(bucket = %name, "Watch result dropped, stopping");
                    break;
                }

                match storage.take(&name, tokens).await {
                    Ok(()) => {
                        signal.complete();
                        break;
                    }
                    Err(err) if err.is_insufficient_tokens() => {
                        tracing::trace!(bucket = %name, tokens, "Watch tick, not enough tokens yet");
                    }
                    Err(err) => {
                        tracing::debug!(error = ?err, bucket = %name, "Watch take failed");
                        signal.fail(err);
                        break;
                    }
                }
            },
            () = deadline => {
                tracing::debug!(bucket = %name, ?timeout, "Watch timed out");
                signal.fail(BucketError::Timeout(timeout));
                break;
            },
            reason = cancel_rx => {
                tracing::debug!(bucket = %name, "Watch cancelled");
                signal.cancelled(reason);
                break;
            },
        }
    }
} // end fn watch_loop

async fn fill_loop<S: Storage>(
    storage: Arc<S>,
    name: BucketName,
    target: u64,
    mode: FillMode,
    period: Duration,
    mut signal: WatchSignal,
    mut cancel_rx: CancelReceiver,
) {
    let mut interval = new_interval(period);

    loop {
        let next_tick = tick(&mut interval).fuse();
        futures::pin_mut!(next_tick);

        futures::select! {
            () = next_tick => {
                if signal.is_abandoned() {
                    tracing::debug!(bucket = %name, "Fill result dropped, stopping");
                    break;
                }

                if let Err(err) = refill(&*storage, &name, target, mode).await {
                    tracing::error!(error = ?err, bucket = %name, "Failed to refill bucket");
                    signal.fail(BucketError::Refill(Box::new(err)));
                    break;
                }
            },
            reason = cancel_rx => {
                tracing::debug!(bucket = %name, "Fill cancelled");
                signal.cancelled(reason);
                break;
            },
        }
    }
} // end fn fill_loop

async fn dynamic_fill_loop<S, T>(
    storage: Arc<S>,
    name: BucketName,
    target: u64,
    mode: FillMode,
    mut trigger: T,
    mut signal: WatchSignal,
    mut cancel_rx: CancelReceiver,
) where
    S: Storage,
    T: Stream<Item = ()> + Send + Unpin + 'static,
{
    loop {
        let next_trigger = trigger.next().fuse();
        futures::pin_mut!(next_trigger);

        futures::select! {
            pulse = next_trigger => {
                if pulse.is_none() {
                    tracing::debug!(bucket = %name, "Fill trigger ended");
                    signal.complete();
                    break;
                }

                if signal.is_abandoned() {
                    tracing::debug!(bucket = %name, "Fill result dropped, stopping");
                    break;
                }

                if let Err(err) = refill(&*storage, &name, target, mode).await {
                    tracing::error!(error = ?err, bucket = %name, "Failed to refill bucket");
                    signal.fail(BucketError::Refill(Box::new(err)));
                    break;
                }
            },
            reason = cancel_rx => {
                tracing::debug!(bucket = %name, "Fill cancelled");
                signal.cancelled(reason);
                break;
            },
        }
    }
} // end fn dynamic_fill_loop

async fn refill<S: Storage>(
    storage: &S,
    name: &BucketName,
    target: u64,
    mode: FillMode,
) -> Result<(), BucketError> {
    tracing::trace!(bucket = %name, target, ?mode, "Refilling bucket");

    match mode {
        FillMode::Overwrite => storage.set(name, target).await,
        FillMode::Delta => {
            let count = storage.count(name).await?;

            if count < target {
                storage.put(name, target - count).await
            } else {
                Ok(())
            }
        }
    }
}
