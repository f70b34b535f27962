use std::{future::Future, time::Duration};

#[cfg(feature = "tokio")]
pub(crate) type Interval = tokio::time::Interval;

#[cfg(all(feature = "smol", not(feature = "tokio")))]
pub(crate) type Interval = smol::Timer;

/// Longest period an interval is armed with.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Interval whose first tick fires one `period` from now.
///
/// `period` must be non-zero.
#[cfg(feature = "tokio")]
pub(crate) fn new_interval(period: Duration) -> Interval {
    // Tokio's interval ticks immediately on first await; start one period out so
    // both runtimes agree.
    let period = period.min(FAR_FUTURE);
    let now = tokio::time::Instant::now();
    let start = now.checked_add(period).unwrap_or(now);

    tokio::time::interval_at(start, period)
}

#[cfg(all(feature = "smol", not(feature = "tokio")))]
pub(crate) fn new_interval(period: Duration) -> Interval {
    smol::Timer::interval(period.min(FAR_FUTURE))
}

#[cfg(feature = "tokio")]
pub(crate) fn spawn_task<F>(fut: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(fut);
}

#[cfg(all(feature = "smol", not(feature = "tokio")))]
pub(crate) fn spawn_task<F>(fut: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    smol::spawn(fut).detach();
}

#[cfg(feature = "tokio")]
pub(crate) async fn tick(interval: &mut Interval) {
    interval.tick().await;
}

#[cfg(all(feature = "smol", not(feature = "tokio")))]
pub(crate) async fn tick(interval: &mut Interval) {
    use futures::StreamExt;
    interval.next().await;
}

#[cfg(feature = "tokio")]
pub(crate) async fn sleep(duration: Duration) {
    tokio::time::sleep(duration).await;
}

#[cfg(all(feature = "smol", not(feature = "tokio")))]
pub(crate) async fn sleep(duration: Duration) {
    smol::Timer::after(duration).await;
}
