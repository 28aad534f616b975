use core::ops::Range;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::{
    interval::{Calendar, Interval},
    store::SampleStore,
    QuantityKind, Time,
};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    #[error("read access to the sample source was denied")]
    Denied,
    #[error("sample source unavailable: {0}")]
    Unavailable(String),
}

/// Upstream store of samples able to compute per-bucket statistics.
#[async_trait]
pub trait SampleSource: Send + Sync {
    /// Discrete average of `kind` over each calendar bucket of `range`, in
    /// chronological order. `None` marks a bucket without samples.
    async fn request_bucketed_average(
        &self,
        kind: QuantityKind,
        range: Range<Time>,
        interval: Interval,
    ) -> Result<Vec<Option<f64>>, SourceError>;
}

#[async_trait]
impl<S> SampleSource for Arc<S>
where
    S: SampleSource + ?Sized,
{
    async fn request_bucketed_average(
        &self,
        kind: QuantityKind,
        range: Range<Time>,
        interval: Interval,
    ) -> Result<Vec<Option<f64>>, SourceError> {
        (**self).request_bucketed_average(kind, range, interval).await
    }
}

/// [`SampleSource`] over a shared in-process [`SampleStore`].
///
/// Clones share the store and the authorization flag.
#[derive(Debug, Clone)]
pub struct InMemSource {
    store: Arc<RwLock<SampleStore>>,
    calendar: Calendar,
    authorized: Arc<AtomicBool>,
}
impl InMemSource {
    pub fn new(store: SampleStore, calendar: Calendar) -> Self {
        Self {
            store: Arc::new(RwLock::new(store)),
            calendar,
            authorized: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn store(&self) -> &Arc<RwLock<SampleStore>> {
        &self.store
    }
    pub fn set_authorized(&self, authorized: bool) {
        self.authorized.store(authorized, Ordering::Relaxed);
    }
}
#[async_trait]
impl SampleSource for InMemSource {
    async fn request_bucketed_average(
        &self,
        kind: QuantityKind,
        range: Range<Time>,
        interval: Interval,
    ) -> Result<Vec<Option<f64>>, SourceError> {
        if !self.authorized.load(Ordering::Relaxed) {
            return Err(SourceError::Denied);
        }
        let buckets = self.calendar.buckets(range, interval);
        let store = self.store.read().await;
        let averages = buckets
            .into_iter()
            .map(|bucket| store.average(kind, bucket))
            .collect();
        Ok(averages)
    }
}
