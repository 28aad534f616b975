use core::{future::Future, ops::Range, str::FromStr, time::Duration};

use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    interval::{Calendar, Interval},
    preset::Preset,
    source::{SampleSource, SourceError},
    QuantityKind, Time,
};

/// Value reported for a bucket that holds no samples.
pub const EMPTY_BUCKET_VALUE: f64 = 0.0;

/// What to do when the source returns a different number of buckets than
/// there are labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MismatchPolicy {
    /// Fail with [`AggregateError::LabelCountMismatch`].
    #[default]
    Reject,
    /// Drop surplus trailing buckets or pad missing ones with [`EMPTY_BUCKET_VALUE`].
    Fit,
}
impl FromStr for MismatchPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(MismatchPolicy::Reject),
            "fit" => Ok(MismatchPolicy::Fit),
            other => Err(format!("unknown mismatch policy `{other}`")),
        }
    }
}

#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("range start {start} is not before end {end}")]
    InvalidRange { start: Time, end: Time },
    #[error("{labels} labels for {buckets} buckets")]
    LabelCountMismatch { labels: usize, buckets: usize },
    #[error(transparent)]
    DataSource(#[from] SourceError),
    #[error("sample source did not answer within {0:?}")]
    Timeout(Duration),
    #[error("aggregation cancelled")]
    Cancelled,
}

/// Per-bucket averages paired with their labels, ready for a chart.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationResult {
    values: Vec<f64>,
    labels: Vec<String>,
}
impl AggregationResult {
    pub fn values(&self) -> &[f64] {
        &self.values
    }
    pub fn labels(&self) -> &[String] {
        &self.labels
    }
    pub fn into_parts(self) -> (Vec<f64>, Vec<String>) {
        (self.values, self.labels)
    }
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub kind: QuantityKind,
    pub calendar: Calendar,
    pub mismatch: MismatchPolicy,
    pub request_timeout: Option<Duration>,
}
impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            kind: QuantityKind::WalkingSpeed,
            calendar: Calendar::utc(),
            mismatch: MismatchPolicy::default(),
            request_timeout: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AggregationPipeline<S> {
    source: S,
    options: PipelineOptions,
}
impl<S> AggregationPipeline<S>
where
    S: SampleSource,
{
    pub fn new(source: S, options: PipelineOptions) -> Self {
        Self { source, options }
    }

    pub fn source(&self) -> &S {
        &self.source
    }
    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    pub async fn aggregate<L>(
        &self,
        range: Range<Time>,
        interval: Interval,
        labels: impl IntoIterator<Item = L>,
    ) -> Result<AggregationResult, AggregateError>
    where
        L: Into<String>,
    {
        self.aggregate_until(range, interval, labels, core::future::pending())
            .await
    }

    /// Like [`Self::aggregate`] but gives up with [`AggregateError::Cancelled`]
    /// once `cancel` completes.
    pub async fn aggregate_until<L>(
        &self,
        range: Range<Time>,
        interval: Interval,
        labels: impl IntoIterator<Item = L>,
        cancel: impl Future<Output = ()>,
    ) -> Result<AggregationResult, AggregateError>
    where
        L: Into<String>,
    {
        if range.start >= range.end {
            return Err(AggregateError::InvalidRange {
                start: range.start,
                end: range.end,
            });
        }
        let labels: Vec<String> = labels.into_iter().map(Into::into).collect();
        let buckets = self.options.calendar.bucket_count(range.clone(), interval);
        if labels.len() != buckets {
            return Err(AggregateError::LabelCountMismatch {
                labels: labels.len(),
                buckets,
            });
        }

        debug!(?interval, buckets, start = %range.start, end = %range.end, "requesting bucketed average");
        let request = self.request(range, interval);
        let raw = tokio::select! {
            biased;
            () = cancel => {
                debug!(?interval, "aggregation cancelled");
                return Err(AggregateError::Cancelled);
            }
            raw = request => raw,
        };
        let raw = match raw {
            Ok(raw) => raw,
            Err(e) => {
                warn!(?interval, error = %e, "bucketed average request failed");
                return Err(e);
            }
        };

        let values = raw
            .into_iter()
            .map(|avg| avg.unwrap_or(EMPTY_BUCKET_VALUE))
            .collect();
        let values = self.reconcile(values, labels.len())?;
        debug!(?interval, buckets = values.len(), "bucketed average received");
        Ok(AggregationResult { values, labels })
    }

    pub async fn aggregate_preset(
        &self,
        preset: Preset,
        now: Time,
    ) -> Result<AggregationResult, AggregateError> {
        let range = preset.range(&self.options.calendar, now).ok_or(
            AggregateError::InvalidRange {
                start: now,
                end: now,
            },
        )?;
        self.aggregate(range, preset.interval(), preset.labels().iter().copied())
            .await
    }

    async fn request(
        &self,
        range: Range<Time>,
        interval: Interval,
    ) -> Result<Vec<Option<f64>>, AggregateError> {
        let request = self
            .source
            .request_bucketed_average(self.options.kind, range, interval);
        let raw = match self.options.request_timeout {
            Some(limit) => tokio::time::timeout(limit, request)
                .await
                .map_err(|_| AggregateError::Timeout(limit))?,
            None => request.await,
        };
        Ok(raw?)
    }

    fn reconcile(&self, mut values: Vec<f64>, labels: usize) -> Result<Vec<f64>, AggregateError> {
        if values.len() == labels {
            return Ok(values);
        }
        match self.options.mismatch {
            MismatchPolicy::Reject => {
                warn!(labels, buckets = values.len(), "source bucket count disagrees with labels");
                Err(AggregateError::LabelCountMismatch {
                    labels,
                    buckets: values.len(),
                })
            }
            MismatchPolicy::Fit => {
                debug!(labels, buckets = values.len(), "fitting source buckets to labels");
                values.resize(labels, EMPTY_BUCKET_VALUE);
                Ok(values)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};

    use super::*;

    #[derive(Debug)]
    struct ScriptedSource {
        reply: Result<Vec<Option<f64>>, SourceError>,
        delay: Option<Duration>,
        calls: AtomicUsize,
    }
    impl ScriptedSource {
        fn new(reply: Result<Vec<Option<f64>>, SourceError>) -> Self {
            Self {
                reply,
                delay: None,
                calls: AtomicUsize::new(0),
            }
        }
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }
    #[async_trait]
    impl SampleSource for ScriptedSource {
        async fn request_bucketed_average(
            &self,
            _kind: QuantityKind,
            _range: Range<Time>,
            _interval: Interval,
        ) -> Result<Vec<Option<f64>>, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.reply.clone()
        }
    }

    fn week() -> Range<Time> {
        Utc.with_ymd_and_hms(2023, 3, 11, 0, 0, 0).unwrap()
            ..Utc.with_ymd_and_hms(2023, 3, 18, 0, 0, 0).unwrap()
    }
    const DAYS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

    fn pipeline(
        source: ScriptedSource,
        mismatch: MismatchPolicy,
    ) -> AggregationPipeline<Arc<ScriptedSource>> {
        let options = PipelineOptions {
            mismatch,
            ..Default::default()
        };
        AggregationPipeline::new(Arc::new(source), options)
    }

    #[tokio::test]
    async fn empty_bucket_is_zero() {
        let reply = vec![Some(1.0), None, Some(2.0), None, None, None, Some(0.5)];
        let pipeline = pipeline(ScriptedSource::new(Ok(reply)), MismatchPolicy::Reject);
        let result = pipeline.aggregate(week(), Interval::Day, DAYS).await.unwrap();
        assert_eq!(result.values(), [1.0, 0.0, 2.0, 0.0, 0.0, 0.0, 0.5]);
        assert_eq!(result.labels(), DAYS);
        assert!(result.values().iter().all(|v| !v.is_nan()));
    }

    #[tokio::test]
    async fn label_mismatch_fails_before_request() {
        let pipeline = pipeline(ScriptedSource::new(Ok(vec![])), MismatchPolicy::Fit);
        let err = pipeline
            .aggregate(week(), Interval::Day, ["Mon", "Tue"])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AggregateError::LabelCountMismatch {
                labels: 2,
                buckets: 7
            }
        ));
        assert_eq!(pipeline.source().calls(), 0);
    }

    #[tokio::test]
    async fn inverted_range_is_rejected() {
        let pipeline = pipeline(ScriptedSource::new(Ok(vec![])), MismatchPolicy::Reject);
        let range = week();
        let err = pipeline
            .aggregate(range.end..range.start, Interval::Day, DAYS)
            .await
            .unwrap_err();
        assert!(matches!(err, AggregateError::InvalidRange { .. }));
        assert_eq!(pipeline.source().calls(), 0);
    }

    #[tokio::test]
    async fn source_failure_is_surfaced() {
        let reply = Err(SourceError::Unavailable("store locked".into()));
        let pipeline = pipeline(ScriptedSource::new(reply), MismatchPolicy::Reject);
        let err = pipeline.aggregate(week(), Interval::Day, DAYS).await.unwrap_err();
        match err {
            AggregateError::DataSource(SourceError::Unavailable(cause)) => {
                assert_eq!(cause, "store locked")
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(pipeline.source().calls(), 1);
    }

    #[tokio::test]
    async fn short_reply_is_rejected() {
        let reply = vec![Some(1.0); 6];
        let pipeline = pipeline(ScriptedSource::new(Ok(reply)), MismatchPolicy::Reject);
        let err = pipeline.aggregate(week(), Interval::Day, DAYS).await.unwrap_err();
        assert!(matches!(
            err,
            AggregateError::LabelCountMismatch {
                labels: 7,
                buckets: 6
            }
        ));
    }

    #[tokio::test]
    async fn fit_truncates_long_reply() {
        let reply = vec![Some(1.0); 9];
        let pipeline = pipeline(ScriptedSource::new(Ok(reply)), MismatchPolicy::Fit);
        let result = pipeline.aggregate(week(), Interval::Day, DAYS).await.unwrap();
        assert_eq!(result.values(), [1.0; 7]);
    }

    #[tokio::test]
    async fn repeated_calls_agree() {
        let reply = vec![Some(1.25), None, Some(1.5), None, None, None, None];
        let pipeline = pipeline(ScriptedSource::new(Ok(reply)), MismatchPolicy::Reject);
        let a = pipeline.aggregate(week(), Interval::Day, DAYS).await.unwrap();
        let b = pipeline.aggregate(week(), Interval::Day, DAYS).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn cancel_wins_over_slow_source() {
        let mut source = ScriptedSource::new(Ok(vec![None; 7]));
        source.delay = Some(Duration::from_secs(5));
        let pipeline = pipeline(source, MismatchPolicy::Reject);
        let cancel = tokio::time::sleep(Duration::from_millis(10));
        let err = pipeline
            .aggregate_until(week(), Interval::Day, DAYS, cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, AggregateError::Cancelled));
    }

    #[tokio::test]
    async fn slow_source_times_out() {
        let mut source = ScriptedSource::new(Ok(vec![None; 7]));
        source.delay = Some(Duration::from_secs(5));
        let options = PipelineOptions {
            request_timeout: Some(Duration::from_millis(10)),
            ..Default::default()
        };
        let pipeline = AggregationPipeline::new(source, options);
        let err = pipeline.aggregate(week(), Interval::Day, DAYS).await.unwrap_err();
        assert!(matches!(err, AggregateError::Timeout(_)));
    }

    #[test]
    fn mismatch_policy_parses() {
        assert_eq!("reject".parse::<MismatchPolicy>(), Ok(MismatchPolicy::Reject));
        assert_eq!(" Fit ".parse::<MismatchPolicy>(), Ok(MismatchPolicy::Fit));
        assert!("pad".parse::<MismatchPolicy>().is_err());
    }
}
