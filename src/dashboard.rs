use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{
    pipeline::{AggregateError, AggregationPipeline, AggregationResult},
    preset::Preset,
    source::SampleSource,
    view::ChartRenderer,
    Time,
};

pub type PresetOutcome = (Preset, Result<AggregationResult, AggregateError>);

/// Runs every [`Preset`] against one shared source.
#[derive(Debug)]
pub struct Dashboard<S> {
    pipeline: Arc<AggregationPipeline<S>>,
}
impl<S> Clone for Dashboard<S> {
    fn clone(&self) -> Self {
        Self {
            pipeline: Arc::clone(&self.pipeline),
        }
    }
}
impl<S> Dashboard<S>
where
    S: SampleSource,
{
    pub fn new(pipeline: AggregationPipeline<S>) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
        }
    }

    pub fn pipeline(&self) -> &AggregationPipeline<S> {
        &self.pipeline
    }

    /// Aggregates all presets concurrently and sends each outcome to `tx` as
    /// soon as it is ready.
    ///
    /// Returns the number of outcomes delivered; stops delivering once `tx`
    /// is closed.
    pub async fn refresh(&self, now: Time, tx: &mpsc::Sender<PresetOutcome>) -> usize {
        let tasks = Preset::ALL.map(|preset| async move {
            let outcome = self.pipeline.aggregate_preset(preset, now).await;
            if let Err(e) = &outcome {
                warn!(?preset, error = %e, "preset aggregation failed");
            }
            match tx.send((preset, outcome)).await {
                Ok(()) => true,
                Err(_) => {
                    debug!(?preset, "outcome receiver closed");
                    false
                }
            }
        });
        let delivered = join_all(tasks).await.into_iter().filter(|sent| *sent).count();
        info!(%now, delivered, "dashboard refreshed");
        delivered
    }

    /// Refreshes and feeds every successful outcome to `renderer` in preset
    /// order.
    pub async fn render_into(&self, now: Time, renderer: &mut impl ChartRenderer) -> usize {
        let (tx, mut rx) = mpsc::channel(Preset::ALL.len());
        self.refresh(now, &tx).await;
        drop(tx);
        let mut outcomes = vec![];
        while let Some(outcome) = rx.recv().await {
            outcomes.push(outcome);
        }
        outcomes.sort_by_key(|(preset, _)| Preset::ALL.iter().position(|p| p == preset));
        let mut rendered = 0;
        for (preset, outcome) in outcomes {
            if let Ok(result) = outcome {
                renderer.render(preset.title(), &result);
                rendered += 1;
            }
        }
        rendered
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::*;
    use crate::{
        interval::Calendar,
        pipeline::PipelineOptions,
        source::InMemSource,
        store::SampleStore,
        view::PlotlyBarChart,
        QuantityKind, Sample,
    };

    fn now() -> Time {
        Utc.with_ymd_and_hms(2023, 3, 17, 12, 0, 0).unwrap()
    }

    async fn dashboard() -> (Dashboard<InMemSource>, InMemSource) {
        let source = InMemSource::new(SampleStore::default(), Calendar::utc());
        {
            let mut store = source.store().write().await;
            let mut push = store.push(QuantityKind::WalkingSpeed);
            for day in 0..400 {
                push(Sample {
                    time: now() - Duration::days(day),
                    value: 1.25,
                });
            }
        }
        let pipeline = AggregationPipeline::new(source.clone(), PipelineOptions::default());
        (Dashboard::new(pipeline), source)
    }

    #[tokio::test]
    async fn refresh_delivers_every_preset() {
        let (dashboard, _) = dashboard().await;
        let (tx, mut rx) = mpsc::channel(3);
        assert_eq!(dashboard.refresh(now(), &tx).await, 3);
        drop(tx);
        let mut seen = vec![];
        while let Some((preset, outcome)) = rx.recv().await {
            let result = outcome.unwrap();
            assert_eq!(result.values().len(), preset.bucket_count());
            assert!(result.values().iter().all(|v| *v == 1.25));
            seen.push(preset);
        }
        seen.sort_by_key(|p| p.bucket_count());
        assert_eq!(seen, [Preset::Weekly, Preset::Daily, Preset::Monthly]);
    }

    #[tokio::test]
    async fn denied_source_fails_every_preset() {
        let (dashboard, source) = dashboard().await;
        source.set_authorized(false);
        let (tx, mut rx) = mpsc::channel(3);
        dashboard.refresh(now(), &tx).await;
        drop(tx);
        while let Some((_, outcome)) = rx.recv().await {
            assert!(matches!(outcome, Err(AggregateError::DataSource(_))));
        }
    }

    #[tokio::test]
    async fn closed_receiver_stops_delivery() {
        let (dashboard, _) = dashboard().await;
        let (tx, rx) = mpsc::channel(3);
        drop(rx);
        assert_eq!(dashboard.refresh(now(), &tx).await, 0);
    }

    #[tokio::test]
    async fn renders_in_preset_order() {
        let (dashboard, _) = dashboard().await;
        let mut chart = PlotlyBarChart::default();
        assert_eq!(dashboard.render_into(now(), &mut chart).await, 3);
        assert_eq!(
            chart.titles().collect::<Vec<_>>(),
            ["Daily", "Weekly", "Monthly"]
        );
    }
}
