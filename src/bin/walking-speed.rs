use std::{sync::Arc, time::Duration};

use anyhow::Context;
use chrono::{TimeZone, Utc};
use hyped::*;
use poem::{
    get, handler,
    http::StatusCode,
    middleware::AddData,
    web::{Data, Html, Query},
    EndpointExt, Route, Server,
};
use serde::Deserialize;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use walking_speed::{
    config::Config,
    dashboard::Dashboard,
    pipeline::AggregationPipeline,
    source::InMemSource,
    store::SampleStore,
    view::PlotlyBarChart,
    QuantityKind, Sample, Time,
};

const SEED_DAYS: i64 = 400;
const INGEST_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let config = Config::from_env()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.log_filter))
        .with_target(true)
        .init();

    let source = InMemSource::new(SampleStore::new(config.queue_size), config.calendar);
    seed(&source, Utc::now()).await;
    let pipeline = AggregationPipeline::new(source.clone(), config.pipeline_options());
    let dashboard = Dashboard::new(pipeline);

    if let Some(path) = &config.output {
        let html = page(render_charts(&dashboard, Utc::now()).await);
        std::fs::write(path, html)
            .with_context(|| format!("failed to write dashboard to {}", path.display()))?;
        info!(path = %path.display(), "dashboard written");
        return Ok(());
    }

    enum DashboardMessage {
        Chart(ChartQuery, oneshot::Sender<String>),
    }
    let (tx, mut rx) = mpsc::channel(1);
    tokio::spawn(async move {
        let mut tick: u64 = 0;
        loop {
            tokio::select! {
                () = tokio::time::sleep(INGEST_INTERVAL) => {
                    tick += 1;
                    let mut store = source.store().write().await;
                    store.push(QuantityKind::WalkingSpeed)(synthetic(Utc::now(), tick));
                }
                Some(msg) = rx.recv() => {
                    match msg {
                        DashboardMessage::Chart(query, resp) => {
                            let now = query.now.and_then(|ms| Utc.timestamp_millis_opt(ms).single());
                            let html = render_charts(&dashboard, now.unwrap_or_else(Utc::now)).await;
                            if resp.send(html).is_err() {
                                warn!("chart request dropped before reply");
                            }
                        }
                    }
                }
            }
        }
    });

    struct AppState {
        pub dashboard: mpsc::Sender<DashboardMessage>,
    }
    let state = Arc::new(AppState { dashboard: tx });

    #[derive(Deserialize)]
    struct ChartQuery {
        /// Reference instant in Unix milliseconds; defaults to now.
        pub now: Option<i64>,
    }

    #[handler]
    async fn chart(query: Query<ChartQuery>, state: Data<&Arc<AppState>>) -> poem::Result<Html<String>> {
        let (tx, rx) = oneshot::channel();
        let msg = DashboardMessage::Chart(query.0, tx);
        state
            .dashboard
            .send(msg)
            .await
            .map_err(|_| poem::Error::from_status(StatusCode::SERVICE_UNAVAILABLE))?;
        let charts = rx
            .await
            .map_err(|_| poem::Error::from_status(StatusCode::SERVICE_UNAVAILABLE))?;
        Ok(Html(page(charts)))
    }

    let app = Route::new().at("/", get(chart)).with(AddData::new(state));

    let listener = poem::listener::TcpListener::bind(config.bind);
    info!(bind = %config.bind, "serving walking speed dashboard");
    Server::new(listener)
        .run(app)
        .await
        .context("dashboard server failed")?;
    Ok(())
}

async fn render_charts(dashboard: &Dashboard<InMemSource>, now: Time) -> String {
    let mut chart = PlotlyBarChart::new(QuantityKind::WalkingSpeed);
    dashboard.render_into(now, &mut chart).await;
    chart.to_html("walking-speed")
}

fn page(charts: String) -> String {
    let charts = danger(charts);
    let plotly = "https://cdn.plot.ly/plotly-2.12.1.min.js";
    let plotly = script(()).src(plotly);
    let root_div = div((plotly, charts));
    let body = hyped::body(root_div);
    let root = (doctype(), html(body));
    render(root)
}

/// Fills the store with a year of walks, skipping every fifth day.
async fn seed(source: &InMemSource, now: Time) {
    let mut store = source.store().write().await;
    let mut push = store.push(QuantityKind::WalkingSpeed);
    let mut n: u64 = 0;
    for day in (0..SEED_DAYS).rev() {
        if day % 5 == 3 {
            continue;
        }
        for hour in [8, 13, 19] {
            n += 1;
            let time = now - chrono::Duration::days(day) - chrono::Duration::hours(hour);
            push(synthetic(time, n));
        }
    }
    info!(samples = n, "seeded sample store");
}

fn synthetic(time: Time, n: u64) -> Sample {
    let phase = (n % 17) as f64 / 17.0 * core::f64::consts::TAU;
    Sample {
        time,
        value: 1.3 + 0.2 * phase.sin(),
    }
}
