use plotly::{
    layout::{Axis, AxisType, RangeMode},
    Bar, Layout, Plot,
};

use crate::{pipeline::AggregationResult, QuantityKind};

/// Consumer of aggregated series.
pub trait ChartRenderer {
    /// `result` always holds as many values as labels.
    fn render(&mut self, title: &str, result: &AggregationResult);
}

/// Renders each series as a plotly bar chart with a zero-based value axis.
///
/// Series are kept as plain data until [`Self::to_html`] so the renderer can
/// be held across awaits.
#[derive(Debug, Clone)]
pub struct PlotlyBarChart {
    series_name: String,
    charts: Vec<BarSeries>,
}
#[derive(Debug, Clone)]
struct BarSeries {
    title: String,
    labels: Vec<String>,
    values: Vec<f64>,
}
impl PlotlyBarChart {
    pub fn new(kind: QuantityKind) -> Self {
        Self {
            series_name: kind.unit().to_owned(),
            charts: vec![],
        }
    }

    pub fn len(&self) -> usize {
        self.charts.len()
    }
    pub fn is_empty(&self) -> bool {
        self.charts.is_empty()
    }
    pub fn titles(&self) -> impl Iterator<Item = &str> {
        self.charts.iter().map(|series| series.title.as_str())
    }

    /// Inline HTML of every rendered chart, in render order.
    ///
    /// Each chart gets a `<div>` id derived from `div_prefix`.
    pub fn to_html(&self, div_prefix: &str) -> String {
        let mut html = String::new();
        for (i, series) in self.charts.iter().enumerate() {
            let div_id = format!("{div_prefix}-{i}-{}", series.title.to_ascii_lowercase());
            let plot = self.plot(series);
            html.push_str(&plot.to_inline_html(Some(div_id.as_str())));
        }
        html
    }

    fn plot(&self, series: &BarSeries) -> Plot {
        let trace = Bar::new(series.labels.clone(), series.values.clone())
            .name(self.series_name.as_str());
        let mut plot = Plot::new();
        plot.add_trace(trace);
        let layout = Layout::default()
            .title(series.title.as_str())
            .x_axis(Axis::default().type_(AxisType::Category))
            .y_axis(
                Axis::default()
                    .title(self.series_name.as_str())
                    .range_mode(RangeMode::ToZero),
            );
        plot.set_layout(layout);
        plot
    }
}
impl Default for PlotlyBarChart {
    fn default() -> Self {
        Self::new(QuantityKind::WalkingSpeed)
    }
}
impl ChartRenderer for PlotlyBarChart {
    fn render(&mut self, title: &str, result: &AggregationResult) {
        self.charts.retain(|series| series.title != title);
        self.charts.push(BarSeries {
            title: title.to_owned(),
            labels: result.labels().to_vec(),
            values: result.values().to_vec(),
        });
    }
}
