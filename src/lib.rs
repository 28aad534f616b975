pub mod config;
pub mod dashboard;
pub mod interval;
pub mod pipeline;
pub mod preset;
pub mod source;
pub mod store;
pub mod view;

pub type Time = chrono::DateTime<chrono::Utc>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub time: Time,
    pub value: f64,
}

/// A quantity tracked by a [`source::SampleSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuantityKind {
    WalkingSpeed,
    WalkingDistance,
}
impl QuantityKind {
    pub fn unit(self) -> &'static str {
        match self {
            QuantityKind::WalkingSpeed => "m/s",
            QuantityKind::WalkingDistance => "m",
        }
    }
}
