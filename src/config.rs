use std::{net::SocketAddr, path::PathBuf, time::Duration};

use thiserror::Error;

use crate::{
    interval::Calendar,
    pipeline::{MismatchPolicy, PipelineOptions},
    store::DEFAULT_QUEUE_SIZE,
    QuantityKind,
};

pub const ENV_UTC_OFFSET_MINUTES: &str = "WALKING_SPEED_UTC_OFFSET_MINUTES";
pub const ENV_TIMEOUT: &str = "WALKING_SPEED_TIMEOUT";
pub const ENV_MISMATCH_POLICY: &str = "WALKING_SPEED_MISMATCH_POLICY";
pub const ENV_QUEUE_SIZE: &str = "WALKING_SPEED_QUEUE_SIZE";
pub const ENV_OUTPUT: &str = "WALKING_SPEED_OUTPUT";
pub const ENV_BIND: &str = "WALKING_SPEED_BIND";
pub const ENV_LOG: &str = "WALKING_SPEED_LOG";

#[derive(Debug, Error)]
#[error("invalid {key}=`{value}`: {reason}")]
pub struct ConfigError {
    key: &'static str,
    value: String,
    reason: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub calendar: Calendar,
    pub request_timeout: Option<Duration>,
    pub mismatch: MismatchPolicy,
    pub queue_size: usize,
    /// Write the dashboard here and exit instead of serving it.
    pub output: Option<PathBuf>,
    pub bind: SocketAddr,
    pub log_filter: String,
}
impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(value) = lookup(ENV_UTC_OFFSET_MINUTES) {
            config.calendar = value
                .trim()
                .parse::<i32>()
                .ok()
                .and_then(Calendar::from_offset_minutes)
                .ok_or_else(|| invalid(ENV_UTC_OFFSET_MINUTES, &value, "not a UTC offset in minutes"))?;
        }
        if let Some(value) = lookup(ENV_TIMEOUT) {
            let timeout = humantime::parse_duration(value.trim())
                .map_err(|e| invalid(ENV_TIMEOUT, &value, e))?;
            config.request_timeout = Some(timeout);
        }
        if let Some(value) = lookup(ENV_MISMATCH_POLICY) {
            config.mismatch = value
                .parse()
                .map_err(|e: String| invalid(ENV_MISMATCH_POLICY, &value, e))?;
        }
        if let Some(value) = lookup(ENV_QUEUE_SIZE) {
            config.queue_size = value
                .trim()
                .parse()
                .map_err(|e| invalid(ENV_QUEUE_SIZE, &value, e))?;
        }
        if let Some(value) = lookup(ENV_OUTPUT) {
            config.output = Some(PathBuf::from(value));
        }
        if let Some(value) = lookup(ENV_BIND) {
            config.bind = value
                .trim()
                .parse()
                .map_err(|e| invalid(ENV_BIND, &value, e))?;
        }
        if let Some(value) = lookup(ENV_LOG) {
            config.log_filter = value;
        }
        Ok(config)
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            kind: QuantityKind::WalkingSpeed,
            calendar: self.calendar,
            mismatch: self.mismatch,
            request_timeout: self.request_timeout,
        }
    }
}
impl Default for Config {
    fn default() -> Self {
        Self {
            calendar: Calendar::utc(),
            request_timeout: None,
            mismatch: MismatchPolicy::Reject,
            queue_size: DEFAULT_QUEUE_SIZE,
            output: None,
            bind: SocketAddr::from(([127, 0, 0, 1], 3000)),
            log_filter: "info".into(),
        }
    }
}

fn invalid(key: &'static str, value: &str, reason: impl ToString) -> ConfigError {
    ConfigError {
        key,
        value: value.to_owned(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup<'a>(vars: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        let vars: HashMap<&str, &str> = vars.iter().copied().collect();
        move |key| vars.get(key).map(|v| v.to_string())
    }

    #[test]
    fn defaults_without_env() {
        let config = Config::from_lookup(|_| None).unwrap();
        assert_eq!(config.calendar, Calendar::utc());
        assert_eq!(config.mismatch, MismatchPolicy::Reject);
        assert_eq!(config.request_timeout, None);
        assert_eq!(config.queue_size, DEFAULT_QUEUE_SIZE);
        assert!(config.output.is_none());
    }

    #[test]
    fn reads_every_key() {
        let vars = [
            (ENV_UTC_OFFSET_MINUTES, "-300"),
            (ENV_TIMEOUT, "250ms"),
            (ENV_MISMATCH_POLICY, "fit"),
            (ENV_QUEUE_SIZE, "128"),
            (ENV_OUTPUT, "/tmp/speed.html"),
            (ENV_BIND, "0.0.0.0:8080"),
            (ENV_LOG, "walking_speed=debug"),
        ];
        let config = Config::from_lookup(lookup(&vars)).unwrap();
        assert_eq!(config.calendar, Calendar::from_offset_minutes(-300).unwrap());
        assert_eq!(config.request_timeout, Some(Duration::from_millis(250)));
        assert_eq!(config.mismatch, MismatchPolicy::Fit);
        assert_eq!(config.queue_size, 128);
        assert_eq!(config.output, Some(PathBuf::from("/tmp/speed.html")));
        assert_eq!(config.bind.port(), 8080);
        assert_eq!(config.log_filter, "walking_speed=debug");
        assert_eq!(config.pipeline_options().mismatch, MismatchPolicy::Fit);
    }

    #[test]
    fn rejects_bad_values() {
        for (key, value) in [
            (ENV_UTC_OFFSET_MINUTES, "east"),
            (ENV_UTC_OFFSET_MINUTES, "100000"),
            (ENV_TIMEOUT, "soon"),
            (ENV_MISMATCH_POLICY, "pad"),
            (ENV_QUEUE_SIZE, "-1"),
        ] {
            let vars = [(key, value)];
            let err = Config::from_lookup(lookup(&vars)).unwrap_err();
            assert!(err.to_string().contains(key), "{err}");
        }
    }
}
