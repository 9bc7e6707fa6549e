use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSecondsWithFrac};

use crate::concepts::metric::Metric;
use crate::feedback::ConfigError;

pub const WILLINGNESS_NEVER: u8 = 0;
pub const WILLINGNESS_DEFAULT: u8 = 3;
pub const WILLINGNESS_ALWAYS: u8 = 7;

pub const TC_HOP_LIMIT_DEFAULT: u8 = 10;
pub const ETX_MEMORY_LENGTH_DEFAULT: usize = 32;
/// A packet sequence number jump beyond this is taken as a restart of the peer
pub const ETX_SEQNUM_RESTART_DETECTION: u16 = 256;
/// Multiple of the peer's HELLO interval after which its first missing HELLO is counted
pub const ETX_HELLO_TIMEOUT_FACTOR: f64 = 1.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkMetricType {
    /// every link costs the same, routes minimize hop count
    None,
    Etx,
    /// metrics from a static metric file
    Static,
    /// metrics supplied by `RoutingSystem::test_link_metric`
    Test,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MprPolicy {
    ByDegree,
    ByMetricPerDegree,
    /// metric per degree while every candidate has a metric, degree otherwise
    ByDegreeOrMetric,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelayPolicy {
    FloodingMprSelectors,
    RoutingMprSelectors,
    Either,
}

/// Which symmetric neighbours go into TCs, criteria are OR-ed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvertisePolicy {
    pub mpr_selectors: bool,
    /// advertise neighbours whose incoming metric is at most this
    pub in_metric: Option<Metric>,
    /// advertise neighbours whose outgoing metric is at most this
    pub out_metric: Option<Metric>,
}

impl Default for AdvertisePolicy {
    fn default() -> Self {
        Self {
            mpr_selectors: true,
            in_metric: None,
            out_metric: None,
        }
    }
}

/// Link quality hysteresis parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Hysteresis {
    pub scale: f64,
    pub accept: f64,
    pub reject: f64,
    pub initial_quality: f64,
    /// multiple of the HELLO interval after which a missing HELLO lowers quality
    pub loss_detect_scale: f64,
}

impl Default for Hysteresis {
    fn default() -> Self {
        Self {
            scale: 0.5,
            accept: 0.8,
            reject: 0.3,
            initial_quality: 0.5,
            loss_detect_scale: 1.5,
        }
    }
}

impl Hysteresis {
    pub fn initial_pending(&self) -> bool {
        self.initial_quality < self.reject
    }
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldTimes {
    /// lost neighbour set
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub n: Duration,
    /// link set, after the last HELLO
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub l: Duration,
    /// validity time put into HELLOs
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub h: Duration,
    /// removed interface addresses
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub i: Duration,
    /// validity time put into TCs
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub t: Duration,
    /// former originator addresses
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub o: Duration,
    /// empty TCs keep being sent this long after the last non-empty one
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub a: Duration,
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub p: Duration,
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub rx: Duration,
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub f: Duration,
}

impl HoldTimes {
    pub fn derived(hello_interval: Duration, tc_interval: Duration) -> Self {
        let dedup = Duration::from_secs(30);
        Self {
            n: hello_interval * 3,
            l: hello_interval * 3,
            h: hello_interval * 3,
            i: hello_interval * 3,
            t: tc_interval * 3,
            o: dedup,
            a: tc_interval * 3,
            p: dedup,
            rx: dedup,
            f: dedup,
        }
    }
}

/// Router parameters, see RFC 6130 and RFC 7181 Appendix A
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub willingness: u8,
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub hello_interval: Duration,
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub hello_min_interval: Duration,
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub hello_jitter: Duration,
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub tc_interval: Duration,
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub tc_min_interval: Duration,
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub tc_jitter: Duration,
    /// upper bound of the random delay before a relayed TC is sent
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub forward_jitter: Duration,
    pub tc_hop_limit: u8,
    pub hold: HoldTimes,
    pub link_metric: LinkMetricType,
    pub etx_memory_length: usize,
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub etx_metric_interval: Duration,
    pub flooding_mpr: MprPolicy,
    pub routing_mpr: MprPolicy,
    pub advertise: AdvertisePolicy,
    pub relay: RelayPolicy,
    pub hysteresis: Option<Hysteresis>,
    /// static link metric table, used with `LinkMetricType::Static`
    pub metric_file: Option<PathBuf>,
    /// statistics are logged on this period when set
    #[serde_as(as = "Option<DurationSecondsWithFrac<f64>>")]
    pub stat_interval: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self::with_intervals(Duration::from_secs(2), Duration::from_secs(5))
    }
}

impl Config {
    /// Default configuration with every timing parameter derived from the two message intervals
    pub fn with_intervals(hello_interval: Duration, tc_interval: Duration) -> Self {
        Self {
            willingness: WILLINGNESS_DEFAULT,
            hello_interval,
            hello_min_interval: hello_interval / 4,
            hello_jitter: hello_interval / 4,
            tc_interval,
            tc_min_interval: tc_interval / 4,
            tc_jitter: tc_interval / 4,
            forward_jitter: tc_interval / 4,
            tc_hop_limit: TC_HOP_LIMIT_DEFAULT,
            hold: HoldTimes::derived(hello_interval, tc_interval),
            link_metric: LinkMetricType::Etx,
            etx_memory_length: ETX_MEMORY_LENGTH_DEFAULT,
            etx_metric_interval: Duration::from_secs(1),
            flooding_mpr: MprPolicy::ByDegree,
            routing_mpr: MprPolicy::ByDegree,
            advertise: AdvertisePolicy::default(),
            relay: RelayPolicy::FloodingMprSelectors,
            hysteresis: None,
            metric_file: None,
            stat_interval: None,
        }
    }

    /// Parses a JSON configuration.
    ///
    /// Missing fields take their defaults, derived from the HELLO and TC intervals the JSON does give, as
    /// [`Config::with_intervals`] would. A partial `hold` object only overrides the hold times it names.
    pub fn from_json(json: &str) -> anyhow::Result<Config> {
        let given: serde_json::Value = serde_json::from_str(json).context("malformed router configuration")?;
        let Some(given) = given.as_object() else {
            anyhow::bail!("router configuration must be a JSON object");
        };
        let interval = |key: &str, default: Duration| -> anyhow::Result<Duration> {
            let Some(value) = given.get(key) else {
                return Ok(default);
            };
            let secs = value
                .as_f64()
                .with_context(|| format!("{key} must be a number of seconds"))?;
            Duration::try_from_secs_f64(secs).with_context(|| format!("{key} is not a valid duration"))
        };
        let defaults = Config::default();
        let derived = Config::with_intervals(
            interval("hello_interval", defaults.hello_interval)?,
            interval("tc_interval", defaults.tc_interval)?,
        );

        let mut merged = serde_json::to_value(derived)?;
        if let Some(merged) = merged.as_object_mut() {
            for (key, value) in given {
                match (merged.get_mut(key), value) {
                    (Some(serde_json::Value::Object(inner)), serde_json::Value::Object(overrides)) => {
                        inner.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
                    }
                    _ => {
                        merged.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        let config: Config = serde_json::from_value(merged).context("malformed router configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn uses_link_metric(&self) -> bool {
        self.link_metric != LinkMetricType::None
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.willingness > WILLINGNESS_ALWAYS {
            return Err(ConfigError::Willingness(self.willingness));
        }
        check_interval("HELLO", self.hello_interval, self.hello_jitter, self.hello_min_interval)?;
        check_interval("TC", self.tc_interval, self.tc_jitter, self.tc_min_interval)?;
        if self.etx_metric_interval.is_zero() {
            return Err(ConfigError::ZeroInterval {
                message: "ETX metric",
            });
        }
        if self.etx_memory_length == 0 {
            return Err(ConfigError::EtxMemoryLength);
        }
        if let Some(hyst) = &self.hysteresis {
            for (name, value) in [
                ("scale", hyst.scale),
                ("accept", hyst.accept),
                ("reject", hyst.reject),
                ("initial_quality", hyst.initial_quality),
            ] {
                if !(0.0..1.0).contains(&value) {
                    return Err(ConfigError::Hysteresis { name, value });
                }
            }
            if hyst.accept < hyst.reject {
                return Err(ConfigError::HysteresisOrder {
                    accept: hyst.accept,
                    reject: hyst.reject,
                });
            }
        }
        let advertise = &self.advertise;
        if !advertise.mpr_selectors && advertise.in_metric.is_none() && advertise.out_metric.is_none() {
            return Err(ConfigError::EmptyAdvertisePolicy);
        }
        Ok(())
    }
}

fn check_interval(
    message: &'static str,
    interval: Duration,
    jitter: Duration,
    min_interval: Duration,
) -> Result<(), ConfigError> {
    if interval.is_zero() {
        return Err(ConfigError::ZeroInterval { message });
    }
    if interval.saturating_sub(jitter) < min_interval || jitter > interval {
        return Err(ConfigError::IntervalTooShort {
            message,
            interval,
            jitter,
            min_interval,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.hold.h, Duration::from_secs(6));
        assert_eq!(config.hold.t, Duration::from_secs(15));
        assert_eq!(config.hello_jitter, Duration::from_millis(500));
    }

    #[test]
    fn rejects_out_of_range_willingness() {
        let config = Config {
            willingness: 8,
            ..Config::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::Willingness(8)));
    }

    #[test]
    fn rejects_jitter_eating_min_interval() {
        let config = Config {
            hello_jitter: Duration::from_millis(1800),
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::IntervalTooShort { message: "HELLO", .. })
        ));
    }

    #[test]
    fn rejects_inverted_hysteresis() {
        let config = Config {
            hysteresis: Some(Hysteresis {
                accept: 0.2,
                reject: 0.4,
                ..Hysteresis::default()
            }),
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::HysteresisOrder { .. })));
    }

    #[test]
    fn parses_json_with_defaults() {
        let config = Config::from_json(
            r#"{ "willingness": 7, "hello_interval": 1.0, "hello_min_interval": 0.25,
                 "hello_jitter": 0.25, "flooding_mpr": "ByMetricPerDegree" }"#,
        )
        .unwrap();
        assert_eq!(config.willingness, WILLINGNESS_ALWAYS);
        assert_eq!(config.hello_interval, Duration::from_secs(1));
        assert_eq!(config.flooding_mpr, MprPolicy::ByMetricPerDegree);
        assert_eq!(config.tc_interval, Duration::from_secs(5));

        assert!(Config::from_json(r#"{ "willingness": 9 }"#).is_err());
    }

    #[test]
    fn json_intervals_rederive_dependent_timings() {
        let config = Config::from_json(r#"{ "hello_interval": 1.0, "tc_interval": 10.0 }"#).unwrap();
        assert_eq!(config, Config::with_intervals(Duration::from_secs(1), Duration::from_secs(10)));
        assert_eq!(config.hold.l, Duration::from_secs(3));
        assert_eq!(config.hold.t, Duration::from_secs(30));
        assert_eq!(config.hello_jitter, Duration::from_millis(250));

        // explicit values still win, including single hold times
        let config = Config::from_json(
            r#"{ "hello_interval": 1.0, "hello_jitter": 0.1, "hold": { "o": 60.0 } }"#,
        )
        .unwrap();
        assert_eq!(config.hello_jitter, Duration::from_millis(100));
        assert_eq!(config.hold.o, Duration::from_secs(60));
        assert_eq!(config.hold.n, Duration::from_secs(3));
        assert_eq!(config.hold.t, Duration::from_secs(15));

        assert!(Config::from_json("[]").is_err());
        assert!(Config::from_json(r#"{ "tc_interval": "soon" }"#).is_err());
    }
}
