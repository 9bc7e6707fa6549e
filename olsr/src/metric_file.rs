use std::path::Path;

use anyhow::Context;
use educe::Educe;
use serde::{Deserialize, Serialize};

use crate::concepts::metric::Metric;
use crate::config::Config;
use crate::feedback::ConfigError;
use crate::framework::RoutingSystem;

#[derive(Educe, Serialize, Deserialize)]
#[educe(Clone(bound()), Debug(bound()), PartialEq(bound()))]
#[serde(bound = "")]
pub struct MetricEntry<T: RoutingSystem + ?Sized> {
    /// sender of the HELLO
    pub src: T::Address,
    /// receiving interface address
    pub dst: T::Address,
    pub metric: Metric,
}

/// Static link metric table.
///
/// One entry per line, `src dst dir metric`, where a `dir` of `B` also installs the reverse direction.
/// `#` starts a comment.
#[derive(Educe, Serialize, Deserialize)]
#[educe(Clone(bound()), Debug(bound()), Default(bound()))]
#[serde(bound = "")]
pub struct MetricFile<T: RoutingSystem + ?Sized> {
    pub entries: Vec<MetricEntry<T>>,
}

impl<T: RoutingSystem + ?Sized> MetricFile<T> {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Later entries for the same pair replace earlier ones
    pub fn insert(&mut self, src: T::Address, dst: T::Address, metric: Metric) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.src == src && e.dst == dst) {
            entry.metric = metric;
        } else {
            self.entries.push(MetricEntry { src, dst, metric });
        }
    }

    /// Metric of the link from `src` to any of the receiving interface's addresses
    pub fn lookup(&self, src: &T::Address, local_addrs: &[T::Address]) -> Option<Metric> {
        self.entries
            .iter()
            .find(|e| e.src == *src && local_addrs.contains(&e.dst))
            .map(|e| e.metric)
    }

    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut file = Self::default();
        for (idx, raw) in text.lines().enumerate() {
            let line = idx + 1;
            let content = raw.split('#').next().unwrap_or_default().trim();
            if content.is_empty() {
                continue;
            }
            let fields: Vec<&str> = content.split_whitespace().collect();
            let &[src, dst, dir, metric] = fields.as_slice() else {
                return Err(ConfigError::MetricFileFormat { line });
            };
            let src = parse_addr::<T>(src, line)?;
            let dst = parse_addr::<T>(dst, line)?;
            let value = metric
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(|v| v.round())
                .filter(|v| *v >= Metric::MINIMUM.value() as f64 && *v <= Metric::MAXIMUM.value() as f64)
                .ok_or_else(|| ConfigError::MetricOutOfRange {
                    line,
                    metric: metric.to_string(),
                })?;
            let value = Metric::new(value as u32);
            if dir.eq_ignore_ascii_case("b") {
                file.insert(dst.clone(), src.clone(), value);
            }
            file.insert(src, dst, value);
        }
        Ok(file)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read metric file {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("invalid metric file {}", path.display()))
    }

    /// Loads the metric file named by the configuration, if any
    pub fn from_config(config: &Config) -> anyhow::Result<Option<Self>> {
        config.metric_file.as_deref().map(Self::load).transpose()
    }
}

fn parse_addr<T: RoutingSystem + ?Sized>(text: &str, line: usize) -> Result<T::Address, ConfigError> {
    text.parse().map_err(|_| ConfigError::MetricFileAddress {
        line,
        address: text.to_string(),
    })
}
