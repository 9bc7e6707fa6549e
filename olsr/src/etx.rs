use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::concepts::metric::Metric;
use crate::config::ETX_SEQNUM_RESTART_DETECTION;
use crate::util::seqno_diff;

/// Metric of a perfect link, ETX 1 in both directions, a tenth of `Metric::DEFAULT`
pub const ETX_PERFECT_METRIC: f64 = 409.6;

/// Fixed-length ring of per-interval counters, the newest slot on top
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SlotWindow {
    slots: Vec<u32>,
    top: usize,
}

impl SlotWindow {
    pub fn new(len: usize) -> Self {
        Self {
            slots: vec![0; len.max(1)],
            top: 0,
        }
    }

    /// Starts a new interval, displacing the oldest one
    pub fn push(&mut self) {
        self.top = (self.top + 1) % self.slots.len();
        self.slots[self.top] = 0;
    }

    pub fn set_top(&mut self, value: u32) {
        self.slots[self.top] = value;
    }

    pub fn add_top(&mut self, value: u32) {
        self.slots[self.top] = self.slots[self.top].saturating_add(value);
    }

    pub fn sum(&self) -> u64 {
        self.slots.iter().map(|v| *v as u64).sum()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Expected transmission count estimator of a single link
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EtxEstimator {
    received: SlotWindow,
    total: SlotWindow,
    last_seqnum: Option<u16>,
    /// reverse ETX, undefined while too few packets arrived
    pub r_etx: Option<f64>,
    /// forward ETX as advertised by the peer
    pub d_etx: Option<f64>,
    pub lost_hellos: u32,
}

impl EtxEstimator {
    pub fn new(memory_length: usize) -> Self {
        Self {
            received: SlotWindow::new(memory_length),
            total: SlotWindow::new(memory_length),
            last_seqnum: None,
            r_etx: None,
            d_etx: None,
            lost_hellos: 0,
        }
    }

    /// Accounts packets of the current interval
    pub fn record(&mut self, received: u32, total: u32) {
        self.received.add_top(received);
        self.total.add_top(total);
    }

    /// Counts a packet from the peer, sequence number gaps count as losses
    pub fn on_packet(&mut self, seqnum: u16) {
        match self.last_seqnum {
            None => {
                self.received.set_top(1);
                self.total.set_top(1);
            }
            Some(last) => {
                let diff = match seqno_diff(seqnum, last) {
                    0 => return,
                    diff if diff > ETX_SEQNUM_RESTART_DETECTION => 1,
                    diff => diff,
                };
                self.record(1, diff as u32);
            }
        }
        self.last_seqnum = Some(seqnum);
    }

    pub fn on_hello(&mut self, d_etx: Option<f64>) {
        self.d_etx = d_etx;
        self.lost_hellos = 0;
    }

    pub fn on_hello_timeout(&mut self) {
        self.lost_hellos += 1;
    }

    /// Runs once per metric interval, returns the new incoming link metric
    pub fn compute(&mut self, hello_interval: Duration) -> Metric {
        let memory = self.received.len() as f64;
        let penalty = hello_interval.as_secs_f64() * self.lost_hellos as f64 / memory;
        let received = (self.received.sum() as f64 - penalty).max(0.0);
        let total = self.total.sum() as f64;

        let metric = if received < 1.0 {
            self.r_etx = None;
            Metric::MAXIMUM
        } else {
            let r_etx = total / received;
            self.r_etx = Some(r_etx);
            match self.d_etx {
                Some(d_etx) => Metric::clamped(ETX_PERFECT_METRIC * r_etx * d_etx),
                None => Metric::DEFAULT,
            }
        };

        self.received.push();
        self.total.push();
        metric
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERVAL: Duration = Duration::from_secs(2);

    #[test]
    fn converges_on_lossless_link() {
        let mut etx = EtxEstimator::new(32);
        for _ in 0..32 {
            etx.record(1, 1);
            etx.compute(INTERVAL);
        }
        assert_eq!(etx.r_etx, Some(1.0));
    }

    #[test]
    fn half_loss_doubles_reverse_etx() {
        let mut etx = EtxEstimator::new(32);
        for _ in 0..32 {
            etx.record(1, 1);
            etx.compute(INTERVAL);
        }
        let mut last = 1.0;
        for _ in 0..16 {
            etx.record(0, 1);
            etx.compute(INTERVAL);
            let r_etx = etx.r_etx.unwrap();
            assert!(r_etx > last);
            last = r_etx;
        }
        assert_eq!(etx.r_etx, Some(2.0));
    }

    #[test]
    fn silent_link_is_unusable() {
        let mut etx = EtxEstimator::new(32);
        assert_eq!(etx.compute(INTERVAL), Metric::MAXIMUM);
        assert_eq!(etx.r_etx, None);
    }

    #[test]
    fn metric_combines_both_directions() {
        let mut etx = EtxEstimator::new(8);
        etx.on_packet(10);
        assert_eq!(etx.compute(INTERVAL), Metric::DEFAULT);

        etx.on_hello(Some(2.0));
        etx.on_packet(11);
        // 2 received out of 2 sent over the window
        assert_eq!(etx.compute(INTERVAL), Metric::clamped(ETX_PERFECT_METRIC * 2.0));
        assert_eq!(etx.r_etx, Some(1.0));
    }

    #[test]
    fn sequence_gaps_count_as_losses() {
        let mut etx = EtxEstimator::new(8);
        etx.on_packet(65534);
        etx.on_packet(1); // wraps, 3 sent
        etx.on_packet(1); // duplicate
        etx.compute(INTERVAL);
        assert_eq!(etx.r_etx, Some(4.0 / 2.0));

        etx.on_packet(2000); // restart
        etx.compute(INTERVAL);
        assert_eq!(etx.r_etx, Some(5.0 / 3.0));
    }

    #[test]
    fn missed_hellos_penalize_received() {
        let mut etx = EtxEstimator::new(4);
        etx.record(2, 2);
        etx.on_hello_timeout();
        etx.on_hello_timeout();
        // 2 - 2s * 2 / 4
        etx.compute(INTERVAL);
        assert_eq!(etx.r_etx, Some(2.0 / 1.0));
    }
}
