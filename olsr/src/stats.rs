use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::feedback::DiscardReason;

/// Protocol counters, logged periodically when `Config::stat_interval` is set
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    pub hello_sent: u64,
    pub hello_received: u64,
    pub tc_sent: u64,
    pub tc_received: u64,
    pub tc_relayed: u64,
    pub discarded: BTreeMap<DiscardReason, u64>,
    pub flooding_mpr_calcs: u64,
    pub routing_mpr_calcs: u64,
    pub route_calcs: u64,
    pub routes_added: u64,
    pub routes_deleted: u64,
    /// routes replaced by a route with a different next hop or distance
    pub route_flaps: u64,
    pub route_table_errors: u64,
    pub ansn_updates: u64,
    /// installed routes by hop distance
    pub routes_per_hop: BTreeMap<u8, u64>,
}

impl Stats {
    pub fn discard(&mut self, reason: DiscardReason) {
        *self.discarded.entry(reason).or_default() += 1;
    }

    pub fn discarded(&self, reason: DiscardReason) -> u64 {
        self.discarded.get(&reason).copied().unwrap_or_default()
    }

    pub fn set_route_distances(&mut self, dists: impl Iterator<Item = u8>) {
        self.routes_per_hop.clear();
        for dist in dists {
            *self.routes_per_hop.entry(dist).or_default() += 1;
        }
    }
}
