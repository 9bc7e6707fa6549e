use educe::Educe;
use serde::{Deserialize, Serialize};

use crate::concepts::metric::Metric;
use crate::framework::RoutingSystem;

/// One entry of the routing set, as handed to the route table sink
#[derive(Educe, Serialize, Deserialize)]
#[educe(Clone(bound()), Debug(bound()), PartialEq(bound()))]
#[serde(bound = "")]
pub struct RouteEntry<T: RoutingSystem + ?Sized> {
    pub dest: T::Address,
    pub next_hop: T::Address,
    /// local address packets towards `dest` are sourced from
    pub source: T::Address,
    pub metric: Metric,
    pub dist: u8,
    pub itf: T::InterfaceId,
}

impl<T: RoutingSystem + ?Sized> RouteEntry<T> {
    /// Whether both entries forward the same way, metric aside
    pub fn same_forwarding(&self, other: &Self) -> bool {
        self.next_hop == other.next_hop
            && self.source == other.source
            && self.dist == other.dist
            && self.itf == other.itf
    }
}
