use std::collections::BTreeSet;

use educe::Educe;
use serde::{Deserialize, Serialize};

use crate::concepts::metric::Metric;
use crate::config::WILLINGNESS_DEFAULT;
use crate::framework::RoutingSystem;

/// A neighbouring router, aggregating every link to it
#[derive(Educe, Serialize, Deserialize)]
#[educe(Clone(bound()), Debug(bound()))]
#[serde(bound = "")]
pub struct Neighbour<T: RoutingSystem + ?Sized> {
    pub addrs: BTreeSet<T::Address>,
    pub originator: Option<T::Address>,
    pub willingness: u8,
    /// at least one link to this neighbour is symmetric
    pub symmetric: bool,
    /// included in this router's TCs
    pub advertised: bool,
    /// selected by this router as flooding MPR
    pub flooding_mpr: bool,
    /// selected by this router as routing MPR
    pub routing_mpr: bool,
    /// this neighbour selected this router as routing MPR
    pub mpr_selector: bool,
    /// best incoming metric over all links
    pub in_metric: Metric,
    /// best outgoing metric over all links
    pub out_metric: Metric,
    pub link_count: usize,
    pub symlink_count: usize,
}

impl<T: RoutingSystem + ?Sized> Neighbour<T> {
    pub fn new(addrs: BTreeSet<T::Address>, originator: Option<T::Address>) -> Self {
        Self {
            addrs,
            originator,
            willingness: WILLINGNESS_DEFAULT,
            symmetric: false,
            advertised: false,
            flooding_mpr: false,
            routing_mpr: false,
            mpr_selector: false,
            in_metric: Metric::UNDEFINED,
            out_metric: Metric::UNDEFINED,
            link_count: 0,
            symlink_count: 0,
        }
    }

    /// Originator address when known, otherwise the lowest interface address
    pub fn router_addr(&self) -> Option<&T::Address> {
        self.originator.as_ref().or_else(|| self.addrs.first())
    }

    pub fn has_addr(&self, addr: &T::Address) -> bool {
        self.addrs.contains(addr) || self.originator.as_ref() == Some(addr)
    }
}

/// A router two hops away, reached over a specific link
#[derive(Educe, Serialize, Deserialize)]
#[educe(Clone(bound()), Debug(bound()))]
#[serde(bound = "")]
pub struct TwoHop<T: RoutingSystem + ?Sized> {
    pub address: T::Address,
    /// metric from the 2-hop neighbour towards the 1-hop neighbour
    pub in_metric: Metric,
    /// metric from the 1-hop neighbour towards the 2-hop neighbour
    pub out_metric: Metric,
}

/// Address of a neighbour that recently stopped being symmetric, advertised as LOST
#[derive(Educe, Serialize, Deserialize)]
#[educe(Clone(bound()), Debug(bound()))]
#[serde(bound = "")]
pub struct LostNeighbour<T: RoutingSystem + ?Sized> {
    pub address: T::Address,
}
