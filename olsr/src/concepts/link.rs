use std::collections::BTreeSet;
use std::time::Duration;

use educe::Educe;
use serde::{Deserialize, Serialize};

use crate::concepts::metric::Metric;
use crate::concepts::neighbour::{Neighbour, TwoHop};
use crate::etx::EtxEstimator;
use crate::framework::RoutingSystem;
use crate::timeout::Time;
use crate::tuple_base::{Handle, TupleBase};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkStatus {
    Pending,
    Heard,
    Symmetric,
    Lost,
}

/// Per-link sub-timers, kept in the owning interface's timeout list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkTimer {
    /// ETX: a HELLO from the peer is overdue
    HelloTimeout,
    /// Hysteresis: a HELLO from the peer is overdue
    QualityCheck,
}

/// Whether a timestamp is still in the future
pub fn is_valid(at: Option<Time>, now: Time) -> bool {
    at.is_some_and(|at| at > now)
}

#[derive(Educe, Serialize, Deserialize)]
#[educe(Clone(bound()), Debug(bound()))]
#[serde(bound = "")]
pub struct Link<T: RoutingSystem + ?Sized> {
    /// interface addresses of the neighbour reachable over this link
    pub neighbour_addrs: BTreeSet<T::Address>,
    pub heard_time: Option<Time>,
    pub sym_time: Option<Time>,
    pub status: LinkStatus,
    /// status at the end of the last processing cycle
    pub prev_status: LinkStatus,
    pub quality: f64,
    pub pending: bool,
    pub lost: bool,
    /// the HELLO interval advertised by the peer
    pub hello_interval: Option<Duration>,
    pub in_metric: Metric,
    pub out_metric: Metric,
    pub etx: EtxEstimator,
    /// the peer selected this router as flooding MPR
    pub mpr_selector: bool,
    pub neighbour: Option<Handle<Neighbour<T>>>,
    pub two_hops: TupleBase<TwoHop<T>>,
}

impl<T: RoutingSystem + ?Sized> Link<T> {
    pub fn new(neighbour_addrs: BTreeSet<T::Address>, quality: f64, pending: bool, etx_memory: usize) -> Self {
        Self {
            neighbour_addrs,
            heard_time: None,
            sym_time: None,
            status: LinkStatus::Pending,
            prev_status: LinkStatus::Pending,
            quality,
            pending,
            lost: false,
            hello_interval: None,
            in_metric: Metric::UNDEFINED,
            out_metric: Metric::UNDEFINED,
            etx: EtxEstimator::new(etx_memory),
            mpr_selector: false,
            neighbour: None,
            two_hops: TupleBase::new(),
        }
    }

    pub fn compute_status(&self, now: Time) -> LinkStatus {
        if self.pending {
            LinkStatus::Pending
        } else if self.lost {
            LinkStatus::Lost
        } else if is_valid(self.sym_time, now) {
            LinkStatus::Symmetric
        } else if is_valid(self.heard_time, now) {
            LinkStatus::Heard
        } else {
            LinkStatus::Lost
        }
    }

    pub fn is_symmetric(&self) -> bool {
        self.status == LinkStatus::Symmetric
    }

    pub fn was_symmetric(&self) -> bool {
        self.prev_status == LinkStatus::Symmetric
    }

    pub fn overlaps<'a>(&self, mut addrs: impl Iterator<Item = &'a T::Address>) -> bool
    where
        T::Address: 'a,
    {
        addrs.any(|addr| self.neighbour_addrs.contains(addr))
    }

    /// Address used as next hop over this link
    pub fn next_hop(&self) -> Option<&T::Address> {
        self.neighbour_addrs.first()
    }
}
