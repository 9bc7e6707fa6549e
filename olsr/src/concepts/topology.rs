use educe::Educe;
use serde::{Deserialize, Serialize};

use crate::concepts::metric::Metric;
use crate::framework::RoutingSystem;

/// A remote router that advertises a set of neighbours
#[derive(Educe, Serialize, Deserialize)]
#[educe(Clone(bound()), Debug(bound()))]
#[serde(bound = "")]
pub struct AdvertisingRouter<T: RoutingSystem + ?Sized> {
    pub originator: T::Address,
    /// latest accepted advertised neighbour sequence number
    pub ansn: u16,
}

/// Router to router edge learned from a TC
#[derive(Educe, Serialize, Deserialize)]
#[educe(Clone(bound()), Debug(bound()))]
#[serde(bound = "")]
pub struct RouterTopology<T: RoutingSystem + ?Sized> {
    pub from: T::Address,
    pub to: T::Address,
    pub ansn: u16,
    pub metric: Metric,
}

/// Router to routable address edge learned from a TC
#[derive(Educe, Serialize, Deserialize)]
#[educe(Clone(bound()), Debug(bound()))]
#[serde(bound = "")]
pub struct RoutableTopology<T: RoutingSystem + ?Sized> {
    pub from: T::Address,
    pub dest: T::Address,
    pub ansn: u16,
    pub metric: Metric,
}

/// A network attached to a remote gateway router
#[derive(Educe, Serialize, Deserialize)]
#[educe(Clone(bound()), Debug(bound()))]
#[serde(bound = "")]
pub struct AttachedNetwork<T: RoutingSystem + ?Sized> {
    pub originator: T::Address,
    pub network: T::Address,
    pub distance: u8,
    pub ansn: u16,
    pub metric: Metric,
}
