use std::fmt::Debug;
use std::hash::Hash;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::concepts::metric::Metric;
use crate::concepts::route::RouteEntry;
use crate::feedback::RouteTableError;

pub trait RoutingSystem {
    /// Address of an interface, router or attached network, MUST be unique within the MANET.
    /// Parsed from text when reading the static metric file.
    type Address: Ord + PartialOrd + Debug + FromStr + ProtocolData + ProtocolKey;
    /// Host handle of a local network interface
    type InterfaceId: Debug + ProtocolKey + ProtocolData;
    /// Receives route additions and deletions, usually the kernel forwarding table
    type RouteTable: RouteTable<Self> + Default;

    /// Link metric oracle used when running with `LinkMetricType::Test`
    fn test_link_metric(_itf: &Self::InterfaceId, _src: &Self::Address) -> Option<Metric> {
        None
    }
}

pub trait ProtocolData: Clone + Serialize + DeserializeOwned + Sized {}
pub trait ProtocolKey: Eq + PartialEq + Hash {}
impl<T: Eq + PartialEq + Hash> ProtocolKey for T {}
impl<T: Clone + Serialize + DeserializeOwned + Sized> ProtocolData for T {}

/// The platform route table. Both operations express intent and may be replayed.
pub trait RouteTable<T: RoutingSystem + ?Sized> {
    fn add_route(&mut self, route: &RouteEntry<T>) -> Result<(), RouteTableError>;
    fn delete_route(&mut self, route: &RouteEntry<T>) -> Result<(), RouteTableError>;
}
