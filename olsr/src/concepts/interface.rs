use educe::Educe;
use serde::{Deserialize, Serialize};

use crate::concepts::dedup::MessageKey;
use crate::concepts::link::{Link, LinkTimer};
use crate::concepts::metric::Metric;
use crate::framework::RoutingSystem;
use crate::timeout::{Time, TimeoutList};
use crate::tuple_base::{Handle, TupleBase};

/// A local OLSRv2 interface with the links sensed over it
#[derive(Educe, Serialize, Deserialize)]
#[educe(Clone(bound()), Debug(bound()))]
#[serde(bound = "")]
pub struct LocalInterface<T: RoutingSystem + ?Sized> {
    pub id: T::InterfaceId,
    /// the first address identifies the interface in routes
    pub addrs: Vec<T::Address>,
    pub links: TupleBase<Link<T>>,
    /// ETX and hysteresis sub-timers of the links
    pub link_timers: TimeoutList<(Handle<Link<T>>, LinkTimer)>,
    /// received set, flooded messages already seen on this interface
    pub received: TupleBase<MessageKey<T>>,
    pub hello_seqnum: u16,
    /// when the periodic HELLO timer fires next
    pub next_hello: Time,
    pub last_hello: Option<Time>,
}

impl<T: RoutingSystem + ?Sized> LocalInterface<T> {
    pub fn new(id: T::InterfaceId, addrs: Vec<T::Address>, next_hello: Time) -> Self {
        Self {
            id,
            addrs,
            links: TupleBase::new(),
            link_timers: TimeoutList::new(),
            received: TupleBase::new(),
            hello_seqnum: 0,
            next_hello,
            last_hello: None,
        }
    }

    pub fn has_addr(&self, addr: &T::Address) -> bool {
        self.addrs.contains(addr)
    }

    pub fn primary_addr(&self) -> Option<&T::Address> {
        self.addrs.first()
    }

    /// Removes a link together with its sub-timers
    pub fn remove_link(&mut self, handle: Handle<Link<T>>) -> Option<Link<T>> {
        self.link_timers.cancel((handle, LinkTimer::HelloTimeout));
        self.link_timers.cancel((handle, LinkTimer::QualityCheck));
        self.links.remove(handle)
    }
}

/// A network this router is a gateway to
#[derive(Educe, Serialize, Deserialize)]
#[educe(Clone(bound()), Debug(bound()), PartialEq(bound()))]
#[serde(bound = "")]
pub struct LocalAttachedNetwork<T: RoutingSystem + ?Sized> {
    pub network: T::Address,
    pub distance: u8,
    pub metric: Metric,
}

/// A former originator address, still recognized as ours until it expires
#[derive(Educe, Serialize, Deserialize)]
#[educe(Clone(bound()), Debug(bound()))]
#[serde(bound = "")]
pub struct OldOriginator<T: RoutingSystem + ?Sized> {
    pub address: T::Address,
}

/// An address of a removed local interface, still recognized as ours until it expires
#[derive(Educe, Serialize, Deserialize)]
#[educe(Clone(bound()), Debug(bound()))]
#[serde(bound = "")]
pub struct RemovedAddress<T: RoutingSystem + ?Sized> {
    pub address: T::Address,
}
