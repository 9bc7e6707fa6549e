use std::time::Duration;

use educe::Educe;
use serde::{Deserialize, Serialize};

use crate::concepts::metric::Metric;
use crate::framework::RoutingSystem;

/// A decoded packet as handed over by the host's packet parser
#[derive(Educe, Serialize, Deserialize)]
#[educe(Clone(bound()), Debug(bound()), PartialEq(bound()))]
#[serde(bound = "")]
pub struct Packet<T: RoutingSystem + ?Sized> {
    /// packet sequence number, counted by the ETX estimator
    pub seqnum: Option<u16>,
    pub messages: Vec<Message<T>>,
}

#[derive(Educe, Serialize, Deserialize)]
#[educe(Clone(bound()), Debug(bound()), PartialEq(bound()))]
#[serde(bound = "")]
pub enum Message<T: RoutingSystem + ?Sized> {
    Hello(Hello<T>),
    Tc(Tc<T>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    Hello,
    Tc,
}

impl<T: RoutingSystem + ?Sized> Message<T> {
    pub fn header(&self) -> &MessageHeader<T> {
        match self {
            Message::Hello(hello) => &hello.header,
            Message::Tc(tc) => &tc.header,
        }
    }

    pub fn header_mut(&mut self) -> &mut MessageHeader<T> {
        match self {
            Message::Hello(hello) => &mut hello.header,
            Message::Tc(tc) => &mut tc.header,
        }
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Hello(_) => MessageKind::Hello,
            Message::Tc(_) => MessageKind::Tc,
        }
    }
}

/// Optional RFC 5444 message header fields
#[derive(Educe, Serialize, Deserialize)]
#[educe(Clone(bound()), Debug(bound()), PartialEq(bound()), Default(bound()))]
#[serde(bound = "")]
pub struct MessageHeader<T: RoutingSystem + ?Sized> {
    pub originator: Option<T::Address>,
    pub seqnum: Option<u16>,
    pub hop_limit: Option<u8>,
    pub hop_count: Option<u8>,
}

#[derive(Educe, Serialize, Deserialize)]
#[educe(Clone(bound()), Debug(bound()), PartialEq(bound()))]
#[serde(bound = "")]
pub struct Hello<T: RoutingSystem + ?Sized> {
    pub header: MessageHeader<T>,
    pub validity_time: Duration,
    pub interval_time: Option<Duration>,
    pub willingness: Option<u8>,
    /// addresses of the sender's own interfaces
    pub local_addrs: Vec<LocalAddress<T>>,
    pub neighbours: Vec<HelloNeighbour<T>>,
}

#[derive(Educe, Serialize, Deserialize)]
#[educe(Clone(bound()), Debug(bound()), PartialEq(bound()))]
#[serde(bound = "")]
pub struct LocalAddress<T: RoutingSystem + ?Sized> {
    pub address: T::Address,
    /// THIS_IF when true, OTHER_IF otherwise
    pub this_if: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkStatusValue {
    Lost,
    Symmetric,
    Heard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OtherNeighbValue {
    Lost,
    Symmetric,
}

/// Link metric TLVs attached to a neighbour address
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LinkMetrics {
    pub l_in: Option<Metric>,
    pub n_in: Option<Metric>,
    pub n_out: Option<Metric>,
}

#[derive(Educe, Serialize, Deserialize)]
#[educe(Clone(bound()), Debug(bound()), PartialEq(bound()))]
#[serde(bound = "")]
pub struct HelloNeighbour<T: RoutingSystem + ?Sized> {
    pub address: T::Address,
    pub link_status: Option<LinkStatusValue>,
    pub other_neighb: Option<OtherNeighbValue>,
    pub metrics: LinkMetrics,
    /// the sender selected this address's router as flooding MPR
    pub flooding_mpr: bool,
    /// the sender selected this address's router as routing MPR
    pub routing_mpr: bool,
    /// the sender's reverse ETX of the link, our forward ETX
    pub r_etx: Option<f64>,
}

impl<T: RoutingSystem + ?Sized> HelloNeighbour<T> {
    pub fn new(address: T::Address) -> Self {
        Self {
            address,
            link_status: None,
            other_neighb: None,
            metrics: LinkMetrics::default(),
            flooding_mpr: false,
            routing_mpr: false,
            r_etx: None,
        }
    }

    /// Whether the sender considers this address a symmetric neighbour
    pub fn is_symmetric(&self) -> bool {
        self.link_status == Some(LinkStatusValue::Symmetric)
            || self.other_neighb == Some(OtherNeighbValue::Symmetric)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NbrAddrType {
    Originator,
    Routable,
    RoutableOrig,
}

impl NbrAddrType {
    pub fn is_originator(&self) -> bool {
        matches!(self, NbrAddrType::Originator | NbrAddrType::RoutableOrig)
    }

    pub fn is_routable(&self) -> bool {
        matches!(self, NbrAddrType::Routable | NbrAddrType::RoutableOrig)
    }
}

#[derive(Educe, Serialize, Deserialize)]
#[educe(Clone(bound()), Debug(bound()), PartialEq(bound()))]
#[serde(bound = "")]
pub struct Tc<T: RoutingSystem + ?Sized> {
    pub header: MessageHeader<T>,
    pub validity_time: Duration,
    pub interval_time: Option<Duration>,
    pub ansn: Option<u16>,
    /// the advertised content is the originator's complete advertised set
    pub complete: bool,
    pub advertised: Vec<TcAddress<T>>,
    pub gateways: Vec<TcGateway<T>>,
}

impl<T: RoutingSystem + ?Sized> Tc<T> {
    pub fn has_content(&self) -> bool {
        !self.advertised.is_empty() || !self.gateways.is_empty()
    }
}

#[derive(Educe, Serialize, Deserialize)]
#[educe(Clone(bound()), Debug(bound()), PartialEq(bound()))]
#[serde(bound = "")]
pub struct TcAddress<T: RoutingSystem + ?Sized> {
    pub address: T::Address,
    pub kind: NbrAddrType,
    /// N_OUT link metric from the originator towards this neighbour
    pub metric: Option<Metric>,
}

#[derive(Educe, Serialize, Deserialize)]
#[educe(Clone(bound()), Debug(bound()), PartialEq(bound()))]
#[serde(bound = "")]
pub struct TcGateway<T: RoutingSystem + ?Sized> {
    pub network: T::Address,
    pub distance: u8,
    pub metric: Option<Metric>,
}

#[derive(Educe, Serialize, Deserialize)]
#[educe(Clone(bound()), Debug(bound()))]
#[serde(bound = "")]
pub struct OutboundMessage<T: RoutingSystem + ?Sized> {
    /// send via this interface
    pub itf: T::InterfaceId,
    pub message: Message<T>,
}
