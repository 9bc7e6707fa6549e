use educe::Educe;
use serde::{Deserialize, Serialize};

use crate::concepts::packet::MessageKind;
use crate::framework::RoutingSystem;

/// Identifies a flooded message for duplicate suppression
#[derive(Educe, Serialize, Deserialize)]
#[educe(Clone(bound()), Debug(bound()), PartialEq(bound()), Eq, Hash(bound()))]
#[serde(bound = "")]
pub struct MessageKey<T: RoutingSystem + ?Sized> {
    pub kind: MessageKind,
    pub originator: T::Address,
    pub seqnum: u16,
}
