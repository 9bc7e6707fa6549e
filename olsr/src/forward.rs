use log::trace;
use serde_json::json;

use crate::concepts::dedup::MessageKey;
use crate::concepts::packet::{Message, MessageKind, OutboundMessage, Tc};
use crate::config::RelayPolicy;
use crate::framework::RoutingSystem;
use crate::router::Router;
use crate::timeout::Time;

impl<T: RoutingSystem + ?Sized> Router<T> {
    /// Queues a relayed copy of the TC if the previous hop selected this router as relay
    pub(crate) fn consider_forwarding(&mut self, now: Time, itf_idx: usize, src: &T::Address, tc: &Tc<T>) {
        let header = &tc.header;
        let (Some(originator), Some(seqnum)) = (&header.originator, header.seqnum) else {
            return;
        };
        if self.is_local_addr(originator) {
            return;
        }
        let metrics = self.config.uses_link_metric();
        let itf = &mut self.interfaces[itf_idx];
        let Some(link) = itf
            .links
            .values()
            .find(|link| link.is_symmetric() && link.neighbour_addrs.contains(src))
        else {
            trace!("Not forwarding TC received from non-symmetric {}", json!(src));
            return;
        };
        let link_selector = link.mpr_selector;
        let neighbour_selector = link
            .neighbour
            .and_then(|handle| self.neighbours.get(handle))
            .is_some_and(|nbr| nbr.mpr_selector);

        let key = MessageKey {
            kind: MessageKind::Tc,
            originator: originator.clone(),
            seqnum,
        };
        if itf.received.values().any(|received| *received == key) {
            return;
        }
        itf.received.insert(key.clone(), Some(now + self.config.hold.rx));
        if self.forwarded.values().any(|forwarded| *forwarded == key) {
            return;
        }
        self.forwarded.insert(key, Some(now + self.config.hold.f));

        let relay = if metrics {
            match self.config.relay {
                RelayPolicy::FloodingMprSelectors => link_selector,
                RelayPolicy::RoutingMprSelectors => neighbour_selector,
                RelayPolicy::Either => link_selector || neighbour_selector,
            }
        } else {
            neighbour_selector
        };
        if !relay {
            return;
        }
        let hop_limit = header.hop_limit.unwrap_or(0);
        let hop_count = header.hop_count.unwrap_or(0);
        if hop_limit <= 1 || hop_count == u8::MAX {
            return;
        }

        let mut copy = tc.clone();
        copy.header.hop_limit = Some(hop_limit - 1);
        copy.header.hop_count = header.hop_count.map(|count| count + 1);
        let delay = self.jitter(self.config.forward_jitter);
        trace!(
            "Relaying TC {} of {} in {:?}",
            seqnum,
            json!(originator),
            delay
        );
        self.relay_queue.insert(Message::Tc(copy), Some(now + delay));
        self.stats.tc_relayed += 1;
    }

    /// Emits every relayed message that is due, on every interface
    pub(crate) fn flush_relay_queue(&mut self, now: Time) {
        while let Some((_, message)) = self.relay_queue.pop_expired(now) {
            for itf in &self.interfaces {
                self.outbound.push(OutboundMessage {
                    itf: itf.id.clone(),
                    message: message.clone(),
                });
            }
        }
    }
}
