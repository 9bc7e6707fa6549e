use log::{debug, trace};
use serde_json::json;

use crate::concepts::dedup::MessageKey;
use crate::concepts::metric::Metric;
use crate::concepts::packet::{
    Message, MessageHeader, MessageKind, NbrAddrType, OutboundMessage, Tc, TcAddress, TcGateway,
};
use crate::concepts::topology::{AdvertisingRouter, AttachedNetwork, RoutableTopology, RouterTopology};
use crate::feedback::DiscardReason;
use crate::framework::RoutingSystem;
use crate::router::Router;
use crate::timeout::Time;
use crate::util::{increment, seqno_greater_than, seqno_less_than};

impl<T: RoutingSystem + ?Sized> Router<T> {
    // region TC Processing

    /// Topology discovery from a TC. Forwarding is decided separately.
    pub(crate) fn process_tc(&mut self, now: Time, tc: &Tc<T>) -> Result<(), DiscardReason> {
        let header = &tc.header;
        let originator = header.originator.as_ref().ok_or(DiscardReason::MissingOriginator)?;
        if self.is_local_addr(originator) {
            return Err(DiscardReason::OwnMessage);
        }
        let seqnum = header.seqnum.ok_or(DiscardReason::MissingSeqnum)?;
        header.hop_limit.ok_or(DiscardReason::MissingHopLimit)?;
        if tc.advertised.iter().any(|adv| adv.address == *originator) {
            return Err(DiscardReason::AdvertisesOriginator);
        }
        if tc.has_content() && tc.ansn.is_none() {
            return Err(DiscardReason::MissingAnsn);
        }

        let key = MessageKey {
            kind: MessageKind::Tc,
            originator: originator.clone(),
            seqnum,
        };
        if self.processed.values().any(|processed| *processed == key) {
            return Err(DiscardReason::Duplicate);
        }
        self.processed.insert(key, Some(now + self.config.hold.p));

        let Some(ansn) = tc.ansn else {
            return Ok(());
        };
        let until = now + tc.validity_time;

        match self.advertising_routers.find(|ar| ar.originator == *originator) {
            Some(handle) => {
                let Some(ar) = self.advertising_routers.get_mut(handle) else {
                    return Ok(());
                };
                if seqno_greater_than(ar.ansn, ansn) {
                    return Err(DiscardReason::StaleAnsn);
                }
                if ar.ansn != ansn {
                    ar.ansn = ansn;
                    self.changes.topology = true;
                }
                self.advertising_routers.set_expiry(handle, until);
            }
            None => {
                trace!("New advertising router {}", json!(originator));
                self.advertising_routers.insert(
                    AdvertisingRouter {
                        originator: originator.clone(),
                        ansn,
                    },
                    Some(until),
                );
                self.changes.topology = true;
            }
        }

        for adv in &tc.advertised {
            if self.is_local_addr(&adv.address) {
                continue;
            }
            let metric = adv.metric.unwrap_or_default();
            if adv.kind.is_originator() {
                self.upsert_router_topology(originator, &adv.address, ansn, metric, until);
            }
            if adv.kind.is_routable() {
                self.upsert_routable_topology(originator, &adv.address, ansn, metric, until);
            }
        }
        for gateway in &tc.gateways {
            self.upsert_attached(originator, gateway, ansn, until);
        }

        if tc.complete {
            let older = |from: &T::Address, old: u16| from == originator && seqno_less_than(old, ansn);
            let removed = self.router_topology.retain(|tr| !older(&tr.from, tr.ansn)).len()
                + self.routable_topology.retain(|ta| !older(&ta.from, ta.ansn)).len()
                + self.attached.retain(|an| !older(&an.originator, an.ansn)).len();
            if removed > 0 {
                trace!("Removed {removed} outdated tuples of {}", json!(originator));
                self.changes.topology = true;
            }
        }
        Ok(())
    }

    fn upsert_router_topology(&mut self, from: &T::Address, to: &T::Address, ansn: u16, metric: Metric, until: Time) {
        match self.router_topology.find(|tr| tr.from == *from && tr.to == *to) {
            Some(handle) => {
                if let Some(tr) = self.router_topology.get_mut(handle) {
                    if tr.metric != metric {
                        tr.metric = metric;
                        self.changes.topology = true;
                    }
                    tr.ansn = ansn;
                }
                self.router_topology.set_expiry(handle, until);
            }
            None => {
                self.router_topology.insert(
                    RouterTopology {
                        from: from.clone(),
                        to: to.clone(),
                        ansn,
                        metric,
                    },
                    Some(until),
                );
                self.changes.topology = true;
            }
        }
    }

    fn upsert_routable_topology(
        &mut self,
        from: &T::Address,
        dest: &T::Address,
        ansn: u16,
        metric: Metric,
        until: Time,
    ) {
        match self.routable_topology.find(|ta| ta.from == *from && ta.dest == *dest) {
            Some(handle) => {
                if let Some(ta) = self.routable_topology.get_mut(handle) {
                    if ta.metric != metric {
                        ta.metric = metric;
                        self.changes.topology = true;
                    }
                    ta.ansn = ansn;
                }
                self.routable_topology.set_expiry(handle, until);
            }
            None => {
                self.routable_topology.insert(
                    RoutableTopology {
                        from: from.clone(),
                        dest: dest.clone(),
                        ansn,
                        metric,
                    },
                    Some(until),
                );
                self.changes.topology = true;
            }
        }
    }

    fn upsert_attached(&mut self, originator: &T::Address, gateway: &TcGateway<T>, ansn: u16, until: Time) {
        let metric = gateway.metric.unwrap_or_default();
        match self
            .attached
            .find(|an| an.originator == *originator && an.network == gateway.network)
        {
            Some(handle) => {
                if let Some(an) = self.attached.get_mut(handle) {
                    if an.metric != metric || an.distance != gateway.distance {
                        an.metric = metric;
                        an.distance = gateway.distance;
                        self.changes.topology = true;
                    }
                    an.ansn = ansn;
                }
                self.attached.set_expiry(handle, until);
            }
            None => {
                self.attached.insert(
                    AttachedNetwork {
                        originator: originator.clone(),
                        network: gateway.network.clone(),
                        distance: gateway.distance,
                        ansn,
                        metric,
                    },
                    Some(until),
                );
                self.changes.topology = true;
            }
        }
    }

    // endregion

    // region TC Generation

    /// Re-evaluates which symmetric neighbours go into TCs, bumping the ANSN on any change
    pub(crate) fn update_advertised_set(&mut self) {
        let policy = &self.config.advertise;
        let mut changed = false;
        for (_, nbr) in self.neighbours.iter_mut() {
            let advertised = nbr.symmetric
                && ((policy.mpr_selectors && nbr.mpr_selector)
                    || policy.in_metric.is_some_and(|max| nbr.in_metric <= max)
                    || policy.out_metric.is_some_and(|max| nbr.out_metric <= max));
            if advertised != nbr.advertised {
                nbr.advertised = advertised;
                changed = true;
            }
        }
        if changed {
            self.bump_ansn();
            debug!("Advertised neighbour set changed, ANSN is now {}", self.ansn);
        }
    }

    /// The advertised content changed, receivers drop whatever an older ANSN told them
    pub(crate) fn bump_ansn(&mut self) {
        increment(&mut self.ansn);
        self.stats.ansn_updates += 1;
    }

    pub(crate) fn generate_tc(&mut self, now: Time) {
        if let Some(last) = self.last_tc {
            let earliest = last + self.config.tc_min_interval;
            if now < earliest {
                self.next_tc = earliest;
                return;
            }
        }
        let jitter = self.jitter(self.config.tc_jitter);
        self.next_tc = now + self.config.tc_interval - jitter;

        self.update_advertised_set();
        let Some(mut tc) = self.build_tc() else {
            return;
        };
        if tc.has_content() {
            self.last_nonempty_tc = Some(now);
        } else if !self
            .last_nonempty_tc
            .is_some_and(|at| now < at + self.config.hold.a)
        {
            trace!("Suppressing empty TC");
            return;
        }

        increment(&mut self.msg_seqnum);
        tc.header.seqnum = Some(self.msg_seqnum);
        if let Some(originator) = &tc.header.originator {
            let key = MessageKey {
                kind: MessageKind::Tc,
                originator: originator.clone(),
                seqnum: self.msg_seqnum,
            };
            self.processed.insert(key, Some(now + self.config.hold.p));
        }
        self.last_tc = Some(now);
        for itf in &self.interfaces {
            self.outbound.push(OutboundMessage {
                itf: itf.id.clone(),
                message: Message::Tc(tc.clone()),
            });
        }
        self.stats.tc_sent += 1;
    }

    /// TC carrying the advertised neighbours and the local attached networks, without a sequence number
    pub(crate) fn build_tc(&self) -> Option<Tc<T>> {
        let originator = self.originator.clone()?;
        let metrics = self.config.uses_link_metric();

        let mut advertised = Vec::new();
        for nbr in self.neighbours.values().filter(|nbr| nbr.advertised) {
            let metric = if metrics { nbr.out_metric.defined() } else { None };
            for address in &nbr.addrs {
                let kind = if nbr.originator.as_ref() == Some(address) {
                    NbrAddrType::RoutableOrig
                } else {
                    NbrAddrType::Routable
                };
                advertised.push(TcAddress {
                    address: address.clone(),
                    kind,
                    metric,
                });
            }
            if let Some(orig) = nbr.originator.as_ref().filter(|orig| !nbr.addrs.contains(*orig)) {
                advertised.push(TcAddress {
                    address: orig.clone(),
                    kind: NbrAddrType::Originator,
                    metric,
                });
            }
        }
        let gateways = self
            .attached_networks
            .iter()
            .map(|an| TcGateway {
                network: an.network.clone(),
                distance: an.distance,
                metric: Some(an.metric),
            })
            .collect();

        Some(Tc {
            header: MessageHeader {
                originator: Some(originator),
                seqnum: None,
                hop_limit: Some(self.config.tc_hop_limit),
                hop_count: Some(0),
            },
            validity_time: self.config.hold.t,
            interval_time: Some(self.config.tc_interval),
            ansn: Some(self.ansn),
            complete: true,
            advertised,
            gateways,
        })
    }

    // endregion
}
