use std::collections::BTreeSet;

use log::{debug, trace};
use serde_json::json;

use crate::concepts::link::{Link, LinkStatus, LinkTimer};
use crate::concepts::metric::Metric;
use crate::concepts::neighbour::{Neighbour, TwoHop};
use crate::concepts::packet::{
    Hello, HelloNeighbour, LinkStatusValue, LocalAddress, Message, MessageHeader, OtherNeighbValue, OutboundMessage,
};
use crate::config::{LinkMetricType, ETX_HELLO_TIMEOUT_FACTOR, WILLINGNESS_DEFAULT};
use crate::feedback::DiscardReason;
use crate::framework::RoutingSystem;
use crate::router::Router;
use crate::timeout::Time;
use crate::tuple_base::Handle;
use crate::util::increment;

impl<T: RoutingSystem + ?Sized> Router<T> {
    // region HELLO Processing

    /// Link sensing and neighbour discovery from a HELLO received on the interface at `itf_idx`
    pub(crate) fn process_hello(
        &mut self,
        now: Time,
        itf_idx: usize,
        src: &T::Address,
        hello: &Hello<T>,
    ) -> Result<(), DiscardReason> {
        let header = &hello.header;
        if header.hop_limit.is_some_and(|limit| limit != 1) || header.hop_count.is_some_and(|count| count != 0) {
            return Err(DiscardReason::HelloHopLimit);
        }
        if hello
            .local_addrs
            .iter()
            .any(|local| hello.neighbours.iter().any(|n| n.address == local.address))
        {
            return Err(DiscardReason::AddressConflict);
        }
        if hello.local_addrs.iter().any(|local| self.is_local_addr(&local.address)) {
            return Err(DiscardReason::OwnMessage);
        }

        let mut sending: BTreeSet<T::Address> = hello
            .local_addrs
            .iter()
            .filter(|local| local.this_if)
            .map(|local| local.address.clone())
            .collect();
        if sending.is_empty() {
            sending.insert(src.clone());
        }
        let mut neighbour_addrs: BTreeSet<T::Address> =
            hello.local_addrs.iter().map(|local| local.address.clone()).collect();
        if neighbour_addrs.is_empty() {
            neighbour_addrs.insert(src.clone());
        }
        let originator = match (&header.originator, neighbour_addrs.len()) {
            (Some(orig), _) => orig.clone(),
            (None, 1) => neighbour_addrs.first().cloned().unwrap_or_else(|| src.clone()),
            (None, _) => src.clone(),
        };
        if self.is_local_addr(&originator) {
            return Err(DiscardReason::OwnMessage);
        }

        let validity = hello.validity_time;
        let interval = hello.interval_time.unwrap_or(self.config.hello_interval);
        let willingness = hello.willingness.unwrap_or(WILLINGNESS_DEFAULT);

        let (nbr_handle, removed) = self.update_neighbour(now, &neighbour_addrs, &originator, willingness);

        // everything that needs the rest of the router, before borrowing the interface
        let itf_addrs = self.interfaces[itf_idx].addrs.clone();
        let mine: Vec<&HelloNeighbour<T>> = hello
            .neighbours
            .iter()
            .filter(|n| itf_addrs.contains(&n.address))
            .collect();
        let two_hop_entries: Vec<&HelloNeighbour<T>> = hello
            .neighbours
            .iter()
            .filter(|n| !self.is_local_addr(&n.address) && !neighbour_addrs.contains(&n.address))
            .collect();
        let selected_flooding = hello
            .neighbours
            .iter()
            .any(|n| n.flooding_mpr && self.is_local_addr(&n.address));
        let selected_routing = hello
            .neighbours
            .iter()
            .any(|n| n.routing_mpr && self.is_local_addr(&n.address));
        let in_metric = match self.config.link_metric {
            LinkMetricType::None => Some(Metric::DEFAULT),
            LinkMetricType::Etx => None,
            LinkMetricType::Static => Some(self.static_metrics.lookup(src, &itf_addrs).unwrap_or_default()),
            LinkMetricType::Test => {
                Some(T::test_link_metric(&self.interfaces[itf_idx].id, src).unwrap_or_default())
            }
        };
        let hysteresis = self.config.hysteresis.clone();
        let (initial_quality, initial_pending) = match &hysteresis {
            Some(hyst) => (hyst.initial_quality, hyst.initial_pending()),
            None => (1.0, false),
        };
        let l_hold = self.config.hold.l;
        let etx = self.config.link_metric == LinkMetricType::Etx;
        let etx_memory = self.config.etx_memory_length;

        let itf = &mut self.interfaces[itf_idx];

        if !removed.is_empty() {
            for handle in itf.links.handles() {
                let Some(link) = itf.links.get_mut(handle) else {
                    continue;
                };
                for addr in &removed {
                    link.neighbour_addrs.remove(addr);
                }
                if link.neighbour_addrs.is_empty() {
                    if let Some(link) = itf.remove_link(handle) {
                        self.changes.link_removed(&link);
                    }
                }
            }
        }

        let overlapping: Vec<Handle<Link<T>>> = itf
            .links
            .iter()
            .filter(|(_, link)| link.overlaps(sending.iter()))
            .map(|(handle, _)| handle)
            .collect();
        let handle = match overlapping.as_slice() {
            [one] => *one,
            others => {
                for handle in others {
                    if let Some(link) = itf.remove_link(*handle) {
                        self.changes.link_removed(&link);
                    }
                }
                trace!("New link to {}", json!(sending));
                self.changes.link = true;
                let link = Link::new(sending.clone(), initial_quality, initial_pending, etx_memory);
                itf.links.insert(link, None)
            }
        };
        let Some(link) = itf.links.get_mut(handle) else {
            return Ok(());
        };
        link.neighbour_addrs = sending;
        link.neighbour = Some(nbr_handle);

        let reported_lost = mine.iter().any(|n| n.link_status == Some(LinkStatusValue::Lost));
        let reported_heard = mine.iter().find(|n| {
            matches!(
                n.link_status,
                Some(LinkStatusValue::Symmetric) | Some(LinkStatusValue::Heard)
            )
        });
        let out_metric = if reported_lost {
            link.sym_time = None;
            Metric::UNDEFINED
        } else if let Some(entry) = reported_heard {
            link.sym_time = Some(now + validity);
            entry.metrics.l_in.unwrap_or_default()
        } else {
            link.sym_time = None;
            link.out_metric
        };
        if out_metric != link.out_metric {
            link.out_metric = out_metric;
            self.changes.metric = true;
        }
        let heard = (now + validity).max(link.sym_time.unwrap_or_default());
        link.heard_time = Some(heard);

        if let Some(hyst) = &hysteresis {
            link.quality = (1.0 - hyst.scale) * link.quality + hyst.scale;
            if link.quality > hyst.accept {
                link.pending = false;
                link.lost = false;
            }
            itf.link_timers.reschedule(
                (handle, LinkTimer::QualityCheck),
                now + interval.mul_f64(hyst.loss_detect_scale),
            );
        }
        let l_time = if link.pending { heard } else { heard + l_hold };
        let l_time = match itf.links.expiry(handle) {
            Some(current) => current.max(l_time),
            None => l_time,
        };
        itf.links.set_expiry(handle, l_time);

        // re-borrow, the expiry update above needed the whole base
        let Some(link) = itf.links.get_mut(handle) else {
            return Ok(());
        };
        link.hello_interval = Some(interval);
        if etx {
            link.etx.on_hello(mine.iter().find_map(|n| n.r_etx));
            itf.link_timers.reschedule(
                (handle, LinkTimer::HelloTimeout),
                now + interval.mul_f64(ETX_HELLO_TIMEOUT_FACTOR),
            );
        }
        if let Some(metric) = in_metric {
            if link.in_metric != metric {
                link.in_metric = metric;
                self.changes.metric = true;
            }
        }

        let status = link.compute_status(now);
        if status != link.status {
            link.status = status;
            self.changes.link = true;
        }

        if link.status == LinkStatus::Symmetric {
            for entry in &two_hop_entries {
                let existing = link.two_hops.find(|two_hop| two_hop.address == entry.address);
                if entry.is_symmetric() {
                    let in_metric = entry.metrics.n_in.unwrap_or_default();
                    let out_metric = entry.metrics.n_out.unwrap_or_default();
                    match existing {
                        Some(h) => {
                            if let Some(two_hop) = link.two_hops.get_mut(h) {
                                if two_hop.in_metric != in_metric || two_hop.out_metric != out_metric {
                                    two_hop.in_metric = in_metric;
                                    two_hop.out_metric = out_metric;
                                    self.changes.two_hop = true;
                                }
                            }
                            link.two_hops.set_expiry(h, now + validity);
                        }
                        None => {
                            trace!("New 2-hop neighbour {}", json!(entry.address));
                            link.two_hops.insert(
                                TwoHop {
                                    address: entry.address.clone(),
                                    in_metric,
                                    out_metric,
                                },
                                Some(now + validity),
                            );
                            self.changes.two_hop = true;
                        }
                    }
                } else if let Some(h) = existing {
                    link.two_hops.remove(h);
                    self.changes.two_hop = true;
                }
            }
        }

        link.mpr_selector = selected_flooding;
        let metrics = self.config.uses_link_metric();
        if let Some(nbr) = self.neighbours.get_mut(nbr_handle) {
            nbr.mpr_selector = if metrics { selected_routing } else { selected_flooding };
        }
        Ok(())
    }

    /// Finds, creates or merges the neighbour a HELLO came from.
    ///
    /// returns: the neighbour and the addresses it no longer has
    fn update_neighbour(
        &mut self,
        now: Time,
        addrs: &BTreeSet<T::Address>,
        originator: &T::Address,
        willingness: u8,
    ) -> (Handle<Neighbour<T>>, Vec<T::Address>) {
        let matches: Vec<Handle<Neighbour<T>>> = self
            .neighbours
            .iter()
            .filter(|(_, n)| n.addrs.iter().any(|a| addrs.contains(a)) || n.originator.as_ref() == Some(originator))
            .map(|(handle, _)| handle)
            .collect();

        let mut removed = Vec::new();
        let mut lost = Vec::new();
        let handle = match matches.as_slice() {
            [one] => {
                let handle = *one;
                if let Some(nbr) = self.neighbours.get_mut(handle) {
                    removed.extend(nbr.addrs.difference(addrs).cloned());
                    if nbr.symmetric {
                        lost.extend(removed.iter().cloned());
                    }
                    if nbr.addrs != *addrs || nbr.originator.as_ref() != Some(originator) {
                        nbr.addrs = addrs.clone();
                        nbr.originator = Some(originator.clone());
                        self.changes.neighbour = true;
                    }
                }
                handle
            }
            others => {
                if others.len() > 1 {
                    debug!("Merging {} neighbours into {}", others.len(), json!(originator));
                }
                for handle in others {
                    if let Some(old) = self.neighbours.remove(*handle) {
                        let gone: Vec<T::Address> = old.addrs.difference(addrs).cloned().collect();
                        if old.symmetric {
                            self.changes.neighbour_sym = true;
                            lost.extend(gone.iter().cloned());
                        }
                        removed.extend(gone);
                    }
                }
                self.changes.neighbour = true;
                self.neighbours
                    .insert(Neighbour::new(addrs.clone(), Some(originator.clone())), None)
            }
        };

        if let Some(nbr) = self.neighbours.get_mut(handle) {
            if nbr.willingness != willingness {
                nbr.willingness = willingness;
                self.changes.neighbour = true;
            }
        }
        self.mark_lost(now, lost);
        (handle, removed)
    }

    // endregion

    // region HELLO Generation

    pub(crate) fn generate_hellos(&mut self, now: Time) {
        for itf_idx in 0..self.interfaces.len() {
            let itf = &mut self.interfaces[itf_idx];
            if itf.next_hello > now {
                continue;
            }
            if let Some(last) = itf.last_hello {
                let earliest = last + self.config.hello_min_interval;
                if now < earliest {
                    itf.next_hello = earliest;
                    continue;
                }
            }
            let hello = self.build_hello(itf_idx);
            let jitter = self.jitter(self.config.hello_jitter);
            let itf = &mut self.interfaces[itf_idx];
            itf.last_hello = Some(now);
            itf.next_hello = now + self.config.hello_interval - jitter;
            trace!("Sending HELLO on {}", json!(itf.id));
            self.outbound.push(OutboundMessage {
                itf: itf.id.clone(),
                message: Message::Hello(hello),
            });
            self.stats.hello_sent += 1;
        }
    }

    /// Builds the next HELLO of the interface at `itf_idx`, consuming a message sequence number
    pub(crate) fn build_hello(&mut self, itf_idx: usize) -> Hello<T> {
        let seqnum = {
            let itf = &mut self.interfaces[itf_idx];
            increment(&mut itf.hello_seqnum);
            itf.hello_seqnum
        };
        let metrics = self.config.uses_link_metric();
        let etx = self.config.link_metric == LinkMetricType::Etx;

        let local_addrs = self
            .interfaces
            .iter()
            .enumerate()
            .flat_map(|(idx, itf)| {
                itf.addrs.iter().map(move |address| LocalAddress {
                    address: address.clone(),
                    this_if: idx == itf_idx,
                })
            })
            .collect();

        let mut neighbours = Vec::new();
        let mut listed = BTreeSet::new();
        for link in self.interfaces[itf_idx].links.values() {
            if link.status == LinkStatus::Pending {
                continue;
            }
            let nbr = link.neighbour.and_then(|handle| self.neighbours.get(handle));
            for address in &link.neighbour_addrs {
                if !listed.insert(address.clone()) {
                    continue;
                }
                let mut entry = HelloNeighbour::new(address.clone());
                entry.link_status = Some(match link.status {
                    LinkStatus::Symmetric => LinkStatusValue::Symmetric,
                    LinkStatus::Heard => LinkStatusValue::Heard,
                    _ => LinkStatusValue::Lost,
                });
                if metrics {
                    entry.metrics.l_in = link.in_metric.defined();
                }
                if etx {
                    entry.r_etx = link.etx.r_etx;
                }
                if let Some(nbr) = nbr.filter(|nbr| nbr.symmetric) {
                    if !link.is_symmetric() {
                        entry.other_neighb = Some(OtherNeighbValue::Symmetric);
                    }
                    entry.flooding_mpr = nbr.flooding_mpr;
                    entry.routing_mpr = nbr.routing_mpr;
                    if metrics {
                        entry.metrics.n_in = nbr.in_metric.defined();
                        entry.metrics.n_out = nbr.out_metric.defined();
                    }
                }
                neighbours.push(entry);
            }
        }
        for nbr in self.neighbours.values().filter(|nbr| nbr.symmetric) {
            for address in &nbr.addrs {
                if !listed.insert(address.clone()) {
                    continue;
                }
                let mut entry = HelloNeighbour::new(address.clone());
                entry.other_neighb = Some(OtherNeighbValue::Symmetric);
                if metrics {
                    entry.metrics.n_in = nbr.in_metric.defined();
                    entry.metrics.n_out = nbr.out_metric.defined();
                }
                neighbours.push(entry);
            }
        }
        for lost in self.lost_neighbours.values() {
            if listed.insert(lost.address.clone()) {
                let mut entry = HelloNeighbour::new(lost.address.clone());
                entry.other_neighb = Some(OtherNeighbValue::Lost);
                neighbours.push(entry);
            }
        }

        Hello {
            header: MessageHeader {
                originator: self.originator.clone(),
                seqnum: Some(seqnum),
                hop_limit: Some(1),
                hop_count: Some(0),
            },
            validity_time: self.config.hold.h,
            interval_time: Some(self.config.hello_interval),
            willingness: Some(self.config.willingness),
            local_addrs,
            neighbours,
        }
    }

    // endregion
}
