use std::collections::BTreeMap;
use std::time::Duration;

use log::{debug, info, trace, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::json;
use serde_with::serde_as;

use crate::concepts::dedup::MessageKey;
use crate::concepts::interface::{LocalAttachedNetwork, LocalInterface, OldOriginator, RemovedAddress};
use crate::concepts::link::{is_valid, Link, LinkTimer};
use crate::concepts::metric::Metric;
use crate::concepts::neighbour::{LostNeighbour, Neighbour};
use crate::concepts::packet::{Message, OutboundMessage, Packet};
use crate::concepts::route::RouteEntry;
use crate::concepts::topology::{AdvertisingRouter, AttachedNetwork, RoutableTopology, RouterTopology};
use crate::config::{Config, LinkMetricType};
use crate::feedback::DiscardReason;
use crate::framework::RoutingSystem;
use crate::metric_file::MetricFile;
use crate::stats::Stats;
use crate::timeout::Time;
use crate::tuple_base::{Handle, TupleBase};

/// Which information bases changed during the current callback
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeFlags {
    pub link: bool,
    pub link_sym: bool,
    pub neighbour: bool,
    pub neighbour_sym: bool,
    pub two_hop: bool,
    pub topology: bool,
    pub interfaces: bool,
    pub metric: bool,
}

impl ChangeFlags {
    pub fn needs_mpr(&self) -> bool {
        self.link_sym || self.neighbour || self.neighbour_sym || self.two_hop || self.metric
    }

    pub fn needs_routes(&self) -> bool {
        *self != Self::default()
    }

    pub fn link_removed<T: RoutingSystem + ?Sized>(&mut self, link: &Link<T>) {
        self.link = true;
        if link.is_symmetric() || link.was_symmetric() {
            self.link_sym = true;
        }
        if !link.two_hops.is_empty() {
            self.two_hop = true;
        }
    }
}

#[derive(Clone, Copy)]
struct LinkSummary {
    links: usize,
    symlinks: usize,
    in_metric: Metric,
    out_metric: Metric,
}

impl Default for LinkSummary {
    fn default() -> Self {
        Self {
            links: 0,
            symlinks: 0,
            in_metric: Metric::UNDEFINED,
            out_metric: Metric::UNDEFINED,
        }
    }
}

/// A single OLSRv2 router.
///
/// The router performs no I/O and never reads a clock. The host feeds it packets and time, drains `outbound`
/// and receives route changes through `route_table`.
#[serde_as]
#[derive(Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Router<T: RoutingSystem + ?Sized> {
    pub config: Config,
    pub interfaces: Vec<LocalInterface<T>>,
    pub originator: Option<T::Address>,
    pub old_originators: TupleBase<OldOriginator<T>>,
    pub removed_addrs: TupleBase<RemovedAddress<T>>,
    pub attached_networks: Vec<LocalAttachedNetwork<T>>,
    pub neighbours: TupleBase<Neighbour<T>>,
    pub lost_neighbours: TupleBase<LostNeighbour<T>>,
    pub advertising_routers: TupleBase<AdvertisingRouter<T>>,
    pub router_topology: TupleBase<RouterTopology<T>>,
    pub routable_topology: TupleBase<RoutableTopology<T>>,
    pub attached: TupleBase<AttachedNetwork<T>>,
    /// processed set
    pub processed: TupleBase<MessageKey<T>>,
    /// forwarded set
    pub forwarded: TupleBase<MessageKey<T>>,
    /// the routes currently installed in the route table
    #[serde_as(as = "Vec<(_, _)>")]
    pub routes: BTreeMap<T::Address, RouteEntry<T>>,
    /// advertised neighbour sequence number
    pub ansn: u16,
    /// sequence number of TC messages
    pub msg_seqnum: u16,
    pub next_tc: Time,
    pub last_tc: Option<Time>,
    pub last_nonempty_tc: Option<Time>,
    pub next_etx: Time,
    pub next_stats: Option<Time>,
    /// relayed messages, each expiring when it is due to be sent
    pub relay_queue: TupleBase<Message<T>>,
    pub changes: ChangeFlags,
    pub stats: Stats,
    pub outbound: Vec<OutboundMessage<T>>,
    pub static_metrics: MetricFile<T>,
    #[serde(skip, default = "fresh_rng")]
    pub(crate) rng: StdRng,
    #[serde(skip)]
    pub route_table: T::RouteTable,
}

fn fresh_rng() -> StdRng {
    StdRng::from_entropy()
}

impl<T: RoutingSystem + ?Sized> Router<T> {
    /// Validates the configuration and, with static link metrics, loads the configured metric file
    pub fn new(config: Config) -> anyhow::Result<Self> {
        Self::with_rng(config, fresh_rng())
    }

    /// Same as [`Router::new`], with reproducible jitter
    pub fn with_seed(config: Config, seed: u64) -> anyhow::Result<Self> {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: Config, rng: StdRng) -> anyhow::Result<Self> {
        config.validate()?;
        let static_metrics = match config.link_metric {
            LinkMetricType::Static => MetricFile::from_config(&config)?.unwrap_or_default(),
            _ => MetricFile::default(),
        };
        if !static_metrics.is_empty() {
            info!("Loaded {} static link metrics", static_metrics.len());
        }
        let next_stats = config.stat_interval.map(|_| Time::ZERO);
        Ok(Self {
            config,
            interfaces: Vec::new(),
            originator: None,
            old_originators: TupleBase::new(),
            removed_addrs: TupleBase::new(),
            attached_networks: Vec::new(),
            neighbours: TupleBase::new(),
            lost_neighbours: TupleBase::new(),
            advertising_routers: TupleBase::new(),
            router_topology: TupleBase::new(),
            routable_topology: TupleBase::new(),
            attached: TupleBase::new(),
            processed: TupleBase::new(),
            forwarded: TupleBase::new(),
            routes: BTreeMap::new(),
            ansn: 0,
            msg_seqnum: 0,
            next_tc: Time::ZERO,
            last_tc: None,
            last_nonempty_tc: None,
            next_etx: Time::ZERO,
            next_stats,
            relay_queue: TupleBase::new(),
            changes: ChangeFlags::default(),
            stats: Stats::default(),
            outbound: Vec::new(),
            static_metrics,
            rng,
            route_table: Default::default(),
        })
    }

    // region Interface

    /// Adds a local interface. The first address of the first interface becomes the originator.
    pub fn add_interface(&mut self, now: Time, id: T::InterfaceId, addrs: Vec<T::Address>) {
        if self.interface_index(&id).is_some() {
            warn!("Interface {} is already known, ignoring", json!(id));
            return;
        }
        self.expire(now);
        if self.originator.is_none() {
            if let Some(first) = addrs.first() {
                self.replace_originator(now, Some(first.clone()));
            }
        }
        for addr in &addrs {
            self.removed_addrs.retain(|r| r.address != *addr);
        }
        info!("Added interface {} with addresses {}", json!(id), json!(addrs));
        self.interfaces.push(LocalInterface::new(id, addrs, now));
        self.changes.interfaces = true;
        self.finish(now);
    }

    /// Removes a local interface together with its links. Routes over it are withdrawn.
    pub fn remove_interface(&mut self, now: Time, id: &T::InterfaceId) {
        let Some(idx) = self.interface_index(id) else {
            warn!("Cannot remove unknown interface {}", json!(id));
            return;
        };
        self.expire(now);
        let itf = self.interfaces.remove(idx);
        for link in itf.links.values() {
            self.changes.link_removed(link);
        }
        for addr in &itf.addrs {
            self.removed_addrs
                .insert(RemovedAddress { address: addr.clone() }, Some(now + self.config.hold.i));
        }
        if self.originator.as_ref().is_some_and(|orig| itf.has_addr(orig)) {
            let next = self.interfaces.iter().find_map(|i| i.primary_addr().cloned());
            self.replace_originator(now, next);
        }
        info!("Removed interface {}", json!(itf.id));
        self.changes.interfaces = true;
        self.finish(now);
    }

    pub fn set_originator(&mut self, now: Time, originator: T::Address) {
        self.expire(now);
        self.replace_originator(now, Some(originator));
        self.finish(now);
    }

    fn replace_originator(&mut self, now: Time, originator: Option<T::Address>) {
        if self.originator == originator {
            return;
        }
        if let Some(new) = &originator {
            self.old_originators.retain(|o| o.address != *new);
        }
        if let Some(old) = self.originator.take() {
            info!("Originator {} retired", json!(old));
            self.old_originators
                .insert(OldOriginator { address: old }, Some(now + self.config.hold.o));
        }
        self.originator = originator;
        self.changes.interfaces = true;
    }

    /// Advertises this router as a gateway to `network`
    pub fn add_attached_network(&mut self, now: Time, network: T::Address, distance: u8, metric: Metric) {
        self.expire(now);
        self.attached_networks.retain(|an| an.network != network);
        self.attached_networks.push(LocalAttachedNetwork {
            network,
            distance,
            metric,
        });
        self.bump_ansn();
        self.changes.interfaces = true;
        self.finish(now);
    }

    /// returns: whether the network was attached
    pub fn remove_attached_network(&mut self, now: Time, network: &T::Address) -> bool {
        self.expire(now);
        let before = self.attached_networks.len();
        self.attached_networks.retain(|an| an.network != *network);
        let removed = self.attached_networks.len() != before;
        if removed {
            self.bump_ansn();
            self.changes.interfaces = true;
        }
        self.finish(now);
        removed
    }

    /// Installs the static link metric table. Links pick up their metric with the next HELLO.
    pub fn set_static_metrics(&mut self, metrics: MetricFile<T>) {
        self.static_metrics = metrics;
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn routes(&self) -> &BTreeMap<T::Address, RouteEntry<T>> {
        &self.routes
    }

    pub fn drain_outbound(&mut self) -> Vec<OutboundMessage<T>> {
        std::mem::take(&mut self.outbound)
    }

    pub fn interface(&self, id: &T::InterfaceId) -> Option<&LocalInterface<T>> {
        self.interfaces.iter().find(|itf| itf.id == *id)
    }

    pub(crate) fn interface_index(&self, id: &T::InterfaceId) -> Option<usize> {
        self.interfaces.iter().position(|itf| itf.id == *id)
    }

    /// Whether the address belongs to this router, now or recently
    pub fn is_local_addr(&self, addr: &T::Address) -> bool {
        self.originator.as_ref() == Some(addr)
            || self.interfaces.iter().any(|itf| itf.has_addr(addr))
            || self.old_originators.values().any(|o| o.address == *addr)
            || self.removed_addrs.values().any(|r| r.address == *addr)
    }

    /// Neighbour owning the address, if any
    pub fn neighbour_by_addr(&self, addr: &T::Address) -> Option<&Neighbour<T>> {
        self.neighbours.values().find(|n| n.has_addr(addr))
    }

    // endregion

    // region Event Loop

    /// Earliest time at which [`Router::tick`] has work to do
    pub fn next_deadline(&self) -> Option<Time> {
        let mut deadlines = vec![
            Some(self.next_tc),
            self.next_stats,
            self.old_originators.next_expiry(),
            self.removed_addrs.next_expiry(),
            self.neighbours.next_expiry(),
            self.lost_neighbours.next_expiry(),
            self.advertising_routers.next_expiry(),
            self.router_topology.next_expiry(),
            self.routable_topology.next_expiry(),
            self.attached.next_expiry(),
            self.processed.next_expiry(),
            self.forwarded.next_expiry(),
            self.relay_queue.next_expiry(),
        ];
        if self.config.link_metric == LinkMetricType::Etx {
            deadlines.push(Some(self.next_etx));
        }
        for itf in &self.interfaces {
            deadlines.extend([
                Some(itf.next_hello),
                itf.links.next_expiry(),
                itf.link_timers.next_deadline(),
                itf.received.next_expiry(),
            ]);
            for link in itf.links.values() {
                deadlines.extend([link.sym_time, link.heard_time, link.two_hops.next_expiry()]);
            }
        }
        deadlines.into_iter().flatten().min()
    }

    /// Runs every timer due at `now`
    pub fn tick(&mut self, now: Time) {
        self.expire(now);
        self.fire_link_timers(now);
        if self.config.link_metric == LinkMetricType::Etx && self.next_etx <= now {
            self.update_etx_metrics();
            self.next_etx = now + self.config.etx_metric_interval;
        }
        self.finish(now);

        self.generate_hellos(now);
        if self.next_tc <= now {
            self.generate_tc(now);
        }
        self.flush_relay_queue(now);

        if let Some(at) = self.next_stats {
            if at <= now {
                info!("Statistics: {}", json!(self.stats));
                self.next_stats = self.config.stat_interval.map(|interval| now + interval);
            }
        }
    }

    /// Processes a decoded packet received on `itf` from the neighbour interface address `src`
    pub fn handle_packet(&mut self, now: Time, itf: &T::InterfaceId, src: &T::Address, packet: &Packet<T>) {
        self.expire(now);
        let Some(itf_idx) = self.interface_index(itf) else {
            self.discard(DiscardReason::UnknownInterface, src);
            return;
        };
        if self.is_local_addr(src) {
            self.discard(DiscardReason::OwnMessage, src);
            return;
        }

        for message in &packet.messages {
            match message {
                Message::Hello(hello) => {
                    self.stats.hello_received += 1;
                    if let Err(reason) = self.process_hello(now, itf_idx, src, hello) {
                        self.discard(reason, src);
                    }
                }
                Message::Tc(tc) => {
                    self.stats.tc_received += 1;
                    let result = self.process_tc(now, tc);
                    if let Err(reason) = result {
                        self.discard(reason, src);
                    }
                    if matches!(
                        result,
                        Ok(()) | Err(DiscardReason::Duplicate) | Err(DiscardReason::StaleAnsn)
                    ) {
                        self.consider_forwarding(now, itf_idx, src, tc);
                    }
                }
            }
        }

        if let Some(seqnum) = packet.seqnum {
            let links = &mut self.interfaces[itf_idx].links;
            if let Some(handle) = links.find(|link| link.neighbour_addrs.contains(src)) {
                if let Some(link) = links.get_mut(handle) {
                    link.etx.on_packet(seqnum);
                }
            }
        }

        self.finish(now);
    }

    /// Random delay in `[0, max]`
    pub(crate) fn jitter(&mut self, max: Duration) -> Duration {
        max.mul_f64(self.rng.gen())
    }

    pub(crate) fn discard(&mut self, reason: DiscardReason, src: &T::Address) {
        debug!("Discarded message from {}: {reason}", json!(src));
        self.stats.discard(reason);
    }

    /// Brings derived state up to date at the end of every callback
    pub(crate) fn finish(&mut self, now: Time) {
        self.expire(now);
        self.sync_bases(now);
        if self.changes.needs_mpr() {
            self.select_mprs();
        }
        if self.changes.needs_routes() {
            self.recalculate_routes();
        }
        self.changes = ChangeFlags::default();
    }

    // endregion

    // region Timers

    /// Removes every tuple whose validity ended at or before `now`
    pub(crate) fn expire(&mut self, now: Time) {
        for itf in &mut self.interfaces {
            while let Some((handle, link)) = itf.links.pop_expired(now) {
                itf.link_timers.cancel((handle, LinkTimer::HelloTimeout));
                itf.link_timers.cancel((handle, LinkTimer::QualityCheck));
                trace!("Link to {} timed out", json!(link.neighbour_addrs));
                self.changes.link_removed(&link);
            }
            for (_, link) in itf.links.iter_mut() {
                while let Some((_, two_hop)) = link.two_hops.pop_expired(now) {
                    trace!("2-hop neighbour {} timed out", json!(two_hop.address));
                    self.changes.two_hop = true;
                }
            }
            while itf.received.pop_expired(now).is_some() {}
        }
        while let Some((_, lost)) = self.lost_neighbours.pop_expired(now) {
            trace!("Lost neighbour {} forgotten", json!(lost.address));
        }
        while let Some((_, ar)) = self.advertising_routers.pop_expired(now) {
            trace!("Advertising router {} timed out", json!(ar.originator));
            self.changes.topology = true;
        }
        while self.router_topology.pop_expired(now).is_some() {
            self.changes.topology = true;
        }
        while self.routable_topology.pop_expired(now).is_some() {
            self.changes.topology = true;
        }
        while self.attached.pop_expired(now).is_some() {
            self.changes.topology = true;
        }
        while self.processed.pop_expired(now).is_some() {}
        while self.forwarded.pop_expired(now).is_some() {}
        while self.old_originators.pop_expired(now).is_some() {}
        while self.removed_addrs.pop_expired(now).is_some() {}
    }

    fn fire_link_timers(&mut self, now: Time) {
        let l_hold = self.config.hold.l;
        for itf in &mut self.interfaces {
            while let Some((_, (handle, timer))) = itf.link_timers.pop_expired(now) {
                let Some(link) = itf.links.get_mut(handle) else {
                    continue;
                };
                let interval = link.hello_interval.unwrap_or(self.config.hello_interval);
                match timer {
                    LinkTimer::HelloTimeout => {
                        link.etx.on_hello_timeout();
                    }
                    LinkTimer::QualityCheck => {
                        let Some(hyst) = &self.config.hysteresis else {
                            continue;
                        };
                        link.quality *= 1.0 - hyst.scale;
                        if link.quality < hyst.reject && !link.lost {
                            trace!("Link to {} rejected by hysteresis", json!(link.neighbour_addrs));
                            link.lost = true;
                            let hold = now + l_hold;
                            if itf.links.expiry(handle).map_or(true, |at| at < hold) {
                                itf.links.set_expiry(handle, hold);
                            }
                        }
                    }
                }
                itf.link_timers.schedule((handle, timer), now + interval);
            }
        }
    }

    fn update_etx_metrics(&mut self) {
        for itf in &mut self.interfaces {
            for (_, link) in itf.links.iter_mut() {
                let interval = link.hello_interval.unwrap_or(self.config.hello_interval);
                let metric = link.etx.compute(interval);
                if link.in_metric != metric {
                    trace!(
                        "ETX metric of link to {} is now {metric}",
                        json!(link.neighbour_addrs)
                    );
                    link.in_metric = metric;
                    self.changes.metric = true;
                }
            }
        }
    }

    // endregion

    // region Base Sync

    /// Re-evaluates link status and keeps the neighbour set consistent with the link sets
    fn sync_bases(&mut self, now: Time) {
        for itf in &mut self.interfaces {
            for (_, link) in itf.links.iter_mut() {
                if !is_valid(link.sym_time, now) {
                    link.sym_time = None;
                }
                if !is_valid(link.heard_time, now) {
                    link.heard_time = None;
                }
                link.status = link.compute_status(now);
                if link.status != link.prev_status {
                    trace!(
                        "Link to {} is now {:?}",
                        json!(link.neighbour_addrs),
                        link.status
                    );
                    self.changes.link = true;
                    if link.is_symmetric() != link.was_symmetric() {
                        self.changes.link_sym = true;
                    }
                }
                if !link.is_symmetric() && !link.two_hops.is_empty() {
                    link.two_hops.clear();
                    self.changes.two_hop = true;
                }
                link.prev_status = link.status;
            }
        }

        self.attach_links();

        let mut summaries: BTreeMap<Handle<Neighbour<T>>, LinkSummary> = BTreeMap::new();
        for itf in &self.interfaces {
            for link in itf.links.values() {
                let Some(nbr) = link.neighbour else {
                    continue;
                };
                let summary = summaries.entry(nbr).or_default();
                summary.links += 1;
                if link.is_symmetric() {
                    summary.symlinks += 1;
                    summary.in_metric = summary.in_metric.min(link.in_metric);
                    summary.out_metric = summary.out_metric.min(link.out_metric);
                }
            }
        }

        let mut lost = Vec::new();
        let mut regained = Vec::new();
        for handle in self.neighbours.handles() {
            let summary = summaries.get(&handle).copied().unwrap_or_default();
            if summary.links == 0 {
                if let Some(nbr) = self.neighbours.remove(handle) {
                    trace!("Neighbour {} has no links left", json!(nbr.addrs));
                    self.changes.neighbour = true;
                    if nbr.symmetric {
                        self.changes.neighbour_sym = true;
                        lost.extend(nbr.addrs);
                    }
                }
                continue;
            }
            let Some(nbr) = self.neighbours.get_mut(handle) else {
                continue;
            };
            nbr.link_count = summary.links;
            nbr.symlink_count = summary.symlinks;
            if nbr.in_metric != summary.in_metric || nbr.out_metric != summary.out_metric {
                nbr.in_metric = summary.in_metric;
                nbr.out_metric = summary.out_metric;
                self.changes.metric = true;
            }
            let symmetric = summary.symlinks > 0;
            if symmetric != nbr.symmetric {
                debug!(
                    "Neighbour {} is {}symmetric",
                    json!(nbr.router_addr()),
                    if symmetric { "" } else { "no longer " }
                );
                nbr.symmetric = symmetric;
                self.changes.neighbour_sym = true;
                if symmetric {
                    regained.extend(nbr.addrs.iter().cloned());
                } else {
                    nbr.flooding_mpr = false;
                    nbr.routing_mpr = false;
                    nbr.mpr_selector = false;
                    lost.extend(nbr.addrs.iter().cloned());
                }
            }
        }
        for addr in regained {
            self.lost_neighbours.retain(|l| l.address != addr);
        }
        self.mark_lost(now, lost);
    }

    /// Points every link at the neighbour owning its addresses, creating neighbours as needed
    fn attach_links(&mut self) {
        for itf_idx in 0..self.interfaces.len() {
            for handle in self.interfaces[itf_idx].links.handles() {
                let Some(link) = self.interfaces[itf_idx].links.get(handle) else {
                    continue;
                };
                if link.neighbour.is_some_and(|nbr| self.neighbours.contains(nbr)) {
                    continue;
                }
                let nbr = match self.neighbours.find(|n| link.overlaps(n.addrs.iter())) {
                    Some(nbr) => nbr,
                    None => {
                        let addrs = link.neighbour_addrs.clone();
                        self.changes.neighbour = true;
                        self.neighbours.insert(Neighbour::new(addrs, None), None)
                    }
                };
                if let Some(link) = self.interfaces[itf_idx].links.get_mut(handle) {
                    link.neighbour = Some(nbr);
                }
            }
        }
    }

    /// Advertises the addresses as LOST for `N_HOLD_TIME`
    pub(crate) fn mark_lost(&mut self, now: Time, addrs: impl IntoIterator<Item = T::Address>) {
        let until = now + self.config.hold.n;
        for address in addrs {
            match self.lost_neighbours.find(|l| l.address == address) {
                Some(handle) => self.lost_neighbours.set_expiry(handle, until),
                None => {
                    self.lost_neighbours.insert(LostNeighbour { address }, Some(until));
                }
            }
        }
    }

    // endregion
}
