use std::collections::BTreeMap;

use educe::Educe;
use log::{debug, error};
use serde_json::json;

use crate::concepts::interface::LocalInterface;
use crate::concepts::link::Link;
use crate::concepts::metric::Metric;
use crate::concepts::neighbour::Neighbour;
use crate::concepts::route::RouteEntry;
use crate::config::WILLINGNESS_NEVER;
use crate::feedback::invariant_violation;
use crate::framework::{RouteTable, RoutingSystem};
use crate::router::Router;

/// Upper bound on relaxation rounds over the topology sets
const MAX_RELAXATION_ROUNDS: usize = 255;

/// The changes needed to turn one routing set into another
#[derive(Educe)]
#[educe(Debug(bound()), Default(bound()))]
pub struct RouteDiff<T: RoutingSystem + ?Sized> {
    pub additions: Vec<RouteEntry<T>>,
    /// same forwarding, possibly a different metric; needs no route table call
    pub updates: Vec<RouteEntry<T>>,
    pub removals: Vec<RouteEntry<T>>,
}

impl<T: RoutingSystem + ?Sized> RouteDiff<T> {
    /// Whether the route table needs to be touched
    pub fn is_empty(&self) -> bool {
        self.additions.is_empty() && self.removals.is_empty()
    }
}

/// Computes the route table operations turning `prev` into `next`
pub fn diff_routes<T: RoutingSystem + ?Sized>(
    prev: &BTreeMap<T::Address, RouteEntry<T>>,
    next: &BTreeMap<T::Address, RouteEntry<T>>,
) -> RouteDiff<T> {
    let mut diff = RouteDiff::default();
    for (dest, old) in prev {
        match next.get(dest) {
            None => diff.removals.push(old.clone()),
            Some(new) if new.same_forwarding(old) => diff.updates.push(new.clone()),
            Some(new) => {
                diff.removals.push(old.clone());
                diff.additions.push(new.clone());
            }
        }
    }
    for (dest, new) in next {
        if !prev.contains_key(dest) {
            diff.additions.push(new.clone());
        }
    }
    diff
}

/// Installs `candidate` unless `dest` already has a route at least as good by `better`
fn offer<T: RoutingSystem + ?Sized>(
    routes: &mut BTreeMap<T::Address, RouteEntry<T>>,
    candidate: RouteEntry<T>,
    better: impl Fn(&RouteEntry<T>, &RouteEntry<T>) -> bool,
) -> bool {
    match routes.get(&candidate.dest) {
        Some(existing) if !better(&candidate, existing) => false,
        _ => {
            routes.insert(candidate.dest.clone(), candidate);
            true
        }
    }
}

fn lower_metric<T: RoutingSystem + ?Sized>(candidate: &RouteEntry<T>, existing: &RouteEntry<T>) -> bool {
    candidate.metric < existing.metric
}

impl<T: RoutingSystem + ?Sized> Router<T> {
    fn is_routable(&self, addr: &T::Address) -> bool {
        !self.is_local_addr(addr) && !self.attached_networks.iter().any(|an| an.network == *addr)
    }

    /// Route over `link` to `dest`
    fn link_route(
        itf: &LocalInterface<T>,
        link: &Link<T>,
        dest: &T::Address,
        nbr: &Neighbour<T>,
    ) -> Option<RouteEntry<T>> {
        Some(RouteEntry {
            dest: dest.clone(),
            next_hop: link.next_hop()?.clone(),
            source: itf.primary_addr()?.clone(),
            metric: nbr.out_metric,
            dist: 1,
            itf: itf.id.clone(),
        })
    }

    /// Builds the routing set from scratch
    pub fn compute_routes(&self) -> BTreeMap<T::Address, RouteEntry<T>> {
        let mut routes = BTreeMap::new();

        // best symmetric link of every symmetric neighbour
        let mut best_links = Vec::new();
        for (handle, nbr) in self.neighbours.iter().filter(|(_, nbr)| nbr.symmetric) {
            let best = self
                .interfaces
                .iter()
                .flat_map(|itf| itf.links.values().map(move |link| (itf, link)))
                .filter(|(_, link)| link.neighbour == Some(handle) && link.is_symmetric())
                .min_by_key(|(_, link)| link.out_metric);
            if let Some((itf, link)) = best {
                best_links.push((nbr, itf, link));
            }
        }

        for (nbr, itf, link) in &best_links {
            let Some(router) = nbr.router_addr().filter(|addr| self.is_routable(addr)) else {
                continue;
            };
            if let Some(route) = Self::link_route(itf, link, router, nbr) {
                routes.insert(router.clone(), route);
            }
        }
        for (nbr, itf, link) in &best_links {
            for addr in &nbr.addrs {
                if routes.contains_key(addr) || !self.is_routable(addr) {
                    continue;
                }
                if let Some(route) = Self::link_route(itf, link, addr, nbr) {
                    routes.insert(addr.clone(), route);
                }
            }
        }

        for itf in &self.interfaces {
            for link in itf.links.values().filter(|link| link.is_symmetric()) {
                let Some(nbr) = link.neighbour.and_then(|handle| self.neighbours.get(handle)) else {
                    invariant_violation(format_args!("symmetric link on {:?} without a neighbour", itf.id));
                    continue;
                };
                if nbr.willingness == WILLINGNESS_NEVER {
                    continue;
                }
                for two_hop in link.two_hops.values() {
                    if !self.is_routable(&two_hop.address) {
                        continue;
                    }
                    let Some(mut route) = Self::link_route(itf, link, &two_hop.address, nbr) else {
                        continue;
                    };
                    route.metric = link.out_metric + two_hop.out_metric;
                    route.dist = 2;
                    offer(&mut routes, route, lower_metric);
                }
            }
        }

        let router_edges: Vec<_> = self
            .router_topology
            .values()
            .map(|tr| (&tr.from, &tr.to, tr.metric))
            .collect();
        self.relax(&mut routes, &router_edges);
        let routable_edges: Vec<_> = self
            .routable_topology
            .values()
            .map(|ta| (&ta.from, &ta.dest, ta.metric))
            .collect();
        self.relax(&mut routes, &routable_edges);

        for an in self.attached.values() {
            if !self.is_routable(&an.network) {
                continue;
            }
            let Some(gateway) = routes.get(&an.originator) else {
                continue;
            };
            let route = RouteEntry {
                dest: an.network.clone(),
                metric: gateway.metric + an.metric,
                dist: gateway.dist.saturating_add(an.distance),
                ..gateway.clone()
            };
            offer(&mut routes, route, |candidate, existing| candidate.dist < existing.dist);
        }
        routes
    }

    /// Extends routes along topology edges until nothing improves
    fn relax(
        &self,
        routes: &mut BTreeMap<T::Address, RouteEntry<T>>,
        edges: &[(&T::Address, &T::Address, Metric)],
    ) {
        for _ in 0..MAX_RELAXATION_ROUNDS {
            let mut changed = false;
            for &(from, to, metric) in edges {
                if !self.is_routable(to) {
                    continue;
                }
                let Some(via) = routes.get(from) else {
                    continue;
                };
                let route = RouteEntry {
                    dest: to.clone(),
                    metric: via.metric + metric,
                    dist: via.dist.saturating_add(1),
                    ..via.clone()
                };
                changed |= offer(routes, route, lower_metric);
            }
            if !changed {
                break;
            }
        }
    }

    /// Recomputes the routing set and pushes the difference to the route table
    pub(crate) fn recalculate_routes(&mut self) {
        let next = self.compute_routes();
        let diff = diff_routes(&self.routes, &next);
        self.stats.route_calcs += 1;

        for route in &diff.removals {
            match self.route_table.delete_route(route) {
                Ok(()) => self.stats.routes_deleted += 1,
                Err(err) => {
                    error!("Failed to delete route to {}: {err}", json!(route.dest));
                    self.stats.route_table_errors += 1;
                }
            }
        }
        for route in &diff.additions {
            if self.routes.contains_key(&route.dest) {
                self.stats.route_flaps += 1;
            }
            match self.route_table.add_route(route) {
                Ok(()) => self.stats.routes_added += 1,
                Err(err) => {
                    error!("Failed to add route to {}: {err}", json!(route.dest));
                    self.stats.route_table_errors += 1;
                }
            }
        }
        if !diff.is_empty() {
            debug!(
                "Routes recalculated: {} added, {} removed, {} total",
                diff.additions.len(),
                diff.removals.len(),
                next.len()
            );
        }
        self.stats.set_route_distances(next.values().map(|route| route.dist));
        self.routes = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::RouteTableError;

    struct Sys;
    #[derive(Default)]
    struct NoTable;
    impl RouteTable<Sys> for NoTable {
        fn add_route(&mut self, _: &RouteEntry<Sys>) -> Result<(), RouteTableError> {
            Ok(())
        }
        fn delete_route(&mut self, _: &RouteEntry<Sys>) -> Result<(), RouteTableError> {
            Ok(())
        }
    }
    impl RoutingSystem for Sys {
        type Address = char;
        type InterfaceId = u8;
        type RouteTable = NoTable;
    }

    fn route(dest: char, next_hop: char, metric: u32, dist: u8) -> RouteEntry<Sys> {
        RouteEntry {
            dest,
            next_hop,
            source: 'x',
            metric: Metric::new(metric),
            dist,
            itf: 0,
        }
    }

    fn set(routes: &[RouteEntry<Sys>]) -> BTreeMap<char, RouteEntry<Sys>> {
        routes.iter().map(|r| (r.dest, r.clone())).collect()
    }

    fn dests(routes: &[RouteEntry<Sys>]) -> Vec<char> {
        routes.iter().map(|r| r.dest).collect()
    }

    #[test]
    fn diff_classifies_every_destination() {
        let prev = set(&[route('a', 'a', 10, 1), route('b', 'a', 20, 2), route('c', 'a', 30, 3)]);
        let next = set(&[route('a', 'a', 15, 1), route('b', 'd', 20, 2), route('e', 'a', 30, 2)]);
        let diff = diff_routes(&prev, &next);
        assert_eq!(dests(&diff.updates), vec!['a']);
        assert_eq!(diff.updates[0].metric, Metric::new(15));
        assert_eq!(dests(&diff.removals), vec!['b', 'c']);
        assert_eq!(dests(&diff.additions), vec!['b', 'e']);
        assert_eq!(diff.additions[0].next_hop, 'd');
    }

    #[test]
    fn diff_applied_to_prev_yields_next() {
        let prev = set(&[route('a', 'a', 10, 1), route('b', 'a', 20, 2), route('c', 'c', 10, 1)]);
        let next = set(&[route('a', 'a', 10, 1), route('b', 'c', 20, 2), route('d', 'c', 20, 2)]);
        let diff = diff_routes(&prev, &next);

        let mut applied = prev.clone();
        for removed in &diff.removals {
            applied.remove(&removed.dest);
        }
        for added in diff.additions.iter().chain(&diff.updates) {
            applied.insert(added.dest, added.clone());
        }
        assert_eq!(applied, next);
    }

    #[test]
    fn identical_sets_need_no_route_table_calls() {
        let routes = set(&[route('a', 'a', 10, 1), route('b', 'a', 20, 2)]);
        let diff = diff_routes(&routes, &routes);
        assert!(diff.is_empty());
        assert_eq!(diff.updates.len(), 2);
    }
}
