use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use log::debug;
use serde_json::json;

use crate::concepts::metric::Metric;
use crate::concepts::neighbour::{Neighbour, TwoHop};
use crate::config::{MprPolicy, WILLINGNESS_ALWAYS, WILLINGNESS_NEVER};
use crate::framework::RoutingSystem;
use crate::router::Router;
use crate::tuple_base::Handle;

/// A candidate MPR `via` reaching `target` at `metric`
#[derive(Debug, Clone, PartialEq)]
pub struct Coverage<A> {
    /// index of the candidate neighbour
    pub via: usize,
    pub target: A,
    pub metric: Metric,
}

#[derive(Clone, Copy)]
struct Score {
    via: usize,
    degree: u64,
    metric: Metric,
}

impl Score {
    fn cmp_by_degree(&self, other: &Score) -> Ordering {
        self.degree
            .cmp(&other.degree)
            .then_with(|| other.metric.cmp(&self.metric))
    }

    fn cmp_by_metric_per_degree(&self, other: &Score) -> Ordering {
        // a/b < c/d <=> a*d < c*b, greater is better
        let lhs = self.metric.value() as u128 * other.degree as u128;
        let rhs = other.metric.value() as u128 * self.degree as u128;
        rhs.cmp(&lhs).then_with(|| self.degree.cmp(&other.degree))
    }
}

/// Greedy MPR selection.
///
/// `willingness` is indexed by the `via` of the candidates. Candidates willing to ALWAYS relay are selected up
/// front when they cover anything, then candidates are picked by `policy` until every target is covered. Ties go to the lowest index.
pub fn greedy_select<A: Ord + Clone>(
    policy: MprPolicy,
    willingness: &[u8],
    candidates: &[Coverage<A>],
) -> BTreeSet<usize> {
    let mut edges: BTreeMap<(usize, A), Metric> = BTreeMap::new();
    for candidate in candidates {
        edges
            .entry((candidate.via, candidate.target.clone()))
            .and_modify(|metric| *metric = (*metric).min(candidate.metric))
            .or_insert(candidate.metric);
    }
    let mut uncovered: BTreeSet<A> = edges.keys().map(|(_, target)| target.clone()).collect();
    let mut remaining: BTreeSet<usize> = edges.keys().map(|(via, _)| *via).collect();

    // willing to ALWAYS relay, and covering at least one target
    let mut selected: BTreeSet<usize> = remaining
        .iter()
        .copied()
        .filter(|via| willingness.get(*via).is_some_and(|will| *will >= WILLINGNESS_ALWAYS))
        .collect();
    for via in &selected {
        remaining.remove(via);
        for (covering, target) in edges.keys() {
            if covering == via {
                uncovered.remove(target);
            }
        }
    }

    while !uncovered.is_empty() {
        let scores: Vec<Score> = remaining
            .iter()
            .filter_map(|via| {
                let mut degree = 0;
                let mut metric = Metric::new(0);
                for ((covering, target), edge) in &edges {
                    if covering == via && uncovered.contains(target) {
                        degree += 1;
                        metric = metric + *edge;
                    }
                }
                (degree > 0).then_some(Score {
                    via: *via,
                    degree,
                    metric,
                })
            })
            .collect();
        let per_degree = match policy {
            MprPolicy::ByDegree => false,
            MprPolicy::ByMetricPerDegree => true,
            MprPolicy::ByDegreeOrMetric => scores.iter().all(|score| !score.metric.is_undefined()),
        };

        let mut best: Option<Score> = None;
        for score in scores {
            let better = match &best {
                None => true,
                Some(best) if per_degree => score.cmp_by_metric_per_degree(best) == Ordering::Greater,
                Some(best) => score.cmp_by_degree(best) == Ordering::Greater,
            };
            if better {
                best = Some(score);
            }
        }
        let Some(best) = best else {
            break;
        };
        selected.insert(best.via);
        remaining.remove(&best.via);
        uncovered.retain(|target| !edges.contains_key(&(best.via, target.clone())));
    }
    selected
}

impl<T: RoutingSystem + ?Sized> Router<T> {
    /// 2-hop tuples of every symmetric link to the neighbour
    fn symmetric_two_hops(&self, nbr: Handle<Neighbour<T>>) -> impl Iterator<Item = &TwoHop<T>> + '_ {
        self.interfaces
            .iter()
            .flat_map(|itf| itf.links.values())
            .filter(move |link| link.neighbour == Some(nbr) && link.is_symmetric())
            .flat_map(|link| link.two_hops.values())
    }

    /// Recomputes the flooding and routing MPR sets and writes the flags back to the neighbours
    pub(crate) fn select_mprs(&mut self) {
        let symmetric: Vec<(Handle<Neighbour<T>>, &Neighbour<T>)> =
            self.neighbours.iter().filter(|(_, nbr)| nbr.symmetric).collect();
        let candidates: Vec<(Handle<Neighbour<T>>, &Neighbour<T>)> = symmetric
            .iter()
            .filter(|(_, nbr)| nbr.willingness > WILLINGNESS_NEVER)
            .copied()
            .collect();
        let willingness: Vec<u8> = candidates.iter().map(|(_, nbr)| nbr.willingness).collect();

        // direct metric and candidate index of every symmetric neighbour address
        let mut owners: BTreeMap<&T::Address, (Metric, Option<usize>)> = BTreeMap::new();
        for (handle, nbr) in &symmetric {
            let idx = candidates.iter().position(|(h, _)| h == handle);
            for addr in &nbr.addrs {
                owners.insert(addr, (nbr.out_metric, idx));
            }
        }

        let mut flooding = Vec::new();
        for (idx, (handle, nbr)) in candidates.iter().enumerate() {
            for two_hop in self.symmetric_two_hops(*handle) {
                if self.is_local_addr(&two_hop.address) || owners.contains_key(&two_hop.address) {
                    continue;
                }
                flooding.push(Coverage {
                    via: idx,
                    target: two_hop.address.clone(),
                    metric: nbr.out_metric + two_hop.out_metric,
                });
            }
        }
        let flooding_mprs = greedy_select(self.config.flooding_mpr, &willingness, &flooding);

        let routing_mprs = if self.config.uses_link_metric() {
            // cheapest way to reach each candidate, directly or through another candidate
            let mut first_hop: Vec<(Metric, u8)> = candidates.iter().map(|(_, nbr)| (nbr.out_metric, 1)).collect();
            for (handle, relay) in &candidates {
                for two_hop in self.symmetric_two_hops(*handle) {
                    if let Some((_, Some(target))) = owners.get(&two_hop.address) {
                        let cost = (relay.out_metric + two_hop.out_metric, 2);
                        if cost < first_hop[*target] {
                            first_hop[*target] = cost;
                        }
                    }
                }
            }

            let mut cheapest: BTreeMap<T::Address, (Metric, u8, usize)> = BTreeMap::new();
            for (idx, (handle, _)) in candidates.iter().enumerate() {
                let (via_metric, via_hops) = first_hop[idx];
                for two_hop in self.symmetric_two_hops(*handle) {
                    if self.is_local_addr(&two_hop.address) {
                        continue;
                    }
                    let cost = (via_metric + two_hop.out_metric, via_hops + 1);
                    if owners
                        .get(&two_hop.address)
                        .is_some_and(|(direct, _)| *direct <= cost.0)
                    {
                        continue;
                    }
                    let entry = cheapest
                        .entry(two_hop.address.clone())
                        .or_insert((cost.0, cost.1, idx));
                    if cost < (entry.0, entry.1) {
                        *entry = (cost.0, cost.1, idx);
                    }
                }
            }
            let routing: Vec<Coverage<T::Address>> = cheapest
                .into_iter()
                .map(|(target, (metric, _, via))| Coverage { via, target, metric })
                .collect();
            greedy_select(self.config.routing_mpr, &willingness, &routing)
        } else {
            flooding_mprs.clone()
        };

        let handles: Vec<Handle<Neighbour<T>>> = candidates.iter().map(|(handle, _)| *handle).collect();
        self.stats.flooding_mpr_calcs += 1;
        self.stats.routing_mpr_calcs += 1;

        let mut changed = false;
        for (handle, nbr) in self.neighbours.iter_mut() {
            let idx = handles.iter().position(|h| *h == handle);
            let flooding_mpr = idx.is_some_and(|idx| flooding_mprs.contains(&idx));
            let routing_mpr = idx.is_some_and(|idx| routing_mprs.contains(&idx));
            if nbr.flooding_mpr != flooding_mpr || nbr.routing_mpr != routing_mpr {
                nbr.flooding_mpr = flooding_mpr;
                nbr.routing_mpr = routing_mpr;
                changed = true;
            }
        }
        if changed {
            let names = |set: &BTreeSet<usize>| -> Vec<&T::Address> {
                set.iter()
                    .filter_map(|idx| handles.get(*idx))
                    .filter_map(|handle| self.neighbours.get(*handle))
                    .filter_map(|nbr| nbr.router_addr())
                    .collect()
            };
            debug!(
                "MPR sets changed, flooding {} routing {}",
                json!(names(&flooding_mprs)),
                json!(names(&routing_mprs))
            );
        }
    }
}
