use std::collections::BTreeMap;
use std::time::Duration;

use olsr::concepts::metric::Metric;
use olsr::concepts::packet::{
    Hello, HelloNeighbour, LinkStatusValue, LocalAddress, Message, MessageHeader, NbrAddrType, Packet, Tc,
    TcAddress,
};
use olsr::concepts::route::RouteEntry;
use olsr::config::{Config, LinkMetricType, WILLINGNESS_DEFAULT};
use olsr::feedback::RouteTableError;
use olsr::framework::{RouteTable, RoutingSystem};
use olsr::metric_file::MetricFile;
use olsr::router::Router;
use olsr::util::increment;
use serde::{Deserialize, Serialize};

pub const ITF: &str = "wlan0";
pub const STEP: Duration = Duration::from_millis(100);

pub fn init_logging() {
    let _ = simplelog::TestLogger::init(simplelog::LevelFilter::Debug, simplelog::Config::default());
}

pub fn test_config() -> Config {
    Config {
        link_metric: LinkMetricType::Static,
        ..Config::with_intervals(Duration::from_secs(2), Duration::from_secs(5))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RouteOp {
    Add(RouteEntry<VirtualSystem>),
    Delete(RouteEntry<VirtualSystem>),
}

/// Route table sink that remembers every call
#[derive(Default)]
pub struct RecordingTable {
    pub ops: Vec<RouteOp>,
    pub reject: bool,
}

impl RouteTable<VirtualSystem> for RecordingTable {
    fn add_route(&mut self, route: &RouteEntry<VirtualSystem>) -> Result<(), RouteTableError> {
        if self.reject {
            return Err(RouteTableError::Rejected(format!("no route to {}", route.dest)));
        }
        self.ops.push(RouteOp::Add(route.clone()));
        Ok(())
    }

    fn delete_route(&mut self, route: &RouteEntry<VirtualSystem>) -> Result<(), RouteTableError> {
        if self.reject {
            return Err(RouteTableError::Unavailable);
        }
        self.ops.push(RouteOp::Delete(route.clone()));
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualEdge {
    pub id: i32,
    pub a: String,
    pub b: String,
    pub metric: u32,
    pub up: bool,
}

impl VirtualEdge {
    fn other(&self, node: &str) -> Option<&str> {
        if self.a == node {
            Some(&self.b)
        } else if self.b == node {
            Some(&self.a)
        } else {
            None
        }
    }
}

/// Routers sharing a lossless broadcast medium, one single-address interface each
#[derive(Serialize, Deserialize)]
pub struct VirtualSystem {
    pub routers: Vec<Router<VirtualSystem>>,
    pub edges: Vec<VirtualEdge>,
    pub now: Duration,
    pub packet_seqnums: BTreeMap<String, u16>,
}

impl VirtualSystem {
    pub fn create(nodes: &[&str], edges: &[(i32, &str, &str, u32)]) -> VirtualSystem {
        Self::with_config(nodes, edges, test_config())
    }

    pub fn with_config(nodes: &[&str], edges: &[(i32, &str, &str, u32)], config: Config) -> VirtualSystem {
        let routers = nodes
            .iter()
            .enumerate()
            .map(|(idx, node)| {
                let mut router = Router::with_seed(config.clone(), idx as u64).unwrap();
                router.add_interface(Duration::ZERO, ITF.to_string(), vec![node.to_string()]);
                router
            })
            .collect();
        let edges = edges
            .iter()
            .map(|(id, a, b, metric)| VirtualEdge {
                id: *id,
                a: a.to_string(),
                b: b.to_string(),
                metric: *metric,
                up: true,
            })
            .collect();
        let mut system = VirtualSystem {
            routers,
            edges,
            now: Duration::ZERO,
            packet_seqnums: BTreeMap::new(),
        };
        system.sync_metrics();
        system
    }

    fn sync_metrics(&mut self) {
        for router in &mut self.routers {
            let Some(name) = router.originator.clone() else {
                continue;
            };
            let mut file = MetricFile::default();
            for edge in &self.edges {
                if let Some(other) = edge.other(&name) {
                    file.insert(other.to_string(), name.clone(), Metric::new(edge.metric));
                }
            }
            router.set_static_metrics(file);
        }
    }

    pub fn update_edge(&mut self, edge_id: i32, metric: u32) {
        for edge in self.edges.iter_mut().filter(|e| e.id == edge_id) {
            edge.metric = metric;
        }
        self.sync_metrics();
    }

    pub fn set_edge_up(&mut self, edge_id: i32, up: bool) {
        for edge in self.edges.iter_mut().filter(|e| e.id == edge_id) {
            edge.up = up;
        }
    }

    /// Index into `routers`, stable even after the router loses its originator
    pub fn index_of(&self, node: &str) -> usize {
        self.routers
            .iter()
            .position(|r| r.originator.as_deref() == Some(node))
            .unwrap_or_else(|| panic!("No node {node} found"))
    }

    pub fn node(&self, node: &str) -> &Router<Self> {
        &self.routers[self.index_of(node)]
    }

    pub fn get_node(&mut self, node: &str) -> &mut Router<Self> {
        let idx = self.index_of(node);
        &mut self.routers[idx]
    }

    pub fn route(&self, cur: &str, dest: &str) -> &RouteEntry<Self> {
        self.node(cur)
            .routes()
            .get(dest)
            .unwrap_or_else(|| panic!("No route found from {cur} to {dest}"))
    }

    pub fn has_route(&self, cur: &str, dest: &str) -> bool {
        self.node(cur).routes().contains_key(dest)
    }

    pub fn get_next_hop(&self, cur: &str, dest: &str) -> String {
        self.route(cur, dest).next_hop.clone()
    }

    pub fn get_metric_to(&self, cur: &str, dest: &str) -> u32 {
        self.route(cur, dest).metric.value()
    }

    pub fn get_dist_to(&self, cur: &str, dest: &str) -> u8 {
        self.route(cur, dest).dist
    }

    pub fn take_route_ops(&mut self, node: &str) -> Vec<RouteOp> {
        std::mem::take(&mut self.get_node(node).route_table.ops)
    }

    /// Advances time by one step: timers fire, then every message sent is delivered over the edges that are up
    pub fn step(&mut self) {
        self.now += STEP;
        let now = self.now;
        let mut sent = Vec::new();
        for router in &mut self.routers {
            router.tick(now);
            let from = router.originator.clone().unwrap_or_default();
            for out in router.drain_outbound() {
                sent.push((from.clone(), out.message));
            }
        }
        let itf = ITF.to_string();
        for (from, message) in sent {
            let seqnum = self.packet_seqnums.entry(from.clone()).or_default();
            increment(seqnum);
            let packet = Packet {
                seqnum: Some(*seqnum),
                messages: vec![message],
            };
            let receivers: Vec<String> = self
                .edges
                .iter()
                .filter(|e| e.up)
                .filter_map(|e| e.other(&from))
                .map(str::to_string)
                .collect();
            for receiver in receivers {
                let router = self
                    .routers
                    .iter_mut()
                    .find(|r| r.originator.as_deref() == Some(receiver.as_str()));
                if let Some(router) = router {
                    router.handle_packet(now, &itf, &from, &packet);
                }
            }
        }
    }

    pub fn run_for(&mut self, duration: Duration) {
        let until = self.now + duration;
        while self.now < until {
            self.step();
        }
    }

    /// Long enough for a handful of TC rounds on small graphs
    pub fn converge(&mut self) {
        self.run_for(Duration::from_secs(40));
    }

    pub fn freeze(&self) -> String {
        serde_json::to_string(&self).unwrap()
    }

    pub fn restore(state: String) -> VirtualSystem {
        serde_json::from_str(&state).unwrap()
    }
}

impl RoutingSystem for VirtualSystem {
    type Address = String;
    type InterfaceId = String;
    type RouteTable = RecordingTable;
}

/// Standalone router with a single interface, for feeding hand-made messages
pub fn lone_router(name: &str) -> Router<VirtualSystem> {
    let mut router = Router::with_seed(test_config(), 0).unwrap();
    router.add_interface(Duration::ZERO, ITF.to_string(), vec![name.to_string()]);
    router
}

pub fn hello(from: &str, neighbours: Vec<HelloNeighbour<VirtualSystem>>) -> Packet<VirtualSystem> {
    Packet {
        seqnum: None,
        messages: vec![Message::Hello(Hello {
            header: MessageHeader {
                originator: Some(from.to_string()),
                seqnum: Some(1),
                hop_limit: Some(1),
                hop_count: Some(0),
            },
            validity_time: Duration::from_secs(6),
            interval_time: Some(Duration::from_secs(2)),
            willingness: Some(WILLINGNESS_DEFAULT),
            local_addrs: vec![LocalAddress {
                address: from.to_string(),
                this_if: true,
            }],
            neighbours,
        })],
    }
}

pub fn listed(address: &str, status: LinkStatusValue) -> HelloNeighbour<VirtualSystem> {
    HelloNeighbour {
        link_status: Some(status),
        ..HelloNeighbour::new(address.to_string())
    }
}

pub fn tc(from: &str, seqnum: u16, ansn: u16, advertised: &[&str]) -> Packet<VirtualSystem> {
    Packet {
        seqnum: None,
        messages: vec![Message::Tc(Tc {
            header: MessageHeader {
                originator: Some(from.to_string()),
                seqnum: Some(seqnum),
                hop_limit: Some(10),
                hop_count: Some(0),
            },
            validity_time: Duration::from_secs(15),
            interval_time: Some(Duration::from_secs(5)),
            ansn: Some(ansn),
            complete: true,
            advertised: advertised
                .iter()
                .map(|address| TcAddress {
                    address: address.to_string(),
                    kind: NbrAddrType::RoutableOrig,
                    metric: Some(Metric::DEFAULT),
                })
                .collect(),
            gateways: Vec::new(),
        })],
    }
}
