//! Iterative resolution: walking the delegation hierarchy from the root
//! servers down to an authoritative answer.

use std::collections::HashMap;
use std::future::Future;
use std::net::{IpAddr, Ipv4Addr};
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use hickory_proto::op::Message;
use hickory_proto::rr::{Name, RData, RecordType};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::LookupError;
use crate::nameserver::{canonical_name, NameServer, Nameserver};
use crate::trace::{Trace, TraceSink};

/// Ceiling on outbound transport calls per top-level resolution.
pub const DEFAULT_MAX_QUERY_COUNT: u8 = 30;

/// The thirteen IANA root servers (IPv4).
const ROOT_SERVERS: [(&str, Ipv4Addr); 13] = [
    ("a.root-servers.net.", Ipv4Addr::new(198, 41, 0, 4)),
    ("b.root-servers.net.", Ipv4Addr::new(170, 247, 170, 2)),
    ("c.root-servers.net.", Ipv4Addr::new(192, 33, 4, 12)),
    ("d.root-servers.net.", Ipv4Addr::new(199, 7, 91, 13)),
    ("e.root-servers.net.", Ipv4Addr::new(192, 203, 230, 10)),
    ("f.root-servers.net.", Ipv4Addr::new(192, 5, 5, 241)),
    ("g.root-servers.net.", Ipv4Addr::new(192, 112, 36, 4)),
    ("h.root-servers.net.", Ipv4Addr::new(198, 97, 190, 53)),
    ("i.root-servers.net.", Ipv4Addr::new(192, 36, 148, 17)),
    ("j.root-servers.net.", Ipv4Addr::new(192, 58, 128, 30)),
    ("k.root-servers.net.", Ipv4Addr::new(193, 0, 14, 129)),
    ("l.root-servers.net.", Ipv4Addr::new(199, 7, 83, 42)),
    ("m.root-servers.net.", Ipv4Addr::new(202, 12, 27, 33)),
];

/// Builds endpoints for nameservers learned during a walk.
pub type EndpointFactory = Box<dyn Fn(IpAddr, u16) -> Arc<dyn NameServer> + Send + Sync>;

type WalkFuture<'a> = Pin<Box<dyn Future<Output = Result<Message, LookupError>> + Send + 'a>>;

/// A nameserver that answers queries by walking the delegation
/// hierarchy itself, starting at the root servers, instead of trusting
/// an upstream recursor.
///
/// Delegations learned along the way are cached in a zone tree for the
/// lifetime of this instance; answers themselves are never cached.
pub struct RecursiveNameserver {
    zones: tokio::sync::Mutex<ZoneTree>,

    /// Transport-call budget per top-level resolution.
    pub max_query_count: u8,

    /// Record a [`Trace`] of each resolution.
    pub enable_trace: bool,

    trace: Mutex<Option<Arc<Trace>>>,
    factory: EndpointFactory,
}

impl RecursiveNameserver {
    pub fn new() -> Self {
        Self::with_endpoint_factory(Box::new(|address, port| {
            Arc::new(Nameserver::udp(address, port))
        }))
    }

    /// Overrides how endpoints for resolver-learned nameservers are
    /// constructed (the default is unencrypted UDP).
    pub fn with_endpoint_factory(factory: EndpointFactory) -> Self {
        let mut tree = ZoneTree::new();
        for (hostname, address) in ROOT_SERVERS {
            let hostname = Name::from_ascii(hostname).expect("root server hostname is valid");
            tree.node_mut(ZoneTree::ROOT)
                .ns
                .insert(hostname, Some(factory(IpAddr::V4(address), 53)));
        }

        Self {
            zones: tokio::sync::Mutex::new(tree),
            max_query_count: DEFAULT_MAX_QUERY_COUNT,
            enable_trace: false,
            trace: Mutex::new(None),
            factory,
        }
    }

    /// Takes the trace recorded by the most recent query, if tracing was
    /// enabled.
    pub fn take_trace(&self) -> Option<Arc<Trace>> {
        self.trace.lock().take()
    }

    fn begin_trace(&self) -> TraceSink {
        let mut slot = self.trace.lock();
        if self.enable_trace {
            let trace = Arc::new(Trace::new());
            *slot = Some(trace.clone());
            TraceSink::new(trace)
        } else {
            *slot = None;
            TraceSink::disabled()
        }
    }

    /// Walks zone `zone` for `(name, rrtype)`: known-address nameservers
    /// first, then nameservers whose addresses must themselves be
    /// resolved from the root.
    fn resolve_zone<'a>(
        &'a self,
        zones: &'a mut ZoneTree,
        zone: usize,
        name: &'a Name,
        rrtype: RecordType,
        ctx: &'a mut WalkContext,
    ) -> WalkFuture<'a> {
        Box::pin(async move {
            let known: Vec<(Name, Arc<dyn NameServer>)> = zones
                .node(zone)
                .ns
                .iter()
                .filter_map(|(hostname, endpoint)| {
                    endpoint
                        .as_ref()
                        .map(|endpoint| (hostname.clone(), endpoint.clone()))
                })
                .collect();

            for (hostname, endpoint) in known {
                match self
                    .query_nameserver(zones, zone, &hostname, endpoint, name, rrtype, ctx)
                    .await
                {
                    Ok(message) if !message.answers().is_empty() => return Ok(message),
                    Err(err) if err.is_hard() => return Err(err),
                    Ok(_) => {}
                    Err(err) => {
                        debug!(hostname = %hostname, error = %err, "nameserver yielded no answer");
                    }
                }
            }

            // The rest are hostnames from earlier referrals that came
            // without glue; resolve each from the root before use.
            let unknown: Vec<Name> = zones
                .node(zone)
                .ns
                .iter()
                .filter(|(_, endpoint)| endpoint.is_none())
                .map(|(hostname, _)| hostname.clone())
                .collect();

            for hostname in unknown {
                let root = zones.root_of(zone);
                let address = match self
                    .resolve_zone(zones, root, &hostname, RecordType::A, ctx)
                    .await
                {
                    Ok(message) => first_a_record(&message),
                    Err(err) if err.is_hard() => return Err(err),
                    Err(err) => {
                        warn!(hostname = %hostname, error = %err, "unable to resolve nameserver address");
                        continue;
                    }
                };
                let Some(address) = address else { continue };

                let endpoint = (self.factory)(IpAddr::V4(address), 53);
                zones
                    .node_mut(zone)
                    .ns
                    .insert(hostname.clone(), Some(endpoint.clone()));

                match self
                    .query_nameserver(zones, zone, &hostname, endpoint, name, rrtype, ctx)
                    .await
                {
                    Ok(message) if !message.answers().is_empty() => return Ok(message),
                    Err(err) if err.is_hard() => return Err(err),
                    _ => {}
                }
            }

            Err(LookupError::AnswerNotFound)
        })
    }

    /// One transport call against one nameserver, plus referral
    /// bookkeeping and descent into matching child zones.
    #[allow(clippy::too_many_arguments)]
    fn query_nameserver<'a>(
        &'a self,
        zones: &'a mut ZoneTree,
        zone: usize,
        hostname: &'a Name,
        endpoint: Arc<dyn NameServer>,
        name: &'a Name,
        rrtype: RecordType,
        ctx: &'a mut WalkContext,
    ) -> WalkFuture<'a> {
        Box::pin(async move {
            if ctx.queries >= self.max_query_count {
                warn!(max = self.max_query_count, "query budget exhausted");
                return Err(LookupError::MaxQueryCount(self.max_query_count));
            }
            ctx.queries += 1;

            debug!(
                hostname = %hostname,
                endpoint = %endpoint.label(),
                domain = %name,
                rrtype = %rrtype,
                depth = ctx.depth,
                queries = ctx.queries,
                "querying nameserver"
            );

            let (message, latency) = endpoint.query(&name.to_string(), rrtype).await?;

            ctx.trace.add_lookup(
                ctx.depth,
                &name.to_string(),
                rrtype,
                &format!("{hostname} ({})", endpoint.label()),
                latency,
                &message,
            );

            if !message.answers().is_empty() {
                return Ok(message);
            }

            // An authoritative server with nothing to say is definitive.
            if message.authoritative() {
                return Err(LookupError::RecordDoesNotExist);
            }

            // A referral: the authority section names the child zones and
            // their nameservers, the additional section may carry glue.
            for record in message.name_servers() {
                let Some(RData::NS(target)) = record.data() else {
                    continue;
                };
                let child_zone = record.name().to_lowercase();
                let child = zones.ensure_child(zone, &child_zone);
                zones
                    .node_mut(child)
                    .ns
                    .entry(target.0.to_lowercase())
                    .or_insert(None);
            }

            for record in message.additionals() {
                let Some(RData::A(address)) = record.data() else {
                    continue;
                };
                let owner = record.name().to_lowercase();
                let children: Vec<usize> = zones.node(zone).children.values().copied().collect();
                for child in children {
                    if let Some(slot) = zones.node_mut(child).ns.get_mut(&owner) {
                        // First glue address wins.
                        if slot.is_none() {
                            *slot = Some((self.factory)(IpAddr::V4(address.0), 53));
                        }
                    }
                }
            }

            // Descend into every child zone whose name suffixes the
            // queried name.
            let children: Vec<(Name, usize)> = zones
                .node(zone)
                .children
                .iter()
                .map(|(child_name, &child)| (child_name.clone(), child))
                .collect();

            for (child_name, child) in children {
                if !child_name.zone_of(name) {
                    continue;
                }
                ctx.depth += 1;
                let result = self.resolve_zone(zones, child, name, rrtype, ctx).await;
                ctx.depth -= 1;
                match result {
                    Ok(message) if !message.answers().is_empty() => return Ok(message),
                    Err(err) if err.is_hard() => return Err(err),
                    _ => {}
                }
            }

            Err(LookupError::AnswerNotFound)
        })
    }
}

impl Default for RecursiveNameserver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NameServer for RecursiveNameserver {
    async fn query(
        &self,
        name: &str,
        rrtype: RecordType,
    ) -> Result<(Message, Duration), LookupError> {
        let start = Instant::now();
        let owner = canonical_name(name)?;

        info!(domain = %owner, rrtype = %rrtype, "starting iterative resolution");

        let mut ctx = WalkContext {
            queries: 0,
            depth: 0,
            trace: self.begin_trace(),
        };

        let mut zones = self.zones.lock().await;
        let message = self
            .resolve_zone(&mut zones, ZoneTree::ROOT, &owner, rrtype, &mut ctx)
            .await?;

        Ok((message, start.elapsed()))
    }

    fn label(&self) -> String {
        "local iterative resolver".to_string()
    }
}

/// Counters and the trace handle threaded through one walk.
struct WalkContext {
    queries: u8,
    depth: u8,
    trace: TraceSink,
}

/// Delegations learned during walks. Parent and child links are arena
/// indices into one vector, so upward and downward traversal needs no
/// reference cycles.
struct ZoneTree {
    nodes: Vec<ZoneNode>,
}

#[derive(Default)]
struct ZoneNode {
    parent: Option<usize>,
    children: HashMap<Name, usize>,
    /// NS hostname -> endpoint; `None` until glue or a lookup provides
    /// the address.
    ns: HashMap<Name, Option<Arc<dyn NameServer>>>,
}

impl ZoneTree {
    const ROOT: usize = 0;

    fn new() -> Self {
        Self {
            nodes: vec![ZoneNode::default()],
        }
    }

    fn node(&self, index: usize) -> &ZoneNode {
        &self.nodes[index]
    }

    fn node_mut(&mut self, index: usize) -> &mut ZoneNode {
        &mut self.nodes[index]
    }

    /// Follows parent links up to the root node.
    fn root_of(&self, mut index: usize) -> usize {
        while let Some(parent) = self.nodes[index].parent {
            index = parent;
        }
        index
    }

    fn ensure_child(&mut self, parent: usize, name: &Name) -> usize {
        if let Some(&child) = self.nodes[parent].children.get(name) {
            return child;
        }
        let child = self.nodes.len();
        self.nodes.push(ZoneNode {
            parent: Some(parent),
            ..ZoneNode::default()
        });
        self.nodes[parent].children.insert(name.clone(), child);
        child
    }
}

fn first_a_record(message: &Message) -> Option<Ipv4Addr> {
    message.answers().iter().find_map(|record| match record.data() {
        Some(RData::A(address)) => Some(address.0),
        _ => None,
    })
}
