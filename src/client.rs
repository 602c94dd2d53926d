//! Stub client: queries configured recursive nameservers and optionally
//! authenticates the answers locally.

use std::sync::Arc;
use std::time::Duration;

use hickory_proto::op::Message;
use hickory_proto::rr::dnssec::rdata::DS;
use hickory_proto::rr::RecordType;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{debug, info, warn};

use crate::dnssec::root_anchors;
use crate::error::LookupError;
use crate::nameserver::NameServer;
use crate::recursive::RecursiveNameserver;
use crate::trace::{Trace, TraceSink};

/// Default ceiling on the authenticator's recursive parent steps.
pub const DEFAULT_MAX_AUTHENTICATION_DEPTH: u8 = 10;

/// Depth ceiling when the chain is fetched through the local iterative
/// resolver, where each step is far more expensive.
pub const RECURSIVE_MAX_AUTHENTICATION_DEPTH: u8 = 3;

/// A DNS client holding an ordered list of nameservers.
///
/// Each query tries the nameservers once each (in shuffled order by
/// default) and, unless disabled, authenticates the answer against
/// [`root_anchors`] before returning it.
pub struct Client {
    nameservers: Vec<Arc<dyn NameServer>>,

    /// Trust anchors terminating the validation chain. Defaults to the
    /// embedded IANA root anchors.
    pub root_anchors: Vec<DS>,

    /// Fail when a reply is missing the authenticated-data flag.
    pub require_authenticated_data: bool,

    /// Run the local DNSSEC authenticator on every answer.
    pub locally_authenticate: bool,

    /// Shuffle (a copy of) the nameserver list per query.
    pub randomize_nameservers: bool,

    /// Ceiling on the authenticator's recursive parent steps.
    pub max_authentication_depth: u8,

    /// Record a [`Trace`] of each resolution.
    pub enable_trace: bool,

    rng: Mutex<StdRng>,
    trace: Mutex<Option<Arc<Trace>>>,
}

impl Client {
    /// A client with the default configuration: answers must carry the
    /// AD flag and are additionally authenticated locally against the
    /// embedded root anchors.
    pub fn new(nameservers: Vec<Arc<dyn NameServer>>) -> Self {
        Self {
            nameservers,
            root_anchors: root_anchors::embedded(),
            require_authenticated_data: true,
            locally_authenticate: true,
            randomize_nameservers: true,
            max_authentication_depth: DEFAULT_MAX_AUTHENTICATION_DEPTH,
            enable_trace: false,
            rng: Mutex::new(StdRng::from_entropy()),
            trace: Mutex::new(None),
        }
    }

    /// A client backed by the local iterative resolver instead of remote
    /// recursors. Authoritative answers never carry the AD flag, so only
    /// local authentication applies, with a tighter depth ceiling.
    pub fn with_recursive() -> Self {
        let mut client = Self::new(vec![Arc::new(RecursiveNameserver::new())]);
        client.require_authenticated_data = false;
        client.max_authentication_depth = RECURSIVE_MAX_AUTHENTICATION_DEPTH;
        client
    }

    /// Reseeds the shuffle RNG, making nameserver ordering reproducible.
    pub fn seed_rng(&self, seed: u64) {
        *self.rng.lock() = StdRng::seed_from_u64(seed);
    }

    /// Takes the trace recorded by the most recent query, if tracing was
    /// enabled.
    pub fn take_trace(&self) -> Option<Arc<Trace>> {
        self.trace.lock().take()
    }

    /// Resolves `name`/`rrtype` and, per configuration, authenticates
    /// the answer. Returns the reply and the cumulative latency across
    /// the attempted nameservers.
    pub async fn query(
        &self,
        name: &str,
        rrtype: RecordType,
    ) -> Result<(Message, Duration), LookupError> {
        let sink = self.begin_trace();
        let (message, latency) = self.lookup(name, rrtype, &sink).await?;

        if self.locally_authenticate {
            self.authenticate_with_sink(&message, &sink).await?;
        }

        Ok((message, latency))
    }

    /// The plain query path, shared with the authenticator's DNSKEY and
    /// DS lookups (which must not re-enter authentication).
    pub(crate) async fn lookup(
        &self,
        name: &str,
        rrtype: RecordType,
        sink: &TraceSink,
    ) -> Result<(Message, Duration), LookupError> {
        let nameservers = self.shuffled_nameservers();
        if nameservers.is_empty() {
            return Err(LookupError::NoNameservers);
        }

        info!(domain = name, rrtype = %rrtype, "performing dns query");

        let mut total_latency = Duration::ZERO;
        for nameserver in nameservers {
            debug!(nameserver = %nameserver.label(), "nameserver selected");

            let (message, latency) = match nameserver.query(name, rrtype).await {
                Ok(reply) => reply,
                Err(err) => {
                    warn!(
                        nameserver = %nameserver.label(),
                        error = %err,
                        "query attempt failed; any remaining nameservers will still be tried"
                    );
                    continue;
                }
            };
            total_latency += latency;

            if self.require_authenticated_data && !message.authentic_data() {
                warn!(
                    nameserver = %nameserver.label(),
                    "reply is missing the authenticated-data flag"
                );
                return Err(LookupError::NoAuthenticatedData);
            }

            debug!(
                nameserver = %nameserver.label(),
                latency_ms = latency.as_millis() as u64,
                answers = message.answers().len(),
                authenticated_data = message.authentic_data(),
                "answer to query found"
            );
            sink.add_lookup(0, name, rrtype, &nameserver.label(), latency, &message);

            return Ok((message, total_latency));
        }

        warn!(domain = name, "no answer found on any configured nameserver");
        Err(LookupError::NoAnswer)
    }

    /// A shuffled copy of the nameserver list; the client's own list is
    /// never reordered, keeping concurrent queries safe.
    fn shuffled_nameservers(&self) -> Vec<Arc<dyn NameServer>> {
        let mut list = self.nameservers.clone();
        if self.randomize_nameservers && list.len() > 1 {
            list.shuffle(&mut *self.rng.lock());
        }
        list
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

    pub(crate) fn current_trace_sink(&self) -> TraceSink {
        match &*self.trace.lock() {
            Some(trace) => TraceSink::new(trace.clone()),
            None => TraceSink::disabled(),
        }
    }
}
