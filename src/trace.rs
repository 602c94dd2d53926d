//! Step-by-step record of a resolution, for inspection or pretty-printing.
//!
//! A fresh [`Trace`] is created at the start of each top-level query; the
//! steps appear in the causal order of the events that produced them.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use hickory_proto::op::Message;
use hickory_proto::rr::{Record, RecordType};
use parking_lot::Mutex;

/// Ordered, append-only collection of [`TraceStep`]s.
#[derive(Debug, Default)]
pub struct Trace {
    steps: Mutex<Vec<TraceStep>>,
}

impl Trace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, step: TraceStep) {
        self.steps.lock().push(step);
    }

    /// Snapshot of the recorded steps, in insertion order.
    pub fn steps(&self) -> Vec<TraceStep> {
        self.steps.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.steps.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.lock().is_empty()
    }
}

/// One recorded event during a resolution.
#[derive(Debug, Clone)]
pub enum TraceStep {
    Lookup(LookupStep),
    SignatureValidation(SignatureValidationStep),
    DelegationSignerCheck(DelegationSignerCheckStep),
}

/// A single outbound query and the reply it produced.
#[derive(Debug, Clone)]
pub struct LookupStep {
    pub depth: u8,
    pub domain: String,
    pub rrtype: String,
    pub nameserver: String,
    pub latency: Duration,
    pub answers: Vec<String>,
    pub authorities: Vec<String>,
    pub additionals: Vec<String>,
    pub authoritative: bool,
    pub truncated: bool,
}

/// One RRSIG checked against a zone key.
#[derive(Debug, Clone)]
pub struct SignatureValidationStep {
    pub depth: u8,
    pub key_type: KeyType,
    pub domain: String,
    pub zone: String,
    pub key: String,
    /// SHA-256 DS digest of the key, lowercase hex.
    pub key_digest: String,
    pub algorithm: String,
    pub signature: String,
    pub records: Vec<String>,
    pub error: Option<String>,
}

impl SignatureValidationStep {
    pub fn valid(&self) -> bool {
        self.error.is_none()
    }
}

/// A child zone's KSK digest matched against the parent's DS RRset (or
/// the configured anchors, when the parent is the root).
#[derive(Debug, Clone)]
pub struct DelegationSignerCheckStep {
    pub depth: u8,
    pub child: String,
    pub parent: String,
    /// The matched digest, lowercase hex.
    pub digest: String,
}

/// Which key role an RRSIG was checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    Zsk,
    Ksk,
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Zsk => write!(f, "zsk"),
            Self::Ksk => write!(f, "ksk"),
        }
    }
}

/// Shared handle to the trace of the resolution in flight. A sink without
/// a trace behind it silently drops every add.
#[derive(Debug, Clone, Default)]
pub(crate) struct TraceSink(Option<Arc<Trace>>);

impl TraceSink {
    pub(crate) fn new(trace: Arc<Trace>) -> Self {
        Self(Some(trace))
    }

    pub(crate) fn disabled() -> Self {
        Self(None)
    }

    pub(crate) fn add(&self, step: TraceStep) {
        if let Some(trace) = &self.0 {
            trace.add(step);
        }
    }

    pub(crate) fn add_lookup(
        &self,
        depth: u8,
        domain: &str,
        rrtype: RecordType,
        nameserver: &str,
        latency: Duration,
        message: &Message,
    ) {
        if self.0.is_none() {
            return;
        }
        self.add(TraceStep::Lookup(LookupStep {
            depth,
            domain: domain.to_string(),
            rrtype: rrtype.to_string(),
            nameserver: nameserver.to_string(),
            latency,
            answers: rrset_to_strings(message.answers()),
            authorities: rrset_to_strings(message.name_servers()),
            additionals: rrset_to_strings(message.additionals()),
            authoritative: message.authoritative(),
            truncated: message.truncated(),
        }));
    }
}

/// Presentation strings for a record set, tabs flattened to spaces.
pub(crate) fn rrset_to_strings(records: &[Record]) -> Vec<String> {
    records.iter().map(record_to_string).collect()
}

pub(crate) fn record_to_string(record: &Record) -> String {
    tabs_to_spaces(&record.to_string())
}

/// The wire library's presentation format separates fields with tabs,
/// which reads poorly in structured logs.
pub(crate) fn tabs_to_spaces(s: &str) -> String {
    s.replace('\t', " ")
}
