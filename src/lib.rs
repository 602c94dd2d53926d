//! DNS resolution with local DNSSEC validation.
//!
//! This crate answers DNS queries either through configured recursive
//! nameservers (UDP, TCP, or DNS-over-TLS) or by walking the delegation
//! hierarchy itself from the root servers, and can cryptographically
//! validate every answer against the IANA root trust anchors instead of
//! trusting an upstream resolver's AD bit.
//!
//! ```no_run
//! use dnsanchor::{Client, Nameserver};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), dnsanchor::LookupError> {
//! let client = Client::new(vec![Arc::new(Nameserver::tls(
//!     "8.8.8.8".parse().unwrap(),
//!     853,
//!     "dns.google",
//! ))]);
//!
//! let (answers, _msg, _latency) = client.query_a("example.com").await?;
//! for answer in answers {
//!     println!("{answer}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod dnssec;
pub mod error;
pub mod nameserver;
pub mod recursive;
pub mod trace;

mod query_typed;
mod transport;

pub use client::Client;
pub use error::LookupError;
pub use nameserver::{NameServer, Nameserver, Protocol};
pub use recursive::RecursiveNameserver;
pub use trace::{Trace, TraceStep};

/// Re-export of the underlying wire-format library, so callers can build
/// and inspect messages without a separate dependency.
pub use hickory_proto as proto;
