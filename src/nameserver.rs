//! Nameserver endpoints and the outbound query path.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use hickory_proto::op::{Edns, Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::{Name, RecordType};
use tracing::debug;

use crate::error::LookupError;
use crate::transport;

/// EDNS0 advertised payload size. Signed answers need the headroom over
/// the classic 512-byte limit.
pub(crate) const EDNS_UDP_PAYLOAD_SIZE: u16 = 4096;

const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

static QUERY_ID_COUNTER: AtomicU16 = AtomicU16::new(1);

/// Connection protocol for a nameserver endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Udp,
    Tcp,
    TcpTls,
}

impl Protocol {
    fn scheme(self) -> &'static str {
        match self {
            Self::Udp => "udp",
            Self::Tcp => "tcp",
            Self::TcpTls => "tcp-tls",
        }
    }
}

/// Anything able to answer a DNS question: a concrete endpoint, the local
/// iterative resolver, or a test double.
#[async_trait]
pub trait NameServer: Send + Sync {
    /// Sends one query and returns the reply plus the round-trip time.
    async fn query(
        &self,
        name: &str,
        rrtype: RecordType,
    ) -> Result<(Message, Duration), LookupError>;

    /// Identifier used in logs and trace records.
    fn label(&self) -> String;
}

/// A remote nameserver endpoint. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct Nameserver {
    protocol: Protocol,
    address: IpAddr,
    port: u16,
    sni_domain: Option<String>,
    timeout: Duration,
}

impl Nameserver {
    /// Plain UDP endpoint.
    pub fn udp(address: IpAddr, port: u16) -> Self {
        Self {
            protocol: Protocol::Udp,
            address,
            port,
            sni_domain: None,
            timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }

    /// Plain TCP endpoint.
    pub fn tcp(address: IpAddr, port: u16) -> Self {
        Self {
            protocol: Protocol::Tcp,
            ..Self::udp(address, port)
        }
    }

    /// DNS-over-TLS endpoint. The certificate is verified against
    /// `sni_domain`.
    pub fn tls(address: IpAddr, port: u16, sni_domain: impl Into<String>) -> Self {
        Self {
            protocol: Protocol::TcpTls,
            sni_domain: Some(sni_domain.into()),
            ..Self::udp(address, port)
        }
    }

    /// Overrides the per-attempt timeout (default 5 seconds).
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// `address:port`, with IPv6 literals bracketed.
    pub fn connection_string(&self) -> String {
        match self.address {
            IpAddr::V4(v4) => format!("{}:{}", v4, self.port),
            IpAddr::V6(v6) => format!("[{}]:{}", v6, self.port),
        }
    }

    fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }
}

impl fmt::Display for Nameserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.protocol.scheme(), self.connection_string())?;
        if let Some(domain) = &self.sni_domain {
            write!(f, "#{domain}")?;
        }
        Ok(())
    }
}

#[async_trait]
impl NameServer for Nameserver {
    async fn query(
        &self,
        name: &str,
        rrtype: RecordType,
    ) -> Result<(Message, Duration), LookupError> {
        let owner = canonical_name(name)?;
        let query = build_query(&owner, rrtype);
        let payload = query.to_vec()?;

        debug!(nameserver = %self, domain = %owner, rrtype = %rrtype, "sending query");

        let start = Instant::now();
        let reply = match self.protocol {
            Protocol::Udp => {
                transport::exchange_udp(self.socket_addr(), &payload, self.timeout).await?
            }
            Protocol::Tcp => {
                transport::exchange_tcp(self.socket_addr(), &payload, self.timeout).await?
            }
            Protocol::TcpTls => {
                let domain = self.sni_domain.as_deref().unwrap_or_default();
                transport::exchange_tls(self.socket_addr(), domain, &payload, self.timeout).await?
            }
        };
        let rtt = start.elapsed();

        let message = Message::from_vec(&reply)?;
        if message.response_code() != ResponseCode::NoError {
            return Err(LookupError::Rcode(u16::from(message.response_code())));
        }

        Ok((message, rtt))
    }

    fn label(&self) -> String {
        self.to_string()
    }
}

/// Lowercases the owner and guarantees exactly one trailing dot.
pub(crate) fn canonical_name(name: &str) -> Result<Name, LookupError> {
    let mut name = Name::from_ascii(name.trim_end_matches('.'))
        .map_err(|err| LookupError::Proto(err.to_string()))?
        .to_lowercase();
    name.set_fqdn(true);
    Ok(name)
}

/// Standard query shape for every outbound message: RD set, EDNS0 with a
/// 4096-byte payload and the DO bit, CD clear.
pub(crate) fn build_query(name: &Name, rrtype: RecordType) -> Message {
    let mut message = Message::new();
    message.set_id(QUERY_ID_COUNTER.fetch_add(1, Ordering::Relaxed));
    message.set_message_type(MessageType::Query);
    message.set_op_code(OpCode::Query);
    message.set_recursion_desired(true);
    message.add_query(Query::query(name.clone(), rrtype));

    let mut edns = Edns::new();
    edns.set_version(0);
    edns.set_max_payload(EDNS_UDP_PAYLOAD_SIZE);
    edns.set_dnssec_ok(true);
    message.set_edns(edns);

    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn udp_connection_string() {
        let ns = Nameserver::udp("127.0.0.1".parse().unwrap(), 53);
        assert_eq!(ns.connection_string(), "127.0.0.1:53");
        assert_eq!(ns.to_string(), "udp://127.0.0.1:53");
    }

    #[test]
    fn ipv6_addresses_are_bracketed() {
        let ns = Nameserver::udp("::1".parse().unwrap(), 53);
        assert_eq!(ns.connection_string(), "[::1]:53");
        assert_eq!(ns.to_string(), "udp://[::1]:53");
    }

    #[test]
    fn tls_nameserver_carries_the_sni_domain() {
        let ns = Nameserver::tls("127.0.0.1".parse().unwrap(), 853, "example.com");
        assert_eq!(ns.protocol(), Protocol::TcpTls);
        assert_eq!(ns.to_string(), "tcp-tls://127.0.0.1:853#example.com");
    }

    #[test]
    fn queries_set_rd_and_edns0_with_do() {
        let name = canonical_name("example.com").unwrap();
        let query = build_query(&name, RecordType::A);

        assert!(query.recursion_desired());
        assert_eq!(query.queries().len(), 1);
        assert_eq!(query.queries()[0].name().to_string(), "example.com.");
        assert_eq!(query.queries()[0].query_type(), RecordType::A);

        let edns = query.edns().expect("edns0 must be present");
        assert_eq!(edns.max_payload(), EDNS_UDP_PAYLOAD_SIZE);
        assert!(edns.dnssec_ok());
    }

    #[test]
    fn query_ids_are_unique() {
        let name = canonical_name("example.com").unwrap();
        let first = build_query(&name, RecordType::A);
        let second = build_query(&name, RecordType::A);
        assert_ne!(first.id(), second.id());
    }

    #[test]
    fn names_are_lowercased_and_dot_terminated() {
        for input in ["Example.COM", "example.com.", "EXAMPLE.com"] {
            let name = canonical_name(input).unwrap();
            let text = name.to_string();
            assert_eq!(text, "example.com.");
            assert!(name.is_fqdn());
        }
        assert_eq!(canonical_name(".").unwrap().to_string(), ".");
    }

    #[test]
    fn rrtype_names_match_presentation_format() {
        let cases = [
            (RecordType::A, "A"),
            (RecordType::AAAA, "AAAA"),
            (RecordType::CNAME, "CNAME"),
            (RecordType::DNSKEY, "DNSKEY"),
            (RecordType::DS, "DS"),
            (RecordType::MX, "MX"),
            (RecordType::NS, "NS"),
            (RecordType::PTR, "PTR"),
            (RecordType::RRSIG, "RRSIG"),
            (RecordType::SOA, "SOA"),
            (RecordType::SRV, "SRV"),
            (RecordType::TXT, "TXT"),
        ];
        for (rrtype, expected) in cases {
            assert_eq!(rrtype.to_string(), expected);
        }
    }
}
