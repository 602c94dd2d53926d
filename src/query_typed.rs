//! Per-rrtype query helpers.
//!
//! Each helper submits a query through [`Client::query`] and filters the
//! answer section down to the requested concrete record type. Not DRY,
//! but trivially readable and free of generics gymnastics.

use std::net::{Ipv4Addr, Ipv6Addr};
use std::time::Duration;

use hickory_proto::op::Message;
use hickory_proto::rr::dnssec::rdata::{DNSSECRData, DNSKEY, DS};
use hickory_proto::rr::rdata::{MX, SOA, SRV, TXT};
use hickory_proto::rr::{Name, RData, RecordType};

use crate::client::Client;
use crate::error::LookupError;

impl Client {
    /// Retrieves A records for the given name.
    pub async fn query_a(
        &self,
        name: &str,
    ) -> Result<(Vec<Ipv4Addr>, Message, Duration), LookupError> {
        let (message, latency) = self.query(name, RecordType::A).await?;
        let answers = message
            .answers()
            .iter()
            .filter_map(|record| match record.data() {
                Some(RData::A(address)) => Some(address.0),
                _ => None,
            })
            .collect();
        Ok((answers, message, latency))
    }

    /// Retrieves AAAA records for the given name.
    pub async fn query_aaaa(
        &self,
        name: &str,
    ) -> Result<(Vec<Ipv6Addr>, Message, Duration), LookupError> {
        let (message, latency) = self.query(name, RecordType::AAAA).await?;
        let answers = message
            .answers()
            .iter()
            .filter_map(|record| match record.data() {
                Some(RData::AAAA(address)) => Some(address.0),
                _ => None,
            })
            .collect();
        Ok((answers, message, latency))
    }

    /// Retrieves CNAME records for the given name.
    pub async fn query_cname(
        &self,
        name: &str,
    ) -> Result<(Vec<Name>, Message, Duration), LookupError> {
        let (message, latency) = self.query(name, RecordType::CNAME).await?;
        let answers = message
            .answers()
            .iter()
            .filter_map(|record| match record.data() {
                Some(RData::CNAME(target)) => Some(target.0.clone()),
                _ => None,
            })
            .collect();
        Ok((answers, message, latency))
    }

    /// Retrieves MX records for the given name.
    pub async fn query_mx(&self, name: &str) -> Result<(Vec<MX>, Message, Duration), LookupError> {
        let (message, latency) = self.query(name, RecordType::MX).await?;
        let answers = message
            .answers()
            .iter()
            .filter_map(|record| match record.data() {
                Some(RData::MX(mx)) => Some(mx.clone()),
                _ => None,
            })
            .collect();
        Ok((answers, message, latency))
    }

    /// Retrieves NS records for the given name.
    pub async fn query_ns(&self, name: &str) -> Result<(Vec<Name>, Message, Duration), LookupError> {
        let (message, latency) = self.query(name, RecordType::NS).await?;
        let answers = message
            .answers()
            .iter()
            .filter_map(|record| match record.data() {
                Some(RData::NS(target)) => Some(target.0.clone()),
                _ => None,
            })
            .collect();
        Ok((answers, message, latency))
    }

    /// Retrieves PTR records for the given name.
    pub async fn query_ptr(
        &self,
        name: &str,
    ) -> Result<(Vec<Name>, Message, Duration), LookupError> {
        let (message, latency) = self.query(name, RecordType::PTR).await?;
        let answers = message
            .answers()
            .iter()
            .filter_map(|record| match record.data() {
                Some(RData::PTR(target)) => Some(target.0.clone()),
                _ => None,
            })
            .collect();
        Ok((answers, message, latency))
    }

    /// Retrieves SOA records for the given name.
    pub async fn query_soa(
        &self,
        name: &str,
    ) -> Result<(Vec<SOA>, Message, Duration), LookupError> {
        let (message, latency) = self.query(name, RecordType::SOA).await?;
        let answers = message
            .answers()
            .iter()
            .filter_map(|record| match record.data() {
                Some(RData::SOA(soa)) => Some(soa.clone()),
                _ => None,
            })
            .collect();
        Ok((answers, message, latency))
    }

    /// Retrieves SRV records for the given name.
    pub async fn query_srv(
        &self,
        name: &str,
    ) -> Result<(Vec<SRV>, Message, Duration), LookupError> {
        let (message, latency) = self.query(name, RecordType::SRV).await?;
        let answers = message
            .answers()
            .iter()
            .filter_map(|record| match record.data() {
                Some(RData::SRV(srv)) => Some(srv.clone()),
                _ => None,
            })
            .collect();
        Ok((answers, message, latency))
    }

    /// Retrieves TXT records for the given name.
    pub async fn query_txt(
        &self,
        name: &str,
    ) -> Result<(Vec<TXT>, Message, Duration), LookupError> {
        let (message, latency) = self.query(name, RecordType::TXT).await?;
        let answers = message
            .answers()
            .iter()
            .filter_map(|record| match record.data() {
                Some(RData::TXT(txt)) => Some(txt.clone()),
                _ => None,
            })
            .collect();
        Ok((answers, message, latency))
    }

    /// Retrieves DS records for the given name.
    pub async fn query_ds(&self, name: &str) -> Result<(Vec<DS>, Message, Duration), LookupError> {
        let (message, latency) = self.query(name, RecordType::DS).await?;
        let answers = message
            .answers()
            .iter()
            .filter_map(|record| match record.data() {
                Some(RData::DNSSEC(DNSSECRData::DS(ds))) => Some(ds.clone()),
                _ => None,
            })
            .collect();
        Ok((answers, message, latency))
    }

    /// Retrieves DNSKEY records for the given name.
    pub async fn query_dnskey(
        &self,
        name: &str,
    ) -> Result<(Vec<DNSKEY>, Message, Duration), LookupError> {
        let (message, latency) = self.query(name, RecordType::DNSKEY).await?;
        let answers = message
            .answers()
            .iter()
            .filter_map(|record| match record.data() {
                Some(RData::DNSSEC(DNSSECRData::DNSKEY(key))) => Some(key.clone()),
                _ => None,
            })
            .collect();
        Ok((answers, message, latency))
    }

    /// Queries for any record type and returns the raw answer message.
    pub async fn query_any(&self, name: &str) -> Result<(Message, Duration), LookupError> {
        self.query(name, RecordType::ANY).await
    }
}
