use hickory_proto::rr::dnssec::rdata::{DNSSECRData, DNSKEY, RRSIG, SIG};
use hickory_proto::rr::dnssec::{DigestType, Verifier};
use hickory_proto::rr::{DNSClass, Name, RData, Record};

use super::errors::DnssecError;
use super::{DNSKEY_FLAGS_KSK, DNSKEY_FLAGS_ZSK};
use crate::trace::{record_to_string, rrset_to_strings, KeyType};

/// One RRSIG, the DNSKEY that should validate it, and the records the
/// signature covers.
///
/// A sealed set pairs a ZSK with ordinary record sets and a KSK with
/// DNSKEY record sets; [`SignatureSet::add_key`] enforces the pairing.
#[derive(Debug)]
pub(crate) struct SignatureSet {
    signature: SIG,
    display: String,
    key: Option<Record>,
    records: Vec<Record>,
}

/// Partitions an answer section into signature sets.
///
/// Every RRSIG seeds an empty set; every other record is offered to every
/// set and adopted by those whose covered type, signer zone, and label
/// count all match. A record no set adopts fails the whole partition.
pub(crate) fn signature_sets(rrset: &[Record]) -> Result<Vec<SignatureSet>, DnssecError> {
    let mut sets = Vec::new();
    let mut answers = Vec::new();

    for record in rrset {
        match record.data() {
            Some(RData::DNSSEC(DNSSECRData::SIG(signature))) => sets.push(SignatureSet {
                signature: signature.clone(),
                display: record_to_string(record),
                key: None,
                records: Vec::new(),
            }),
            _ => answers.push(record),
        }
    }

    if sets.is_empty() {
        return Err(DnssecError::NoRrsigRecords);
    }

    for record in answers {
        let mut assigned = false;
        for set in &mut sets {
            assigned = set.add_record(record) || assigned;
        }
        if !assigned {
            return Err(DnssecError::UnassignedRecord {
                record: record_to_string(record),
            });
        }
    }

    Ok(sets)
}

impl SignatureSet {
    pub(crate) fn signer_name(&self) -> &Name {
        self.signature.signer_name()
    }

    pub(crate) fn key_tag(&self) -> u16 {
        self.signature.key_tag()
    }

    /// Presentation form of the RRSIG record, tabs flattened.
    pub(crate) fn display(&self) -> &str {
        &self.display
    }

    pub(crate) fn records(&self) -> Vec<String> {
        rrset_to_strings(&self.records)
    }

    pub(crate) fn key(&self) -> Option<&DNSKEY> {
        match self.key.as_ref()?.data() {
            Some(RData::DNSSEC(DNSSECRData::DNSKEY(key))) => Some(key),
            _ => None,
        }
    }

    pub(crate) fn key_record(&self) -> Option<&Record> {
        self.key.as_ref()
    }

    pub(crate) fn key_display(&self) -> String {
        self.key.as_ref().map(record_to_string).unwrap_or_default()
    }

    /// SHA-256 DS digest of the matched key, lowercase hex.
    pub(crate) fn key_sha256_digest(&self) -> String {
        let Some(record) = &self.key else {
            return String::new();
        };
        let Some(key) = self.key() else {
            return String::new();
        };
        key.to_digest(&record.name().to_lowercase(), DigestType::SHA256)
            .map(|digest| hex::encode(digest.as_ref()))
            .unwrap_or_default()
    }

    fn add_record(&mut self, record: &Record) -> bool {
        if record.record_type() != self.signature.type_covered() {
            return false;
        }
        if !self.signature.signer_name().zone_of(record.name()) {
            return false;
        }
        // Label counts must match exactly; wildcard expansion is not
        // supported here.
        if record.name().num_labels() != self.signature.num_labels() {
            return false;
        }
        self.records.push(record.clone());
        true
    }

    /// Seals the set with `record` when it is a DNSKEY of the requested
    /// role whose key tag matches the RRSIG. Exact flags comparison, so
    /// revoked keys never match.
    pub(crate) fn add_key(&mut self, record: &Record, role: KeyType) -> bool {
        let Some(RData::DNSSEC(DNSSECRData::DNSKEY(key))) = record.data() else {
            return false;
        };
        let wanted_flags = match role {
            KeyType::Zsk => DNSKEY_FLAGS_ZSK,
            KeyType::Ksk => DNSKEY_FLAGS_KSK,
        };
        if key.flags() != wanted_flags {
            return false;
        }
        let Ok(tag) = key.calculate_key_tag() else {
            return false;
        };
        if tag != self.signature.key_tag() {
            return false;
        }
        self.key = Some(record.clone());
        true
    }

    pub(crate) fn has_key(&self) -> bool {
        self.key.is_some()
    }

    /// Checks the validity window, then verifies the signature over the
    /// canonical wire form of the covered records.
    pub(crate) fn verify(&self, now: u32) -> Result<(), DnssecError> {
        let key = self.key().ok_or_else(|| DnssecError::NoMatchingKey {
            signature: self.display.clone(),
        })?;

        if now < self.signature.sig_inception() || now > self.signature.sig_expiration() {
            return Err(DnssecError::SignatureOutsideValidity);
        }

        let owner = self
            .records
            .first()
            .map(|record| record.name().clone())
            .unwrap_or_else(|| self.signature.signer_name().clone());

        let rrsig = RRSIG::new(
            self.signature.type_covered(),
            self.signature.algorithm(),
            self.signature.num_labels(),
            self.signature.original_ttl(),
            self.signature.sig_expiration(),
            self.signature.sig_inception(),
            self.signature.key_tag(),
            self.signature.signer_name().clone(),
            self.signature.sig().to_vec(),
        );

        key.verify_rrsig(&owner, DNSClass::IN, &rrsig, &self.records)
            .map_err(|_| DnssecError::BadSignature)
    }
}
