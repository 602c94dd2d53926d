//! Shared test support: a scripted nameserver and self-signed zone
//! fixtures for exercising the authenticator end to end.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use hickory_proto::op::{Message, Query, ResponseCode};
use hickory_proto::rr::dnssec::rdata::{DNSSECRData, DNSKEY, DS, SIG};
use hickory_proto::rr::dnssec::tbs::rrset_tbs_with_sig;
use hickory_proto::rr::dnssec::{Algorithm, DigestType};
use hickory_proto::rr::rdata::A;
use hickory_proto::rr::{DNSClass, Name, RData, Record, RecordType};
use ring::rand::SystemRandom;
use ring::signature::{
    EcdsaKeyPair, Ed25519KeyPair, KeyPair as _, ECDSA_P256_SHA256_FIXED_SIGNING,
    ECDSA_P384_SHA384_FIXED_SIGNING,
};

use dnsanchor::{LookupError, NameServer};

pub const RECORD_TTL: u32 = 3600;

// ---------------------------------------------------------------------------
// Scripted nameserver

/// Serves canned replies keyed by (owner, rrtype), recording every call.
pub struct MockNameserver {
    label: String,
    fail: Option<FailMode>,
    responses: HashMap<(String, RecordType), Message>,
    calls: Mutex<Vec<(String, RecordType)>>,
}

enum FailMode {
    Transport,
    Rcode(u16),
}

impl MockNameserver {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            fail: None,
            responses: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// A nameserver whose every query fails at the transport level.
    pub fn failing(label: impl Into<String>) -> Self {
        Self {
            fail: Some(FailMode::Transport),
            ..Self::new(label)
        }
    }

    /// A nameserver answering every query with the given error rcode.
    pub fn with_rcode(label: impl Into<String>, rcode: u16) -> Self {
        Self {
            fail: Some(FailMode::Rcode(rcode)),
            ..Self::new(label)
        }
    }

    pub fn respond(mut self, name: &str, rrtype: RecordType, message: Message) -> Self {
        self.responses.insert((canonical(name), rrtype), message);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<(String, RecordType)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl NameServer for MockNameserver {
    async fn query(
        &self,
        name: &str,
        rrtype: RecordType,
    ) -> Result<(Message, Duration), LookupError> {
        let key = (canonical(name), rrtype);
        self.calls.lock().unwrap().push(key.clone());

        match self.fail {
            Some(FailMode::Transport) => {
                return Err(LookupError::Io(format!("{}: scripted failure", self.label)));
            }
            Some(FailMode::Rcode(rcode)) => return Err(LookupError::Rcode(rcode)),
            None => {}
        }
        match self.responses.get(&key) {
            Some(message) => Ok((message.clone(), Duration::from_millis(1))),
            None => Err(LookupError::Io(format!(
                "{}: no scripted answer for {} {rrtype}",
                self.label, key.0
            ))),
        }
    }

    fn label(&self) -> String {
        self.label.clone()
    }
}

fn canonical(name: &str) -> String {
    let trimmed = name.trim_end_matches('.').to_ascii_lowercase();
    format!("{trimmed}.")
}

// ---------------------------------------------------------------------------
// Record and message builders

pub fn name(s: &str) -> Name {
    s.parse().unwrap()
}

pub fn a_record(owner: &str, address: [u8; 4]) -> Record {
    Record::from_rdata(name(owner), RECORD_TTL, RData::A(A(address.into())))
}

/// A NOERROR answer carrying the given question and answer records.
pub fn answer_message(qname: &str, rrtype: RecordType, answers: Vec<Record>) -> Message {
    let mut message = Message::new();
    message.set_response_code(ResponseCode::NoError);
    message.set_recursion_available(true);
    message.set_authentic_data(true);
    message.add_query(Query::query(name(qname), rrtype));
    message.insert_answers(answers);
    message
}

// ---------------------------------------------------------------------------
// Self-signed zone fixtures

enum Signer {
    Ed25519(Ed25519KeyPair),
    Ecdsa(EcdsaKeyPair),
}

impl Signer {
    fn generate(algorithm: Algorithm) -> Self {
        let rng = SystemRandom::new();
        match algorithm {
            Algorithm::ED25519 => {
                let pkcs8 = Ed25519KeyPair::generate_pkcs8(&rng).unwrap();
                Self::Ed25519(Ed25519KeyPair::from_pkcs8(pkcs8.as_ref()).unwrap())
            }
            Algorithm::ECDSAP256SHA256 => {
                let alg = &ECDSA_P256_SHA256_FIXED_SIGNING;
                let pkcs8 = EcdsaKeyPair::generate_pkcs8(alg, &rng).unwrap();
                Self::Ecdsa(EcdsaKeyPair::from_pkcs8(alg, pkcs8.as_ref(), &rng).unwrap())
            }
            Algorithm::ECDSAP384SHA384 => {
                let alg = &ECDSA_P384_SHA384_FIXED_SIGNING;
                let pkcs8 = EcdsaKeyPair::generate_pkcs8(alg, &rng).unwrap();
                Self::Ecdsa(EcdsaKeyPair::from_pkcs8(alg, pkcs8.as_ref(), &rng).unwrap())
            }
            other => panic!("fixture zones do not support {other:?}"),
        }
    }

    /// Public key material in DNSKEY wire form: raw for Ed25519, the
    /// uncompressed point minus its 0x04 prefix for ECDSA.
    fn dnskey_public_bytes(&self) -> Vec<u8> {
        match self {
            Self::Ed25519(key) => key.public_key().as_ref().to_vec(),
            Self::Ecdsa(key) => key.public_key().as_ref()[1..].to_vec(),
        }
    }

    fn sign(&self, data: &[u8]) -> Vec<u8> {
        match self {
            Self::Ed25519(key) => key.sign(data).as_ref().to_vec(),
            Self::Ecdsa(key) => {
                let rng = SystemRandom::new();
                key.sign(&rng, data).unwrap().as_ref().to_vec()
            }
        }
    }
}

pub enum KeyRole {
    Zsk,
    Ksk,
}

/// One fixture zone with a freshly generated KSK/ZSK pair.
pub struct FixtureZone {
    pub zone: Name,
    pub ksk_record: Record,
    pub zsk_record: Record,
    ksk_signer: Signer,
    zsk_signer: Signer,
}

impl FixtureZone {
    pub fn new(zone: &str, ksk_algorithm: Algorithm, zsk_algorithm: Algorithm) -> Self {
        let zone = name(zone);
        let ksk_signer = Signer::generate(ksk_algorithm);
        let zsk_signer = Signer::generate(zsk_algorithm);

        let ksk = DNSKEY::new(
            true,
            true,
            false,
            ksk_algorithm,
            ksk_signer.dnskey_public_bytes(),
        );
        let zsk = DNSKEY::new(
            true,
            false,
            false,
            zsk_algorithm,
            zsk_signer.dnskey_public_bytes(),
        );

        let ksk_record = Record::from_rdata(
            zone.clone(),
            RECORD_TTL,
            RData::DNSSEC(DNSSECRData::DNSKEY(ksk)),
        );
        let zsk_record = Record::from_rdata(
            zone.clone(),
            RECORD_TTL,
            RData::DNSSEC(DNSSECRData::DNSKEY(zsk)),
        );

        Self {
            zone,
            ksk_record,
            zsk_record,
            ksk_signer,
            zsk_signer,
        }
    }

    fn dnskey(&self, role: &KeyRole) -> &DNSKEY {
        let record = match role {
            KeyRole::Zsk => &self.zsk_record,
            KeyRole::Ksk => &self.ksk_record,
        };
        match record.data() {
            Some(RData::DNSSEC(DNSSECRData::DNSKEY(key))) => key,
            _ => unreachable!("fixture records are DNSKEYs"),
        }
    }

    /// Signs `records` with the requested key, valid for +/- one hour.
    pub fn sign(&self, records: &[Record], role: KeyRole) -> Record {
        let now = unix_now();
        self.sign_with_window(records, role, now - 3600, now + 3600)
    }

    /// Signs `records` with an explicit validity window.
    pub fn sign_with_window(
        &self,
        records: &[Record],
        role: KeyRole,
        inception: u32,
        expiration: u32,
    ) -> Record {
        let key = self.dnskey(&role);
        let signer = match role {
            KeyRole::Zsk => &self.zsk_signer,
            KeyRole::Ksk => &self.ksk_signer,
        };

        let owner = records[0].name().clone();
        let template = SIG::new(
            records[0].record_type(),
            key.algorithm(),
            owner.num_labels(),
            RECORD_TTL,
            expiration,
            inception,
            key.calculate_key_tag().unwrap(),
            self.zone.clone(),
            Vec::new(),
        );

        let tbs = rrset_tbs_with_sig(&owner, DNSClass::IN, &template, records).unwrap();
        let signature = signer.sign(tbs.as_ref());

        Record::from_rdata(
            owner,
            RECORD_TTL,
            RData::DNSSEC(DNSSECRData::SIG(template.set_sig(signature))),
        )
    }

    /// The DNSKEY RRset plus its KSK signature, as the zone publishes it.
    pub fn signed_dnskey_rrset(&self) -> Vec<Record> {
        let rrset = vec![self.ksk_record.clone(), self.zsk_record.clone()];
        let rrsig = self.sign(&rrset, KeyRole::Ksk);
        vec![self.ksk_record.clone(), self.zsk_record.clone(), rrsig]
    }

    /// DS record of this zone's KSK, as published at the parent.
    pub fn ds_record(&self, digest_type: DigestType) -> Record {
        Record::from_rdata(
            self.zone.clone(),
            RECORD_TTL,
            RData::DNSSEC(DNSSECRData::DS(self.ds(digest_type))),
        )
    }

    pub fn ds(&self, digest_type: DigestType) -> DS {
        let key = self.dnskey(&KeyRole::Ksk);
        let digest = key.to_digest(&self.zone, digest_type).unwrap();
        DS::new(
            key.calculate_key_tag().unwrap(),
            key.algorithm(),
            digest_type,
            digest.as_ref().to_vec(),
        )
    }
}

pub fn unix_now() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as u32
}

// ---------------------------------------------------------------------------
// A full example.com. -> com. -> . chain

/// The signed chain the scenario tests walk: `test.example.com. A` signed
/// by example.com.'s ZSK, each DNSKEY RRset signed by its zone's KSK,
/// each DS RRset signed by the parent's ZSK, and the root KSK's SHA-512
/// DS as the trust anchor.
pub struct FixtureChain {
    pub example: FixtureZone,
    pub com: FixtureZone,
    pub root: FixtureZone,
    pub a_record: Record,
    pub root_anchor: DS,
}

impl FixtureChain {
    pub fn build() -> Self {
        let example = FixtureZone::new(
            "example.com.",
            Algorithm::ED25519,
            Algorithm::ECDSAP256SHA256,
        );
        let com = FixtureZone::new("com.", Algorithm::ECDSAP384SHA384, Algorithm::ECDSAP384SHA384);
        let root = FixtureZone::new(".", Algorithm::ED25519, Algorithm::ED25519);

        let a_record = a_record("test.example.com.", [1, 1, 1, 1]);
        let root_anchor = root.ds(DigestType::SHA512);

        Self {
            example,
            com,
            root,
            a_record,
            root_anchor,
        }
    }

    /// The signed answer for `test.example.com. A`.
    pub fn signed_answer(&self) -> Message {
        let rrsig = self.example.sign(&[self.a_record.clone()], KeyRole::Zsk);
        answer_message(
            "test.example.com.",
            RecordType::A,
            vec![self.a_record.clone(), rrsig],
        )
    }

    /// A nameserver scripted with every response the chain walk needs.
    pub fn nameserver(&self) -> MockNameserver {
        let example_ds = self.example.ds_record(DigestType::SHA256);
        let example_ds_rrsig = self.com.sign(&[example_ds.clone()], KeyRole::Zsk);

        let com_ds = self.com.ds_record(DigestType::SHA384);
        let com_ds_rrsig = self.root.sign(&[com_ds.clone()], KeyRole::Zsk);

        MockNameserver::new("mock-nameserver")
            .respond("test.example.com.", RecordType::A, self.signed_answer())
            .respond(
                "example.com.",
                RecordType::DNSKEY,
                answer_message(
                    "example.com.",
                    RecordType::DNSKEY,
                    self.example.signed_dnskey_rrset(),
                ),
            )
            .respond(
                "example.com.",
                RecordType::DS,
                answer_message(
                    "example.com.",
                    RecordType::DS,
                    vec![example_ds, example_ds_rrsig],
                ),
            )
            .respond(
                "com.",
                RecordType::DNSKEY,
                answer_message("com.", RecordType::DNSKEY, self.com.signed_dnskey_rrset()),
            )
            .respond(
                "com.",
                RecordType::DS,
                answer_message("com.", RecordType::DS, vec![com_ds, com_ds_rrsig]),
            )
            .respond(
                ".",
                RecordType::DNSKEY,
                answer_message(".", RecordType::DNSKEY, self.root.signed_dnskey_rrset()),
            )
    }
}
