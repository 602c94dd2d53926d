//! Embedded root trust anchors.
//!
//! DS records for the root zone KSKs as published by IANA: KSK-2017
//! (key tag 20326) and KSK-2024 (key tag 38696). These are the default
//! chain terminus; callers validating against a locally maintained
//! anchor file can replace them on the client.

use hickory_proto::rr::dnssec::rdata::DS;
use hickory_proto::rr::dnssec::{Algorithm, DigestType};

const KSK_2017_KEY_TAG: u16 = 20326;
const KSK_2017_DIGEST: &str = "e06d44b80b8f1d39a95c0b0d7c65d08458e880409bbc683457104237c7f8ec8d";

const KSK_2024_KEY_TAG: u16 = 38696;
const KSK_2024_DIGEST: &str = "683d2d0acb8c9b712a1948b27f741219298d0a450d612c483af444a4c0fb2b16";

/// The embedded root anchors, newest first.
pub fn embedded() -> Vec<DS> {
    vec![
        ds(KSK_2024_KEY_TAG, KSK_2024_DIGEST),
        ds(KSK_2017_KEY_TAG, KSK_2017_DIGEST),
    ]
}

fn ds(key_tag: u16, digest: &str) -> DS {
    DS::new(
        key_tag,
        Algorithm::RSASHA256,
        DigestType::SHA256,
        hex::decode(digest).expect("embedded anchor digest is valid hex"),
    )
}
