//! Recursive chain validation from an answer's zone up to the root.

use std::future::Future;
use std::pin::Pin;
use std::time::{SystemTime, UNIX_EPOCH};

use hickory_proto::op::Message;
use hickory_proto::rr::dnssec::rdata::{DNSSECRData, DS};
use hickory_proto::rr::{Name, RData, Record, RecordType};
use tracing::{debug, error, info};

use super::{signature_sets, DnssecError, SignatureSet};
use crate::client::Client;
use crate::error::LookupError;
use crate::trace::{
    DelegationSignerCheckStep, KeyType, SignatureValidationStep, TraceSink, TraceStep,
};

type AuthFuture<'a> = Pin<Box<dyn Future<Output = Result<(), LookupError>> + Send + 'a>>;

/// State threaded through the recursive chain steps.
#[derive(Clone)]
pub(crate) struct AuthContext {
    depth: u8,
    initial_domain: Name,
    trace: TraceSink,
}

impl AuthContext {
    fn deeper(&self) -> Self {
        Self {
            depth: self.depth + 1,
            initial_domain: self.initial_domain.clone(),
            trace: self.trace.clone(),
        }
    }
}

impl Client {
    /// Verifies the DNSSEC chain for `message`: every answer RRset back
    /// to its zone keys, each zone key to the parent's DS RRset, and the
    /// root zone's key to the configured trust anchors.
    ///
    /// The DNSKEY and DS lookups the chain needs go through this
    /// client's own nameserver selection.
    pub async fn authenticate(&self, message: &Message) -> Result<(), LookupError> {
        let sink = self.current_trace_sink();
        self.authenticate_with_sink(message, &sink).await
    }

    pub(crate) async fn authenticate_with_sink(
        &self,
        message: &Message,
        sink: &TraceSink,
    ) -> Result<(), LookupError> {
        let ctx = AuthContext {
            depth: 0,
            initial_domain: question_name(message),
            trace: sink.clone(),
        };
        self.authenticate_at(message, ctx).await
    }

    fn authenticate_at<'a>(&'a self, message: &'a Message, ctx: AuthContext) -> AuthFuture<'a> {
        Box::pin(async move {
            if ctx.depth >= self.max_authentication_depth {
                return Err(DnssecError::MaxDepthReached(self.max_authentication_depth).into());
            }

            let domain = question_name(message);
            info!(
                domain = %domain,
                origin = %ctx.initial_domain,
                depth = ctx.depth,
                "authenticating answer"
            );

            let key_signature_sets = self.authenticate_zone_signing_key(message, &ctx).await?;

            for set in &key_signature_sets {
                let zone = set.signer_name().to_lowercase();
                if zone.is_root() {
                    // Terminus: the root KSK must hash to a configured anchor.
                    info!(zone = %zone, "checking key signing key against the root anchors");
                    let Some(digest) = matching_ds_digest(set, self.root_anchors.iter()) else {
                        error!(zone = %zone, "no configured anchor matches the root key signing key");
                        return Err(DnssecError::DsMismatchAtRoot.into());
                    };
                    info!(digest = %digest, "key signing key authenticated at the root");
                    ctx.trace
                        .add(TraceStep::DelegationSignerCheck(DelegationSignerCheckStep {
                            depth: ctx.depth,
                            child: domain.to_string(),
                            parent: zone.to_string(),
                            digest,
                        }));
                    return Ok(());
                }

                // The zone's KSK must be vouched for by the parent via the
                // DS RRset published for this zone.
                info!(zone = %zone, "checking key signing key against the parent DS");
                let (ds_message, _) = self
                    .lookup(&zone.to_string(), RecordType::DS, &ctx.trace)
                    .await?;

                let answers = ds_records(ds_message.answers());
                let Some(digest) = matching_ds_digest(set, answers.into_iter()) else {
                    error!(zone = %zone, "no DS record at the parent matches the key signing key");
                    return Err(DnssecError::DsMismatchAtParent.into());
                };
                info!(zone = %zone, digest = %digest, "key signing key authenticated at the parent");
                ctx.trace
                    .add(TraceStep::DelegationSignerCheck(DelegationSignerCheckStep {
                        depth: ctx.depth,
                        child: domain.to_string(),
                        parent: zone.to_string(),
                        digest,
                    }));

                // Continue upward: the DS answer itself is signed by the
                // parent zone.
                return self.authenticate_at(&ds_message, ctx.deeper()).await;
            }

            Err(DnssecError::NoSignatureSets.into())
        })
    }

    /// The ZSK and KSK steps: verify every answer RRset with the zone's
    /// ZSK, then the zone's DNSKEY RRset with its KSK. Returns the
    /// verified KSK signature sets for the DS chain step.
    async fn authenticate_zone_signing_key(
        &self,
        message: &Message,
        ctx: &AuthContext,
    ) -> Result<Vec<SignatureSet>, LookupError> {
        let domain = question_name(message);
        let zone_sets = signature_sets(message.answers())?;

        info!(
            domain = %domain,
            signatures = zone_sets.len(),
            depth = ctx.depth,
            "authenticating zone's zsk and ksk"
        );

        let mut verified_key_sets = Vec::new();
        for mut set in zone_sets {
            let zone = set.signer_name().to_lowercase().to_string();
            let (keys_message, _) = self.lookup(&zone, RecordType::DNSKEY, &ctx.trace).await?;
            let key_records = dnskey_records(keys_message.answers());

            for record in &key_records {
                if set.add_key(record, KeyType::Zsk) {
                    break;
                }
            }
            self.verify_set(&set, KeyType::Zsk, &domain, ctx)?;

            // The DNSKEY RRset carries its own signature, made with the KSK.
            let key_sets = signature_sets(keys_message.answers())?;
            for mut key_set in key_sets {
                for record in &key_records {
                    if key_set.add_key(record, KeyType::Ksk) {
                        break;
                    }
                }
                self.verify_set(&key_set, KeyType::Ksk, &domain, ctx)?;
                verified_key_sets.push(key_set);
            }
        }

        Ok(verified_key_sets)
    }

    fn verify_set(
        &self,
        set: &SignatureSet,
        key_type: KeyType,
        domain: &Name,
        ctx: &AuthContext,
    ) -> Result<(), LookupError> {
        if !set.has_key() {
            error!(
                zone = %set.signer_name(),
                key_tag = set.key_tag(),
                "no {key_type} in the zone's DNSKEY RRset matches the signature"
            );
            return Err(DnssecError::NoMatchingKey {
                signature: set.display().to_string(),
            }
            .into());
        }

        let result = set.verify(unix_now());

        ctx.trace
            .add(TraceStep::SignatureValidation(SignatureValidationStep {
                depth: ctx.depth,
                key_type,
                domain: domain.to_string(),
                zone: set.signer_name().to_string(),
                key: set.key_display(),
                key_digest: set.key_sha256_digest(),
                algorithm: set
                    .key()
                    .map(|key| key.algorithm().to_string())
                    .unwrap_or_default(),
                signature: set.display().to_string(),
                records: set.records(),
                error: result.as_ref().err().map(ToString::to_string),
            }));

        match result {
            Ok(()) => {
                debug!(
                    flag = %key_type,
                    zone = %set.signer_name(),
                    signature = set.display(),
                    "signature verified"
                );
                Ok(())
            }
            Err(err) => {
                error!(flag = %key_type, zone = %set.signer_name(), error = %err, "signature verification failed");
                Err(DnssecError::VerificationFailed {
                    signature: set.display().to_string(),
                    source: Box::new(err),
                }
                .into())
            }
        }
    }
}

/// Finds the first DS whose (key tag, algorithm, digest) triple matches
/// the set's key, hashing the key under each candidate's digest type.
/// Digests are compared as bytes, which makes the hex comparison
/// case-insensitive by construction. Returns the matched digest as
/// lowercase hex.
fn matching_ds_digest<'a>(
    set: &SignatureSet,
    candidates: impl Iterator<Item = &'a DS>,
) -> Option<String> {
    let key = set.key()?;
    let owner = set.key_record()?.name().to_lowercase();
    let key_tag = key.calculate_key_tag().ok()?;

    for candidate in candidates {
        if candidate.key_tag() != key_tag || candidate.algorithm() != key.algorithm() {
            continue;
        }
        let Ok(digest) = key.to_digest(&owner, candidate.digest_type()) else {
            continue;
        };
        if digest.as_ref() == candidate.digest() {
            return Some(hex::encode(digest.as_ref()));
        }
    }
    None
}

fn ds_records(records: &[Record]) -> Vec<&DS> {
    records
        .iter()
        .filter_map(|record| match record.data() {
            Some(RData::DNSSEC(DNSSECRData::DS(ds))) => Some(ds),
            _ => None,
        })
        .collect()
}

fn dnskey_records(records: &[Record]) -> Vec<Record> {
    records
        .iter()
        .filter(|record| {
            matches!(
                record.data(),
                Some(RData::DNSSEC(DNSSECRData::DNSKEY(_)))
            )
        })
        .cloned()
        .collect()
}

fn question_name(message: &Message) -> Name {
    message
        .queries()
        .first()
        .map(|query| query.name().to_lowercase())
        .unwrap_or_else(Name::root)
}

fn unix_now() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as u32
}
