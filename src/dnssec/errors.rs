use thiserror::Error;

/// Failures raised while authenticating a signed answer against the
/// configured trust anchors. Every variant is fatal to the resolution
/// that triggered it; none are retried.
#[derive(Error, Debug)]
pub enum DnssecError {
    #[error("maximum authentication depth of {0} reached")]
    MaxDepthReached(u8),

    #[error(
        "no RRSIG records found. this might indicate that DNSSEC is not enabled for this \
         domain, or that the nameserver used does not return RRSIG records"
    )]
    NoRrsigRecords,

    #[error("[{record}] was unable to be assigned to any RRSIG")]
    UnassignedRecord { record: String },

    #[error("{signature} does not have a matching key")]
    NoMatchingKey { signature: String },

    #[error("signature outside of the allowed inception or expiration range")]
    SignatureOutsideValidity,

    #[error("bad signature")]
    BadSignature,

    #[error("unable to verify {signature}; received {source}")]
    VerificationFailed {
        signature: String,
        source: Box<DnssecError>,
    },

    #[error("unable to find a matching DS digest at the root")]
    DsMismatchAtRoot,

    #[error("unable to find a matching DS digest at the parent")]
    DsMismatchAtParent,

    #[error("no signature sets found, unable to validate")]
    NoSignatureSets,
}
