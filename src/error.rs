use thiserror::Error;

use crate::dnssec::DnssecError;

/// Errors surfaced while resolving a query.
///
/// Failures split into two classes: *hard* errors abort an entire
/// iterative walk, everything else is *soft* and lets the caller move on
/// to the next candidate nameserver.
#[derive(Error, Debug)]
pub enum LookupError {
    #[error("io error: {0}")]
    Io(String),

    #[error("message error: {0}")]
    Proto(String),

    #[error("query error returned (rcode {0})")]
    Rcode(u16),

    #[error("no nameservers set")]
    NoNameservers,

    #[error("resolver dnssec authentication failed")]
    NoAuthenticatedData,

    #[error("no answer found on any configured nameserver")]
    NoAnswer,

    #[error("unable to find answer")]
    AnswerNotFound,

    #[error("max allowed query count of {0} reached")]
    MaxQueryCount(u8),

    #[error("record does not exist")]
    RecordDoesNotExist,

    #[error(transparent)]
    Dnssec(#[from] DnssecError),
}

impl LookupError {
    /// Hard errors stop an iterative walk outright; soft errors mean the
    /// next candidate nameserver may still produce an answer.
    pub fn is_hard(&self) -> bool {
        matches!(self, Self::MaxQueryCount(_) | Self::RecordDoesNotExist)
    }
}

impl From<std::io::Error> for LookupError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<hickory_proto::error::ProtoError> for LookupError {
    fn from(err: hickory_proto::error::ProtoError) -> Self {
        Self::Proto(err.to_string())
    }
}
