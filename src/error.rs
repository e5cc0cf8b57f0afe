use thiserror::Error as ThisError;

pub type OpaqueError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(ThisError, Debug)]
pub enum Error {
    #[error("invalid IPv4 range `{0}`")]
    InvalidRange(String),
    #[error("socket error: {0}")]
    Socket(#[source] std::io::Error),
    #[error("raw ICMP socket requires elevated privileges (run as root or grant CAP_NET_RAW)")]
    InsufficientPrivilege,
    #[error("no IPv4 address found for interface {0}")]
    NoLocalAddress(String),
    #[error("Response timeout")]
    ResponseTimeout,
    #[error("malformed ICMP reply")]
    MalformedReply,
    #[error("ICMP reply does not match any outstanding request")]
    UnmatchedReply,
    #[error("{0}")]
    Opaque(#[from] OpaqueError),
}

pub type Result<T> = std::result::Result<T, Error>;

#[allow(clippy::enum_variant_names)]
#[derive(ThisError, Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum InputBuildError {
    #[error("target IP address is required")]
    MissingTargetIp,
    #[error("response timeout must be non-zero")]
    ZeroTimeout,
}
