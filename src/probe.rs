use crate::{
    constants::DEFAULT_RESPONSE_TIMEOUT,
    error::{Error, InputBuildError, Result},
};
use std::{future::Future, net::Ipv4Addr, time::Duration};

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct ProbeInput {
    pub target_ip: Ipv4Addr,
    pub sequence: u16,
    pub timeout: Duration,
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default)]
pub struct ProbeInputBuilder {
    target_ip: Option<Ipv4Addr>,
    sequence: Option<u16>,
    timeout: Option<Duration>,
}

impl ProbeInputBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_target_ip(mut self, target_ip: Ipv4Addr) -> Self {
        self.target_ip = Some(target_ip);
        self
    }

    pub fn with_sequence(mut self, sequence: u16) -> Self {
        self.sequence = Some(sequence);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn build(&self) -> std::result::Result<ProbeInput, InputBuildError> {
        let timeout = self.timeout.unwrap_or(DEFAULT_RESPONSE_TIMEOUT);
        if timeout.is_zero() {
            return Err(InputBuildError::ZeroTimeout);
        }
        Ok(ProbeInput {
            target_ip: self.target_ip.ok_or(InputBuildError::MissingTargetIp)?,
            sequence: self.sequence.unwrap_or(1),
            timeout,
        })
    }
}

/// Why a single probe did not confirm its target.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub enum FailureReason {
    Resolve,
    Send,
    Timeout,
    MalformedReply,
    UnmatchedReply,
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub enum ProbeOutcome {
    /// Carries the address to credit, which for a correlated reply is the
    /// reply's source.
    Alive(Ipv4Addr),
    Failed(FailureReason),
}

impl ProbeOutcome {
    pub fn is_alive(&self) -> bool {
        matches!(self, ProbeOutcome::Alive(_))
    }

    pub fn into_result(self) -> Result<Ipv4Addr> {
        match self {
            ProbeOutcome::Alive(addr) => Ok(addr),
            ProbeOutcome::Failed(FailureReason::Timeout) => Err(Error::ResponseTimeout),
            ProbeOutcome::Failed(FailureReason::MalformedReply) => Err(Error::MalformedReply),
            ProbeOutcome::Failed(FailureReason::UnmatchedReply) => Err(Error::UnmatchedReply),
            ProbeOutcome::Failed(FailureReason::Send) => {
                Err(Error::Opaque("failed to send echo request".into()))
            }
            ProbeOutcome::Failed(FailureReason::Resolve) => {
                Err(Error::Opaque("target is not a unicast address".into()))
            }
        }
    }
}

/// Anything able to run one echo round-trip against a target.
///
/// [`crate::client::Client`] is the network implementation; the scanner only
/// depends on this trait.
pub trait Prober: Send + Sync + 'static {
    fn probe(&self, input: ProbeInput) -> impl Future<Output = ProbeOutcome> + Send;
}
