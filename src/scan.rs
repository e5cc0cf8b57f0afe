use std::{collections::BTreeMap, net::Ipv4Addr, sync::Arc, time::Duration};

use log::{debug, warn};
use tokio::sync::Semaphore;

use crate::{
    alive::AliveSet,
    constants::{
        DEFAULT_CONCURRENCY, DEFAULT_RESPONSE_TIMEOUT, DEFAULT_RETRIES, DEFAULT_ROUND_DELAY,
    },
    error::{InputBuildError, Result},
    probe::{FailureReason, ProbeInput, ProbeOutcome, Prober},
    range::AddressRange,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanConfig {
    /// Extra sweeps after the first one; `0` means exactly one round.
    pub retries: usize,
    pub response_timeout: Duration,
    /// Upper bound on probes in flight at any moment.
    pub concurrency: usize,
    /// Pause after a round has issued all its probes. Longer delays lower the
    /// burst rate and give slow hosts time to answer, at the cost of scan time.
    pub round_delay: Duration,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            retries: DEFAULT_RETRIES,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            concurrency: DEFAULT_CONCURRENCY,
            round_delay: DEFAULT_ROUND_DELAY,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScanConfigBuilder {
    config: ScanConfig,
}

impl ScanConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retries(mut self, retries: usize) -> Self {
        self.config.retries = retries;
        self
    }

    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.config.response_timeout = timeout;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.config.concurrency = concurrency;
        self
    }

    pub fn with_round_delay(mut self, delay: Duration) -> Self {
        self.config.round_delay = delay;
        self
    }

    /// Zero concurrency is clamped to one.
    pub fn build(self) -> std::result::Result<ScanConfig, InputBuildError> {
        if self.config.response_timeout.is_zero() {
            return Err(InputBuildError::ZeroTimeout);
        }
        Ok(ScanConfig {
            concurrency: self.config.concurrency.max(1),
            ..self.config
        })
    }
}

#[derive(Debug)]
pub struct ScanReport {
    pub alive: AliveSet,
    pub rounds: usize,
    pub probes_issued: usize,
    pub failures: BTreeMap<FailureReason, usize>,
}

impl ScanReport {
    /// Alive hosts in ascending numeric order.
    pub fn hosts(&self) -> Vec<Ipv4Addr> {
        self.alive.finalize()
    }
}

/// Sweeps an address range in rounds, probing every address not yet known to
/// be alive.
///
/// # Example
/// ```no_run
/// use async_icmp_sweep::{Client, ClientConfigBuilder, ScanConfigBuilder, Scanner};
/// use std::sync::Arc;
///
/// tokio_test::block_on(async {
///     let client = Client::new(ClientConfigBuilder::new().build()).unwrap();
///     let config = ScanConfigBuilder::new().with_retries(5).build().unwrap();
///     let scanner = Scanner::new(Arc::new(client), config);
///     let report = scanner.scan_cidr("192.168.1.0/24").await.unwrap();
///     for host in report.hosts() {
///         println!("{}", host);
///     }
/// })
/// ```
#[derive(Debug)]
pub struct Scanner<P> {
    prober: Arc<P>,
    config: ScanConfig,
}

impl<P: Prober> Scanner<P> {
    pub fn new(prober: Arc<P>, config: ScanConfig) -> Self {
        Self { prober, config }
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Enumerates `cidr` and scans it.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidRange`] before any probe is sent if
    /// `cidr` is not valid IPv4 CIDR notation.
    pub async fn scan_cidr(&self, cidr: &str) -> Result<ScanReport> {
        let range = AddressRange::parse(cidr)?;
        Ok(self.scan(&range).await)
    }

    /// Runs `retries + 1` rounds over `range` and waits for every probe to
    /// finish before returning.
    ///
    /// Round `r + 1` starts once round `r` has issued all its probes and the
    /// round delay has elapsed; probes of consecutive rounds may overlap.
    pub async fn scan(&self, range: &AddressRange) -> ScanReport {
        let rounds = self.config.retries + 1;
        let alive = Arc::new(AliveSet::new());
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut handles = Vec::new();

        if !range.is_empty() {
            for round in 0..rounds {
                let sequence = (round + 1) as u16;
                let mut issued = 0;
                for &target_ip in range {
                    if alive.contains(&target_ip) {
                        continue;
                    }
                    // The semaphore is never closed.
                    let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                        break;
                    };
                    if alive.contains(&target_ip) {
                        continue;
                    }

                    let input = ProbeInput {
                        target_ip,
                        sequence,
                        timeout: self.config.response_timeout,
                    };
                    let prober = Arc::clone(&self.prober);
                    let alive = Arc::clone(&alive);
                    handles.push(tokio::spawn(async move {
                        let outcome = prober.probe(input).await;
                        if let ProbeOutcome::Alive(addr) = outcome {
                            if alive.insert_if_absent(addr) {
                                debug!("{} is alive (round {})", addr, sequence);
                            }
                        }
                        drop(permit);
                        outcome
                    }));
                    issued += 1;
                }
                debug!(
                    "round {}/{} issued {} probes, {} hosts alive so far",
                    round + 1,
                    rounds,
                    issued,
                    alive.len()
                );
                if round + 1 < rounds {
                    tokio::time::sleep(self.config.round_delay).await;
                }
            }
        }

        let probes_issued = handles.len();
        let mut failures = BTreeMap::new();
        for result in futures::future::join_all(handles).await {
            match result {
                Ok(ProbeOutcome::Alive(_)) => {}
                Ok(ProbeOutcome::Failed(reason)) => *failures.entry(reason).or_insert(0) += 1,
                Err(err) => warn!("probe task failed, reason: {}", err),
            }
        }

        let alive = Arc::try_unwrap(alive).unwrap_or_else(|shared| {
            let copy = AliveSet::new();
            for addr in shared.finalize() {
                copy.insert_if_absent(addr);
            }
            copy
        });
        ScanReport {
            alive,
            rounds: if range.is_empty() { 0 } else { rounds },
            probes_issued,
            failures,
        }
    }
}
