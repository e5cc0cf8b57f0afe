//! Discovers live hosts on a local IPv4 subnet with ICMP echo sweeps.
//!
//! A [`Client`] owns one raw ICMP socket and correlates replies to requests by
//! source address and a per-request nonce. A [`Scanner`] sweeps an
//! [`AddressRange`] in several rounds with a bounded number of probes in
//! flight, skipping hosts that already answered.
//!
//! ## Example
//! ```no_run
//! use async_icmp_sweep::{local, Client, ClientConfigBuilder, ScanConfigBuilder, Scanner};
//! use std::sync::Arc;
//!
//! tokio_test::block_on(async {
//!     let ip = local::interface_ipv4("eth0").unwrap();
//!     let client = Client::new(ClientConfigBuilder::new().build()).unwrap();
//!     let scanner = Scanner::new(Arc::new(client), ScanConfigBuilder::new().build().unwrap());
//!     let report = scanner.scan_cidr(&local::subnet_cidr(ip)).await.unwrap();
//!     for host in report.hosts() {
//!         println!("{}", host);
//!     }
//! })
//! ```

pub mod alive;
pub mod client;
pub mod correlation;
pub mod error;
pub mod local;
pub mod probe;
pub mod range;
pub mod scan;

pub(crate) mod capture;
pub(crate) mod constants;
pub(crate) mod notification;
pub(crate) mod response;

pub use alive::AliveSet;
pub use client::{Client, ClientConfig, ClientConfigBuilder};
pub use correlation::{EchoToken, NonceCorrelator, ReplyCorrelator};
pub use error::{Error, InputBuildError, Result};
pub use probe::{FailureReason, ProbeInput, ProbeInputBuilder, ProbeOutcome, Prober};
pub use range::AddressRange;
pub use scan::{ScanConfig, ScanConfigBuilder, ScanReport, Scanner};
