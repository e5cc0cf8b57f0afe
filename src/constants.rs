use std::time::Duration;

pub(crate) const ICMP_HEADER_LEN: usize = 8;
pub(crate) const MARKER: &[u8; MARKER_LEN] = b"ICMPSWP1";
pub(crate) const MARKER_LEN: usize = 8;
pub(crate) const NONCE_LEN: usize = 8;
pub(crate) const ECHO_PAYLOAD_LEN: usize = MARKER_LEN + NONCE_LEN;
pub(crate) const ECHO_PACK_LEN: usize = ICMP_HEADER_LEN + ECHO_PAYLOAD_LEN;

pub(crate) const TRANSPORT_BUFFER_SIZE: usize = 4096;
pub(crate) const CAPTURE_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub(crate) const DEFAULT_RETRIES: usize = 25;
pub(crate) const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_millis(1000);
pub(crate) const DEFAULT_CONCURRENCY: usize = 256;
pub(crate) const DEFAULT_ROUND_DELAY: Duration = Duration::from_millis(100);
