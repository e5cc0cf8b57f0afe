use pnet::{
    packet::{icmp::IcmpPacket, ip::IpNextHeaderProtocols},
    transport::{self, TransportChannelType, TransportProtocol, TransportSender},
};

use log::{debug, error};
use std::{
    fmt,
    io::ErrorKind,
    net::{IpAddr, Ipv4Addr},
    sync::Arc,
    time::Duration,
};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use tokio_util::sync::CancellationToken;

use crate::{
    capture::spawn_capture,
    constants::{CAPTURE_POLL_INTERVAL, TRANSPORT_BUFFER_SIZE},
    correlation::{NonceCorrelator, ReplyCorrelator},
    error::{Error, Result},
    notification::{await_verdict, NotificationHandler},
    probe::{FailureReason, ProbeInput, ProbeOutcome, Prober},
    response::Listener,
};

const CHANNEL_TYPE_ICMP: TransportChannelType =
    TransportChannelType::Layer4(TransportProtocol::Ipv4(IpNextHeaderProtocols::Icmp));

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub identifier: u16,
    pub buffer_size: usize,
    pub capture_poll_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct ClientConfigBuilder {
    identifier: u16,
    buffer_size: usize,
    capture_poll_interval: Duration,
}

impl Default for ClientConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientConfigBuilder {
    /// Starts from the low 16 bits of the process id as ICMP identifier.
    pub fn new() -> Self {
        Self {
            identifier: (std::process::id() & 0xffff) as u16,
            buffer_size: TRANSPORT_BUFFER_SIZE,
            capture_poll_interval: CAPTURE_POLL_INTERVAL,
        }
    }

    pub fn with_identifier(mut self, identifier: u16) -> Self {
        self.identifier = identifier;
        self
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    pub fn with_capture_poll_interval(mut self, interval: Duration) -> Self {
        self.capture_poll_interval = interval;
        self
    }

    pub fn build(self) -> ClientConfig {
        ClientConfig {
            identifier: self.identifier,
            buffer_size: self.buffer_size,
            capture_poll_interval: self.capture_poll_interval,
        }
    }
}

/// A client for sending ICMP echo requests and correlating their replies.
///
/// The `Client` owns one raw ICMP socket shared by every probe. A background
/// capture thread reads the socket and a listener task routes each reply to
/// the probe waiting for it, matching on source address and nonce.
///
/// # Example
/// ```no_run
/// use async_icmp_sweep::{Client, ClientConfigBuilder};
///
/// tokio_test::block_on(async {
///     let client = Client::new(ClientConfigBuilder::new().build())
///         .expect("Failed to create ICMP client");
/// })
/// ```
pub struct Client {
    sender: Mutex<TransportSender>,
    correlator: Arc<dyn ReplyCorrelator>,

    notification_handler: Arc<NotificationHandler>,
    _task_spawner: BackgroundTaskSpawner,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("correlator", &self.correlator)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Creates a new `Client` using the nonce correlator.
    ///
    /// Must be called from within a tokio runtime, which drives the reply
    /// listener.
    ///
    /// # Errors
    /// Returns [`Error::InsufficientPrivilege`] if the process may not open raw
    /// sockets, or [`Error::Socket`] for any other socket failure.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let correlator = Arc::new(NonceCorrelator::new(config.identifier));
        Self::with_correlator(config, correlator)
    }

    pub fn with_correlator(
        config: ClientConfig,
        correlator: Arc<dyn ReplyCorrelator>,
    ) -> Result<Self> {
        let channel = transport::transport_channel(config.buffer_size, CHANNEL_TYPE_ICMP);
        let (sender, receiver) = channel.map_err(|err| match err.kind() {
            ErrorKind::PermissionDenied => Error::InsufficientPrivilege,
            _ => Error::Socket(err),
        })?;

        let notification_handler = Arc::new(NotificationHandler::new());
        let (packets_tx, packets_rx) = mpsc::unbounded_channel();

        let mut task_spawner = BackgroundTaskSpawner::new();
        task_spawner.spawn_capture(receiver, config.capture_poll_interval, packets_tx);
        task_spawner.spawn_listener(Listener::new(
            packets_rx,
            Arc::clone(&correlator),
            Arc::clone(&notification_handler),
        ));

        Ok(Self {
            sender: Mutex::new(sender),
            correlator,
            notification_handler,
            _task_spawner: task_spawner,
        })
    }

    /// Sends one echo request to `input.target_ip` and waits up to
    /// `input.timeout` for its reply.
    ///
    /// Replies that are malformed or carry a stale nonce do not end the wait;
    /// they only decide the failure reason reported if no matching reply
    /// arrives in time.
    ///
    /// # Example
    /// ```no_run
    /// use async_icmp_sweep::{Client, ClientConfigBuilder, ProbeInputBuilder, ProbeOutcome};
    /// use std::net::Ipv4Addr;
    ///
    /// let probe_input = ProbeInputBuilder::new()
    ///     .with_target_ip(Ipv4Addr::new(192, 168, 1, 1))
    ///     .build()
    ///     .expect("Failed to build probe input");
    /// tokio_test::block_on(async {
    ///     let client = Client::new(ClientConfigBuilder::new().build()).unwrap();
    ///     match client.probe(probe_input).await {
    ///         ProbeOutcome::Alive(ip) => println!("{} is alive", ip),
    ///         ProbeOutcome::Failed(reason) => println!("no reply: {:?}", reason),
    ///     }
    /// })
    /// ```
    pub async fn probe(&self, input: ProbeInput) -> ProbeOutcome {
        let target_ip = input.target_ip;
        if target_ip.is_unspecified() || target_ip.is_broadcast() || target_ip.is_multicast() {
            return ProbeOutcome::Failed(FailureReason::Resolve);
        }

        let token = self.correlator.issue(input.sequence);
        let request = match self.correlator.encode_request(&token) {
            Ok(request) => request,
            Err(err) => {
                debug!(
                    "failed to build echo request for {}, reason: {}",
                    target_ip, err
                );
                return ProbeOutcome::Failed(FailureReason::Send);
            }
        };

        let Some(mut verdicts) = self
            .notification_handler
            .register_waiter(target_ip, token.nonce)
            .await
        else {
            debug!("reply listener is gone, not sending to {}", target_ip);
            return ProbeOutcome::Failed(FailureReason::Send);
        };
        let outcome = match self.send(&request, target_ip).await {
            Ok(()) => await_verdict(&mut verdicts, input.timeout).await,
            Err(err) => {
                debug!(
                    "failed to send echo request to {}, reason: {}",
                    target_ip, err
                );
                ProbeOutcome::Failed(FailureReason::Send)
            }
        };
        self.notification_handler
            .deregister(&target_ip, token.nonce)
            .await;
        outcome
    }

    async fn send(&self, request: &[u8], target_ip: Ipv4Addr) -> Result<()> {
        let packet = IcmpPacket::new(request)
            .ok_or(Error::Opaque("failed to view echo request packet".into()))?;
        self.sender
            .lock()
            .await
            .send_to(packet, IpAddr::V4(target_ip))
            .map_err(Error::Socket)?;
        Ok(())
    }
}

impl Prober for Client {
    fn probe(&self, input: ProbeInput) -> impl std::future::Future<Output = ProbeOutcome> + Send {
        Client::probe(self, input)
    }
}

#[derive(Debug)]
struct BackgroundTaskSpawner {
    token: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl BackgroundTaskSpawner {
    fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            handles: Vec::new(),
        }
    }

    fn spawn_capture(
        &mut self,
        receiver: transport::TransportReceiver,
        poll_interval: Duration,
        packets: mpsc::UnboundedSender<crate::response::CapturedPacket>,
    ) {
        self.handles.push(spawn_capture(
            receiver,
            poll_interval,
            self.token.clone(),
            packets,
        ));
    }

    fn spawn_listener(&mut self, mut listener: Listener) {
        let token = self.token.clone();
        let handle = tokio::task::spawn(async move {
            tokio::select! {
                result = listener.listen() => {
                    if let Err(err) = result {
                        error!("reply listener exited, reason: {}", err);
                    }
                },
                _ = token.cancelled() => {
                }
            }
        });
        self.handles.push(handle);
    }
}

impl Drop for BackgroundTaskSpawner {
    fn drop(&mut self) {
        if !self.handles.is_empty() {
            self.token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use crate::{
        client::{Client, ClientConfigBuilder},
        error::Error,
        probe::{ProbeInputBuilder, ProbeOutcome},
    };

    #[test]
    fn test_config_builder() {
        let config = ClientConfigBuilder::new()
            .with_identifier(0x1234)
            .with_buffer_size(1500)
            .build();
        assert_eq!(config.identifier, 0x1234);
        assert_eq!(config.buffer_size, 1500);
    }

    #[tokio::test]
    async fn test_unprobeable_targets_fail_without_sending() {
        // Without raw socket privileges there is nothing further to check.
        let client = match Client::new(ClientConfigBuilder::new().build()) {
            Ok(client) => client,
            Err(Error::InsufficientPrivilege | Error::Socket(_)) => return,
            Err(err) => panic!("unexpected error: {}", err),
        };
        for target in [
            Ipv4Addr::UNSPECIFIED,
            Ipv4Addr::BROADCAST,
            Ipv4Addr::new(224, 0, 0, 1),
        ] {
            let input = ProbeInputBuilder::new()
                .with_target_ip(target)
                .build()
                .unwrap();
            assert_eq!(
                client.probe(input).await,
                ProbeOutcome::Failed(crate::probe::FailureReason::Resolve)
            );
        }
    }

    #[tokio::test]
    #[ignore = "requires raw socket privileges"]
    async fn test_loopback_replies() {
        let client = Client::new(ClientConfigBuilder::new().build()).unwrap();
        let input = ProbeInputBuilder::new()
            .with_target_ip(Ipv4Addr::LOCALHOST)
            .build()
            .unwrap();
        assert_eq!(
            client.probe(input).await,
            ProbeOutcome::Alive(Ipv4Addr::LOCALHOST)
        );
    }
}
