use std::{net::Ipv4Addr, sync::Arc};

use log::{debug, trace};
use tokio::sync::mpsc;

use crate::correlation::{Decoded, ReplyCorrelator};
use crate::error::{Error, Result};
use crate::notification::{Delivery, NotificationHandler};

pub(super) type CapturedPacket = (Vec<u8>, Ipv4Addr);

pub(super) struct Listener {
    packets: mpsc::UnboundedReceiver<CapturedPacket>,
    correlator: Arc<dyn ReplyCorrelator>,
    notification_handler: Arc<NotificationHandler>,
}

impl Listener {
    pub(super) fn new(
        packets: mpsc::UnboundedReceiver<CapturedPacket>,
        correlator: Arc<dyn ReplyCorrelator>,
        notification_handler: Arc<NotificationHandler>,
    ) -> Self {
        Self {
            packets,
            correlator,
            notification_handler,
        }
    }

    pub(super) async fn listen(&mut self) -> Result<()> {
        while let Some((bytes, source)) = self.packets.recv().await {
            self.dispatch(&bytes, source).await;
        }
        self.notification_handler.close().await;
        Err(Error::Opaque("ICMP capture stopped".into()))
    }

    async fn dispatch(&self, bytes: &[u8], source: Ipv4Addr) {
        match self.correlator.decode_reply(bytes) {
            Decoded::NotOurs => {}
            Decoded::Malformed => {
                let told = self.notification_handler.notify_malformed(&source).await;
                trace!("malformed ICMP reply from {} ({} waiting)", source, told);
            }
            Decoded::Token(token) => {
                match self
                    .notification_handler
                    .notify_token(source, token.nonce)
                    .await
                {
                    Delivery::Matched => {}
                    Delivery::Unmatched => debug!(
                        "discarding reply from {} with stale nonce (seq {})",
                        source, token.sequence
                    ),
                    Delivery::Unsolicited => trace!(
                        "discarding unsolicited reply from {} (seq {})",
                        source,
                        token.sequence
                    ),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::correlation::{tests::echo_reply_for, NonceCorrelator};
    use crate::notification::await_verdict;
    use crate::probe::{FailureReason, ProbeOutcome};

    const TARGET: Ipv4Addr = Ipv4Addr::new(192, 168, 0, 20);
    const SHORT: Duration = Duration::from_millis(50);

    struct Fixture {
        tx: mpsc::UnboundedSender<CapturedPacket>,
        correlator: Arc<NonceCorrelator>,
        handler: Arc<NotificationHandler>,
    }

    fn spawn_listener() -> Fixture {
        let (tx, rx) = mpsc::unbounded_channel();
        let correlator = Arc::new(NonceCorrelator::new(7));
        let handler = Arc::new(NotificationHandler::new());
        let mut listener = Listener::new(rx, correlator.clone(), handler.clone());
        tokio::spawn(async move { listener.listen().await });
        Fixture {
            tx,
            correlator,
            handler,
        }
    }

    #[tokio::test]
    async fn test_reply_from_target_resolves_probe() {
        let fixture = spawn_listener();
        let token = fixture.correlator.issue(1);
        let mut rx = fixture
            .handler
            .register_waiter(TARGET, token.nonce)
            .await
            .unwrap();
        let reply = echo_reply_for(&fixture.correlator.encode_request(&token).unwrap());
        fixture.tx.send((reply, TARGET)).unwrap();
        assert_eq!(
            await_verdict(&mut rx, SHORT).await,
            ProbeOutcome::Alive(TARGET)
        );
    }

    #[tokio::test]
    async fn test_reply_from_other_address_is_not_credited() {
        let fixture = spawn_listener();
        let token = fixture.correlator.issue(1);
        let mut rx = fixture
            .handler
            .register_waiter(TARGET, token.nonce)
            .await
            .unwrap();
        let reply = echo_reply_for(&fixture.correlator.encode_request(&token).unwrap());
        fixture
            .tx
            .send((reply, Ipv4Addr::new(192, 168, 0, 21)))
            .unwrap();
        assert_eq!(
            await_verdict(&mut rx, SHORT).await,
            ProbeOutcome::Failed(FailureReason::Timeout)
        );
    }

    #[tokio::test]
    async fn test_stale_and_malformed_replies_are_reported() {
        let fixture = spawn_listener();
        let token = fixture.correlator.issue(2);
        let stale = fixture.correlator.issue(1);
        let mut rx = fixture
            .handler
            .register_waiter(TARGET, token.nonce)
            .await
            .unwrap();

        let stale_reply = echo_reply_for(&fixture.correlator.encode_request(&stale).unwrap());
        fixture.tx.send((stale_reply, TARGET)).unwrap();
        assert_eq!(
            await_verdict(&mut rx, SHORT).await,
            ProbeOutcome::Failed(FailureReason::UnmatchedReply)
        );

        let mut broken = echo_reply_for(&fixture.correlator.encode_request(&token).unwrap());
        broken[2] ^= 0xff;
        fixture.tx.send((broken, TARGET)).unwrap();
        assert_eq!(
            await_verdict(&mut rx, SHORT).await,
            ProbeOutcome::Failed(FailureReason::MalformedReply)
        );
    }

    #[tokio::test]
    async fn test_listen_fails_when_capture_stops() {
        let (tx, rx) = mpsc::unbounded_channel();
        let handler = Arc::new(NotificationHandler::new());
        let mut pending = handler.register_waiter(TARGET, 1).await.unwrap();
        let mut listener = Listener::new(rx, Arc::new(NonceCorrelator::new(7)), handler.clone());
        drop(tx);

        let err = listener.listen().await.unwrap_err();
        assert_eq!(err.to_string(), "ICMP capture stopped");
        assert_eq!(
            await_verdict(&mut pending, Duration::from_secs(60)).await,
            ProbeOutcome::Failed(FailureReason::Timeout)
        );
        assert!(handler.register_waiter(TARGET, 2).await.is_none());
    }
}
