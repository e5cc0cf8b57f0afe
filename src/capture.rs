use std::{io::ErrorKind, net::IpAddr, time::Duration};

use log::error;
use pnet::{packet::Packet, transport::TransportReceiver};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::response::CapturedPacket;

/// Pumps ICMP messages from the blocking raw socket into the async listener.
///
/// The socket is polled with a timeout so the thread notices cancellation
/// within `poll_interval`.
pub(super) fn spawn_capture(
    mut receiver: TransportReceiver,
    poll_interval: Duration,
    token: CancellationToken,
    packets: mpsc::UnboundedSender<CapturedPacket>,
) -> JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        let mut iter = pnet::transport::icmp_packet_iter(&mut receiver);
        while !token.is_cancelled() {
            match iter.next_with_timeout(poll_interval) {
                Ok(Some((packet, IpAddr::V4(source)))) => {
                    if packets.send((packet.packet().to_vec(), source)).is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(err) if err.kind() == ErrorKind::Interrupted => {}
                Err(err) => {
                    error!("stopping ICMP capture, reason: {}", err);
                    break;
                }
            }
        }
    })
}
