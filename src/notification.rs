use std::{collections::HashMap, net::Ipv4Addr, time::Duration};

use tokio::sync::{mpsc, Mutex};

use crate::probe::{FailureReason, ProbeOutcome};

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub(super) enum ReplyVerdict {
    Matched(Ipv4Addr),
    Malformed,
    Unmatched,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub(super) enum Delivery {
    Matched,
    Unmatched,
    Unsolicited,
}

#[derive(Debug)]
struct Waiter {
    nonce: u64,
    tx: mpsc::UnboundedSender<ReplyVerdict>,
}

/// Outstanding probes keyed by target address, each identified by its nonce.
///
/// The table is `None` once [`NotificationHandler::close`] has run, i.e. no
/// reply can be delivered any more.
#[derive(Debug)]
pub(super) struct NotificationHandler {
    waiters: Mutex<Option<HashMap<Ipv4Addr, Vec<Waiter>>>>,
}

impl NotificationHandler {
    pub(super) fn new() -> Self {
        Self {
            waiters: Mutex::new(Some(HashMap::new())),
        }
    }

    /// Returns `None` if the handler has been closed.
    pub(super) async fn register_waiter(
        &self,
        target_ip: Ipv4Addr,
        nonce: u64,
    ) -> Option<mpsc::UnboundedReceiver<ReplyVerdict>> {
        let mut waiters = self.waiters.lock().await;
        let (tx, rx) = mpsc::unbounded_channel();
        waiters
            .as_mut()?
            .entry(target_ip)
            .or_default()
            .push(Waiter { nonce, tx });
        Some(rx)
    }

    /// Drops every waiter, so pending waits end right away, and refuses new
    /// registrations.
    pub(super) async fn close(&self) {
        self.waiters.lock().await.take();
    }

    pub(super) async fn deregister(&self, target_ip: &Ipv4Addr, nonce: u64) {
        let mut guard = self.waiters.lock().await;
        let Some(waiters) = guard.as_mut() else {
            return;
        };
        if let Some(pending) = waiters.get_mut(target_ip) {
            pending.retain(|waiter| waiter.nonce != nonce);
            if pending.is_empty() {
                waiters.remove(target_ip);
            }
        }
    }

    /// Resolves the waiter for (`source`, `nonce`). Other waiters on the same
    /// address learn that an unmatched reply arrived.
    pub(super) async fn notify_token(&self, source: Ipv4Addr, nonce: u64) -> Delivery {
        let mut guard = self.waiters.lock().await;
        let Some(waiters) = guard.as_mut() else {
            return Delivery::Unsolicited;
        };
        let Some(pending) = waiters.get_mut(&source) else {
            return Delivery::Unsolicited;
        };
        if let Some(position) = pending.iter().position(|waiter| waiter.nonce == nonce) {
            let waiter = pending.swap_remove(position);
            let _ = waiter.tx.send(ReplyVerdict::Matched(source));
            if pending.is_empty() {
                waiters.remove(&source);
            }
            return Delivery::Matched;
        }
        for waiter in pending.iter() {
            let _ = waiter.tx.send(ReplyVerdict::Unmatched);
        }
        Delivery::Unmatched
    }

    /// Returns the number of waiters told about a malformed reply from `source`.
    pub(super) async fn notify_malformed(&self, source: &Ipv4Addr) -> usize {
        let waiters = self.waiters.lock().await;
        let pending = waiters.as_ref().and_then(|waiters| waiters.get(source));
        pending.map_or(0, |pending| {
            for waiter in pending {
                let _ = waiter.tx.send(ReplyVerdict::Malformed);
            }
            pending.len()
        })
    }

    #[cfg(test)]
    pub(super) async fn outstanding(&self) -> usize {
        self.waiters
            .lock()
            .await
            .iter()
            .flat_map(HashMap::values)
            .map(Vec::len)
            .sum()
    }
}

/// Waits until a matching reply arrives or `timeout` elapses. Diagnostics
/// received along the way only change the reported failure reason.
pub(super) async fn await_verdict(
    rx: &mut mpsc::UnboundedReceiver<ReplyVerdict>,
    timeout: Duration,
) -> ProbeOutcome {
    let deadline = tokio::time::Instant::now() + timeout;
    let mut reason = FailureReason::Timeout;
    loop {
        match tokio::time::timeout_at(deadline, rx.recv()).await {
            Ok(Some(ReplyVerdict::Matched(source))) => return ProbeOutcome::Alive(source),
            Ok(Some(ReplyVerdict::Malformed)) => reason = FailureReason::MalformedReply,
            Ok(Some(ReplyVerdict::Unmatched)) => reason = FailureReason::UnmatchedReply,
            Ok(None) | Err(_) => return ProbeOutcome::Failed(reason),
        }
    }
}
