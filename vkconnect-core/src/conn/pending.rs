use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::error::VkResult;
use crate::resp::Token;

/// Why a pending request is on the deque; distinguishes requests whose
/// caller is still waiting from ones sent fire-and-forget (spec §3,
/// "forgettable", used for subscription bookkeeping and pipelined ASKING).
#[derive(Debug)]
pub enum RequestKind {
    Single,
    PipelineEntry { index: usize },
    Forgettable,
}

/// A request awaiting a paired response, tracked by the connection handler
/// in FIFO order (spec §4.3).
pub struct PendingRequest {
    pub id: i64,
    pub deadline: Instant,
    pub kind: RequestKind,
    responder: Option<oneshot::Sender<VkResult<Token>>>,
}

impl std::fmt::Debug for PendingRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingRequest")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl PendingRequest {
    pub fn new(
        id: i64,
        deadline: Instant,
        kind: RequestKind,
        responder: oneshot::Sender<VkResult<Token>>,
    ) -> Self {
        Self {
            id,
            deadline,
            kind,
            responder: Some(responder),
        }
    }

    /// A pending entry with nobody waiting on the reply (forgettable).
    pub fn forgettable(id: i64, deadline: Instant) -> Self {
        Self {
            id,
            deadline,
            kind: RequestKind::Forgettable,
            responder: None,
        }
    }

    /// Delivers the outcome to the waiting caller, if any. Consumes `self`
    /// since a pending request is fulfilled or failed exactly once.
    pub fn fulfill(mut self, result: VkResult<Token>) {
        if let Some(responder) = self.responder.take() {
            let _ = responder.send(result);
        }
    }
}
