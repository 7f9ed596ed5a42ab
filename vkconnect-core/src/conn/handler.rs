use std::collections::VecDeque;

use bytes::BytesMut;
use tokio::time::Instant;

use crate::error::VkError;
use crate::resp::{self, Token, TokenKind, Value};

use super::pending::{PendingRequest, RequestKind};

/// Something the I/O loop must do as a result of a state transition. Kept
/// separate from the transition itself so the handler's `&mut self` methods
/// never touch the transport or a timer directly (spec §9, "a method per
/// event returning an action enum the I/O layer executes outside the state
/// transition").
#[derive(Debug)]
pub enum Action {
    /// Write these bytes to the transport.
    Send(BytesMut),
    /// (Re)arm the single deadline timer to fire at this instant.
    ArmTimer(Instant),
    /// No pending requests remain; disable the timer.
    ClearTimer,
    /// Tear down the transport.
    CloseTransport,
    /// Forward an inbound push-kind token to the subscription stream; it is
    /// never paired with the pending-request FIFO (spec §4.3, §9).
    Push(Token),
}

/// The five connection states from spec §4.3, each carrying exactly the
/// data its invariants allow (`Active`/`Closing` hold a deque; `Connected`
/// holds exactly the HELLO request; `Closed` holds none).
enum State {
    Initialized,
    Connected { hello: PendingRequest },
    Active { pending: VecDeque<PendingRequest> },
    Closing { pending: VecDeque<PendingRequest> },
    Closed,
}

/// The connection state machine. Owns no transport or timer itself —
/// callers execute the [`Action`]s it returns.
pub struct ConnectionHandler {
    state: State,
}

impl Default for ConnectionHandler {
    fn default() -> Self {
        Self {
            state: State::Initialized,
        }
    }
}

impl ConnectionHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, State::Active { .. })
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, State::Closed)
    }

    /// `setConnected`: transport is up, send the HELLO request.
    pub fn set_connected(&mut self, hello: PendingRequest, hello_bytes: BytesMut) -> Vec<Action> {
        match &self.state {
            State::Initialized => {
                let deadline = hello.deadline;
                self.state = State::Connected { hello };
                vec![Action::Send(hello_bytes), Action::ArmTimer(deadline)]
            }
            _ => {
                log::error!("setConnected is only valid from Initialized");
                hello.fulfill(Err(VkError::Usage(
                    "setConnected is only valid before any connection activity",
                )));
                vec![]
            }
        }
    }

    /// `sendCommand`: enqueue and flush a request.
    pub fn send_command(&mut self, req: PendingRequest, bytes: BytesMut) -> Vec<Action> {
        match &mut self.state {
            State::Active { pending } => {
                let was_empty = pending.is_empty();
                let deadline = req.deadline;
                pending.push_back(req);
                let mut actions = vec![Action::Send(bytes)];
                if was_empty {
                    actions.push(Action::ArmTimer(deadline));
                }
                actions
            }
            State::Closing { .. } => {
                req.fulfill(Err(VkError::ConnectionClosing));
                vec![]
            }
            State::Closed => {
                req.fulfill(Err(VkError::ConnectionClosed));
                vec![]
            }
            State::Initialized | State::Connected { .. } => {
                req.fulfill(Err(VkError::Usage(
                    "sendCommand is not valid before the connection is active",
                )));
                vec![]
            }
        }
    }

    /// `receivedResponse`: pair an inbound token with the head of the FIFO.
    pub fn received_response(&mut self, token: Token) -> Vec<Action> {
        match std::mem::replace(&mut self.state, State::Closed) {
            State::Connected { hello } => {
                if is_error_kind(token.kind()) {
                    hello.fulfill(Err(to_command_error(&token)));
                    vec![Action::CloseTransport]
                } else {
                    self.state = State::Active {
                        pending: VecDeque::new(),
                    };
                    hello.fulfill(Ok(token));
                    vec![Action::ClearTimer]
                }
            }
            State::Active { mut pending } => {
                if token.kind() == TokenKind::Push {
                    self.state = State::Active { pending };
                    return vec![Action::Push(token)];
                }
                let Some(head) = pop_next_awaiting(&mut pending) else {
                    self.state = State::Closed;
                    return vec![Action::CloseTransport];
                };
                fulfill_from_token(head, token);
                let actions = timer_action_for(&pending);
                self.state = State::Active { pending };
                actions
            }
            State::Closing { mut pending } => {
                if token.kind() == TokenKind::Push {
                    self.state = State::Closing { pending };
                    return vec![Action::Push(token)];
                }
                let Some(head) = pop_next_awaiting(&mut pending) else {
                    self.state = State::Closed;
                    return vec![Action::CloseTransport];
                };
                fulfill_from_token(head, token);
                if pending.is_empty() {
                    self.state = State::Closed;
                    vec![Action::CloseTransport]
                } else {
                    let actions = timer_action_for(&pending);
                    self.state = State::Closing { pending };
                    actions
                }
            }
            other @ (State::Initialized | State::Closed) => {
                self.state = other;
                log::warn!("receivedResponse with no connection established");
                vec![]
            }
        }
    }

    /// `hitDeadline`: the single armed timer fired.
    pub fn hit_deadline(&mut self, now: Instant) -> Vec<Action> {
        match std::mem::replace(&mut self.state, State::Closed) {
            State::Connected { hello } => {
                if hello.deadline <= now {
                    hello.fulfill(Err(VkError::Timeout));
                    vec![Action::CloseTransport]
                } else {
                    let deadline = hello.deadline;
                    self.state = State::Connected { hello };
                    vec![Action::ArmTimer(deadline)]
                }
            }
            State::Active { pending } => self.fail_on_deadline(pending, now, true),
            State::Closing { pending } => self.fail_on_deadline(pending, now, false),
            other @ (State::Initialized | State::Closed) => {
                self.state = other;
                vec![]
            }
        }
    }

    fn fail_on_deadline(&mut self, pending: VecDeque<PendingRequest>, now: Instant, active: bool) -> Vec<Action> {
        let Some(head_deadline) = pending.front().map(|r| r.deadline) else {
            self.state = if active {
                State::Active { pending }
            } else {
                State::Closed
            };
            return vec![Action::ClearTimer];
        };
        if head_deadline <= now {
            for req in pending {
                req.fulfill(Err(VkError::Timeout));
            }
            self.state = State::Closed;
            vec![Action::CloseTransport]
        } else {
            let actions = vec![Action::ArmTimer(head_deadline)];
            self.state = if active {
                State::Active { pending }
            } else {
                State::Closing { pending }
            };
            actions
        }
    }

    /// `cancel`: fail the matching request by id; the connection cannot
    /// selectively cancel at the protocol level, so it tears down.
    pub fn cancel(&mut self, request_id: i64) -> Vec<Action> {
        match std::mem::replace(&mut self.state, State::Closed) {
            State::Connected { hello } => {
                if hello.id == request_id {
                    hello.fulfill(Err(VkError::Cancelled));
                    vec![Action::CloseTransport]
                } else {
                    self.state = State::Connected { hello };
                    vec![]
                }
            }
            State::Active { pending } => self.cancel_from_deque(pending, request_id, true),
            State::Closing { pending } => self.cancel_from_deque(pending, request_id, false),
            other @ (State::Initialized | State::Closed) => {
                self.state = other;
                vec![]
            }
        }
    }

    fn cancel_from_deque(
        &mut self,
        pending: VecDeque<PendingRequest>,
        request_id: i64,
        active: bool,
    ) -> Vec<Action> {
        let contains = pending.iter().any(|r| r.id == request_id);
        if !contains {
            self.state = if active {
                State::Active { pending }
            } else {
                State::Closing { pending }
            };
            return vec![];
        }
        for req in pending {
            if req.id == request_id {
                req.fulfill(Err(VkError::Cancelled));
            } else {
                req.fulfill(Err(VkError::ConnectionClosedDueToCancellation));
            }
        }
        self.state = State::Closed;
        vec![Action::CloseTransport]
    }

    /// `gracefulShutdown`: stop accepting new work, drain what's pending.
    pub fn graceful_shutdown(&mut self) -> Vec<Action> {
        match std::mem::replace(&mut self.state, State::Closed) {
            State::Initialized => vec![],
            State::Connected { hello } => {
                self.state = State::Closing {
                    pending: VecDeque::from([hello]),
                };
                vec![]
            }
            State::Active { pending } => {
                if pending.is_empty() {
                    vec![Action::CloseTransport]
                } else {
                    self.state = State::Closing { pending };
                    vec![]
                }
            }
            State::Closing { pending } => {
                self.state = State::Closing { pending };
                vec![]
            }
            State::Closed => vec![],
        }
    }

    /// `close`: hard, immediate teardown.
    pub fn close(&mut self) -> Vec<Action> {
        match std::mem::replace(&mut self.state, State::Closed) {
            State::Initialized => vec![],
            State::Connected { hello } => {
                hello.fulfill(Err(VkError::ConnectionClosed));
                vec![Action::CloseTransport]
            }
            State::Active { pending } | State::Closing { pending } => {
                for req in pending {
                    req.fulfill(Err(VkError::ConnectionClosed));
                }
                vec![Action::CloseTransport]
            }
            State::Closed => vec![],
        }
    }

    /// `setClosed`: the transport reported it is already gone.
    pub fn set_closed(&mut self) -> Vec<Action> {
        match std::mem::replace(&mut self.state, State::Closed) {
            State::Initialized => vec![],
            State::Connected { hello } => {
                hello.fulfill(Err(VkError::ConnectionClosed));
                vec![]
            }
            State::Active { pending } | State::Closing { pending } => {
                for req in pending {
                    req.fulfill(Err(VkError::ConnectionClosed));
                }
                vec![]
            }
            State::Closed => vec![],
        }
    }
}

fn is_error_kind(kind: TokenKind) -> bool {
    matches!(kind, TokenKind::SimpleError | TokenKind::BulkError)
}

fn to_command_error(token: &Token) -> VkError {
    match Value::from_token(token).ok().and_then(|v| resp::as_error(&v)) {
        Some((prefix, message)) => VkError::CommandError { prefix, message },
        None => VkError::CommandError {
            prefix: String::new(),
            message: String::from_utf8_lossy(token.as_bytes()).into_owned(),
        },
    }
}

fn fulfill_from_token(req: PendingRequest, token: Token) {
    if is_error_kind(token.kind()) {
        req.fulfill(Err(to_command_error(&token)));
    } else {
        req.fulfill(Ok(token));
    }
}

/// Pops the FIFO head repeatedly, silently discarding any leading
/// `Forgettable` entries (spec §4.3: a subscribe/unsubscribe's own
/// acknowledgement arrives as a push frame, never as the regular reply its
/// forgettable placeholder was queued against, so it must not consume the
/// reply meant for the next real request), and returns the first entry
/// that actually expects `token`, or `None` if the deque is exhausted.
fn pop_next_awaiting(pending: &mut VecDeque<PendingRequest>) -> Option<PendingRequest> {
    loop {
        let head = pending.pop_front()?;
        if matches!(head.kind, RequestKind::Forgettable) {
            continue;
        }
        return Some(head);
    }
}

fn timer_action_for(pending: &VecDeque<PendingRequest>) -> Vec<Action> {
    match pending.front() {
        Some(req) => vec![Action::ArmTimer(req.deadline)],
        None => vec![Action::ClearTimer],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conn::pending::RequestKind;
    use bytes::BytesMut;
    use tokio::sync::oneshot;

    fn deadline_in(ms: u64) -> Instant {
        Instant::now() + std::time::Duration::from_millis(ms)
    }

    fn req(id: i64) -> (PendingRequest, oneshot::Receiver<crate::error::VkResult<Token>>) {
        let (tx, rx) = oneshot::channel();
        (
            PendingRequest::new(id, deadline_in(10_000), RequestKind::Single, tx),
            rx,
        )
    }

    fn ok_token(bytes: &'static [u8]) -> Token {
        let mut buf = BytesMut::from(bytes);
        resp::parse(&mut buf).unwrap().unwrap()
    }

    #[tokio::test]
    async fn hello_handshake_activates_connection() {
        let mut handler = ConnectionHandler::new();
        let (hello, rx) = req(0);
        let actions = handler.set_connected(hello, BytesMut::from(&b"*1\r\n$5\r\nHELLO\r\n"[..]));
        assert!(matches!(actions[0], Action::Send(_)));

        let actions = handler.received_response(ok_token(b"%0\r\n"));
        assert!(matches!(actions[0], Action::ClearTimer));
        assert!(handler.is_active());
        assert!(rx.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn hello_error_closes_connection() {
        let mut handler = ConnectionHandler::new();
        let (hello, rx) = req(0);
        handler.set_connected(hello, BytesMut::new());
        let actions = handler.received_response(ok_token(b"-NOAUTH failed\r\n"));
        assert!(matches!(actions[0], Action::CloseTransport));
        assert!(handler.is_closed());
        assert!(rx.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn fifo_pairs_responses_in_order() {
        let mut handler = ConnectionHandler::new();
        let (hello, _) = req(0);
        handler.set_connected(hello, BytesMut::new());
        handler.received_response(ok_token(b"%0\r\n"));

        let (r1, rx1) = req(1);
        let (r2, rx2) = req(2);
        handler.send_command(r1, BytesMut::from(&b"*1\r\n$3\r\nSET\r\n"[..]));
        handler.send_command(r2, BytesMut::from(&b"*1\r\n$3\r\nGET\r\n"[..]));

        handler.received_response(ok_token(b"+OK\r\n"));
        handler.received_response(ok_token(b"$1\r\nv\r\n"));

        let t1 = rx1.await.unwrap().unwrap();
        let t2 = rx2.await.unwrap().unwrap();
        assert_eq!(t1.as_bytes(), b"+OK\r\n");
        assert_eq!(t2.as_bytes(), b"$1\r\nv\r\n");
    }

    #[tokio::test]
    async fn unsolicited_token_closes_connection() {
        let mut handler = ConnectionHandler::new();
        let (hello, _) = req(0);
        handler.set_connected(hello, BytesMut::new());
        handler.received_response(ok_token(b"%0\r\n"));

        let actions = handler.received_response(ok_token(b"+unexpected\r\n"));
        assert!(matches!(actions[0], Action::CloseTransport));
        assert!(handler.is_closed());
    }

    #[tokio::test]
    async fn cancel_fails_matching_and_closes_connection() {
        let mut handler = ConnectionHandler::new();
        let (hello, _) = req(0);
        handler.set_connected(hello, BytesMut::new());
        handler.received_response(ok_token(b"%0\r\n"));

        let (r1, rx1) = req(1);
        let (r2, rx2) = req(2);
        handler.send_command(r1, BytesMut::new());
        handler.send_command(r2, BytesMut::new());

        let actions = handler.cancel(1);
        assert!(matches!(actions[0], Action::CloseTransport));
        assert!(matches!(rx1.await.unwrap(), Err(VkError::Cancelled)));
        assert!(matches!(
            rx2.await.unwrap(),
            Err(VkError::ConnectionClosedDueToCancellation)
        ));
        assert!(handler.is_closed());
    }

    #[tokio::test]
    async fn push_token_does_not_consume_fifo_head() {
        let mut handler = ConnectionHandler::new();
        let (hello, _) = req(0);
        handler.set_connected(hello, BytesMut::new());
        handler.received_response(ok_token(b"%0\r\n"));

        let (r1, rx1) = req(1);
        handler.send_command(r1, BytesMut::new());

        let actions = handler.received_response(ok_token(b">2\r\n+message\r\n+hi\r\n"));
        assert!(matches!(actions[0], Action::Push(_)));

        let actions = handler.received_response(ok_token(b"+OK\r\n"));
        assert!(matches!(actions[0], Action::ClearTimer));
        assert!(rx1.await.unwrap().unwrap().as_bytes() == b"+OK\r\n");
    }

    #[tokio::test]
    async fn forgettable_entry_does_not_swallow_the_next_real_reply() {
        let mut handler = ConnectionHandler::new();
        let (hello, _) = req(0);
        handler.set_connected(hello, BytesMut::new());
        handler.received_response(ok_token(b"%0\r\n"));

        let (forget_tx, _forget_rx) = oneshot::channel();
        let forget = PendingRequest::new(1, deadline_in(10_000), RequestKind::Forgettable, forget_tx);
        handler.send_command(forget, BytesMut::new());

        let (r1, rx1) = req(2);
        handler.send_command(r1, BytesMut::new());

        // The subscribe ack arrives as a push, never pairing with `forget`.
        handler.received_response(ok_token(b">2\r\n+message\r\n+hi\r\n"));

        // A later ordinary reply must skip the forgettable head and pair
        // with the real request behind it, not with `forget`.
        let actions = handler.received_response(ok_token(b"+OK\r\n"));
        assert!(matches!(actions[0], Action::ClearTimer));
        assert_eq!(rx1.await.unwrap().unwrap().as_bytes(), b"+OK\r\n");
    }

    #[tokio::test]
    async fn graceful_shutdown_waits_for_pending_then_closes() {
        let mut handler = ConnectionHandler::new();
        let (hello, _) = req(0);
        handler.set_connected(hello, BytesMut::new());
        handler.received_response(ok_token(b"%0\r\n"));

        let (r1, rx1) = req(1);
        handler.send_command(r1, BytesMut::new());

        let actions = handler.graceful_shutdown();
        assert!(actions.is_empty());

        let actions = handler.received_response(ok_token(b"+OK\r\n"));
        assert!(matches!(actions[0], Action::CloseTransport));
        assert!(handler.is_closed());
        assert!(rx1.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn deadline_past_head_fails_all_and_closes() {
        let mut handler = ConnectionHandler::new();
        let (hello, _) = req(0);
        handler.set_connected(hello, BytesMut::new());
        handler.received_response(ok_token(b"%0\r\n"));

        let (tx, rx) = oneshot::channel();
        let past = Instant::now() - std::time::Duration::from_millis(1);
        let r1 = PendingRequest::new(1, past, RequestKind::Single, tx);
        handler.send_command(r1, BytesMut::new());

        let actions = handler.hit_deadline(Instant::now());
        assert!(matches!(actions[0], Action::CloseTransport));
        assert!(matches!(rx.await.unwrap(), Err(VkError::Timeout)));
        assert!(handler.is_closed());
    }
}
