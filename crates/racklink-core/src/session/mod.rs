// ── Real-time session ──
//
// One authenticated connection to the message bus. Outbound frames go
// through a single FIFO queue drained by one writer task, which only
// starts once the handshake has completed. One reader task decodes
// inbound frames, fans them out to handlers and subscribers, and settles
// correlated requests. Sessions are single-use: once disconnected, build
// a new one.

pub mod correlation;
pub mod handlers;

use std::fmt;
use std::pin::pin;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use racklink_api::{BusLink, OutboundFrame, RawFrame};

use crate::command::CommandEnvelope;
use crate::config::SessionConfig;
use crate::error::{CommandError, CoreError, millis};
use crate::model::{EventKind, InboundEvent};

pub use correlation::AckPattern;
pub use handlers::HandlerId;

use correlation::PendingRequests;
use handlers::HandlerRegistry;

/// Frame names the bus uses to refuse an `authenticate`.
const AUTH_REFUSED_EVENTS: &[&str] = &["unauthorized", "authError"];

// ── SessionState ─────────────────────────────────────────────────

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// `close()` was called.
    Closed,
    ConnectFailed(String),
    AuthFailed(String),
    /// The link dropped after the session was up.
    LinkLost(String),
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => f.write_str("closed"),
            Self::ConnectFailed(reason) => write!(f, "connect failed: {reason}"),
            Self::AuthFailed(reason) => write!(f, "authentication failed: {reason}"),
            Self::LinkLost(reason) => write!(f, "link lost: {reason}"),
        }
    }
}

/// Connection state observable through [`RealtimeSession::state`].
///
/// `Disconnected(None)` is the fresh state; `Disconnected(Some(_))` is
/// terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Disconnected(Option<DisconnectReason>),
    Connecting,
    Authenticating,
    Ready,
}

impl SessionState {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self, Self::Disconnected(Some(_)))
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected(None) => f.write_str("disconnected"),
            Self::Disconnected(Some(reason)) => write!(f, "disconnected ({reason})"),
            Self::Connecting => f.write_str("connecting"),
            Self::Authenticating => f.write_str("authenticating"),
            Self::Ready => f.write_str("ready"),
        }
    }
}

// ── RealtimeSession ──────────────────────────────────────────────

/// Handle to one bus session. Cheaply cloneable; clones share the session.
///
/// Commands may be sent at any time before the session terminates; frames
/// sent before `Ready` wait in order and go out right after the handshake.
#[derive(Clone)]
pub struct RealtimeSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    config: SessionConfig,
    state: watch::Sender<SessionState>,
    /// Taken by `close()`; the writer then drains and hangs up.
    outbound_tx: Mutex<Option<mpsc::UnboundedSender<OutboundFrame>>>,
    /// Taken by the first `connect`; `None` afterwards.
    outbound_rx: Mutex<Option<mpsc::UnboundedReceiver<OutboundFrame>>>,
    pending: PendingRequests,
    handlers: HandlerRegistry,
    events: broadcast::Sender<Arc<InboundEvent>>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Default for RealtimeSession {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

impl RealtimeSession {
    pub fn new(config: SessionConfig) -> Self {
        let (state, _) = watch::channel(SessionState::Disconnected(None));
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(config.event_buffer.max(1));

        Self {
            inner: Arc::new(SessionInner {
                config,
                state,
                outbound_tx: Mutex::new(Some(outbound_tx)),
                outbound_rx: Mutex::new(Some(outbound_rx)),
                pending: PendingRequests::default(),
                handlers: HandlerRegistry::default(),
                events,
                cancel: CancellationToken::new(),
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    // ── Connection lifecycle ─────────────────────────────────────

    /// Open a WebSocket to `endpoint`, authenticate with `token` and return
    /// once the session is `Ready`.
    pub async fn connect(&self, endpoint: &Url, token: &SecretString) -> Result<(), CoreError> {
        let outbound = self.take_outbound()?;
        self.inner.set_state(SessionState::Connecting);

        let timeout = self.inner.config.connect_timeout;
        let link = tokio::select! {
            biased;
            () = self.inner.cancel.cancelled() => return Err(CoreError::SessionClosed),
            attempt = tokio::time::timeout(
                timeout,
                BusLink::connect(endpoint, self.inner.cancel.child_token()),
            ) => attempt,
        };

        let link = match link {
            Ok(Ok(link)) => link,
            Ok(Err(e)) => {
                let reason = e.to_string();
                self.inner.terminate(DisconnectReason::ConnectFailed(reason.clone()));
                return Err(CoreError::ConnectionFailed {
                    url: endpoint.to_string(),
                    reason,
                });
            }
            Err(_) => {
                self.inner.terminate(DisconnectReason::ConnectFailed(format!(
                    "timed out after {}ms",
                    millis(timeout)
                )));
                return Err(CoreError::Timeout {
                    timeout_ms: millis(timeout),
                });
            }
        };

        self.start(link, outbound, token).await
    }

    /// Run the session over an already established link.
    pub async fn connect_link(&self, link: BusLink, token: &SecretString) -> Result<(), CoreError> {
        let outbound = self.take_outbound()?;
        self.inner.set_state(SessionState::Connecting);
        self.start(link, outbound, token).await
    }

    /// Close the session. Pending requests fail with `SessionClosed`.
    ///
    /// Frames already queued are still written, then the link is hung up.
    /// Waits at most `close_grace` for that before cutting the link.
    pub async fn close(&self) {
        drop(self.take_outbound());
        self.inner
            .set_state(SessionState::Disconnected(Some(DisconnectReason::Closed)));
        self.inner.pending.fail_all(&CommandError::SessionClosed);
        drop(
            self.inner
                .outbound_tx
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );

        let tasks: Vec<JoinHandle<()>> = self
            .inner
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        let mut settled = pin!(async move {
            for task in tasks {
                let _ = task.await;
            }
        });

        let grace = self.inner.config.close_grace;
        let drained = tokio::time::timeout(grace, settled.as_mut()).await.is_ok();
        self.inner.cancel.cancel();
        if !drained {
            debug!(grace_ms = millis(grace), "link did not hang up in time, cutting it");
            settled.await;
        }
    }

    fn take_outbound(&self) -> Result<mpsc::UnboundedReceiver<OutboundFrame>, CoreError> {
        self.inner
            .outbound_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(CoreError::SessionSpent)
    }

    async fn start(
        &self,
        link: BusLink,
        outbound: mpsc::UnboundedReceiver<OutboundFrame>,
        token: &SecretString,
    ) -> Result<(), CoreError> {
        self.inner.set_state(SessionState::Authenticating);
        let (link_tx, mut link_rx) = link.into_parts();

        // The identity frame bypasses the queue so it is always first.
        let hello = OutboundFrame::Authenticate {
            user_id: token.expose_secret().to_owned(),
        }
        .encode()?;
        if link_tx.send(hello).await.is_err() {
            return Err(self.auth_failed("link closed before authenticate was sent".into()));
        }

        let auth_timeout = self.inner.config.auth_timeout;
        let handshake = tokio::select! {
            biased;
            () = self.inner.cancel.cancelled() => return Err(CoreError::SessionClosed),
            result = tokio::time::timeout(auth_timeout, self.inner.await_authenticated(&mut link_rx)) => result,
        };
        match handshake {
            Ok(Ok(())) => {}
            Ok(Err(message)) => return Err(self.auth_failed(message)),
            Err(_) => {
                return Err(self.auth_failed(format!(
                    "no authenticated reply within {}ms",
                    millis(auth_timeout)
                )));
            }
        }

        let cancel = self.inner.cancel.clone();
        let writer = tokio::spawn(write_loop(outbound, link_tx, cancel.clone()));
        let reader = tokio::spawn(read_loop(Arc::downgrade(&self.inner), link_rx, cancel));
        self.inner
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend([writer, reader]);

        // close() may have raced the handshake.
        if self.inner.cancel.is_cancelled() {
            return Err(CoreError::SessionClosed);
        }
        self.inner.set_state(SessionState::Ready);
        Ok(())
    }

    fn auth_failed(&self, message: String) -> CoreError {
        self.inner.terminate(DisconnectReason::AuthFailed(message.clone()));
        CoreError::AuthenticationFailed { message }
    }

    // ── Commands ─────────────────────────────────────────────────

    /// Queue a command. Fire-and-forget; fails only if the session has
    /// terminated.
    pub fn send_command(&self, envelope: &CommandEnvelope) -> Result<(), CoreError> {
        self.enqueue(envelope.to_frame())
    }

    /// Send a command and wait for the first inbound event matching `ack`.
    ///
    /// A matching negative acknowledgement resolves as
    /// [`CommandError::Rejected`]; silence past `timeout` as
    /// [`CommandError::Timeout`].
    pub async fn send_command_await(
        &self,
        envelope: &CommandEnvelope,
        ack: impl Into<AckPattern>,
        timeout: Duration,
    ) -> Result<Arc<InboundEvent>, CommandError> {
        self.send_frame_await(envelope.to_frame(), ack.into(), timeout)
            .await
    }

    /// Correlated send for any outbound frame (e.g. `registerDevice`).
    pub async fn send_frame_await(
        &self,
        frame: OutboundFrame,
        ack: AckPattern,
        timeout: Duration,
    ) -> Result<Arc<InboundEvent>, CommandError> {
        if self.current_state().is_terminated() {
            return Err(CommandError::SessionClosed);
        }

        let event = frame.event_name();
        let (id, mut rx) = self.inner.pending.register(ack);
        if self.enqueue(frame).is_err() || self.current_state().is_terminated() {
            self.inner.pending.cancel(id);
            return Err(CommandError::SessionClosed);
        }

        match tokio::time::timeout(timeout, &mut rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(CommandError::SessionClosed),
            Err(_) => {
                if let Some(outcome) = self.inner.pending.abandon(id, &mut rx) {
                    debug!(request = id, event, "settled at the deadline");
                    return outcome;
                }
                debug!(request = id, event, timeout_ms = millis(timeout), "request timed out");
                Err(CommandError::timeout(timeout))
            }
        }
    }

    fn enqueue(&self, frame: OutboundFrame) -> Result<(), CoreError> {
        if self.current_state().is_terminated() {
            return Err(CoreError::SessionClosed);
        }
        self.inner
            .outbound_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .ok_or(CoreError::SessionClosed)?
            .send(frame)
            .map_err(|_| CoreError::SessionClosed)
    }

    // ── Events ───────────────────────────────────────────────────

    /// Register a durable handler for every future event of `kind`.
    pub fn on(
        &self,
        kind: EventKind,
        handler: impl Fn(&InboundEvent) + Send + Sync + 'static,
    ) -> HandlerId {
        self.inner.handlers.add(kind, Arc::new(handler))
    }

    /// Remove a handler. Returns `false` if it was already gone.
    pub fn off(&self, id: HandlerId) -> bool {
        self.inner.handlers.remove(id)
    }

    /// Stream of every decoded inbound event.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<InboundEvent>> {
        self.inner.events.subscribe()
    }

    // ── State ────────────────────────────────────────────────────

    pub fn state(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    pub fn current_state(&self) -> SessionState {
        self.inner.state.borrow().clone()
    }

    /// Correlated requests still waiting for an acknowledgement.
    pub fn pending_requests(&self) -> usize {
        self.inner.pending.len()
    }
}

// ── Session internals ────────────────────────────────────────────

impl SessionInner {
    fn set_state(&self, next: SessionState) {
        // A terminated session never leaves Disconnected.
        let changed = self.state.send_if_modified(|state| {
            if state.is_terminated() || *state == next {
                return false;
            }
            *state = next.clone();
            true
        });
        if changed {
            info!(state = %next, "session state changed");
        }
    }

    fn terminate(&self, reason: DisconnectReason) {
        self.set_state(SessionState::Disconnected(Some(reason)));
        self.cancel.cancel();
        self.pending.fail_all(&CommandError::SessionClosed);
    }

    async fn await_authenticated(
        &self,
        link_rx: &mut mpsc::Receiver<Result<String, racklink_api::Error>>,
    ) -> Result<(), String> {
        loop {
            let text = match link_rx.recv().await {
                Some(Ok(text)) => text,
                Some(Err(e)) => return Err(e.to_string()),
                None => return Err("link closed during handshake".into()),
            };
            let Some(frame) = decode_frame(&text) else {
                continue;
            };
            if AUTH_REFUSED_EVENTS.contains(&frame.event.as_str()) {
                let message = frame
                    .data
                    .get("message")
                    .or_else(|| frame.data.get("error"))
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or("refused by bus");
                return Err(message.to_owned());
            }
            match decode_event(&frame) {
                Some(event) if event.kind() == EventKind::Authenticated => {
                    debug!("authenticated");
                    return Ok(());
                }
                Some(event) => self.deliver(event),
                None => {}
            }
        }
    }

    fn deliver(&self, event: Arc<InboundEvent>) {
        self.handlers.dispatch(&event);
        self.pending.resolve(&event);
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn decode_frame(text: &str) -> Option<RawFrame> {
    match RawFrame::decode(text) {
        Ok(frame) => Some(frame),
        Err(e) => {
            warn!(error = %e, "dropping undecodable frame");
            None
        }
    }
}

fn decode_event(frame: &RawFrame) -> Option<Arc<InboundEvent>> {
    match InboundEvent::from_frame(frame) {
        Ok(Some(event)) => Some(Arc::new(event)),
        Ok(None) => {
            debug!(event = %frame.event, "ignoring unknown event");
            None
        }
        Err(e) => {
            warn!(event = %frame.event, error = %e, "dropping malformed event");
            None
        }
    }
}

// ── Background tasks ─────────────────────────────────────────────

/// Drain the outbound queue onto the link, in order.
async fn write_loop(
    mut queue: mpsc::UnboundedReceiver<OutboundFrame>,
    link_tx: mpsc::Sender<String>,
    cancel: CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            next = queue.recv() => match next {
                Some(frame) => frame,
                None => break,
            },
        };
        let text = match frame.encode() {
            Ok(text) => text,
            Err(e) => {
                warn!(event = frame.event_name(), error = %e, "dropping unencodable frame");
                continue;
            }
        };
        if link_tx.send(text).await.is_err() {
            break;
        }
        debug!(event = frame.event_name(), "frame sent");
    }
    debug!("session writer exiting");
}

/// Decode inbound frames and deliver them until the link or session ends.
async fn read_loop(
    session: Weak<SessionInner>,
    mut link_rx: mpsc::Receiver<Result<String, racklink_api::Error>>,
    cancel: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            next = link_rx.recv() => next,
        };
        let Some(inner) = session.upgrade() else {
            break;
        };
        match next {
            Some(Ok(text)) => {
                if let Some(event) = decode_frame(&text).as_ref().and_then(decode_event) {
                    inner.deliver(event);
                }
            }
            Some(Err(e)) => {
                inner.terminate(DisconnectReason::LinkLost(e.to_string()));
                break;
            }
            None => {
                inner.terminate(DisconnectReason::LinkLost("link closed".into()));
                break;
            }
        }
    }
    debug!("session reader exiting");
}
