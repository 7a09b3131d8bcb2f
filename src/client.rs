//! Session client and its dispatch loop.
//!
//! The [`Client`] owns one controller session:
//! 1. Open the transport
//! 2. Start the dispatch loop
//! 3. Handshake with Communication-Start (MID 1)
//! 4. Correlate one request at a time with its reply
//! 5. Queue subscribed events and acknowledge them
//!
//! At most one request is in flight. Events may arrive at any time, also
//! while a request waits for its reply.
//!
//! # Example
//!
//! ```no_run
//! use openprotocol_client::message::{Message, TighteningResultSubscribe};
//! use openprotocol_client::Client;
//!
//! #[tokio::main]
//! async fn main() -> openprotocol_client::Result<()> {
//!     let client = Client::builder().host("192.168.1.20").build();
//!     client.connect().await?;
//!
//!     client.select_parameter_set(5).await?;
//!     client.subscribe::<TighteningResultSubscribe>().await?;
//!
//!     if let Message::TighteningResult(result) = client.get_subscription().await? {
//!         println!("torque {} {}", result.torque, result.torque_value_unit);
//!     }
//!
//!     client.disconnect().await
//! }
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, trace, warn};

use crate::config::ClientConfig;
use crate::error::{OpenProtocolError, Result};
use crate::message::{
    mid, CommunicationStart, CommunicationStop, KeepAlive, Message, MessageCategory,
    MessageRegistry, OpenProtocolMessage, SelectParameterSet,
};
use crate::protocol::Frame;
use crate::transport::{TcpTransport, Transport};

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Connecting,
    Handshaking,
    Ready,
    Disconnecting,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Builder for configuring and creating a client.
#[derive(Debug, Default)]
pub struct ClientBuilder {
    config: ClientConfig,
    registry: Option<MessageRegistry>,
}

impl ClientBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Controller host. Default: 127.0.0.1
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Controller port. Default: 4545
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Default: 5 seconds
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Default: 5 seconds
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.config.handshake_timeout = timeout;
        self
    }

    /// Default: 5 seconds
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Send MID 9999 at this interval while connected. Default: off
    pub fn keepalive_interval(mut self, interval: Duration) -> Self {
        self.config.keepalive_interval = Some(interval);
        self
    }

    /// Pause after an unexpected dispatch failure. Default: 1 second
    pub fn error_backoff(mut self, backoff: Duration) -> Self {
        self.config.error_backoff = backoff;
        self
    }

    /// Use a custom registry instead of the built-in catalog.
    pub fn registry(mut self, registry: MessageRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Build a client talking TCP to the configured host and port.
    pub fn build(self) -> Client<TcpTransport> {
        let transport = TcpTransport::new(self.config.address());
        self.build_with_transport(transport)
    }

    /// Build a client over any transport.
    pub fn build_with_transport<T: Transport>(self, transport: T) -> Client<T> {
        Client::with_registry(transport, self.config, self.registry.unwrap_or_default())
    }
}

/// The request currently waiting for its reply.
struct PendingRequest {
    id: u64,
    mid: u16,
    expected: BTreeSet<u16>,
    /// Event MID to mark subscribed when the request is positively acknowledged.
    subscribes: Option<u16>,
    reply: oneshot::Sender<Result<Message>>,
}

impl PendingRequest {
    fn answered_by(&self, message: &Message) -> bool {
        self.expected.contains(&message.mid()) || message.category().is_reply()
    }

    fn accepted_subscription(&self, message: &Message) -> Option<u16> {
        match message {
            Message::PositiveAck(ack) if ack.acknowledged_mid == self.mid => self.subscribes,
            _ => None,
        }
    }
}

#[derive(Default)]
struct Session {
    state: SessionState,
    pending: Option<PendingRequest>,
    subscribed: BTreeSet<u16>,
    /// Bumped whenever a session ends; queued events carry the value they
    /// were received under.
    epoch: u64,
}

/// Clears the pending slot when its request finishes, fails or is dropped.
struct PendingGuard<'a> {
    session: &'a Mutex<Session>,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        let mut session = self.session.lock();
        if session.pending.as_ref().is_some_and(|p| p.id == self.id) {
            session.pending = None;
        }
    }
}

enum Route {
    /// Answer for the pending request, with the event MID it newly subscribed.
    Reply(PendingRequest, Option<u16>),
    Event(u64),
    Unexpected(Option<PendingRequest>),
}

/// State shared between the client handle and its background tasks.
struct Shared<T> {
    transport: T,
    registry: MessageRegistry,
    config: ClientConfig,
    session: Mutex<Session>,
    /// Held for a whole request/reply exchange.
    request_gate: tokio::sync::Mutex<()>,
    /// Held for each frame written to the transport.
    send_lock: tokio::sync::Mutex<()>,
    events_tx: mpsc::UnboundedSender<(u64, Message)>,
    events_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<(u64, Message)>>,
    /// Publishes the epoch each time a session ends.
    closed: watch::Sender<u64>,
    next_request_id: AtomicU64,
}

impl<T: Transport> Shared<T> {
    fn state(&self) -> SessionState {
        self.session.lock().state
    }

    /// Epoch of the current session, if it is `Ready`.
    fn live_epoch(&self) -> Result<u64> {
        let session = self.session.lock();
        if session.state == SessionState::Ready {
            Ok(session.epoch)
        } else {
            Err(OpenProtocolError::NotConnected)
        }
    }

    fn set_state(&self, state: SessionState) {
        let mut session = self.session.lock();
        if session.state != state {
            debug!("Session {} -> {}", session.state, state);
            session.state = state;
        }
    }

    async fn send_frame(&self, bytes: &[u8]) -> Result<()> {
        let _send = self.send_lock.lock().await;
        self.transport.send(bytes).await
    }

    async fn request(&self, message: Message, timeout: Duration) -> Result<Message> {
        self.request_with(message, timeout, None).await
    }

    async fn request_with(
        &self,
        message: Message,
        timeout: Duration,
        subscribes: Option<u16>,
    ) -> Result<Message> {
        let mid = message.mid();
        let expected = message.expected_responses();
        if expected.is_empty() {
            return Err(OpenProtocolError::NoExpectedResponse { mid });
        }
        let bytes = self.registry.encode_message(&message)?;

        let _gate = self.request_gate.lock().await;
        let id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let (reply_tx, mut reply_rx) = oneshot::channel();
        self.session.lock().pending = Some(PendingRequest {
            id,
            mid,
            expected,
            subscribes,
            reply: reply_tx,
        });
        let _pending = PendingGuard {
            session: &self.session,
            id,
        };

        self.send_frame(&bytes).await?;
        debug!("Sent MID {} revision {}", mid, message.revision());

        match tokio::time::timeout(timeout, &mut reply_rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => Err(OpenProtocolError::ConnectionClosed),
            Err(_) => {
                // A reply routed at the deadline is still ours; once closed,
                // the dispatch loop sees the caller is gone.
                reply_rx.close();
                if let Ok(reply) = reply_rx.try_recv() {
                    return reply;
                }
                warn!("No reply to MID {} within {:?}", mid, timeout);
                Err(OpenProtocolError::Timeout { mid })
            }
        }
    }

    /// Decode one inbound frame and deliver it.
    async fn route(&self, raw: &[u8]) -> Result<()> {
        let frame = Frame::decode(raw)?;
        let message = self.registry.decode_frame(&frame)?;
        let mid = message.mid();

        let route = {
            let mut session = self.session.lock();
            match session.pending.take() {
                Some(pending) if pending.answered_by(&message) => {
                    let added = pending
                        .accepted_subscription(&message)
                        .filter(|event_mid| session.subscribed.insert(*event_mid));
                    Route::Reply(pending, added)
                }
                pending => {
                    if message.category() == MessageCategory::Event
                        && session.subscribed.contains(&mid)
                    {
                        session.pending = pending;
                        Route::Event(session.epoch)
                    } else {
                        Route::Unexpected(pending)
                    }
                }
            }
        };

        match route {
            Route::Reply(pending, added) => {
                debug!("MID {} answers MID {}", mid, pending.mid);
                if pending.reply.send(Ok(message)).is_err() {
                    debug!("Caller of MID {} is gone, dropping reply", pending.mid);
                    if let Some(event_mid) = added {
                        self.session.lock().subscribed.remove(&event_mid);
                        debug!(
                            "Subscription to MID {} never confirmed, forgetting it",
                            event_mid
                        );
                    }
                }
            }
            Route::Event(epoch) => {
                let ack = if frame.is_no_ack() {
                    None
                } else {
                    self.registry.ack_for(&message)
                };
                trace!("Queued event MID {}", mid);
                let _ = self.events_tx.send((epoch, message));

                if let Some(ack) = ack {
                    let bytes = self.registry.encode_message(&ack)?;
                    self.send_frame(&bytes).await?;
                    debug!("Acknowledged MID {} with MID {}", mid, ack.mid());
                }
            }
            Route::Unexpected(Some(pending)) => {
                warn!("MID {} does not answer pending MID {}", mid, pending.mid);
                let _ = pending
                    .reply
                    .send(Err(OpenProtocolError::UnexpectedMessage { mid }));
            }
            Route::Unexpected(None) => {
                warn!("Dropping unexpected MID {}", mid);
            }
        }

        Ok(())
    }

    /// Return to `Idle`: fail the pending request, forget subscriptions and
    /// drop undelivered events. Waiters on the event queue are woken.
    fn end_session(&self) {
        let (pending, epoch) = {
            let mut session = self.session.lock();
            session.state = SessionState::Idle;
            session.subscribed.clear();
            session.epoch += 1;
            (session.pending.take(), session.epoch)
        };
        if let Some(pending) = pending {
            let _ = pending.reply.send(Err(OpenProtocolError::ConnectionClosed));
        }
        self.closed.send_replace(epoch);

        // A consumer holding the queue filters by epoch instead.
        if let Ok(mut events) = self.events_rx.try_lock() {
            let mut dropped = 0;
            while events.try_recv().is_ok() {
                dropped += 1;
            }
            if dropped > 0 {
                debug!("Dropped {} undelivered events", dropped);
            }
        }
    }
}

/// Read frames until cancelled or the connection ends.
async fn dispatch_loop<T: Transport>(shared: Arc<Shared<T>>, mut shutdown: oneshot::Receiver<()>) {
    debug!("Dispatch loop started");

    loop {
        let received = tokio::select! {
            _ = &mut shutdown => break,
            received = shared.transport.receive() => received,
        };

        let outcome = match received {
            Ok(raw) => shared.route(&raw).await,
            Err(e) => Err(e),
        };
        let Err(e) = outcome else {
            continue;
        };

        if e.is_frame_error() {
            warn!("Dropping inbound frame: {}", e);
            continue;
        }
        if e.is_connection_error() {
            error!("Connection lost: {}", e);
            shared.end_session();
            if let Err(e) = shared.transport.close().await {
                warn!("Closing transport failed: {}", e);
            }
            break;
        }

        error!("Dispatch error: {}", e);
        tokio::select! {
            _ = &mut shutdown => break,
            _ = tokio::time::sleep(shared.config.error_backoff) => {}
        }
    }

    debug!("Dispatch loop stopped");
}

async fn keepalive_loop<T: Transport>(shared: Arc<Shared<T>>, interval: Duration) {
    let mut closed = shared.closed.subscribe();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = closed.changed() => break,
            _ = ticker.tick() => {}
        }
        if shared.state() != SessionState::Ready {
            break;
        }

        let keepalive = Message::from(KeepAlive::default());
        match shared.request(keepalive, shared.config.request_timeout).await {
            Ok(Message::KeepAlive(_)) => trace!("Keep-alive answered"),
            Ok(other) => warn!("Keep-alive answered with MID {}", other.mid()),
            Err(e) if e.is_connection_error() => break,
            Err(e) => warn!("Keep-alive failed: {}", e),
        }
    }
}

struct DispatchTask {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl DispatchTask {
    fn spawn<T: Transport>(shared: Arc<Shared<T>>) -> Self {
        let (shutdown, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(dispatch_loop(shared, shutdown_rx));
        Self { shutdown, handle }
    }

    async fn stop(self) {
        let _ = self.shutdown.send(());
        if let Err(e) = self.handle.await {
            if e.is_panic() {
                error!("Dispatch loop panicked");
            }
        }
    }
}

#[derive(Default)]
struct Tasks {
    dispatch: Option<DispatchTask>,
    keepalive: Option<JoinHandle<()>>,
}

/// A session with one controller.
pub struct Client<T: Transport = TcpTransport> {
    shared: Arc<Shared<T>>,
    /// Background tasks; also serialises connect and disconnect.
    tasks: tokio::sync::Mutex<Tasks>,
}

impl Client<TcpTransport> {
    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }
}

impl<T: Transport> Client<T> {
    /// Create a client over `transport` with the built-in message catalog.
    pub fn new(transport: T, config: ClientConfig) -> Self {
        Self::with_registry(transport, config, MessageRegistry::with_defaults())
    }

    /// Create a client with a custom registry.
    pub fn with_registry(transport: T, config: ClientConfig, registry: MessageRegistry) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (closed, _) = watch::channel(0);
        Self {
            shared: Arc::new(Shared {
                transport,
                registry,
                config,
                session: Mutex::new(Session::default()),
                request_gate: tokio::sync::Mutex::new(()),
                send_lock: tokio::sync::Mutex::new(()),
                events_tx,
                events_rx: tokio::sync::Mutex::new(events_rx),
                closed,
                next_request_id: AtomicU64::new(1),
            }),
            tasks: tokio::sync::Mutex::new(Tasks::default()),
        }
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// Check if the handshake completed and the session is usable.
    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Ready
    }

    /// Event MIDs currently subscribed.
    pub fn subscriptions(&self) -> BTreeSet<u16> {
        self.shared.session.lock().subscribed.clone()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    pub fn registry(&self) -> &MessageRegistry {
        &self.shared.registry
    }

    /// Open the transport and perform the Communication-Start handshake.
    ///
    /// # Errors
    ///
    /// Fails with `HandshakeRejected` if the controller answers with anything
    /// but MID 2, or with the transport or timeout error. On failure the
    /// transport is closed and the client is back to `Idle`.
    pub async fn connect(&self) -> Result<()> {
        let mut tasks = self.tasks.lock().await;
        {
            let mut session = self.shared.session.lock();
            if session.state != SessionState::Idle {
                return Err(OpenProtocolError::Connection(format!(
                    "Cannot connect while {}",
                    session.state
                )));
            }
            session.state = SessionState::Connecting;
        }

        // A previous session may have ended on its own.
        Self::stop_tasks(&mut tasks).await;

        if let Err(e) = self
            .shared
            .transport
            .connect(self.shared.config.connect_timeout)
            .await
        {
            error!("Connect failed: {}", e);
            self.shared.set_state(SessionState::Idle);
            return Err(e);
        }

        self.shared.set_state(SessionState::Handshaking);
        tasks.dispatch = Some(DispatchTask::spawn(self.shared.clone()));

        let start = Message::from(CommunicationStart::default());
        match self
            .shared
            .request(start, self.shared.config.handshake_timeout)
            .await
        {
            Ok(Message::CommunicationStartAck(ack)) => {
                info!(
                    "Connected to {:?} (cell {}, channel {})",
                    ack.controller_name, ack.cell_id, ack.channel_id
                );
                self.shared.set_state(SessionState::Ready);

                if let Some(interval) = self
                    .shared
                    .config
                    .keepalive_interval
                    .filter(|i| !i.is_zero())
                {
                    tasks.keepalive =
                        Some(tokio::spawn(keepalive_loop(self.shared.clone(), interval)));
                }
                Ok(())
            }
            outcome => {
                self.teardown(&mut tasks).await;
                match outcome {
                    Ok(reply) => {
                        warn!("Handshake answered with MID {}", reply.mid());
                        Err(OpenProtocolError::HandshakeRejected { mid: reply.mid() })
                    }
                    Err(e) => {
                        error!("Handshake failed: {}", e);
                        Err(e)
                    }
                }
            }
        }
    }

    /// Send Communication-Stop and close the session.
    ///
    /// Does nothing if the session is not `Ready`, apart from cleaning up
    /// after a session that ended on its own. The session is closed even if
    /// the stop request fails; that error is returned.
    pub async fn disconnect(&self) -> Result<()> {
        let mut tasks = self.tasks.lock().await;
        let was_ready = {
            let mut session = self.shared.session.lock();
            if session.state == SessionState::Ready {
                session.state = SessionState::Disconnecting;
                true
            } else {
                false
            }
        };
        if !was_ready {
            debug!("Disconnect while {}, nothing to stop", self.state());
            self.teardown(&mut tasks).await;
            return Ok(());
        }

        if let Some(keepalive) = tasks.keepalive.take() {
            keepalive.abort();
            let _ = keepalive.await;
        }

        let stop = Message::from(CommunicationStop::default());
        let outcome = self
            .shared
            .request(stop, self.shared.config.request_timeout)
            .await;
        self.teardown(&mut tasks).await;

        match outcome {
            Ok(Message::PositiveAck(_)) => {
                info!("Disconnected");
                Ok(())
            }
            Ok(other) => {
                warn!("Communication stop answered with MID {}", other.mid());
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn stop_tasks(tasks: &mut Tasks) {
        if let Some(keepalive) = tasks.keepalive.take() {
            keepalive.abort();
            let _ = keepalive.await;
        }
        if let Some(dispatch) = tasks.dispatch.take() {
            dispatch.stop().await;
        }
    }

    /// Stop background tasks, close the transport and reset the session.
    async fn teardown(&self, tasks: &mut Tasks) {
        Self::stop_tasks(tasks).await;
        if let Err(e) = self.shared.transport.close().await {
            warn!("Closing transport failed: {}", e);
        }
        self.shared.end_session();
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(OpenProtocolError::NotConnected)
        }
    }

    /// Send a request and wait up to `timeout` for its reply.
    ///
    /// The reply is whichever inbound message first answers it: one whose
    /// MID is in the request's expected set, or any request-reply or command
    /// message. Only one request is in flight at a time; concurrent callers
    /// queue.
    ///
    /// # Errors
    ///
    /// - `NoExpectedResponse` if the message cannot be answered (before any I/O)
    /// - `NotConnected` outside a `Ready` session
    /// - `Timeout` if no reply arrives; the session stays usable
    /// - `UnexpectedMessage` if an unsolicited, unsubscribed message arrives first
    pub async fn send_receive(
        &self,
        message: impl Into<Message>,
        timeout: Duration,
    ) -> Result<Message> {
        let message = message.into();
        if message.expected_responses().is_empty() {
            return Err(OpenProtocolError::NoExpectedResponse { mid: message.mid() });
        }
        self.ensure_ready()?;
        self.shared.request(message, timeout).await
    }

    /// [`send_receive`](Self::send_receive) with the configured request timeout.
    pub async fn request(&self, message: impl Into<Message>) -> Result<Message> {
        self.send_receive(message, self.shared.config.request_timeout)
            .await
    }

    /// Select a parameter set (MID 18).
    ///
    /// # Errors
    ///
    /// A negative acknowledge becomes `NegativeAck` with the controller's
    /// error code.
    pub async fn select_parameter_set(&self, parameter_set: u16) -> Result<()> {
        match self.request(SelectParameterSet::new(parameter_set)).await? {
            Message::PositiveAck(ack) if ack.acknowledged_mid == mid::SELECT_PARAMETER_SET => {
                debug!("Selected parameter set {}", parameter_set);
                Ok(())
            }
            Message::NegativeAck(nack) => Err(nack.into_error()),
            other => Err(OpenProtocolError::UnexpectedReply {
                expected: mid::POSITIVE_ACK,
                actual: other.mid(),
            }),
        }
    }

    /// Subscribe using the default instance of `S`.
    pub async fn subscribe<S>(&self) -> Result<()>
    where
        S: OpenProtocolMessage + Default,
    {
        self.subscribe_message(S::default()).await
    }

    /// Send an event-subscribe message and record its event MID once accepted.
    ///
    /// # Errors
    ///
    /// `WrongCategory` or `MissingEventMid` before any I/O;
    /// `SubscriptionRejected` unless the controller positively acknowledges.
    pub async fn subscribe_message(&self, message: impl Into<Message>) -> Result<()> {
        let message = message.into();
        let event_mid = subscription_target(&message, MessageCategory::EventSubscribe)?;
        let subscribe_mid = message.mid();
        self.ensure_ready()?;

        let reply = self
            .shared
            .request_with(message, self.shared.config.request_timeout, Some(event_mid))
            .await?;
        match reply {
            Message::PositiveAck(ack) if ack.acknowledged_mid == subscribe_mid => {
                info!("Subscribed to MID {}", event_mid);
                Ok(())
            }
            Message::NegativeAck(nack) => {
                warn!(
                    "Subscription MID {} refused with error code {}",
                    subscribe_mid, nack.error_code
                );
                Err(OpenProtocolError::SubscriptionRejected { mid: subscribe_mid })
            }
            other => {
                warn!(
                    "Subscription MID {} answered with MID {}",
                    subscribe_mid,
                    other.mid()
                );
                Err(OpenProtocolError::SubscriptionRejected { mid: subscribe_mid })
            }
        }
    }

    /// Unsubscribe using the default instance of `U`.
    pub async fn unsubscribe<U>(&self, force: bool) -> Result<()>
    where
        U: OpenProtocolMessage + Default,
    {
        self.unsubscribe_message(U::default(), force).await
    }

    /// Send an event-unsubscribe message and forget its event MID.
    ///
    /// With `force`, the MID is forgotten even if the controller refuses or
    /// the request fails, and the failure is only logged.
    pub async fn unsubscribe_message(&self, message: impl Into<Message>, force: bool) -> Result<()> {
        let message = message.into();
        let event_mid = subscription_target(&message, MessageCategory::EventUnsubscribe)?;
        let unsubscribe_mid = message.mid();

        let outcome = self
            .send_receive(message, self.shared.config.request_timeout)
            .await;
        let accepted = matches!(
            &outcome,
            Ok(Message::PositiveAck(ack)) if ack.acknowledged_mid == unsubscribe_mid
        );

        if accepted || force {
            if !accepted {
                warn!(
                    "Unsubscription MID {} not accepted ({}), forgetting MID {} anyway",
                    unsubscribe_mid,
                    describe(&outcome),
                    event_mid
                );
            }
            self.shared.session.lock().subscribed.remove(&event_mid);
            info!("Unsubscribed from MID {}", event_mid);
            return Ok(());
        }

        match outcome {
            Err(e) => Err(e),
            Ok(_) => Err(OpenProtocolError::UnsubscriptionRejected {
                mid: unsubscribe_mid,
            }),
        }
    }

    /// Wait for the next subscribed event.
    ///
    /// # Errors
    ///
    /// `NotConnected` outside a `Ready` session; `ConnectionClosed` if the
    /// session ends while waiting.
    pub async fn get_subscription(&self) -> Result<Message> {
        let mut events = self.shared.events_rx.lock().await;
        let mut closed = self.shared.closed.subscribe();
        let epoch = self.shared.live_epoch()?;

        loop {
            tokio::select! {
                biased;
                _ = closed.changed() => return Err(OpenProtocolError::ConnectionClosed),
                event = events.recv() => match event {
                    Some((queued, message)) if queued == epoch => return Ok(message),
                    Some((_, message)) => {
                        trace!("Dropping MID {} from an earlier session", message.mid());
                    }
                    None => return Err(OpenProtocolError::ConnectionClosed),
                },
            }
        }
    }

    /// Take the next subscribed event if one is queued.
    pub fn try_get_subscription(&self) -> Option<Message> {
        let mut events = self.shared.events_rx.try_lock().ok()?;
        let epoch = self.shared.live_epoch().ok()?;
        while let Ok((queued, message)) = events.try_recv() {
            if queued == epoch {
                return Some(message);
            }
        }
        None
    }
}

impl<T: Transport> Drop for Client<T> {
    fn drop(&mut self) {
        let tasks = self.tasks.get_mut();
        if let Some(keepalive) = tasks.keepalive.take() {
            keepalive.abort();
        }
        if let Some(dispatch) = tasks.dispatch.take() {
            let _ = dispatch.shutdown.send(());
        }
    }
}

fn subscription_target(message: &Message, expected: MessageCategory) -> Result<u16> {
    let spec = message.spec();
    if spec.category != expected {
        return Err(OpenProtocolError::WrongCategory {
            mid: spec.mid,
            expected,
            actual: spec.category,
        });
    }
    spec.event_mid
        .ok_or(OpenProtocolError::MissingEventMid { mid: spec.mid })
}

fn describe(outcome: &Result<Message>) -> String {
    match outcome {
        Ok(message) => format!("reply MID {}", message.mid()),
        Err(e) => e.to_string(),
    }
}
