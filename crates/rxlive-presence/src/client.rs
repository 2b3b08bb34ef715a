//! Presence channel client: the consumer-facing handle and its actor.
//!
//! [`PresenceClient::start`] spawns one channel actor for an outlet. The
//! actor is an isolated Tokio task that owns the connection, the online
//! set and the reconnect timer; the outside world only sees what it
//! publishes through a watch channel as [`PresenceSnapshot`]s.
//!
//! ```text
//! PresenceClient ──shutdown──▶ ChannelActor ──snapshots──▶ subscribers
//!                                 │    ▲
//!                      Connector  ▼    │  CredentialWatch
//!                              Connection
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rxlive_backoff::Backoff;
use rxlive_protocol::{Codec, JsonCodec, OutletId, PresenceEntry, PresenceEvent};
use rxlive_session::{now_unix, CredentialWatch, SessionIdentity};
use rxlive_transport::{Connection, Connector};
use serde::Serialize;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::{ChannelState, OnlineSet, PresenceConfig, PresenceError};

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// What a consumer renders: who is online and whether the channel is up.
///
/// `revision` grows by one with every published change and never goes
/// back, so a consumer can drop anything older than what it already shows.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceSnapshot {
    pub outlet: Option<OutletId>,
    pub state: ChannelState,
    pub online_users: Vec<PresenceEntry>,
    pub is_connected: bool,
    pub revision: u64,
}

// ---------------------------------------------------------------------------
// PresenceClient
// ---------------------------------------------------------------------------

struct ChannelHandle {
    outlet: OutletId,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Keeps one presence channel open for whichever outlet it was last
/// started with.
///
/// Dropping the client signals its actor, which closes the socket and
/// cancels any pending reconnect on its own.
pub struct PresenceClient<C: Connector, K: Codec = JsonCodec> {
    connector: Arc<C>,
    codec: Arc<K>,
    credentials: CredentialWatch,
    config: PresenceConfig,
    snapshot: Arc<watch::Sender<PresenceSnapshot>>,
    channel: Option<ChannelHandle>,
    wall_clock: fn() -> i64,
}

impl<C: Connector> PresenceClient<C> {
    /// Creates a stopped client with the default configuration.
    pub fn new(connector: C, credentials: CredentialWatch) -> Self {
        Self::with_config(connector, credentials, PresenceConfig::default())
    }

    /// Creates a stopped client.
    pub fn with_config(connector: C, credentials: CredentialWatch, config: PresenceConfig) -> Self {
        Self::from_shared(Arc::new(connector), Arc::new(JsonCodec), credentials, config)
    }
}

impl<C: Connector, K: Codec> PresenceClient<C, K> {
    /// Creates a stopped client over a connector and codec that may be
    /// shared with other clients.
    pub fn from_shared(
        connector: Arc<C>,
        codec: Arc<K>,
        credentials: CredentialWatch,
        config: PresenceConfig,
    ) -> Self {
        let (snapshot, _) = watch::channel(PresenceSnapshot::default());
        Self {
            connector,
            codec,
            credentials,
            config: config.validated(),
            snapshot: Arc::new(snapshot),
            channel: None,
            wall_clock: now_unix,
        }
    }

    /// Replaces the wall clock the channel judges expiry against.
    #[cfg(test)]
    pub(crate) fn with_wall_clock(mut self, wall_clock: fn() -> i64) -> Self {
        self.wall_clock = wall_clock;
        self
    }

    /// Scopes the client to `outlet`.
    ///
    /// - `None` stops the client; it stays fully inert.
    /// - The outlet it already runs for is a no-op.
    /// - A different outlet closes the current connection before the new
    ///   one is opened.
    ///
    /// Connection problems are never returned; they show up as
    /// [`ChannelState::Reconnecting`] in the snapshot.
    pub async fn start(&mut self, outlet: Option<OutletId>) {
        let Some(outlet) = outlet else {
            self.stop().await;
            return;
        };

        if let Some(channel) = &self.channel {
            if channel.outlet == outlet && !channel.task.is_finished() {
                return;
            }
            tracing::info!(from = %channel.outlet, to = %outlet, "presence scope changed");
        }
        self.stop().await;
        self.launch(outlet);
    }

    /// Closes the connection, cancels any pending reconnect and waits for
    /// the actor to finish.
    pub async fn stop(&mut self) {
        let Some(channel) = self.channel.take() else {
            return;
        };
        let _ = channel.shutdown.send(());
        if let Err(e) = channel.task.await {
            tracing::error!(outlet = %channel.outlet, error = %e, "presence actor failed");
        }

        self.snapshot.send_if_modified(|s| {
            let stopped = s.outlet.is_none() && !s.state.is_active();
            if !stopped {
                s.outlet = None;
                s.state = ChannelState::Disconnected;
                s.online_users.clear();
                s.is_connected = false;
                s.revision += 1;
            }
            !stopped
        });
    }

    /// Spawns the actor for `outlet`. Any previous channel must already be
    /// stopped.
    pub(crate) fn launch(&mut self, outlet: OutletId) {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let actor = ChannelActor {
            outlet: outlet.clone(),
            connector: Arc::clone(&self.connector),
            codec: Arc::clone(&self.codec),
            credentials: self.credentials.clone(),
            watching: true,
            clock: SessionClock::start(self.wall_clock),
            session: SessionView::default(),
            deadline: None,
            connected_as: None,
            config: self.config.clone(),
            backoff: Backoff::new(self.config.backoff.clone()),
            online: OnlineSet::new(),
            state: ChannelState::Disconnected,
            snapshot: Arc::clone(&self.snapshot),
            shutdown: shutdown_rx,
        };
        self.snapshot.send_modify(|s| {
            s.outlet = Some(outlet.clone());
            s.revision += 1;
        });

        let task = tokio::spawn(actor.run());
        self.channel = Some(ChannelHandle {
            outlet,
            shutdown: shutdown_tx,
            task,
        });
    }

    /// The outlet the client is started for.
    pub fn outlet(&self) -> Option<&OutletId> {
        self.channel.as_ref().map(|c| &c.outlet)
    }

    pub fn is_running(&self) -> bool {
        self.channel.as_ref().is_some_and(|c| !c.task.is_finished())
    }

    /// The latest published snapshot.
    pub fn snapshot(&self) -> PresenceSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn state(&self) -> ChannelState {
        self.snapshot.borrow().state
    }

    /// A receiver that is notified on every published change.
    pub fn subscribe(&self) -> watch::Receiver<PresenceSnapshot> {
        self.snapshot.subscribe()
    }

    /// Waits until the channel is connected and returns that snapshot.
    ///
    /// Doesn't time out on its own: while the server is unreachable the
    /// channel keeps retrying and this keeps waiting.
    ///
    /// # Errors
    /// [`PresenceError::UnresolvedOutlet`] if the client isn't started,
    /// [`PresenceError::InvalidSession`] if the credential isn't usable.
    pub async fn wait_connected(&self) -> Result<PresenceSnapshot, PresenceError> {
        let outlet = self.outlet().cloned().ok_or(PresenceError::UnresolvedOutlet)?;
        if !self.credentials.is_valid_at((self.wall_clock)()) {
            return Err(PresenceError::InvalidSession(outlet));
        }

        let mut rx = self.subscribe();
        match rx.wait_for(|s| s.is_connected).await {
            Ok(snapshot) => Ok(snapshot.clone()),
            // The sender lives in `self`; it can't be gone while borrowed.
            Err(_) => Err(PresenceError::InvalidSession(outlet)),
        }
    }
}

// ---------------------------------------------------------------------------
// SessionClock
// ---------------------------------------------------------------------------

/// Unix seconds as the later of the runtime's clock and the wall clock.
///
/// Validity checks and the expiry timer both read this clock, so when the
/// timer fires the credential is also seen as expired. The runtime clock
/// stands still while the host is suspended; the wall clock doesn't, and
/// a credential that expired meanwhile is seen as expired on wake-up.
#[derive(Debug, Clone, Copy)]
struct SessionClock {
    origin_unix: i64,
    origin: Instant,
    wall: fn() -> i64,
}

impl SessionClock {
    fn start(wall: fn() -> i64) -> Self {
        Self {
            origin_unix: wall(),
            origin: Instant::now(),
            wall,
        }
    }

    fn now(&self) -> i64 {
        let elapsed = i64::try_from(self.origin.elapsed().as_secs()).unwrap_or(i64::MAX);
        self.origin_unix.saturating_add(elapsed).max((self.wall)())
    }

    /// The instant at which [`now`](Self::now) reaches `unix`, counted from
    /// the current time. `None` if that is too far out to represent.
    fn instant_at(&self, unix: i64) -> Option<Instant> {
        let ahead = unix.saturating_sub(self.now()).max(0) as u64;
        Instant::now().checked_add(Duration::from_secs(ahead))
    }
}

// ---------------------------------------------------------------------------
// SessionView
// ---------------------------------------------------------------------------

/// The current credential as the actor acts on it, decoded once per
/// change instead of once per frame.
#[derive(Debug, Clone, Default)]
struct SessionView {
    /// A token is present and its claims decode.
    usable: bool,
    expires_at: Option<i64>,
    identity: SessionIdentity,
}

impl SessionView {
    fn read(credentials: &CredentialWatch) -> Self {
        let current = credentials.current();
        let claims = current.claims();
        Self {
            usable: claims.is_some(),
            expires_at: claims.and_then(|c| c.expires_at),
            identity: current.identity(),
        }
    }

    fn valid_at(&self, now: i64) -> bool {
        self.usable && self.expires_at.is_none_or(|exp| exp > now)
    }
}

// ---------------------------------------------------------------------------
// ChannelActor
// ---------------------------------------------------------------------------

/// Why the actor left the connection loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stop {
    Shutdown,
    SessionEnded,
    /// Someone else signed in; the socket still carries the old token.
    UserChanged,
}

struct ChannelActor<C: Connector, K: Codec> {
    outlet: OutletId,
    connector: Arc<C>,
    codec: Arc<K>,
    credentials: CredentialWatch,
    /// Cleared once the credential store is gone and can't change again.
    watching: bool,
    clock: SessionClock,
    session: SessionView,
    /// When `session` expires on the runtime clock.
    deadline: Option<Instant>,
    /// Whose token the current attempt or connection presented.
    connected_as: Option<SessionIdentity>,
    config: PresenceConfig,
    backoff: Backoff,
    online: OnlineSet,
    state: ChannelState,
    snapshot: Arc<watch::Sender<PresenceSnapshot>>,
    shutdown: oneshot::Receiver<()>,
}

impl<C: Connector, K: Codec> ChannelActor<C, K> {
    async fn run(mut self) {
        tracing::info!(outlet = %self.outlet, "presence channel started");
        self.refresh_session();

        loop {
            if !self.session_valid() {
                tracing::debug!(outlet = %self.outlet, "no valid session, waiting for sign-in");
                if !self.wait_for_session().await {
                    break;
                }
            }

            match self.connect_and_pump().await {
                Stop::Shutdown => break,
                Stop::SessionEnded | Stop::UserChanged => {
                    self.transition(ChannelState::Disconnected);
                    tracing::info!(outlet = %self.outlet, "session ended, presence channel closed");
                }
            }
        }

        self.transition(ChannelState::Disconnected);
        tracing::info!(outlet = %self.outlet, "presence channel stopped");
    }

    /// Parks until the credential becomes valid. Returns `false` on
    /// shutdown.
    async fn wait_for_session(&mut self) -> bool {
        loop {
            tokio::select! {
                biased;
                _ = &mut self.shutdown => return false,
                alive = self.credentials.changed(), if self.watching => {
                    if !alive {
                        self.watching = false;
                        continue;
                    }
                    self.refresh_session();
                    if self.session_valid() {
                        return true;
                    }
                }
            }
        }
    }

    /// Connects, pumps frames and reconnects with backoff until told to
    /// stop or the session ends.
    async fn connect_and_pump(&mut self) -> Stop {
        self.backoff.reset();
        self.transition(ChannelState::Connecting);

        loop {
            let outcome = match self.attempt().await {
                Ok(Some(conn)) => self.pump(conn).await,
                Ok(None) => Ok(()),
                Err(stop) => Err(stop),
            };
            self.connected_as = None;

            match outcome {
                Ok(()) => {}
                Err(Stop::UserChanged) => {
                    self.transition(ChannelState::Reconnecting);
                    continue;
                }
                Err(stop) => return stop,
            }

            self.transition(ChannelState::Reconnecting);
            let delay = self.backoff.next_delay();
            tracing::debug!(
                outlet = %self.outlet,
                attempt = self.backoff.attempt(),
                delay_ms = delay.as_millis() as u64,
                "presence reconnect scheduled"
            );
            if let Err(stop) = self.guard(tokio::time::sleep(delay)).await {
                return stop;
            }
        }
    }

    /// One connection attempt. `Ok(None)` means it failed and was logged.
    async fn attempt(&mut self) -> Result<Option<C::Connection>, Stop> {
        // Re-read against the wall clock: the host may have slept through
        // the expiry while the backoff timer was pending.
        self.refresh_session();
        if !self.session_valid() {
            tracing::info!(outlet = %self.outlet, "credential expired before reconnect");
            return Err(Stop::SessionEnded);
        }
        let Some(token) = self.credentials.token() else {
            return Err(Stop::SessionEnded);
        };
        self.connected_as = Some(self.session.identity.clone());
        let connector = Arc::clone(&self.connector);
        let outlet = self.outlet.clone();
        let timeout = self.config.connect_timeout;

        let connect = tokio::time::timeout(timeout, connector.connect(outlet.as_str(), &token));
        match self.guard(connect).await? {
            Ok(Ok(conn)) => Ok(Some(conn)),
            Ok(Err(e)) => {
                tracing::warn!(outlet = %self.outlet, error = %e, "presence connect attempt failed");
                Ok(None)
            }
            Err(_) => {
                tracing::warn!(
                    outlet = %self.outlet,
                    timeout_ms = timeout.as_millis() as u64,
                    "presence connect attempt timed out"
                );
                Ok(None)
            }
        }
    }

    /// Reads frames until the connection ends. `Ok(())` means it was lost
    /// and should be retried.
    async fn pump(&mut self, mut conn: C::Connection) -> Result<(), Stop> {
        let id = conn.id();
        self.backoff.reset();
        self.transition(ChannelState::Connected);
        tracing::info!(outlet = %self.outlet, conn = %id, "presence channel connected");

        loop {
            let received = self.guard(conn.recv()).await;
            match received {
                Ok(Ok(Some(frame))) => {
                    if !self.session_valid() {
                        tracing::info!(outlet = %self.outlet, "credential expired");
                        close_connection(&mut conn, self.config.close_timeout).await;
                        return Err(Stop::SessionEnded);
                    }
                    self.handle_frame(&frame);
                }
                Ok(Ok(None)) => {
                    tracing::info!(outlet = %self.outlet, conn = %id, "presence connection closed by server");
                    return Ok(());
                }
                Ok(Err(e)) => {
                    tracing::warn!(outlet = %self.outlet, conn = %id, error = %e, "presence connection lost");
                    return Ok(());
                }
                Err(stop) => {
                    close_connection(&mut conn, self.config.close_timeout).await;
                    return Err(stop);
                }
            }
        }
    }

    /// Drives `fut` to completion unless the channel has to stop first:
    /// shutdown was requested, the credential became unusable or reached
    /// its expiry time, or another user signed in.
    async fn guard<F: Future>(&mut self, fut: F) -> Result<F::Output, Stop> {
        tokio::pin!(fut);
        let expiry = expiry_sleep(self.deadline);
        tokio::pin!(expiry);

        loop {
            tokio::select! {
                biased;
                _ = &mut self.shutdown => return Err(Stop::Shutdown),
                _ = &mut expiry => {
                    tracing::info!(outlet = %self.outlet, "credential expired");
                    return Err(Stop::SessionEnded);
                }
                alive = self.credentials.changed(), if self.watching => {
                    if !alive {
                        self.watching = false;
                        continue;
                    }
                    self.refresh_session();
                    if !self.session_valid() {
                        tracing::info!(outlet = %self.outlet, "credential no longer valid");
                        return Err(Stop::SessionEnded);
                    }
                    if self.connected_as.as_ref().is_some_and(|who| *who != self.session.identity) {
                        tracing::info!(outlet = %self.outlet, "signed in as another user, reconnecting");
                        return Err(Stop::UserChanged);
                    }
                    expiry.set(expiry_sleep(self.deadline));
                }
                out = &mut fut => return Ok(out),
            }
        }
    }

    fn handle_frame(&mut self, frame: &[u8]) {
        let event: PresenceEvent = match self.codec.decode(frame) {
            Ok(event) => event,
            Err(e) => {
                tracing::debug!(outlet = %self.outlet, error = %e, "ignoring undecodable presence frame");
                return;
            }
        };
        if let Err(e) = event.validate() {
            tracing::debug!(outlet = %self.outlet, error = %e, "ignoring invalid presence event");
            return;
        }

        let kind = event.kind();
        if self.online.apply(event) {
            tracing::trace!(outlet = %self.outlet, kind, online = self.online.len(), "presence updated");
            self.publish();
        } else {
            tracing::trace!(outlet = %self.outlet, kind, "presence event changed nothing");
        }
    }

    fn transition(&mut self, next: ChannelState) {
        if self.state == next {
            return;
        }
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal channel transition {} -> {}",
            self.state,
            next
        );
        tracing::debug!(outlet = %self.outlet, from = %self.state, to = %next, "presence channel state");

        self.state = next;
        if !next.is_connected() {
            self.online.clear();
        }
        self.publish();
    }

    fn publish(&self) {
        let outlet = self.outlet.clone();
        let state = self.state;
        let online = self.online.entries().to_vec();
        self.snapshot.send_modify(|s| {
            s.outlet = Some(outlet);
            s.state = state;
            s.is_connected = state.is_connected();
            s.online_users = online;
            s.revision += 1;
        });
    }

    fn session_valid(&self) -> bool {
        self.session.valid_at(self.clock.now())
    }

    /// Decodes the current credential and re-arms the expiry deadline.
    fn refresh_session(&mut self) {
        self.session = SessionView::read(&self.credentials);
        self.deadline = self
            .session
            .expires_at
            .and_then(|exp| self.clock.instant_at(exp));
    }
}

async fn expiry_sleep(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn close_connection<T: Connection>(conn: &mut T, timeout: Duration) {
    let id = conn.id();
    match tokio::time::timeout(timeout, conn.close()).await {
        Ok(Ok(())) => tracing::debug!(conn = %id, "presence connection closed"),
        Ok(Err(e)) => tracing::debug!(conn = %id, error = %e, "presence close failed"),
        Err(_) => tracing::debug!(conn = %id, "presence close timed out, dropping socket"),
    }
}
