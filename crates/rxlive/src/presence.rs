//! `OutletPresence`: the consumer-side adapter.
//!
//! Ties the layers together for one consumer: credential store →
//! outlet resolver → presence client. A dashboard badge holds one of
//! these and renders [`PresenceSnapshot`]s.

use std::sync::Arc;

use rxlive_presence::{ChannelState, PresenceClient, PresenceConfig, PresenceError, PresenceSnapshot};
use rxlive_protocol::OutletId;
use rxlive_session::{resolve_outlet_id_or_stored, CredentialStore, SessionReport};
use rxlive_transport::Connector;
use tokio::sync::watch;

use crate::RxliveError;

/// Presence for the outlet the signed-in user belongs to.
///
/// The outlet is resolved from the in-memory profile, or from the last
/// stored one on a cold start. With no outlet the adapter stays fully
/// inert: disconnected and making no network attempts.
pub struct OutletPresence<C: Connector> {
    store: Arc<CredentialStore>,
    client: PresenceClient<C>,
}

impl<C: Connector> OutletPresence<C> {
    /// Creates an unscoped adapter. Call [`refresh`](Self::refresh) or
    /// [`follow`](Self::follow) to start it.
    pub fn new(store: Arc<CredentialStore>, connector: C) -> Self {
        Self::with_config(store, connector, PresenceConfig::default())
    }

    pub fn with_config(store: Arc<CredentialStore>, connector: C, config: PresenceConfig) -> Self {
        let client = PresenceClient::with_config(connector, store.watch(), config);
        Self { store, client }
    }

    /// Re-resolves the outlet and scopes the channel to it.
    ///
    /// Call after sign-in or whenever the profile may have changed.
    /// Returns the outlet now in scope.
    pub async fn refresh(&mut self) -> Option<OutletId> {
        let profile = self.store.profile();
        let outlet = resolve_outlet_id_or_stored(profile.as_ref(), &self.store);
        if outlet.is_none() {
            tracing::debug!("no outlet scope for the current profile, presence stays disconnected");
        }
        self.client.start(outlet.clone()).await;
        outlet
    }

    /// Scopes the channel to an explicit outlet, bypassing the resolver.
    pub async fn scope(&mut self, outlet: Option<OutletId>) {
        self.client.start(outlet).await;
    }

    /// Keeps the scope in step with the credential store: refreshes now
    /// and again on every sign-in, sign-out or token refresh.
    ///
    /// Runs until the future is dropped.
    pub async fn follow(&mut self) {
        let mut credentials = self.store.watch();
        self.refresh().await;
        while credentials.changed().await {
            self.refresh().await;
        }
    }

    /// Closes the channel and cancels any pending reconnect.
    pub async fn stop(&mut self) {
        self.client.stop().await;
    }

    /// The outlet in scope.
    ///
    /// # Errors
    /// [`PresenceError::UnresolvedOutlet`] if there is none.
    pub fn require_outlet(&self) -> Result<OutletId, PresenceError> {
        self.client.outlet().cloned().ok_or(PresenceError::UnresolvedOutlet)
    }

    pub fn snapshot(&self) -> PresenceSnapshot {
        self.client.snapshot()
    }

    pub fn state(&self) -> ChannelState {
        self.client.state()
    }

    pub fn is_connected(&self) -> bool {
        self.client.state().is_connected()
    }

    pub fn subscribe(&self) -> watch::Receiver<PresenceSnapshot> {
        self.client.subscribe()
    }

    /// Waits until the channel is connected.
    pub async fn wait_connected(&self) -> Result<PresenceSnapshot, RxliveError> {
        Ok(self.client.wait_connected().await?)
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// Side-effect-free report on the stored session.
    pub fn diagnose(&self) -> SessionReport {
        self.store.diagnose()
    }
}

#[cfg(feature = "websocket")]
pub use self::websocket::OutletPresenceBuilder;

#[cfg(feature = "websocket")]
mod websocket {
    use std::sync::Arc;
    use std::time::Duration;

    use rxlive_backoff::BackoffConfig;
    use rxlive_presence::PresenceConfig;
    use rxlive_session::CredentialStore;
    use rxlive_transport::WebSocketConnector;

    use super::OutletPresence;

    /// Builder for an [`OutletPresence`] over a WebSocket endpoint.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// use rxlive::prelude::*;
    ///
    /// let presence = OutletPresence::builder("wss://api.example.com/presence")
    ///     .connect_timeout(Duration::from_secs(5))
    ///     .build(store);
    /// ```
    pub struct OutletPresenceBuilder {
        endpoint: String,
        outlet_param: Option<String>,
        config: PresenceConfig,
    }

    impl OutletPresenceBuilder {
        pub fn new(endpoint: impl Into<String>) -> Self {
            Self {
                endpoint: endpoint.into(),
                outlet_param: None,
                config: PresenceConfig::default(),
            }
        }

        /// Query parameter carrying the outlet id. Defaults to `outletId`.
        pub fn outlet_param(mut self, name: impl Into<String>) -> Self {
            self.outlet_param = Some(name.into());
            self
        }

        pub fn connect_timeout(mut self, timeout: Duration) -> Self {
            self.config.connect_timeout = timeout;
            self
        }

        pub fn backoff(mut self, backoff: BackoffConfig) -> Self {
            self.config.backoff = backoff;
            self
        }

        pub fn config(mut self, config: PresenceConfig) -> Self {
            self.config = config;
            self
        }

        /// Builds an unscoped adapter. No connection is made until it is
        /// refreshed.
        pub fn build(self, store: Arc<CredentialStore>) -> OutletPresence<WebSocketConnector> {
            let mut connector = WebSocketConnector::new(self.endpoint);
            if let Some(name) = self.outlet_param {
                connector = connector.outlet_param(name);
            }
            OutletPresence::with_config(store, connector, self.config)
        }
    }

    impl OutletPresence<WebSocketConnector> {
        pub fn builder(endpoint: impl Into<String>) -> OutletPresenceBuilder {
            OutletPresenceBuilder::new(endpoint)
        }
    }
}
