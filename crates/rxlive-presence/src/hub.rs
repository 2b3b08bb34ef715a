//! Shared presence channels: one connection per outlet, many consumers.
//!
//! Each consumer takes a [`PresenceLease`] for the outlet it shows. The
//! first lease for an outlet opens the channel; the channel closes when
//! the last lease for it is dropped.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rxlive_protocol::{Codec, JsonCodec, OutletId};
use rxlive_session::CredentialWatch;
use rxlive_transport::Connector;
use tokio::sync::watch;

use crate::{PresenceClient, PresenceConfig, PresenceSnapshot};

struct SharedChannel<C: Connector, K: Codec> {
    client: PresenceClient<C, K>,
    leases: usize,
}

struct HubInner<C: Connector, K: Codec> {
    connector: Arc<C>,
    codec: Arc<K>,
    credentials: CredentialWatch,
    config: PresenceConfig,
    channels: Mutex<HashMap<OutletId, SharedChannel<C, K>>>,
}

impl<C: Connector, K: Codec> HubInner<C, K> {
    fn lock(&self) -> MutexGuard<'_, HashMap<OutletId, SharedChannel<C, K>>> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Hands out reference-counted access to per-outlet presence channels.
///
/// Cheap to clone; clones share the same channels.
pub struct PresenceHub<C: Connector, K: Codec = JsonCodec> {
    inner: Arc<HubInner<C, K>>,
}

impl<C: Connector, K: Codec> Clone for PresenceHub<C, K> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Connector> PresenceHub<C> {
    pub fn new(connector: C, credentials: CredentialWatch) -> Self {
        Self::with_config(connector, credentials, PresenceConfig::default())
    }

    pub fn with_config(connector: C, credentials: CredentialWatch, config: PresenceConfig) -> Self {
        Self::with_codec(connector, JsonCodec, credentials, config)
    }
}

impl<C: Connector, K: Codec> PresenceHub<C, K> {
    pub fn with_codec(
        connector: C,
        codec: K,
        credentials: CredentialWatch,
        config: PresenceConfig,
    ) -> Self {
        Self {
            inner: Arc::new(HubInner {
                connector: Arc::new(connector),
                codec: Arc::new(codec),
                credentials,
                config,
                channels: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Takes a lease on the channel for `outlet`, opening it if this is
    /// the first one.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn lease(&self, outlet: OutletId) -> PresenceLease<C, K> {
        let mut channels = self.inner.lock();
        let shared = channels.entry(outlet.clone()).or_insert_with(|| {
            let mut client = PresenceClient::from_shared(
                Arc::clone(&self.inner.connector),
                Arc::clone(&self.inner.codec),
                self.inner.credentials.clone(),
                self.inner.config.clone(),
            );
            client.launch(outlet.clone());
            tracing::info!(%outlet, "shared presence channel opened");
            SharedChannel { client, leases: 0 }
        });
        shared.leases += 1;
        tracing::debug!(%outlet, leases = shared.leases, "presence lease taken");

        PresenceLease {
            snapshots: shared.client.subscribe(),
            hub: Arc::clone(&self.inner),
            outlet,
        }
    }

    /// Outlets with an open channel, sorted.
    pub fn outlets(&self) -> Vec<OutletId> {
        let mut outlets: Vec<_> = self.inner.lock().keys().cloned().collect();
        outlets.sort();
        outlets
    }

    /// Number of live leases on `outlet`.
    pub fn lease_count(&self, outlet: &OutletId) -> usize {
        self.inner.lock().get(outlet).map_or(0, |s| s.leases)
    }
}

/// One consumer's hold on a shared presence channel.
///
/// Dropping the lease releases it.
pub struct PresenceLease<C: Connector, K: Codec = JsonCodec> {
    hub: Arc<HubInner<C, K>>,
    outlet: OutletId,
    snapshots: watch::Receiver<PresenceSnapshot>,
}

impl<C: Connector, K: Codec> PresenceLease<C, K> {
    pub fn outlet(&self) -> &OutletId {
        &self.outlet
    }

    pub fn snapshot(&self) -> PresenceSnapshot {
        self.snapshots.borrow().clone()
    }

    /// A receiver of this channel's snapshots, independent of the lease's
    /// own change tracking.
    pub fn subscribe(&self) -> watch::Receiver<PresenceSnapshot> {
        self.snapshots.clone()
    }

    /// Waits for the next snapshot.
    pub async fn changed(&mut self) -> PresenceSnapshot {
        // The channel outlives every lease on it, so the sender is alive.
        let _ = self.snapshots.changed().await;
        self.snapshots.borrow_and_update().clone()
    }
}

impl<C: Connector, K: Codec> Drop for PresenceLease<C, K> {
    fn drop(&mut self) {
        let mut channels = self.hub.lock();
        let Some(shared) = channels.get_mut(&self.outlet) else {
            return;
        };
        shared.leases = shared.leases.saturating_sub(1);
        tracing::debug!(outlet = %self.outlet, leases = shared.leases, "presence lease released");

        if shared.leases == 0 {
            // Dropping the client tells its actor to close the socket.
            channels.remove(&self.outlet);
            tracing::info!(outlet = %self.outlet, "shared presence channel closed");
        }
    }
}
