//! Session Pool — holds `N` authenticated transport sessions, authenticates
//! at most once per process, and routes chunk fetches to sessions
//! deterministically.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use stream_transport::{CredentialBlob, RemoteTransport, TransportError, TransportFactory};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::{SessionError, SessionResult};

/// Fixed margin added on top of a rate-limit's server-specified wait.
const RATE_LIMIT_SAFETY_MARGIN: Duration = Duration::from_millis(500);
/// Interval at which a rate-limit wait logs a progress line.
const RATE_LIMIT_LOG_INTERVAL: Duration = Duration::from_secs(5);

struct Slot {
    transport: Arc<dyn RemoteTransport>,
    connected: bool,
}

/// A pool of `N` authenticated sessions over the remote transport. Index 0
/// performs the only fresh authentication exchange in the process lifetime
/// (spec.md §3 invariant 3); every other slot connects by replaying the
/// persisted credential.
pub struct SessionPool {
    factory: Box<dyn TransportFactory>,
    credential_path: PathBuf,
    slots: Mutex<Vec<Slot>>,
}

impl SessionPool {
    pub fn new(factory: Box<dyn TransportFactory>, credential_path: PathBuf) -> Self {
        Self {
            factory,
            credential_path,
            slots: Mutex::new(Vec::new()),
        }
    }

    /// Idempotent: raise the pool to `desired_size` live, connected
    /// sessions. Safe to call repeatedly (e.g. on every `start_stream`).
    pub async fn ensure_pool(&self, desired_size: usize) -> SessionResult<()> {
        let mut slots = self.slots.lock().await;
        let deficit = desired_size.saturating_sub(slots.len());
        if deficit == 0 {
            return Ok(());
        }

        let credential = self.credential_for_pool_growth(&mut slots).await?;

        for _ in 0..deficit {
            let transport: Arc<dyn RemoteTransport> = self.factory.new_session().into();
            transport
                .connect_with_credential(&credential)
                .await
                .map_err(|e| SessionError::ReconnectFailed(e.to_string()))?;
            slots.push(Slot {
                transport,
                connected: true,
            });
        }

        info!(pool_size = slots.len(), "session pool at target size");
        Ok(())
    }

    /// Obtain the credential to connect new slots with: the one just
    /// established by slot 0 (if this is the pool's first growth), the
    /// persisted one on disk, or a freshly authenticated one.
    async fn credential_for_pool_growth(
        &self,
        slots: &mut Vec<Slot>,
    ) -> SessionResult<CredentialBlob> {
        // Growing an already-established pool: slot 0 already persisted a
        // credential when it was created, just replay it.
        if !slots.is_empty() {
            if let Some(credential) = stream_transport::credential::load(&self.credential_path) {
                return Ok(credential);
            }
        }

        // First-ever growth: try the persisted credential from a prior
        // process run, verified live; fall back to a fresh authentication.
        if let Some(credential) = stream_transport::credential::load(&self.credential_path) {
            let probe: Arc<dyn RemoteTransport> = self.factory.new_session().into();
            if probe.connect_with_credential(&credential).await.is_ok()
                && probe.check_liveness().await.is_ok()
            {
                if slots.is_empty() {
                    slots.push(Slot {
                        transport: probe,
                        connected: true,
                    });
                }
                return Ok(credential);
            }
            warn!("persisted credential failed liveness check, re-authenticating");
        }

        let leader: Arc<dyn RemoteTransport> = self.factory.new_session().into();
        let credential = self.authenticate_with_rate_limit_absorption(&leader).await?;
        stream_transport::credential::persist(&self.credential_path, &credential)
            .map_err(|e| SessionError::AuthFailed(e.to_string()))?;
        leader
            .connect_with_credential(&credential)
            .await
            .map_err(|e| SessionError::AuthFailed(e.to_string()))?;
        if slots.is_empty() {
            slots.push(Slot {
                transport: leader,
                connected: true,
            });
        }
        Ok(credential)
    }

    async fn authenticate_with_rate_limit_absorption(
        &self,
        transport: &Arc<dyn RemoteTransport>,
    ) -> SessionResult<CredentialBlob> {
        loop {
            match transport.authenticate().await {
                Ok(credential) => return Ok(credential),
                Err(TransportError::RateLimited { retry_after }) => {
                    self.wait_out_rate_limit(retry_after).await;
                }
                Err(other) => return Err(SessionError::AuthFailed(other.to_string())),
            }
        }
    }

    async fn wait_out_rate_limit(&self, retry_after: Duration) {
        let total = retry_after + RATE_LIMIT_SAFETY_MARGIN;
        let mut remaining = total;
        while !remaining.is_zero() {
            let step = remaining.min(RATE_LIMIT_LOG_INTERVAL);
            tokio::time::sleep(step).await;
            remaining = remaining.saturating_sub(step);
            info!(remaining_secs = remaining.as_secs(), "rate limited, waiting");
        }
    }

    /// Deterministic routing: `chunk_index mod pool_size`. Reconnects the
    /// selected slot in place if it was marked disconnected.
    pub async fn acquire(&self, chunk_index: u64) -> SessionResult<Arc<dyn RemoteTransport>> {
        let mut slots = self.slots.lock().await;
        if slots.is_empty() {
            return Err(SessionError::PoolEmpty);
        }
        let idx = (chunk_index as usize) % slots.len();

        if !slots[idx].connected {
            self.reconnect_slot(&mut slots, idx).await?;
        }

        Ok(slots[idx].transport.clone())
    }

    /// First connected session; used for metadata resolution.
    pub async fn any_connected(&self) -> SessionResult<Arc<dyn RemoteTransport>> {
        let mut slots = self.slots.lock().await;
        if slots.is_empty() {
            return Err(SessionError::PoolEmpty);
        }
        if !slots.iter().any(|s| s.connected) {
            self.reconnect_slot(&mut slots, 0).await?;
        }
        let idx = slots.iter().position(|s| s.connected).unwrap_or(0);
        Ok(slots[idx].transport.clone())
    }

    /// Mark a slot disconnected after a transport failure so the next
    /// `acquire`/`any_connected` reconnects it before use.
    pub async fn mark_disconnected(&self, chunk_index: u64) {
        let mut slots = self.slots.lock().await;
        if slots.is_empty() {
            return;
        }
        let idx = (chunk_index as usize) % slots.len();
        slots[idx].connected = false;
    }

    async fn reconnect_slot(&self, slots: &mut [Slot], idx: usize) -> SessionResult<()> {
        let credential = stream_transport::credential::load(&self.credential_path)
            .ok_or_else(|| SessionError::ReconnectFailed("no persisted credential".into()))?;
        slots[idx]
            .transport
            .connect_with_credential(&credential)
            .await
            .map_err(|e| SessionError::ReconnectFailed(e.to_string()))?;
        slots[idx].connected = true;
        Ok(())
    }

    pub async fn pool_size(&self) -> usize {
        self.slots.lock().await.len()
    }

    pub async fn disconnect_all(&self) {
        self.slots.lock().await.clear();
    }
}
