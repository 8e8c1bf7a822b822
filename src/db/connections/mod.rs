// =====================================================
// CONNECTION MANAGEMENT MODULE
// Per-role connection URLs, the cached interactive connection,
// and dedicated per-job connections
// =====================================================

use super::sql_utils::mask_url;
use crate::db_types::{StoreRole, StoreStatus};
use crate::error::{LoaderError, LoaderResult};
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::{ConnectOptions, Connection};
use std::str::FromStr;
use std::sync::RwLock;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::{timeout, Duration};

pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    /// Server-side `statement_timeout` applied to every session; 0 disables it.
    pub statement_timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            statement_timeout_secs: 0,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
        }
    }
}

const LIVENESS_PING_SECS: u64 = 2;

/// URL and cached connection are locked separately, so URL lookups and
/// status polls never wait behind a query running on the lease.
#[derive(Default)]
struct RoleSlot {
    url: RwLock<Option<String>>,
    connection: Mutex<Option<PgConnection>>,
}

impl RoleSlot {
    fn read_url(&self) -> Option<String> {
        self.url
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Returns the previous URL.
    fn write_url(&self, url: Option<String>) -> Option<String> {
        let mut guard = self
            .url
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        std::mem::replace(&mut *guard, url)
    }
}

/// Holds the configured URL and at most one cached connection per role.
///
/// The cached connection serves short request-path operations and is
/// serialized by its mutex. Jobs never touch it: they open their own
/// connection through [`ConnectionManager::open_dedicated`] and close it when
/// they finish, so concurrent jobs cannot interleave inside one transaction.
pub struct ConnectionManager {
    settings: ConnectionSettings,
    source: RoleSlot,
    target: RoleSlot,
}

/// Exclusive lease on a role's cached connection.
pub struct SharedConnection<'a> {
    role: StoreRole,
    connection: MutexGuard<'a, Option<PgConnection>>,
}

impl SharedConnection<'_> {
    pub fn connection(&mut self) -> LoaderResult<&mut PgConnection> {
        let role = self.role;
        self.connection
            .as_mut()
            .ok_or_else(|| LoaderError::Configuration(role.not_configured_message()))
    }
}

impl ConnectionManager {
    pub fn new(settings: ConnectionSettings) -> Self {
        Self {
            settings,
            source: RoleSlot::default(),
            target: RoleSlot::default(),
        }
    }

    fn slot(&self, role: StoreRole) -> &RoleSlot {
        match role {
            StoreRole::Source => &self.source,
            StoreRole::Target => &self.target,
        }
    }

    /// Store the URL for a role. A changed URL closes the cached connection;
    /// the next use reconnects lazily.
    pub async fn configure(&self, role: StoreRole, url: &str) -> LoaderResult<()> {
        let url = url.trim();
        if url.is_empty() {
            return Err(LoaderError::validation("database_url required"));
        }

        let slot = self.slot(role);
        let previous = slot.write_url(Some(url.to_string()));
        if previous.as_deref() != Some(url) {
            log::info!("{} store configured: {}", role.label(), mask_url(url));
            if let Some(connection) = slot.connection.lock().await.take() {
                close_quietly(role, connection).await;
            }
        }
        Ok(())
    }

    /// Forget the URL and close the cached connection.
    pub async fn disconnect(&self, role: StoreRole) {
        let slot = self.slot(role);
        slot.write_url(None);
        if let Some(connection) = slot.connection.lock().await.take() {
            close_quietly(role, connection).await;
        }
    }

    pub async fn is_configured(&self, role: StoreRole) -> bool {
        self.slot(role).read_url().is_some()
    }

    pub async fn url(&self, role: StoreRole) -> LoaderResult<String> {
        self.slot(role)
            .read_url()
            .ok_or_else(|| LoaderError::Configuration(role.not_configured_message()))
    }

    /// Never waits on a leased connection: a lease in use counts as live.
    /// An idle cached connection is pinged and dropped when the peer is gone.
    pub async fn status(&self, role: StoreRole) -> StoreStatus {
        let slot = self.slot(role);
        let database_url = slot.read_url().as_deref().map(mask_url);

        let connected = match slot.connection.try_lock() {
            Err(_) => true,
            Ok(mut cached) => match cached.as_mut() {
                None => false,
                Some(connection) => {
                    let ping = timeout(
                        Duration::from_secs(LIVENESS_PING_SECS),
                        connection.ping(),
                    )
                    .await;
                    match ping {
                        Ok(Ok(())) => true,
                        _ => {
                            log::warn!("{} cached connection is no longer alive", role.label());
                            *cached = None;
                            false
                        }
                    }
                }
            },
        };

        StoreStatus {
            connected,
            database_url,
        }
    }

    /// Lease the cached connection, opening it or replacing a stale one first.
    pub async fn shared(&self, role: StoreRole) -> LoaderResult<SharedConnection<'_>> {
        let slot = self.slot(role);
        let url = self.url(role).await?;
        let mut cached = slot.connection.lock().await;

        let stale = match cached.as_mut() {
            Some(connection) => connection.ping().await.err(),
            None => None,
        };
        if let Some(err) = stale {
            log::warn!("{} connection is stale, reconnecting: {}", role.label(), err);
            *cached = None;
        }

        if cached.is_none() {
            *cached = Some(self.connect(&url).await?);
        }

        Ok(SharedConnection {
            role,
            connection: cached,
        })
    }

    /// Round-trip `SELECT 1` on the cached connection.
    pub async fn verify(&self, role: StoreRole) -> LoaderResult<()> {
        let mut lease = self.shared(role).await?;
        sqlx::query("SELECT 1")
            .execute(lease.connection()?)
            .await?;
        Ok(())
    }

    /// Open a connection owned by a single job.
    pub async fn open_dedicated(&self, role: StoreRole) -> LoaderResult<PgConnection> {
        let url = self.url(role).await?;
        self.connect(&url).await
    }

    async fn connect(&self, url: &str) -> LoaderResult<PgConnection> {
        let mut options =
            PgConnectOptions::from_str(url)?.log_statements(log::LevelFilter::Debug);
        if self.settings.statement_timeout_secs > 0 {
            options = options.options([(
                "statement_timeout",
                format!("{}s", self.settings.statement_timeout_secs),
            )]);
        }

        let limit = self.settings.connect_timeout_secs.max(1);
        timeout(Duration::from_secs(limit), options.connect())
            .await
            .map_err(|_| LoaderError::Timeout(limit))?
            .map_err(LoaderError::from)
    }
}

pub async fn close_quietly(role: StoreRole, connection: PgConnection) {
    if let Err(err) = connection.close().await {
        log::warn!("Failed to close {} connection: {}", role.label(), err);
    }
}

#[cfg(test)]
mod tests;
