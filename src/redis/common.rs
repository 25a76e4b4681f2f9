use std::{
    ops::Deref,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use redis::{Client, aio::ConnectionManager};

use crate::{ThrottleError, ThrottleKey};

/// Round-robin wrapper over one or more [`redis::aio::ConnectionManager`]s.
pub struct ThrottleRedisClient {
    connection_managers: Arc<Vec<ConnectionManager>>,
    track_index: AtomicUsize,
}

// `ConnectionManager` does not implement `Debug`, so the derive is not available.
impl std::fmt::Debug for ThrottleRedisClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThrottleRedisClient")
            .field("connection_count", &self.connection_managers.len())
            .field("track_index", &self.track_index)
            .finish_non_exhaustive()
    }
}

impl ThrottleRedisClient {
    /// Open a single managed connection from `client`.
    pub async fn default_from_client(client: Client) -> Result<Self, ThrottleError> {
        Self::from_client(client, 1).await
    }

    /// Open `connection_count` managed connections from `client`.
    pub async fn from_client(
        client: Client,
        connection_count: usize,
    ) -> Result<Self, ThrottleError> {
        if connection_count == 0 {
            return Err(ThrottleError::Configuration(
                "redis connection count must be > 0".to_string(),
            ));
        }

        let mut connection_managers = Vec::with_capacity(connection_count);

        for _ in 0..connection_count {
            connection_managers.push(client.get_connection_manager().await?);
        }

        Ok(Self::from_connection_managers(connection_managers))
    }

    /// Wrap connection managers that were opened elsewhere.
    ///
    /// With an empty vector every store call fails with
    /// [`ThrottleError::StoreUnavailable`].
    pub fn from_connection_managers(connection_managers: Vec<ConnectionManager>) -> Self {
        Self {
            connection_managers: Arc::new(connection_managers),
            track_index: AtomicUsize::new(0),
        }
    }

    pub(crate) fn get(&self) -> Result<ConnectionManager, ThrottleError> {
        let len = self.connection_managers.len();
        if len == 0 {
            return Err(ThrottleError::StoreUnavailable(
                "no redis connection available".to_string(),
            ));
        }

        let index = self.track_index.fetch_add(1, Ordering::Relaxed);
        Ok(self.connection_managers[index % len].clone())
    } // end method get
} // end impl ThrottleRedisClient

impl Clone for ThrottleRedisClient {
    fn clone(&self) -> Self {
        Self {
            connection_managers: self.connection_managers.clone(),
            track_index: AtomicUsize::new(0),
        }
    }
}

/// A validated namespace for every Redis key the store writes.
///
/// Constraints:
/// - Must not be empty
/// - Must not be longer than 255 bytes
/// - Must not contain colons
#[derive(Debug, Clone, PartialEq, PartialOrd, Hash, Eq)]
pub struct KeyPrefix(Arc<str>);

impl KeyPrefix {
    /// The prefix used when none is configured: `throttle_ai`.
    pub fn default_prefix() -> Self {
        Self(Arc::from("throttle_ai"))
    }

    pub(crate) fn store_key(&self, key: &ThrottleKey) -> String {
        format!("{}:{}", self.0, &**key)
    }
}

impl Default for KeyPrefix {
    fn default() -> Self {
        Self::default_prefix()
    }
}

impl Deref for KeyPrefix {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<String> for KeyPrefix {
    type Error = ThrottleError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.is_empty() {
            Err(ThrottleError::InvalidKey(
                "Redis key prefix must not be empty".to_string(),
            ))
        } else if value.len() > 255 {
            Err(ThrottleError::InvalidKey(
                "Redis key prefix must not be longer than 255 characters".to_string(),
            ))
        } else if value.contains(':') {
            Err(ThrottleError::InvalidKey(
                "Redis key prefix must not contain colons".to_string(),
            ))
        } else {
            Ok(Self(Arc::from(value)))
        }
    }
}
