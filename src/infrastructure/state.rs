//! In-process [`StatePort`] implementation.
//!
//! Idempotency keys and checkpoints don't need to survive a process
//! restart for backtesting, so this is a `Mutex`-guarded map rather than
//! a database client.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::domain::errors::PortError;
use crate::domain::ports::StatePort;

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

#[derive(Default)]
pub struct InMemoryStateAdapter {
    entries: Mutex<HashMap<(String, String), Entry>>,
}

impl InMemoryStateAdapter {
    pub fn new() -> Self {
        InMemoryStateAdapter::default()
    }
}

impl StatePort for InMemoryStateAdapter {
    fn get(&self, namespace: &str, key: &str) -> Result<Option<String>, PortError> {
        let mut entries = self.entries.lock().map_err(|_| PortError::StateUnavailable {
            reason: "state mutex poisoned".into(),
        })?;
        let k = (namespace.to_string(), key.to_string());
        if let Some(entry) = entries.get(&k) {
            if let Some(expires_at) = entry.expires_at {
                if Instant::now() >= expires_at {
                    entries.remove(&k);
                    return Ok(None);
                }
            }
            return Ok(Some(entry.value.clone()));
        }
        Ok(None)
    }

    fn set(&self, namespace: &str, key: &str, value: String, ttl_secs: Option<u64>) -> Result<(), PortError> {
        let mut entries = self.entries.lock().map_err(|_| PortError::StateUnavailable {
            reason: "state mutex poisoned".into(),
        })?;
        let expires_at = ttl_secs.map(|ttl| Instant::now() + Duration::from_secs(ttl));
        entries.insert((namespace.to_string(), key.to_string()), Entry { value, expires_at });
        Ok(())
    }

    fn delete(&self, namespace: &str, key: &str) -> Result<(), PortError> {
        let mut entries = self.entries.lock().map_err(|_| PortError::StateUnavailable {
            reason: "state mutex poisoned".into(),
        })?;
        entries.remove(&(namespace.to_string(), key.to_string()));
        Ok(())
    }
}
