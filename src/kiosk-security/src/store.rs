//! Process-wide holder of the current security policy.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::descriptor::SecurityPolicy;
use crate::error::{PolicyError, Result};

/// Backing configuration of the persisted policy string.
pub trait PolicySource: Send + Sync {
    /// Modification time of the backing configuration.
    fn modified(&self) -> Result<SystemTime>;

    /// Reads the persisted descriptor string.
    fn load(&self) -> Result<String>;

    /// Writes a descriptor string back to the configuration.
    fn store(&self, descriptor: &str) -> Result<()>;

    /// Human readable location, used in log fields.
    fn describe(&self) -> String;
}

/// A loaded policy together with the source modification time it was read at.
struct Snapshot {
    policy: Arc<SecurityPolicy>,
    modified: SystemTime,
}

/// Holds the current [`SecurityPolicy`] and keeps it in step with its
/// [`PolicySource`].
///
/// Readers always get a complete policy: replacement swaps an `Arc`, it
/// never edits a published value. Reloads and replacements are serialized
/// on a separate writer lock so the read path is only blocked for the swap.
pub struct SecurityDescriptorStore {
    source: Box<dyn PolicySource>,
    current: RwLock<Option<Arc<Snapshot>>>,
    writer: Mutex<()>,
    /// Modification time of the last revision that failed to load.
    failed: Mutex<Option<SystemTime>>,
}

impl SecurityDescriptorStore {
    /// Creates a store that loads lazily on the first [`Self::current`].
    pub fn new(source: impl PolicySource + 'static) -> Self {
        Self {
            source: Box::new(source),
            current: RwLock::new(None),
            writer: Mutex::new(()),
            failed: Mutex::new(None),
        }
    }

    /// Creates a store and performs the first load immediately, so a
    /// missing or corrupt policy fails at startup.
    pub fn open(source: impl PolicySource + 'static) -> Result<Self> {
        let store = Self::new(source);
        store.current()?;
        Ok(store)
    }

    /// Returns the current policy, reloading first if the source changed.
    ///
    /// Once a valid policy exists, reload failures are logged and the stale
    /// policy is returned. A revision that failed is not read again until
    /// the source changes once more. The first load has nothing to fall
    /// back to and propagates its error.
    pub fn current(&self) -> Result<Arc<SecurityPolicy>> {
        let cached = self.current.read().clone();
        let Some(snapshot) = cached else {
            let _writer = self.writer.lock();
            if let Some(snapshot) = self.current.read().clone() {
                return Ok(Arc::clone(&snapshot.policy));
            }
            let snapshot = self.load_snapshot()?;
            info!(source = %self.source.describe(), "security policy loaded");
            return Ok(self.install(snapshot));
        };

        let modified = match self.source.modified() {
            Ok(modified) => modified,
            Err(e) => {
                warn!(source = %self.source.describe(), error = %e, "cannot stat policy source, keeping current policy");
                return Ok(Arc::clone(&snapshot.policy));
            }
        };
        if modified <= snapshot.modified || *self.failed.lock() == Some(modified) {
            return Ok(Arc::clone(&snapshot.policy));
        }

        match self.reload_if_newer(snapshot.modified, modified) {
            Ok(policy) => Ok(policy),
            Err(e) => {
                warn!(source = %self.source.describe(), error = %e, "policy reload failed, keeping previous policy");
                Ok(Arc::clone(&snapshot.policy))
            }
        }
    }

    /// Persists `policy` and makes it current immediately.
    ///
    /// Concurrent replacements are serialized. Readers see either the old
    /// or the new policy, never a mix.
    pub fn replace(&self, policy: &SecurityPolicy) -> Result<Arc<SecurityPolicy>> {
        let _writer = self.writer.lock();
        let descriptor = policy.to_string();
        self.source.store(&descriptor)?;

        let snapshot = self.load_snapshot()?;
        if *snapshot.policy != *policy {
            return Err(PolicyError::Persist(format!(
                "{} did not read back the written descriptor",
                self.source.describe()
            )));
        }
        info!(source = %self.source.describe(), entries = policy.entries().len(), "security policy replaced");
        Ok(self.install(snapshot))
    }

    fn reload_if_newer(&self, seen: SystemTime, modified: SystemTime) -> Result<Arc<SecurityPolicy>> {
        let _writer = self.writer.lock();
        // Another thread may have reloaded, replaced or failed on this
        // revision while we waited.
        if let Some(snapshot) = self.current.read().clone() {
            if snapshot.modified > seen || *self.failed.lock() == Some(modified) {
                return Ok(Arc::clone(&snapshot.policy));
            }
        }
        match self.load_snapshot() {
            Ok(snapshot) => {
                debug!(source = %self.source.describe(), "security policy reloaded");
                Ok(self.install(snapshot))
            }
            Err(e) => {
                *self.failed.lock() = Some(modified);
                Err(e)
            }
        }
    }

    /// Reads and parses the source. The modification time is sampled
    /// before reading so a concurrent edit is picked up on the next check.
    fn load_snapshot(&self) -> Result<Snapshot> {
        let modified = self.source.modified()?;
        let text = self.source.load()?;
        let policy = text.parse::<SecurityPolicy>()?;
        Ok(Snapshot {
            policy: Arc::new(policy),
            modified,
        })
    }

    fn install(&self, snapshot: Snapshot) -> Arc<SecurityPolicy> {
        let policy = Arc::clone(&snapshot.policy);
        *self.current.write() = Some(Arc::new(snapshot));
        *self.failed.lock() = None;
        policy
    }
}

/// In-process policy source, for embedding and tests.
///
/// Every store advances the modification time so reloads are observable
/// without depending on clock resolution.
pub struct MemoryPolicySource {
    state: Mutex<(String, SystemTime)>,
}

impl MemoryPolicySource {
    pub fn new(descriptor: impl Into<String>) -> Self {
        Self {
            state: Mutex::new((descriptor.into(), SystemTime::UNIX_EPOCH)),
        }
    }

    /// Replaces the descriptor out of band, as an administrator editing the
    /// configuration would.
    pub fn set(&self, descriptor: impl Into<String>) {
        let mut state = self.state.lock();
        state.0 = descriptor.into();
        state.1 += Duration::from_secs(1);
    }
}

impl PolicySource for MemoryPolicySource {
    fn modified(&self) -> Result<SystemTime> {
        Ok(self.state.lock().1)
    }

    fn load(&self) -> Result<String> {
        Ok(self.state.lock().0.clone())
    }

    fn store(&self, descriptor: &str) -> Result<()> {
        self.set(descriptor);
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

impl<S: PolicySource + ?Sized> PolicySource for Arc<S> {
    fn modified(&self) -> Result<SystemTime> {
        (**self).modified()
    }

    fn load(&self) -> Result<String> {
        (**self).load()
    }

    fn store(&self, descriptor: &str) -> Result<()> {
        (**self).store(descriptor)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}
