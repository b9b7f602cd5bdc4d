//! Scoped cryptographic session
//!
//! A [`CryptoSession`] owns the provider for the lifetime of the process
//! entry point: it initializes the engine when opened and shuts it down when
//! dropped. Every component borrows the session instead of reaching for
//! global state.
//!
//! The session also serializes access to files shared between concurrent
//! operations. Read-only keystore opens take a shared lease on the keystore
//! path; writable opens (and repository updates) take an exclusive one.
//! Leases are released when dropped, on success and error paths alike.
//!
//! Leases live in the session's own table, so they exclude threads that share
//! one session and nothing else. Two processes (or two sessions) writing the
//! same keystore or repository are not serialized against each other, and a
//! writable open reads, modifies and replaces the whole file, so the last
//! writer wins. Run the commands that write a given keystore one at a time.

use crate::artifacts::normalize_path;
use crate::error::Result;
use crate::provider::{CryptoProvider, KeystoreMode};
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Shared,
    Exclusive,
}

#[derive(Default)]
struct Holders {
    readers: usize,
    writer: bool,
}

#[derive(Default)]
struct PathLocks {
    held: Mutex<HashMap<PathBuf, Holders>>,
    released: Condvar,
}

impl PathLocks {
    fn acquire(self: &Arc<Self>, path: PathBuf, access: Access) -> PathLease {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            let holders = held.entry(path.clone()).or_default();
            let available = match access {
                Access::Shared => !holders.writer,
                Access::Exclusive => !holders.writer && holders.readers == 0,
            };
            if available {
                match access {
                    Access::Shared => holders.readers += 1,
                    Access::Exclusive => holders.writer = true,
                }
                break;
            }
            debug!(path = %path.display(), ?access, "waiting for path lease");
            held = self
                .released
                .wait(held)
                .unwrap_or_else(PoisonError::into_inner);
        }
        PathLease {
            locks: Arc::clone(self),
            path,
            access,
        }
    }

    fn release(&self, path: &Path, access: Access) {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(holders) = held.get_mut(path) {
            match access {
                Access::Shared => holders.readers = holders.readers.saturating_sub(1),
                Access::Exclusive => holders.writer = false,
            }
            if holders.readers == 0 && !holders.writer {
                held.remove(path);
            }
        }
        drop(held);
        self.released.notify_all();
    }
}

/// Exclusive or shared hold on one file path; released on drop
pub struct PathLease {
    locks: Arc<PathLocks>,
    path: PathBuf,
    access: Access,
}

impl PathLease {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn access(&self) -> Access {
        self.access
    }
}

impl Drop for PathLease {
    fn drop(&mut self) {
        self.locks.release(&self.path, self.access);
    }
}

/// An open provider keystore together with the lease that protects it.
///
/// Dropping the guard without [`CryptoSession::close_keystore`] discards
/// unsaved changes and releases the lease.
pub struct KeystoreGuard<K> {
    keystore: K,
    _lease: PathLease,
}

impl<K> Deref for KeystoreGuard<K> {
    type Target = K;

    fn deref(&self) -> &K {
        &self.keystore
    }
}

impl<K> DerefMut for KeystoreGuard<K> {
    fn deref_mut(&mut self) -> &mut K {
        &mut self.keystore
    }
}

pub struct CryptoSession<P: CryptoProvider> {
    provider: P,
    locks: Arc<PathLocks>,
}

impl<P: CryptoProvider> CryptoSession<P> {
    /// Initialize the provider and open a session over it
    pub fn open(provider: P) -> Result<Self> {
        provider.initialize()?;
        info!("crypto session opened");
        Ok(Self {
            provider,
            locks: Arc::new(PathLocks::default()),
        })
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Take a lease on `path`, blocking until it is available
    pub fn lock_path(&self, path: &Path, access: Access) -> PathLease {
        self.locks.acquire(normalize_path(path), access)
    }

    /// Open a keystore under the lease its mode requires
    pub fn open_keystore(
        &self,
        path: &Path,
        mode: KeystoreMode,
    ) -> Result<KeystoreGuard<P::Keystore>> {
        let access = if mode.is_writable() {
            Access::Exclusive
        } else {
            Access::Shared
        };
        let lease = self.lock_path(path, access);
        let keystore = self.provider.open_keystore(path, mode)?;
        Ok(KeystoreGuard {
            keystore,
            _lease: lease,
        })
    }

    /// Close a keystore, persisting changes, then release its lease
    pub fn close_keystore(&self, guard: KeystoreGuard<P::Keystore>) -> Result<()> {
        let KeystoreGuard { keystore, _lease } = guard;
        self.provider.close_keystore(keystore)
    }
}

impl<P: CryptoProvider> Drop for CryptoSession<P> {
    fn drop(&mut self) {
        self.provider.shutdown();
        info!("crypto session closed");
    }
}
