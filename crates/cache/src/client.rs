//! Authenticated access with at-most-once credential refresh
//!
//! Every build worker shares one [`AuthenticatedClient`]. Credentials are
//! fetched lazily on first use and refreshed when the server answers 401.
//! When several workers hit 401 at the same time only the first one to take
//! the refresh lock calls the provider; the rest pick up its result.
//!
//! A provider that yields nothing turns the client off for the rest of the
//! build: later calls fail fast without locking or asking again.

use crate::{Error, Result};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;
use tuist_core::{CacheConfiguration, ConfigurationProvider};

/// Runs operations with a shared, lazily fetched [`CacheConfiguration`].
pub struct AuthenticatedClient {
    provider: Arc<dyn ConfigurationProvider>,
    /// Current credentials. The read lock is only held to clone the `Arc`.
    slot: RwLock<Option<Arc<CacheConfiguration>>>,
    /// Serializes fetches and refreshes; never held during a request.
    refresh_lock: Mutex<()>,
    /// Set once the provider returned no configuration.
    unavailable: AtomicBool,
}

impl AuthenticatedClient {
    /// Create a client that fetches credentials from `provider`.
    #[must_use]
    pub fn new(provider: Arc<dyn ConfigurationProvider>) -> Self {
        Self {
            provider,
            slot: RwLock::new(None),
            refresh_lock: Mutex::new(()),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Whether the provider has reported the cache unavailable for this build.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        self.unavailable.load(Ordering::Acquire)
    }

    fn ensure_available(&self) -> Result<()> {
        if self.is_unavailable() {
            Err(Error::ConfigurationUnavailable)
        } else {
            Ok(())
        }
    }

    /// Credentials currently cached, if any.
    #[must_use]
    pub fn cached(&self) -> Option<Arc<CacheConfiguration>> {
        self.slot.read().clone()
    }

    /// Drop the cached credentials so the next call fetches new ones.
    pub fn invalidate(&self) {
        *self.slot.write() = None;
    }

    /// Run `operation` with valid credentials.
    ///
    /// `operation` performs a single request and returns
    /// [`Error::TokenExpired`] on HTTP 401. The operation is then retried
    /// once with refreshed credentials; a second expiry is returned as-is.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigurationUnavailable`] when no credentials can
    /// be obtained, now or earlier in the build, otherwise whatever
    /// `operation` returns.
    pub fn execute<T, F>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut(&CacheConfiguration) -> Result<T>,
    {
        let config = self.current()?;
        match operation(config.as_ref()) {
            Err(Error::TokenExpired) => {
                debug!("Cache token expired, refreshing configuration");
                let refreshed = self.refresh(&config)?;
                operation(refreshed.as_ref())
            }
            other => other,
        }
    }

    fn current(&self) -> Result<Arc<CacheConfiguration>> {
        if let Some(config) = self.cached() {
            return Ok(config);
        }
        self.ensure_available()?;

        let _guard = self.refresh_lock.lock();
        // Another worker may have fetched, or given up, while we waited
        if let Some(config) = self.cached() {
            return Ok(config);
        }
        self.ensure_available()?;
        self.fetch(false)
    }

    fn refresh(&self, stale: &Arc<CacheConfiguration>) -> Result<Arc<CacheConfiguration>> {
        let _guard = self.refresh_lock.lock();
        self.ensure_available()?;
        if let Some(current) = self.cached()
            && !Arc::ptr_eq(&current, stale)
        {
            debug!("Configuration already refreshed by another worker");
            return Ok(current);
        }

        self.invalidate();
        self.fetch(true)
    }

    /// Must be called with `refresh_lock` held.
    fn fetch(&self, force_refresh: bool) -> Result<Arc<CacheConfiguration>> {
        let Some(config) = self.provider.configuration(force_refresh) else {
            debug!("No cache configuration; remote cache off for the rest of the build");
            self.unavailable.store(true, Ordering::Release);
            return Err(Error::ConfigurationUnavailable);
        };
        let config = Arc::new(config);
        *self.slot.write() = Some(Arc::clone(&config));
        Ok(config)
    }
}

impl std::fmt::Debug for AuthenticatedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticatedClient")
            .field("cached", &self.cached())
            .field("unavailable", &self.is_unavailable())
            .finish_non_exhaustive()
    }
}
