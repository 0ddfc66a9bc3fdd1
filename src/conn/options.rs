//! Connection configuration.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use roomwire::ConnOptions;
//!
//! let options = ConnOptions::new()
//!     .with_read_timeout(Duration::from_secs(60))
//!     .with_write_timeout(Duration::from_secs(5));
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Worst-case wake latency of `connect` / `wait_connect`.
pub const DEFAULT_SYNC_WAIT: Duration = Duration::from_millis(15);

// ============================================================================
// ConnOptions
// ============================================================================

/// Timeouts and polling interval for one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnOptions {
    /// Maximum wait for one inbound frame. `None` waits forever.
    pub read_timeout: Option<Duration>,

    /// Maximum wait for one outbound frame. `None` waits forever.
    pub write_timeout: Option<Duration>,

    /// Fallback tick while waiting for acknowledgement or a namespace.
    pub sync_wait: Duration,
}

impl Default for ConnOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl ConnOptions {
    /// Creates options with no timeouts and the default sync interval.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            read_timeout: None,
            write_timeout: None,
            sync_wait: DEFAULT_SYNC_WAIT,
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl ConnOptions {
    /// Sets the read timeout.
    #[inline]
    #[must_use]
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    /// Sets the write timeout.
    #[inline]
    #[must_use]
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = Some(timeout);
        self
    }

    /// Sets the sync wait interval.
    #[inline]
    #[must_use]
    pub fn with_sync_wait(mut self, interval: Duration) -> Self {
        self.sync_wait = interval;
        self
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ConnOptions {
    /// Rejects zero durations.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if self.read_timeout.is_some_and(|t| t.is_zero()) {
            return Err(Error::config("read_timeout must be greater than zero"));
        }
        if self.write_timeout.is_some_and(|t| t.is_zero()) {
            return Err(Error::config("write_timeout must be greater than zero"));
        }
        if self.sync_wait.is_zero() {
            return Err(Error::config("sync_wait must be greater than zero"));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
