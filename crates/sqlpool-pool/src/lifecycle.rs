//! Connection lifecycle bookkeeping.
//!
//! The pool tracks a small amount of metadata next to every connection it
//! owns: when it was opened, last used and last validated, how often it has
//! been checked out, and where it currently is.

use std::time::Instant;

/// Where a pooled connection currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// In the idle set, available for checkout.
    Idle,
    /// Checked out to a caller.
    InUse,
    /// Taken out of the idle set by maintenance for revalidation.
    Validating,
    /// Closed and no longer owned by the pool.
    Closed,
}

impl ConnectionState {
    /// Check if the connection is available for checkout.
    #[must_use]
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// Check if the connection is currently busy.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::InUse | Self::Validating)
    }
}

/// Metadata about a pooled connection.
#[derive(Debug, Clone)]
pub struct ConnectionMetadata {
    /// Pool-assigned identifier, unique within one pool.
    pub id: u64,
    /// When the connection was opened.
    pub created_at: Instant,
    /// When the connection was last checked out or returned.
    pub last_used_at: Instant,
    /// When the connection last passed validation.
    pub last_validated_at: Instant,
    /// Number of times the connection has been checked out.
    pub checkout_count: u64,
    /// Current state of the connection.
    pub state: ConnectionState,
}

impl ConnectionMetadata {
    /// Create metadata for a freshly opened connection.
    ///
    /// Opening counts as validation.
    pub fn new(id: u64) -> Self {
        let now = Instant::now();
        Self {
            id,
            created_at: now,
            last_used_at: now,
            last_validated_at: now,
            checkout_count: 0,
            state: ConnectionState::Idle,
        }
    }

    /// Mark the connection as checked out.
    pub fn mark_checkout(&mut self) {
        self.last_used_at = Instant::now();
        self.checkout_count += 1;
        self.state = ConnectionState::InUse;
    }

    /// Mark the connection as returned to idle.
    pub fn mark_checkin(&mut self) {
        self.last_used_at = Instant::now();
        self.state = ConnectionState::Idle;
    }

    /// Mark the connection as taken for revalidation.
    pub fn mark_validating(&mut self) {
        self.state = ConnectionState::Validating;
    }

    /// Record a successful validation.
    pub fn mark_validated(&mut self) {
        self.last_validated_at = Instant::now();
    }

    /// Mark the connection as closed.
    pub fn mark_closed(&mut self) {
        self.state = ConnectionState::Closed;
    }
}

/// Outcome of one maintenance pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    /// Connections opened to reach `min_connections`.
    pub opened: u32,
    /// Idle connections that reported closed and were reopened.
    pub revived: u32,
    /// Idle connections that could not be revived and were discarded.
    pub discarded: u32,
    /// Top-up opens that failed (retried on the next pass).
    pub open_failures: u32,
}

impl MaintenanceReport {
    /// Check if the pass changed nothing.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        *self == Self::default()
    }
}
