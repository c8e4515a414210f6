//! In-memory mock driver.
//!
//! Every [`MockDriver`] clone shares one simulated backing store. Connections
//! created by the driver register with that store, so a test can inspect how
//! many are live, break specific ones, and check which writes were committed.
//!
//! Connection ids are assigned in creation order starting at 1.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use sqlpool_driver::{
    Column, Connection, ConnectionTarget, Driver, DriverError, IsolationLevel, NamedParam,
    ResultSet, SqlValue,
};

/// Canned response for a statement.
#[derive(Clone)]
pub enum MockResponse {
    /// Return a single value.
    Scalar(SqlValue),

    /// Return rows.
    Rows(ResultSet),

    /// Return a rows-affected count.
    RowsAffected(u64),

    /// Fail with a statement error.
    Error {
        /// Error code.
        code: i32,
        /// Error message.
        message: String,
    },

    /// Compute the response from the statement parameters.
    Custom(Arc<dyn Fn(&[NamedParam]) -> MockResponse + Send + Sync>),
}

impl fmt::Debug for MockResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(v) => f.debug_tuple("Scalar").field(v).finish(),
            Self::Rows(rs) => f.debug_tuple("Rows").field(&rs.len()).finish(),
            Self::RowsAffected(n) => f.debug_tuple("RowsAffected").field(n).finish(),
            Self::Error { code, message } => f
                .debug_struct("Error")
                .field("code", code)
                .field("message", message)
                .finish(),
            Self::Custom(_) => f.debug_tuple("Custom").field(&"<fn>").finish(),
        }
    }
}

impl MockResponse {
    /// Create a scalar response.
    pub fn scalar(value: impl Into<SqlValue>) -> Self {
        Self::Scalar(value.into())
    }

    /// Create a rows response.
    pub fn rows(columns: &[&str], rows: Vec<Vec<SqlValue>>) -> Self {
        let columns = columns
            .iter()
            .enumerate()
            .map(|(i, name)| Column::new(*name, i, "ANY"))
            .collect();
        Self::Rows(ResultSet::new(columns, rows))
    }

    /// Create a rows-affected response.
    pub fn affected(count: u64) -> Self {
        Self::RowsAffected(count)
    }

    /// Create an error response.
    pub fn error(code: i32, message: impl Into<String>) -> Self {
        Self::Error {
            code,
            message: message.into(),
        }
    }

    fn resolve(&self, params: &[NamedParam]) -> MockResponse {
        match self {
            Self::Custom(f) => f(params),
            other => other.clone(),
        }
    }
}

#[derive(Default)]
struct Store {
    responses: HashMap<String, MockResponse>,
    password: Option<String>,
    connect_delay: Option<Duration>,
    unreachable: bool,
    fail_next_connects: usize,
    fail_rollbacks: bool,

    severed: HashSet<u64>,
    dead: HashSet<u64>,

    next_id: u64,
    opened: u64,
    revived: u64,
    closed_ids: Vec<u64>,
    live: usize,
    max_live: usize,

    committed: Vec<String>,
    statement_log: Vec<(u64, String)>,
    begins: u64,
    commits: u64,
    rollbacks: u64,
}

impl Store {
    fn healthy(&self, id: u64) -> bool {
        !self.severed.contains(&id) && !self.dead.contains(&id)
    }
}

/// Builder for [`MockDriver`].
#[derive(Default)]
pub struct MockDriverBuilder {
    store: Store,
}

impl MockDriverBuilder {
    /// Register a canned response for an exact statement text.
    #[must_use]
    pub fn with_response(mut self, sql: impl Into<String>, response: MockResponse) -> Self {
        self.store.responses.insert(sql.into(), response);
        self
    }

    /// Require this password in the connection target.
    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.store.password = Some(password.into());
        self
    }

    /// Delay every open by this long.
    #[must_use]
    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.store.connect_delay = Some(delay);
        self
    }

    /// Start with the backing store unreachable.
    #[must_use]
    pub fn unreachable(mut self) -> Self {
        self.store.unreachable = true;
        self
    }

    /// Build the driver.
    #[must_use]
    pub fn build(self) -> MockDriver {
        MockDriver {
            store: Arc::new(Mutex::new(self.store)),
        }
    }
}

/// In-memory driver backed by a shared simulated store.
#[derive(Clone, Default)]
pub struct MockDriver {
    store: Arc<Mutex<Store>>,
}

impl fmt::Debug for MockDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let store = self.store.lock();
        f.debug_struct("MockDriver")
            .field("live", &store.live)
            .field("opened", &store.opened)
            .field("closed", &store.closed_ids.len())
            .finish()
    }
}

impl MockDriver {
    /// Create a driver with no canned responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder.
    #[must_use]
    pub fn builder() -> MockDriverBuilder {
        MockDriverBuilder::default()
    }

    /// Register a canned response at runtime.
    pub fn set_response(&self, sql: impl Into<String>, response: MockResponse) {
        self.store.lock().responses.insert(sql.into(), response);
    }

    /// Make the store (un)reachable for new opens.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.store.lock().unreachable = unreachable;
    }

    /// Fail the next `count` opens with a connect error.
    pub fn fail_next_connects(&self, count: usize) {
        self.store.lock().fail_next_connects = count;
    }

    /// Make rollbacks fail (the pending writes are still discarded).
    pub fn set_fail_rollbacks(&self, fail: bool) {
        self.store.lock().fail_rollbacks = fail;
    }

    /// Drop the server side of a connection. It reports closed but can be
    /// reopened.
    pub fn sever(&self, id: u64) {
        self.store.lock().severed.insert(id);
    }

    /// Sever every connection created so far.
    pub fn sever_all(&self) {
        let mut store = self.store.lock();
        let ids: Vec<u64> = (1..=store.next_id).collect();
        store.severed.extend(ids);
    }

    /// Kill a connection for good. It reports closed and cannot be reopened.
    pub fn kill(&self, id: u64) {
        self.store.lock().dead.insert(id);
    }

    /// Number of connections currently open on the store.
    #[must_use]
    pub fn live(&self) -> usize {
        self.store.lock().live
    }

    /// Highest number of simultaneously open connections observed.
    #[must_use]
    pub fn max_live(&self) -> usize {
        self.store.lock().max_live
    }

    /// Number of successful fresh opens.
    #[must_use]
    pub fn opened(&self) -> u64 {
        self.store.lock().opened
    }

    /// Number of successful reopens of severed connections.
    #[must_use]
    pub fn revived(&self) -> u64 {
        self.store.lock().revived
    }

    /// Number of explicit closes of open connections.
    #[must_use]
    pub fn closed(&self) -> usize {
        self.store.lock().closed_ids.len()
    }

    /// Check if the connection with this id was explicitly closed.
    #[must_use]
    pub fn was_closed(&self, id: u64) -> bool {
        self.store.lock().closed_ids.contains(&id)
    }

    /// Statements that took effect, in commit order.
    #[must_use]
    pub fn committed(&self) -> Vec<String> {
        self.store.lock().committed.clone()
    }

    /// Every statement run, with the id of the connection that ran it.
    #[must_use]
    pub fn statement_log(&self) -> Vec<(u64, String)> {
        self.store.lock().statement_log.clone()
    }

    /// Number of transactions begun.
    #[must_use]
    pub fn begins(&self) -> u64 {
        self.store.lock().begins
    }

    /// Number of transactions committed.
    #[must_use]
    pub fn commits(&self) -> u64 {
        self.store.lock().commits
    }

    /// Number of rollbacks attempted.
    #[must_use]
    pub fn rollbacks(&self) -> u64 {
        self.store.lock().rollbacks
    }
}

impl Driver for MockDriver {
    fn name(&self) -> &str {
        "mock"
    }

    fn connection(&self, target: &ConnectionTarget) -> Box<dyn Connection> {
        let id = {
            let mut store = self.store.lock();
            store.next_id += 1;
            store.next_id
        };
        Box::new(MockConnection {
            id,
            password: target.password().map(str::to_string),
            store: Arc::clone(&self.store),
            live: false,
            pending: None,
        })
    }
}

/// A connection to the simulated store.
struct MockConnection {
    id: u64,
    password: Option<String>,
    store: Arc<Mutex<Store>>,
    live: bool,
    // Some while a transaction is open; holds its uncommitted writes.
    pending: Option<Vec<String>>,
}

impl MockConnection {
    fn check_open(&self) -> Result<(), DriverError> {
        if self.is_open() {
            Ok(())
        } else {
            Err(DriverError::ConnectionClosed)
        }
    }

    fn respond(&self, sql: &str, params: &[NamedParam]) -> Option<MockResponse> {
        let mut store = self.store.lock();
        store.statement_log.push((self.id, sql.to_string()));
        store.responses.get(sql).map(|r| r.resolve(params))
    }
}

#[async_trait]
impl Connection for MockConnection {
    async fn open(&mut self) -> Result<(), DriverError> {
        let delay = self.store.lock().connect_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut store = self.store.lock();
        if store.unreachable {
            return Err(DriverError::Connect("mock store unreachable".into()));
        }
        if store.fail_next_connects > 0 {
            store.fail_next_connects -= 1;
            return Err(DriverError::Connect("connection refused".into()));
        }
        if let Some(expected) = &store.password {
            if self.password.as_ref() != Some(expected) {
                return Err(DriverError::Authentication("login failed".into()));
            }
        }
        if store.dead.contains(&self.id) {
            return Err(DriverError::Connect("connection reset by peer".into()));
        }

        if self.live {
            if store.severed.remove(&self.id) {
                store.revived += 1;
                self.pending = None;
                tracing::debug!(id = self.id, "mock connection reopened");
            }
            return Ok(());
        }

        self.live = true;
        store.opened += 1;
        store.live += 1;
        store.max_live = store.max_live.max(store.live);
        tracing::debug!(id = self.id, live = store.live, "mock connection opened");
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.live && self.store.lock().healthy(self.id)
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        if self.live {
            self.live = false;
            self.pending = None;
            let mut store = self.store.lock();
            store.live -= 1;
            store.closed_ids.push(self.id);
            tracing::debug!(id = self.id, live = store.live, "mock connection closed");
        }
        Ok(())
    }

    async fn begin(&mut self, _isolation: IsolationLevel) -> Result<(), DriverError> {
        self.check_open()?;
        if self.pending.is_some() {
            return Err(DriverError::Transaction("transaction already active".into()));
        }
        self.pending = Some(Vec::new());
        self.store.lock().begins += 1;
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), DriverError> {
        self.check_open()?;
        let pending = self
            .pending
            .take()
            .ok_or_else(|| DriverError::Transaction("no active transaction".into()))?;
        let mut store = self.store.lock();
        store.committed.extend(pending);
        store.commits += 1;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), DriverError> {
        let pending = self.pending.take();
        let mut store = self.store.lock();
        store.rollbacks += 1;
        if store.fail_rollbacks {
            return Err(DriverError::Transaction("rollback failed".into()));
        }
        if pending.is_none() {
            return Err(DriverError::Transaction("no active transaction".into()));
        }
        Ok(())
    }

    async fn query(&mut self, sql: &str, params: &[NamedParam]) -> Result<ResultSet, DriverError> {
        self.check_open()?;
        match self.respond(sql, params) {
            Some(MockResponse::Rows(rs)) => Ok(rs),
            Some(MockResponse::Scalar(v)) => Ok(ResultSet::new(
                vec![Column::new("value", 0, v.type_name())],
                vec![vec![v]],
            )),
            Some(MockResponse::Error { code, message }) => {
                Err(DriverError::Statement { code, message })
            }
            Some(MockResponse::RowsAffected(_)) | None => Ok(ResultSet::empty()),
            Some(MockResponse::Custom(_)) => Ok(ResultSet::empty()),
        }
    }

    async fn execute(&mut self, sql: &str, params: &[NamedParam]) -> Result<u64, DriverError> {
        self.check_open()?;
        let affected = match self.respond(sql, params) {
            Some(MockResponse::RowsAffected(n)) => n,
            Some(MockResponse::Error { code, message }) => {
                return Err(DriverError::Statement { code, message });
            }
            Some(MockResponse::Rows(rs)) => rs.len() as u64,
            _ => 1,
        };

        match &mut self.pending {
            Some(pending) => pending.push(sql.to_string()),
            None => self.store.lock().committed.push(sql.to_string()),
        }
        Ok(affected)
    }
}

impl Drop for MockConnection {
    fn drop(&mut self) {
        if self.live {
            self.store.lock().live -= 1;
        }
    }
}
