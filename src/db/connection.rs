//! Single-connection database access with probing, timeouts and retries.
//!
//! The hosting MySQL server allows one connection per account, so there is no
//! pool. [`ConnectionManager`] owns at most one live connection behind an async
//! mutex: callers queue on the mutex, the first one to find the slot empty (or
//! holding a dead connection) opens a replacement, and everyone behind it reuses
//! that result.

use async_trait::async_trait;
use futures::future::BoxFuture;
use rand::Rng;
use sqlx::any::AnyRow;
use sqlx::AnyConnection;
use sqlx::{Connection, FromRow};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::statement::Statement;

/// MySQL server error numbers that mean the session itself is gone or refused
const MYSQL_CONNECTION_ERRORS: &[u16] = &[
    1040, // ER_CON_COUNT_ERROR
    1053, // ER_SERVER_SHUTDOWN
    1152, // ER_ABORTING_CONNECTION
    1158, // ER_NET_READ_ERROR
    1159, // ER_NET_READ_INTERRUPTED
    1160, // ER_NET_ERROR_ON_WRITE
    1161, // ER_NET_WRITE_INTERRUPTED
    1203, // ER_TOO_MANY_USER_CONNECTIONS
    1226, // ER_USER_LIMIT_REACHED
    2002, // CR_CONNECTION_ERROR
    2003, // CR_CONN_HOST_ERROR
    2006, // CR_SERVER_GONE_ERROR
    2013, // CR_SERVER_LOST
];

const MYSQL_LIMIT_ERRORS: &[u16] = &[1040, 1203, 1226];

/// Errors surfaced by the connection manager
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("Database connection limit reached. The hosting provider allows very few concurrent connections; please try again in a few moments.")]
    ConnectionLimit,
    #[error("Database unavailable after {attempts} attempts: {message}")]
    Unavailable { attempts: u32, message: String },
    #[error("Database error: {0}")]
    Query(#[from] sqlx::Error),
}

/// Why a single attempt lost its connection
#[derive(Debug, thiserror::Error)]
enum ConnectionFault {
    #[error("{0}")]
    Driver(sqlx::Error),
    #[error("query timed out after {0:?}")]
    Timeout(Duration),
}

impl ConnectionFault {
    fn is_connection_limit(&self) -> bool {
        match self {
            ConnectionFault::Driver(err) => is_connection_limit(err),
            ConnectionFault::Timeout(_) => false,
        }
    }
}

enum Failure {
    Connection(ConnectionFault),
    Statement(sqlx::Error),
}

/// Whether an error means the connection should be thrown away and the call retried
pub fn is_connection_error(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => true,
        sqlx::Error::Database(db_err) => {
            if let Some(mysql) = db_err.try_downcast_ref::<sqlx::mysql::MySqlDatabaseError>() {
                if MYSQL_CONNECTION_ERRORS.contains(&mysql.number()) {
                    return true;
                }
            }
            if db_err.code().is_some_and(|code| code.starts_with("08")) {
                return true;
            }
            let message = db_err.message().to_lowercase();
            message.contains("too many connections")
                || message.contains("max_user_connections")
                || message.contains("server has gone away")
                || message.contains("lost connection")
        }
        _ => false,
    }
}

/// Whether an error is the server refusing another connection
pub fn is_connection_limit(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            if let Some(mysql) = db_err.try_downcast_ref::<sqlx::mysql::MySqlDatabaseError>() {
                if MYSQL_LIMIT_ERRORS.contains(&mysql.number()) {
                    return true;
                }
            }
            let message = db_err.message().to_lowercase();
            message.contains("too many connections") || message.contains("max_user_connections")
        }
        _ => false,
    }
}

/// Ceiling for a single backoff sleep
pub const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// Backoff schedule between attempts
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            multiplier: 1.2,
            max_jitter: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay before retrying after failed attempt `attempt` (1-based), without jitter.
    ///
    /// Saturates at [`MAX_BACKOFF`] however large the multiplier or attempt count.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        if self.initial_delay.is_zero() {
            return Duration::ZERO;
        }
        let exponent = attempt.saturating_sub(1).min(64) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.max(1.0).powi(exponent);
        Duration::try_from_secs_f64(secs).map_or(MAX_BACKOFF, |delay| delay.min(MAX_BACKOFF))
    }

    /// Jitter never exceeds the step to the next base delay, so delays are non-decreasing.
    pub fn jitter_bound(&self, attempt: u32) -> Duration {
        let step = self
            .base_delay(attempt.saturating_add(1))
            .saturating_sub(self.base_delay(attempt));
        step.min(self.max_jitter)
    }

    /// `sample` is a uniform draw from `[0, 1)`
    pub fn delay_with_sample(&self, attempt: u32, sample: f64) -> Duration {
        let sample = sample.clamp(0.0, 1.0);
        let bound = self.jitter_bound(attempt).as_nanos() as f64;
        self.base_delay(attempt)
            .saturating_add(Duration::from_nanos((bound * sample).floor() as u64))
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        let sample: f64 = rand::rng().random();
        self.delay_with_sample(attempt, sample)
    }
}

/// Opens, probes and closes raw connections for the manager
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Connection: Send + 'static;

    async fn connect(&self) -> Result<Self::Connection, sqlx::Error>;

    /// Lightweight liveness check
    async fn ping(&self, conn: &mut Self::Connection) -> Result<(), sqlx::Error>;

    async fn close(&self, conn: Self::Connection);
}

/// sqlx `Any` connector; the URL scheme picks MySQL or SQLite
pub struct SqlConnector {
    url: String,
    connect_timeout: Duration,
}

impl SqlConnector {
    pub fn new(url: impl Into<String>, connect_timeout: Duration) -> Self {
        sqlx::any::install_default_drivers();
        Self {
            url: url.into(),
            connect_timeout,
        }
    }

    fn is_sqlite(&self) -> bool {
        self.url.starts_with("sqlite:")
    }
}

#[async_trait]
impl Connector for SqlConnector {
    type Connection = AnyConnection;

    async fn connect(&self) -> Result<AnyConnection, sqlx::Error> {
        let mut conn = tokio::time::timeout(self.connect_timeout, AnyConnection::connect(&self.url))
            .await
            .map_err(|_| {
                sqlx::Error::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("connect timed out after {:?}", self.connect_timeout),
                ))
            })??;

        if self.is_sqlite() {
            sqlx::query("PRAGMA foreign_keys = ON")
                .execute(&mut conn)
                .await?;
        }

        Ok(conn)
    }

    async fn ping(&self, conn: &mut AnyConnection) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(conn).await.map(|_| ())
    }

    async fn close(&self, conn: AnyConnection) {
        if let Err(e) = conn.close().await {
            debug!(error = %e, "Error while closing stale database connection");
        }
    }
}

/// Owns the one cached connection and runs work against it with retries
pub struct ConnectionManager<C: Connector> {
    connector: C,
    slot: Mutex<Option<C::Connection>>,
    policy: RetryPolicy,
    query_timeout: Duration,
}

/// The production manager
pub type Database = ConnectionManager<SqlConnector>;

impl<C: Connector> ConnectionManager<C> {
    pub fn new(connector: C, policy: RetryPolicy, query_timeout: Duration) -> Self {
        Self {
            connector,
            slot: Mutex::new(None),
            policy,
            query_timeout,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Return the cached connection if it answers a probe, otherwise open a new one
    async fn acquire<'s>(
        &self,
        slot: &'s mut Option<C::Connection>,
    ) -> Result<&'s mut C::Connection, sqlx::Error> {
        let alive = match slot.as_mut() {
            Some(conn) => {
                match tokio::time::timeout(self.query_timeout, self.connector.ping(conn)).await {
                    Ok(Ok(())) => true,
                    Ok(Err(e)) => {
                        warn!(error = %e, "Cached database connection failed liveness probe");
                        false
                    }
                    Err(_) => {
                        warn!("Cached database connection probe timed out");
                        false
                    }
                }
            }
            None => false,
        };

        let conn = match slot.take() {
            Some(conn) if alive => conn,
            stale => {
                if let Some(stale) = stale {
                    self.connector.close(stale).await;
                }
                debug!("Opening database connection");
                let conn = self.connector.connect().await?;
                info!("Database connection established");
                conn
            }
        };

        Ok(slot.insert(conn))
    }

    async fn discard(&self, slot: &mut Option<C::Connection>) {
        if let Some(conn) = slot.take() {
            self.connector.close(conn).await;
        }
    }

    async fn attempt<T, F>(&self, op: &F) -> Result<T, Failure>
    where
        T: Send,
        F: for<'c> Fn(&'c mut C::Connection) -> BoxFuture<'c, Result<T, sqlx::Error>> + Send + Sync,
    {
        let mut slot = self.slot.lock().await;

        let conn = match self.acquire(&mut slot).await {
            Ok(conn) => conn,
            Err(e) => return Err(Failure::Connection(ConnectionFault::Driver(e))),
        };

        match tokio::time::timeout(self.query_timeout, op(conn)).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) if is_connection_error(&e) => {
                self.discard(&mut slot).await;
                Err(Failure::Connection(ConnectionFault::Driver(e)))
            }
            Ok(Err(e)) => Err(Failure::Statement(e)),
            Err(_) => {
                self.discard(&mut slot).await;
                Err(Failure::Connection(ConnectionFault::Timeout(self.query_timeout)))
            }
        }
    }

    /// Run `op` on the shared connection, retrying connection-class failures.
    ///
    /// Statement errors (syntax, constraint violations, decode failures) are
    /// returned on the first occurrence.
    pub async fn run<T, F>(&self, op: F) -> Result<T, DbError>
    where
        T: Send,
        F: for<'c> Fn(&'c mut C::Connection) -> BoxFuture<'c, Result<T, sqlx::Error>> + Send + Sync,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut last_fault = None;

        for attempt in 1..=max_attempts {
            match self.attempt(&op).await {
                Ok(value) => return Ok(value),
                Err(Failure::Statement(e)) => return Err(DbError::Query(e)),
                Err(Failure::Connection(fault)) => {
                    warn!(
                        attempt,
                        max_attempts,
                        error = %fault,
                        "Database connection error"
                    );
                    if attempt < max_attempts {
                        let delay = self.policy.delay(attempt);
                        debug!(delay_ms = delay.as_millis() as u64, "Retrying database call");
                        tokio::time::sleep(delay).await;
                    }
                    last_fault = Some(fault);
                }
            }
        }

        match last_fault {
            Some(fault) if fault.is_connection_limit() => {
                error!(attempts = max_attempts, "Database connection limit reached");
                Err(DbError::ConnectionLimit)
            }
            Some(fault) => {
                error!(attempts = max_attempts, error = %fault, "Database unavailable");
                Err(DbError::Unavailable {
                    attempts: max_attempts,
                    message: fault.to_string(),
                })
            }
            None => Err(DbError::Unavailable {
                attempts: max_attempts,
                message: "no attempt was made".to_string(),
            }),
        }
    }

    /// Close the cached connection, if any
    pub async fn close(&self) {
        let mut slot = self.slot.lock().await;
        if slot.is_some() {
            self.discard(&mut slot).await;
            info!("Database connection closed");
        }
    }
}

impl<C> ConnectionManager<C>
where
    C: Connector<Connection = AnyConnection>,
{
    /// All rows produced by `stmt`
    pub async fn query<T>(&self, stmt: Statement) -> Result<Vec<T>, DbError>
    where
        T: for<'r> FromRow<'r, AnyRow> + Send + Unpin + 'static,
    {
        let summary = stmt.summary();
        self.run(move |conn| {
            let stmt = stmt.clone();
            Box::pin(async move { stmt.query_as::<T>().fetch_all(conn).await })
        })
        .await
        .inspect_err(|e| debug!(sql = %summary, error = %e, "Query failed"))
    }

    /// First row produced by `stmt`, if any
    pub async fn query_one<T>(&self, stmt: Statement) -> Result<Option<T>, DbError>
    where
        T: for<'r> FromRow<'r, AnyRow> + Send + Unpin + 'static,
    {
        let summary = stmt.summary();
        self.run(move |conn| {
            let stmt = stmt.clone();
            Box::pin(async move { stmt.query_as::<T>().fetch_optional(conn).await })
        })
        .await
        .inspect_err(|e| debug!(sql = %summary, error = %e, "Query failed"))
    }

    /// Run a statement that returns no rows; yields the affected row count
    pub async fn execute(&self, stmt: Statement) -> Result<u64, DbError> {
        let summary = stmt.summary();
        self.run(move |conn| {
            let stmt = stmt.clone();
            Box::pin(async move {
                stmt.query()
                    .execute(conn)
                    .await
                    .map(|result| result.rows_affected())
            })
        })
        .await
        .inspect_err(|e| debug!(sql = %summary, error = %e, "Statement failed"))
    }

    /// Single `COUNT(*)`-style integer
    pub async fn count(&self, stmt: Statement) -> Result<i64, DbError> {
        let row: Option<(i64,)> = self.query_one(stmt).await?;
        Ok(row.map(|(n,)| n).unwrap_or(0))
    }

    /// `SELECT 1` through the full retry path
    pub async fn test_connection(&self) -> bool {
        match self.execute(Statement::new("SELECT 1")).await {
            Ok(_) => true,
            Err(e) => {
                error!(error = %e, "Database connection test failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct Counters {
        connects: AtomicU32,
        pings: AtomicU32,
        closes: AtomicU32,
    }

    struct FakeConnector {
        counters: Arc<Counters>,
        failing_connects: AtomicU32,
        ping_ok: AtomicBool,
        connect_delay: Duration,
    }

    impl FakeConnector {
        fn new(counters: Arc<Counters>) -> Self {
            Self {
                counters,
                failing_connects: AtomicU32::new(0),
                ping_ok: AtomicBool::new(true),
                connect_delay: Duration::ZERO,
            }
        }
    }

    struct FakeConn;

    #[async_trait]
    impl Connector for FakeConnector {
        type Connection = FakeConn;

        async fn connect(&self) -> Result<FakeConn, sqlx::Error> {
            self.counters.connects.fetch_add(1, Ordering::SeqCst);
            if !self.connect_delay.is_zero() {
                tokio::time::sleep(self.connect_delay).await;
            }
            let remaining = self.failing_connects.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failing_connects.store(remaining - 1, Ordering::SeqCst);
                return Err(connection_reset());
            }
            Ok(FakeConn)
        }

        async fn ping(&self, _conn: &mut FakeConn) -> Result<(), sqlx::Error> {
            self.counters.pings.fetch_add(1, Ordering::SeqCst);
            if self.ping_ok.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(connection_reset())
            }
        }

        async fn close(&self, _conn: FakeConn) {
            self.counters.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Debug)]
    struct FakeDbError(&'static str);

    impl std::fmt::Display for FakeDbError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str(self.0)
        }
    }

    impl std::error::Error for FakeDbError {}

    impl sqlx::error::DatabaseError for FakeDbError {
        fn message(&self) -> &str {
            self.0
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> sqlx::error::ErrorKind {
            sqlx::error::ErrorKind::Other
        }
    }

    fn connection_reset() -> sqlx::Error {
        sqlx::Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "connection reset by peer",
        ))
    }

    fn too_many_connections() -> sqlx::Error {
        sqlx::Error::Database(Box::new(FakeDbError(
            "User 'app' has exceeded the 'max_user_connections' resource (current value: 1)",
        )))
    }

    fn syntax_error() -> sqlx::Error {
        sqlx::Error::Database(Box::new(FakeDbError(
            "You have an error in your SQL syntax",
        )))
    }

    fn manager(connector: FakeConnector) -> ConnectionManager<FakeConnector> {
        ConnectionManager::new(connector, RetryPolicy::default(), Duration::from_secs(30))
    }

    /// An op that always fails with `make_err` and counts its invocations
    async fn run_failing(
        mgr: &ConnectionManager<FakeConnector>,
        calls: Arc<AtomicU32>,
        make_err: fn() -> sqlx::Error,
    ) -> Result<(), DbError> {
        mgr.run(move |_conn| {
            let calls = calls.clone();
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(make_err())
            })
        })
        .await
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_retry_until_exhausted() {
        let counters = Arc::new(Counters::default());
        let mgr = manager(FakeConnector::new(counters.clone()));
        let calls = Arc::new(AtomicU32::new(0));

        let started = tokio::time::Instant::now();
        let result = run_failing(&mgr, calls.clone(), connection_reset).await;

        assert!(matches!(result, Err(DbError::Unavailable { attempts: 5, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        // Each failure discards the handle, so every attempt reconnects
        assert_eq!(counters.connects.load(Ordering::SeqCst), 5);
        assert_eq!(counters.closes.load(Ordering::SeqCst), 5);

        // Four waits of at least 1.0, 1.2, 1.44 and 1.728 seconds
        let policy = RetryPolicy::default();
        let minimum: Duration = (1..5).map(|a| policy.base_delay(a)).sum();
        assert!(started.elapsed() >= minimum);
    }

    #[tokio::test(start_paused = true)]
    async fn test_statement_errors_fail_without_retry() {
        let counters = Arc::new(Counters::default());
        let mgr = manager(FakeConnector::new(counters.clone()));
        let calls = Arc::new(AtomicU32::new(0));

        let result = run_failing(&mgr, calls.clone(), syntax_error).await;

        assert!(matches!(result, Err(DbError::Query(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        // The connection is still healthy and stays cached
        assert_eq!(counters.closes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_limit_is_reported_specifically() {
        let counters = Arc::new(Counters::default());
        let mgr = manager(FakeConnector::new(counters));
        let calls = Arc::new(AtomicU32::new(0));

        let result = run_failing(&mgr, calls.clone(), too_many_connections).await;

        assert!(matches!(result, Err(DbError::ConnectionLimit)));
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        let message = DbError::ConnectionLimit.to_string();
        assert!(message.contains("connection limit"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failures() {
        let counters = Arc::new(Counters::default());
        let mgr = manager(FakeConnector::new(counters.clone()));
        let calls = Arc::new(AtomicU32::new(0));

        let c = calls.clone();
        let result = mgr
            .run(move |_conn| {
                let c = c.clone();
                Box::pin(async move {
                    if c.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(connection_reset())
                    } else {
                        Ok(42)
                    }
                })
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(counters.connects.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_failures_are_retried() {
        let counters = Arc::new(Counters::default());
        let connector = FakeConnector::new(counters.clone());
        connector.failing_connects.store(3, Ordering::SeqCst);
        let mgr = manager(connector);

        let result = mgr.run(|_conn| Box::pin(async { Ok("ok") })).await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(counters.connects.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_connection_is_probed_and_reused() {
        let counters = Arc::new(Counters::default());
        let mgr = manager(FakeConnector::new(counters.clone()));

        for _ in 0..3 {
            mgr.run(|_conn| Box::pin(async { Ok(()) })).await.unwrap();
        }

        assert_eq!(counters.connects.load(Ordering::SeqCst), 1);
        // First call finds the slot empty; the next two probe the cached handle
        assert_eq!(counters.pings.load(Ordering::SeqCst), 2);
        assert_eq!(counters.closes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dead_connection_is_replaced() {
        let counters = Arc::new(Counters::default());
        let mgr = manager(FakeConnector::new(counters.clone()));

        mgr.run(|_conn| Box::pin(async { Ok(()) })).await.unwrap();
        mgr.connector.ping_ok.store(false, Ordering::SeqCst);
        mgr.run(|_conn| Box::pin(async { Ok(()) })).await.unwrap();

        assert_eq!(counters.connects.load(Ordering::SeqCst), 2);
        assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_connection() {
        let counters = Arc::new(Counters::default());
        let mut connector = FakeConnector::new(counters.clone());
        connector.connect_delay = Duration::from_millis(500);
        let mgr = Arc::new(manager(connector));

        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let mgr = mgr.clone();
                tokio::spawn(async move {
                    mgr.run(move |_conn| Box::pin(async move { Ok(i) })).await
                })
            })
            .collect();

        for task in futures::future::join_all(tasks).await {
            assert!(task.unwrap().is_ok());
        }

        assert_eq!(counters.connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_timeout_counts_as_connection_error() {
        let counters = Arc::new(Counters::default());
        let mgr = manager(FakeConnector::new(counters.clone()));
        let calls = Arc::new(AtomicU32::new(0));

        let c = calls.clone();
        let result: Result<(), DbError> = mgr
            .run(move |_conn| {
                let c = c.clone();
                Box::pin(async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(())
                })
            })
            .await;

        match result {
            Err(DbError::Unavailable { attempts, message }) => {
                assert_eq!(attempts, 5);
                assert!(message.contains("timed out"));
            }
            other => panic!("expected Unavailable, got {:?}", other),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_drops_cached_connection() {
        let counters = Arc::new(Counters::default());
        let mgr = manager(FakeConnector::new(counters.clone()));

        mgr.run(|_conn| Box::pin(async { Ok(()) })).await.unwrap();
        mgr.close().await;
        mgr.close().await;

        assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_base_delays_grow_by_multiplier() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.base_delay(1), Duration::from_millis(1000));
        assert_eq!(policy.base_delay(2), Duration::from_millis(1200));
        assert_eq!(policy.base_delay(3).as_millis(), 1440);
    }

    #[test]
    fn test_delays_never_decrease_even_with_jitter() {
        let policy = RetryPolicy::default();
        for _ in 0..200 {
            let delays: Vec<Duration> = (1..policy.max_attempts).map(|a| policy.delay(a)).collect();
            assert!(delays.windows(2).all(|w| w[0] <= w[1]), "{:?}", delays);
        }
        // Worst case: maximum jitter followed by none
        for attempt in 1..policy.max_attempts {
            assert!(
                policy.delay_with_sample(attempt, 1.0) <= policy.delay_with_sample(attempt + 1, 0.0)
            );
        }
    }

    #[test]
    fn test_runaway_backoff_saturates() {
        let policy = RetryPolicy {
            max_attempts: 20,
            initial_delay: Duration::from_secs(1),
            multiplier: 100.0,
            max_jitter: Duration::from_secs(1),
        };
        let delays: Vec<Duration> = (1..policy.max_attempts).map(|a| policy.delay(a)).collect();
        assert!(delays.windows(2).all(|w| w[0] <= w[1]), "{:?}", delays);
        assert_eq!(delays.last().copied(), Some(MAX_BACKOFF));
        assert_eq!(policy.base_delay(u32::MAX), MAX_BACKOFF);

        let unbounded = RetryPolicy {
            multiplier: f64::INFINITY,
            ..policy
        };
        assert_eq!(unbounded.base_delay(1), Duration::from_secs(1));
        assert_eq!(unbounded.base_delay(2), MAX_BACKOFF);
    }

    #[test]
    fn test_error_classification() {
        assert!(is_connection_error(&connection_reset()));
        assert!(is_connection_error(&too_many_connections()));
        assert!(is_connection_limit(&too_many_connections()));
        assert!(!is_connection_error(&syntax_error()));
        assert!(!is_connection_error(&sqlx::Error::RowNotFound));
        assert!(!is_connection_limit(&connection_reset()));
    }
}
