//! Persistent storage for vendor locations.
//!
//! Rows go into a PostGIS-enabled PostgreSQL table through a small sqlx
//! [`PgPool`]. Each write is an independent `INSERT`: no dedup key, no
//! transaction spanning several writes.

use std::future::Future;

use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use sqlx::PgPool;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::{is_valid_table_name, DatabaseConfig};
use crate::location::WGS84_SRID;
use crate::types::{VendorLocationRecord, WriteAck};

/// Errors raised by the location store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend is unreachable or rejected the credentials.
    #[error("could not connect to the database: {0}")]
    ConnectionError(#[source] sqlx::Error),

    /// The table or PostGIS extension could not be created.
    #[error("could not prepare the location table: {0}")]
    SchemaError(#[source] sqlx::Error),

    /// The backend rejected an insert.
    #[error("could not insert vendor data: {0}")]
    WriteError(#[source] sqlx::Error),

    /// The configured SSL mode is not a libpq mode.
    #[error("invalid ssl mode '{0}'")]
    InvalidSslMode(String),

    /// The configured table is not a plain identifier.
    #[error("invalid table name '{0}'")]
    InvalidTable(String),
}

/// Result alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Destination for vendor location rows.
pub trait LocationStore {
    /// Insert one row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::WriteError`] on any backend rejection.
    fn write(&self, record: &VendorLocationRecord) -> impl Future<Output = StoreResult<WriteAck>>;

    /// Release the connection, consuming the store.
    fn close(self) -> impl Future<Output = ()>;
}

/// Build the insert statement for `table`.
///
/// `$2` is the longitude and `$3` the latitude, matching PostGIS `ST_Point(x, y)`.
#[must_use]
pub fn insert_sql(table: &str) -> String {
    format!(
        "INSERT INTO {table} (name, location) VALUES ($1, ST_SetSRID(ST_Point($2, $3), {WGS84_SRID}))"
    )
}

/// Values bound to the insert placeholders: name, longitude, latitude.
#[must_use]
pub fn bind_values(record: &VendorLocationRecord) -> (&str, f64, f64) {
    (
        record.name.as_str(),
        record.reading.longitude,
        record.reading.latitude,
    )
}

/// Translate [`DatabaseConfig`] into sqlx connect options.
///
/// # Errors
///
/// Returns [`StoreError::InvalidSslMode`] if `ssl_mode` is not a libpq mode.
pub fn connect_options(config: &DatabaseConfig) -> StoreResult<PgConnectOptions> {
    let ssl_mode: PgSslMode = config
        .ssl_mode
        .parse()
        .map_err(|_| StoreError::InvalidSslMode(config.ssl_mode.clone()))?;

    Ok(PgConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .username(&config.user)
        .password(&config.password)
        .database(&config.dbname)
        .ssl_mode(ssl_mode))
}

/// PostgreSQL/PostGIS location store.
#[derive(Debug, Clone)]
pub struct PgLocationStore {
    pool: PgPool,
    table: String,
    insert_sql: String,
}

impl PgLocationStore {
    /// Connect using `config`, creating the table first when `create_table` is set.
    ///
    /// Connects eagerly so an unreachable backend fails here rather than on
    /// the first write.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ConnectionError`] if the backend is unreachable or
    /// rejects the credentials.
    pub async fn open(config: &DatabaseConfig) -> StoreResult<Self> {
        let options = connect_options(config)?;
        let store = Self::connect_with(options, config.max_connections, &config.table).await?;
        info!(
            host = %config.host,
            port = config.port,
            database = %config.dbname,
            table = %config.table,
            "database connected"
        );

        if config.create_table {
            store.prepare_schema().await
        } else {
            Ok(store)
        }
    }

    /// Run [`Self::ensure_schema`], closing the pool if it fails.
    async fn prepare_schema(self) -> StoreResult<Self> {
        match self.ensure_schema().await {
            Ok(()) => Ok(self),
            Err(err) => {
                self.pool.close().await;
                Err(err)
            }
        }
    }

    /// Connect with explicit options.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidTable`] for a non-identifier table name and
    /// [`StoreError::ConnectionError`] if no connection can be established.
    pub async fn connect_with(
        options: PgConnectOptions,
        max_connections: u32,
        table: &str,
    ) -> StoreResult<Self> {
        if !is_valid_table_name(table) {
            return Err(StoreError::InvalidTable(table.to_string()));
        }

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(StoreError::ConnectionError)?;

        Ok(Self {
            pool,
            table: table.to_string(),
            insert_sql: insert_sql(table),
        })
    }

    /// Create the PostGIS extension and the location table if missing.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::SchemaError`] if either statement fails.
    pub async fn ensure_schema(&self) -> StoreResult<()> {
        sqlx::query("CREATE EXTENSION IF NOT EXISTS postgis")
            .execute(&self.pool)
            .await
            .map_err(StoreError::SchemaError)?;

        let create = format!(
            r"
            CREATE TABLE IF NOT EXISTS {} (
                id BIGSERIAL PRIMARY KEY,
                name TEXT NOT NULL,
                location geometry(Point, {WGS84_SRID}) NOT NULL,
                recorded_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            ",
            self.table
        );
        sqlx::query(&create)
            .execute(&self.pool)
            .await
            .map_err(StoreError::SchemaError)?;

        info!(table = %self.table, "location table ready");
        Ok(())
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl LocationStore for PgLocationStore {
    async fn write(&self, record: &VendorLocationRecord) -> StoreResult<WriteAck> {
        let (name, longitude, latitude) = bind_values(record);
        let result = sqlx::query(&self.insert_sql)
            .bind(name)
            .bind(longitude)
            .bind(latitude)
            .execute(&self.pool)
            .await
            .map_err(StoreError::WriteError)?;

        debug!(
            vendor = %record.name,
            latitude = record.reading.latitude,
            longitude = record.reading.longitude,
            rows = result.rows_affected(),
            "location row inserted"
        );
        Ok(WriteAck {
            rows_affected: result.rows_affected(),
        })
    }

    async fn close(self) {
        self.pool.close().await;
        info!("database connection closed");
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use std::sync::{Arc, Mutex, PoisonError};

    use super::{LocationStore, StoreError, StoreResult};
    use crate::types::{VendorLocationRecord, WriteAck};

    #[derive(Debug, Default)]
    struct MockStoreCalls {
        attempts: usize,
        rows: Vec<VendorLocationRecord>,
        closes: usize,
    }

    /// Calls observed by a [`MockLocationStore`].
    #[derive(Debug, Default, Clone)]
    pub struct MockStoreLog {
        inner: Arc<Mutex<MockStoreCalls>>,
    }

    impl MockStoreLog {
        fn with<R>(&self, f: impl FnOnce(&mut MockStoreCalls) -> R) -> R {
            let mut calls = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            f(&mut calls)
        }

        pub fn attempts(&self) -> usize {
            self.with(|c| c.attempts)
        }

        pub fn rows(&self) -> Vec<VendorLocationRecord> {
            self.with(|c| c.rows.clone())
        }

        pub fn close_count(&self) -> usize {
            self.with(|c| c.closes)
        }
    }

    /// In-memory store; optionally rejects every write.
    #[derive(Debug, Default)]
    pub struct MockLocationStore {
        fail_writes: bool,
        log: MockStoreLog,
    }

    impl MockLocationStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing() -> Self {
            Self {
                fail_writes: true,
                ..Self::default()
            }
        }

        pub fn log(&self) -> MockStoreLog {
            self.log.clone()
        }
    }

    impl LocationStore for MockLocationStore {
        async fn write(&self, record: &VendorLocationRecord) -> StoreResult<WriteAck> {
            self.log.with(|c| c.attempts += 1);
            if self.fail_writes {
                return Err(StoreError::WriteError(sqlx::Error::PoolClosed));
            }
            self.log.with(|c| c.rows.push(record.clone()));
            Ok(WriteAck { rows_affected: 1 })
        }

        async fn close(self) {
            self.log.with(|c| c.closes += 1);
        }
    }
}
