//! Database module for catalog, detection and session persistence.
//!
//! Uses SQLx with SQLite for lightweight, embedded database storage.
//! Free functions in [`catalog`] and [`activity`] take a pool directly;
//! [`SqliteStore`] wraps a pool and implements the persistence traits the
//! detection core depends on.
//!
//! # Example
//!
//! ```ignore
//! use airtrack::db::{db_url, init_db, SqliteStore};
//!
//! let pool = init_db(&db_url(None)).await?;
//! let store = SqliteStore::new(pool);
//! ```

pub mod activity;
pub mod catalog;

use async_trait::async_trait;
use sqlx::migrate::MigrateDatabase;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::detection::domain::{DetectionEvent, Signature};
use crate::detection::traits::{
    DetectionSink, NewTrack, SessionStore, SignatureStore, StatsSink, StoredSignature,
    TrackCatalog,
};
use crate::error::Result;
use crate::model::Track;
use crate::sessions::PlaySession;

/// Default database filename.
pub const DEFAULT_DB_NAME: &str = "airtrack.db";

/// Build a SQLite database URL from an optional path.
///
/// If no path is provided, uses [`DEFAULT_DB_NAME`] in the current directory.
pub fn db_url(path: Option<&std::path::Path>) -> String {
    match path {
        Some(p) => format!("sqlite:{}", p.display()),
        None => format!("sqlite:{}", DEFAULT_DB_NAME),
    }
}

/// Initialize the database connection pool and run migrations.
///
/// Creates the database file if it doesn't exist, establishes a connection
/// pool with up to 5 connections, and runs all pending migrations.
pub async fn init_db(db_url: &str) -> std::result::Result<SqlitePool, sqlx::Error> {
    if !sqlx::Sqlite::database_exists(db_url).await.unwrap_or(false) {
        sqlx::Sqlite::create_database(db_url).await?;
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

/// SQLite-backed implementation of every persistence trait.
///
/// Also a [`StatsSink`] maintaining each track's play counters.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl SignatureStore for SqliteStore {
    async fn find_exact(&self, fingerprint: &str) -> Result<Option<StoredSignature>> {
        Ok(catalog::find_signature(&self.pool, fingerprint).await?)
    }

    async fn candidates(&self) -> Result<Vec<StoredSignature>> {
        Ok(catalog::all_signatures(&self.pool).await?)
    }

    async fn insert_signature(&self, track_id: i64, signature: &Signature) -> Result<bool> {
        Ok(catalog::insert_signature(&self.pool, track_id, signature).await?)
    }
}

#[async_trait]
impl TrackCatalog for SqliteStore {
    async fn track_exists(&self, track_id: i64) -> Result<bool> {
        Ok(catalog::get_track(&self.pool, track_id).await?.is_some())
    }

    async fn find_track_by_isrc(&self, isrc: &str) -> Result<Option<Track>> {
        Ok(catalog::find_track_by_isrc(&self.pool, isrc).await?)
    }

    async fn find_track_by_name(
        &self,
        title_normalized: &str,
        artist_id: Option<i64>,
    ) -> Result<Option<Track>> {
        Ok(catalog::find_track_by_name(&self.pool, title_normalized, artist_id).await?)
    }

    async fn get_or_create_artist(&self, name: &str, name_normalized: &str) -> Result<i64> {
        Ok(catalog::get_or_create_artist(&self.pool, name, name_normalized).await?)
    }

    async fn create_track(&self, track: &NewTrack) -> Result<i64> {
        Ok(catalog::create_track(&self.pool, track).await?)
    }

    async fn set_track_isrc(&self, track_id: i64, isrc: &str) -> Result<()> {
        Ok(catalog::set_track_isrc(&self.pool, track_id, isrc).await?)
    }
}

#[async_trait]
impl DetectionSink for SqliteStore {
    async fn append_event(&self, event: &DetectionEvent) -> Result<i64> {
        Ok(activity::append_event(&self.pool, event).await?)
    }
}

#[async_trait]
impl SessionStore for SqliteStore {
    async fn save_session(&self, session: &PlaySession) -> Result<i64> {
        Ok(activity::save_session(&self.pool, session).await?)
    }
}

#[async_trait]
impl StatsSink for SqliteStore {
    async fn session_closed(&self, session: &PlaySession) -> Result<()> {
        Ok(catalog::add_play(&self.pool, session.track_id, session.duration_secs()).await?)
    }
}
