//! Artists, tracks and learned signatures.

use sha2::{Digest, Sha256};
use sqlx::sqlite::SqlitePool;

use crate::detection::domain::{Signature, SpectralDescriptors};
use crate::detection::traits::{NewTrack, StoredSignature};
use crate::model::Track;

// ============================================================================
// Database Row Types
// ============================================================================

/// Signature joined with its track's title and artist.
#[derive(Debug, sqlx::FromRow)]
struct SignatureRow {
    id: i64,
    track_id: i64,
    title: String,
    artist: Option<String>,
    fingerprint: String,
    peaks: String,
    duration_secs: i64,
    descriptors: Option<String>,
}

impl From<SignatureRow> for StoredSignature {
    fn from(row: SignatureRow) -> Self {
        StoredSignature {
            id: row.id,
            track_id: row.track_id,
            title: row.title,
            artist: row.artist,
            signature: Signature {
                fingerprint: row.fingerprint,
                peaks: serde_json::from_str(&row.peaks).unwrap_or_default(),
                duration_secs: u32::try_from(row.duration_secs).unwrap_or(0),
                descriptors: row
                    .descriptors
                    .and_then(|d| serde_json::from_str::<SpectralDescriptors>(&d).ok()),
            },
        }
    }
}

const SIGNATURE_SELECT: &str = r#"
    SELECT s.id, s.track_id, t.title, a.name AS artist,
           s.fingerprint, s.peaks, s.duration_secs, s.descriptors
    FROM signatures s
    JOIN tracks t ON t.id = s.track_id
    LEFT JOIN artists a ON a.id = t.artist_id
"#;

const TRACK_COLUMNS: &str = "id, title, title_normalized, artist_id, isrc, album, label, \
                             duration_secs, play_count, total_play_secs";

/// SHA-256 of a fingerprint as lowercase hex, the signature dedup key.
pub fn fingerprint_hash(fingerprint: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(fingerprint.as_bytes());
    format!("{:x}", hasher.finalize())
}

// ============================================================================
// Signatures
// ============================================================================

pub async fn find_signature(
    pool: &SqlitePool,
    fingerprint: &str,
) -> sqlx::Result<Option<StoredSignature>> {
    let sql = format!("{} WHERE s.fingerprint_hash = ?", SIGNATURE_SELECT);
    let row: Option<SignatureRow> = sqlx::query_as(&sql)
        .bind(fingerprint_hash(fingerprint))
        .fetch_optional(pool)
        .await?;
    Ok(row.map(StoredSignature::from))
}

pub async fn all_signatures(pool: &SqlitePool) -> sqlx::Result<Vec<StoredSignature>> {
    let sql = format!("{} ORDER BY s.id", SIGNATURE_SELECT);
    let rows: Vec<SignatureRow> = sqlx::query_as(&sql).fetch_all(pool).await?;
    Ok(rows.into_iter().map(StoredSignature::from).collect())
}

/// Store a signature for a track. Returns false if the fingerprint was
/// already known.
pub async fn insert_signature(
    pool: &SqlitePool,
    track_id: i64,
    signature: &Signature,
) -> sqlx::Result<bool> {
    let peaks = serde_json::to_string(&signature.peaks).unwrap_or_else(|_| "[]".to_string());
    let descriptors = signature
        .descriptors
        .as_ref()
        .and_then(|d| serde_json::to_string(d).ok());

    let result = sqlx::query(
        r#"
        INSERT INTO signatures (track_id, fingerprint, fingerprint_hash, peaks, duration_secs, descriptors)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(fingerprint_hash) DO NOTHING
        "#,
    )
    .bind(track_id)
    .bind(&signature.fingerprint)
    .bind(fingerprint_hash(&signature.fingerprint))
    .bind(&peaks)
    .bind(i64::from(signature.duration_secs))
    .bind(&descriptors)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

// ============================================================================
// Artists
// ============================================================================

/// Get or create an artist by normalized name.
///
/// Atomic: concurrent callers with the same key get the same id.
pub async fn get_or_create_artist(
    pool: &SqlitePool,
    name: &str,
    name_normalized: &str,
) -> sqlx::Result<i64> {
    let row: (i64,) = sqlx::query_as(
        r#"
        INSERT INTO artists (name, name_normalized) VALUES (?, ?)
        ON CONFLICT(name_normalized) DO UPDATE SET name_normalized = excluded.name_normalized
        RETURNING id
        "#,
    )
    .bind(name)
    .bind(name_normalized)
    .fetch_one(pool)
    .await?;
    Ok(row.0)
}

// ============================================================================
// Tracks
// ============================================================================

pub async fn get_track(pool: &SqlitePool, track_id: i64) -> sqlx::Result<Option<Track>> {
    let sql = format!("SELECT {} FROM tracks WHERE id = ?", TRACK_COLUMNS);
    sqlx::query_as(&sql).bind(track_id).fetch_optional(pool).await
}

pub async fn find_track_by_isrc(pool: &SqlitePool, isrc: &str) -> sqlx::Result<Option<Track>> {
    let sql = format!("SELECT {} FROM tracks WHERE isrc = ?", TRACK_COLUMNS);
    sqlx::query_as(&sql).bind(isrc).fetch_optional(pool).await
}

pub async fn find_track_by_name(
    pool: &SqlitePool,
    title_normalized: &str,
    artist_id: Option<i64>,
) -> sqlx::Result<Option<Track>> {
    let sql = format!(
        "SELECT {} FROM tracks WHERE title_normalized = ? AND artist_id IS ? ORDER BY id LIMIT 1",
        TRACK_COLUMNS
    );
    sqlx::query_as(&sql)
        .bind(title_normalized)
        .bind(artist_id)
        .fetch_optional(pool)
        .await
}

/// Insert a track. If its ISRC is already taken, returns the existing id.
pub async fn create_track(pool: &SqlitePool, track: &NewTrack) -> sqlx::Result<i64> {
    let inserted: Option<(i64,)> = sqlx::query_as(
        r#"
        INSERT INTO tracks (title, title_normalized, artist_id, isrc, album, label, duration_secs)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(isrc) DO NOTHING
        RETURNING id
        "#,
    )
    .bind(&track.title)
    .bind(&track.title_normalized)
    .bind(track.artist_id)
    .bind(&track.isrc)
    .bind(&track.album)
    .bind(&track.label)
    .bind(track.duration_secs)
    .fetch_optional(pool)
    .await?;

    match (inserted, &track.isrc) {
        (Some((id,)), _) => Ok(id),
        (None, Some(isrc)) => {
            let (id,): (i64,) = sqlx::query_as("SELECT id FROM tracks WHERE isrc = ?")
                .bind(isrc)
                .fetch_one(pool)
                .await?;
            Ok(id)
        }
        (None, None) => Err(sqlx::Error::RowNotFound),
    }
}

/// Attach an ISRC to a track that has none yet.
pub async fn set_track_isrc(pool: &SqlitePool, track_id: i64, isrc: &str) -> sqlx::Result<()> {
    sqlx::query("UPDATE tracks SET isrc = ? WHERE id = ? AND isrc IS NULL")
        .bind(isrc)
        .bind(track_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Count one finished play against a track.
pub async fn add_play(pool: &SqlitePool, track_id: i64, duration_secs: i64) -> sqlx::Result<()> {
    sqlx::query(
        "UPDATE tracks SET play_count = play_count + 1, total_play_secs = total_play_secs + ? WHERE id = ?",
    )
    .bind(duration_secs.max(0))
    .bind(track_id)
    .execute(pool)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::temp_db;

    fn new_track(title: &str, isrc: Option<&str>) -> NewTrack {
        NewTrack {
            title: title.to_string(),
            title_normalized: title.to_lowercase(),
            isrc: isrc.map(String::from),
            ..Default::default()
        }
    }

    #[test]
    fn test_fingerprint_hash_is_hex_sha256() {
        let hash = fingerprint_hash("AQAD");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(hash, fingerprint_hash("AQAD"));
        assert_ne!(hash, fingerprint_hash("AQAE"));
    }

    #[tokio::test]
    async fn test_artist_is_idempotent() {
        let (pool, _dir) = temp_db().await;
        let a = get_or_create_artist(&pool, "Dua Lipa", "dua lipa").await.unwrap();
        let b = get_or_create_artist(&pool, "DUA LIPA", "dua lipa").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_create_track_dedupes_isrc() {
        let (pool, _dir) = temp_db().await;
        let a = create_track(&pool, &new_track("Song", Some("FR6Z91234560"))).await.unwrap();
        let b = create_track(&pool, &new_track("Song (Live)", Some("FR6Z91234560"))).await.unwrap();
        assert_eq!(a, b);

        let c = create_track(&pool, &new_track("Other", None)).await.unwrap();
        assert_ne!(a, c);
        assert_eq!(find_track_by_isrc(&pool, "FR6Z91234560").await.unwrap().unwrap().id, a);
    }

    #[tokio::test]
    async fn test_find_by_name_and_attach_isrc() {
        let (pool, _dir) = temp_db().await;
        let artist = get_or_create_artist(&pool, "Artist", "artist").await.unwrap();
        let id = create_track(
            &pool,
            &NewTrack {
                artist_id: Some(artist),
                ..new_track("Song", None)
            },
        )
        .await
        .unwrap();

        assert!(find_track_by_name(&pool, "song", None).await.unwrap().is_none());
        let found = find_track_by_name(&pool, "song", Some(artist)).await.unwrap().unwrap();
        assert_eq!(found.id, id);

        set_track_isrc(&pool, id, "USRC17607839").await.unwrap();
        // Never overwrites an existing code
        set_track_isrc(&pool, id, "FR6Z91234560").await.unwrap();
        let track = get_track(&pool, id).await.unwrap().unwrap();
        assert_eq!(track.isrc.as_deref(), Some("USRC17607839"));
    }

    #[tokio::test]
    async fn test_signatures_roundtrip_and_dedupe() {
        let (pool, _dir) = temp_db().await;
        let track = create_track(&pool, &new_track("Song", None)).await.unwrap();
        let mut signature = Signature::new("AQADtEmUKUkS", vec![3, 1, 4, 1, 5]);
        signature.duration_secs = 12;
        signature.descriptors = Some(SpectralDescriptors {
            bass_energy: 0.5,
            mid_energy: 0.25,
            high_energy: 0.125,
            rhythm_strength: 1.0,
        });

        assert!(insert_signature(&pool, track, &signature).await.unwrap());
        assert!(!insert_signature(&pool, track, &signature).await.unwrap());

        let stored = find_signature(&pool, "AQADtEmUKUkS").await.unwrap().unwrap();
        assert_eq!(stored.track_id, track);
        assert_eq!(stored.title, "Song");
        assert_eq!(stored.signature, signature);
        assert_eq!(all_signatures(&pool).await.unwrap().len(), 1);
        assert!(find_signature(&pool, "unknown").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_add_play_accumulates() {
        let (pool, _dir) = temp_db().await;
        let id = create_track(&pool, &new_track("Song", None)).await.unwrap();
        add_play(&pool, id, 180).await.unwrap();
        add_play(&pool, id, 200).await.unwrap();

        let track = get_track(&pool, id).await.unwrap().unwrap();
        assert_eq!(track.play_count, 2);
        assert_eq!(track.total_play_secs, 380);
    }
}
