//! Canonical track resolution and deduplication.
//!
//! Every accepted match passes through [`IdentityResolver::resolve`], which
//! returns the id of exactly one catalog track. Two stations detecting the
//! same recording at the same moment must not create two rows, so
//! resolution of a logical track is serialized on its key:
//!
//! - `name:<title>|<artist>` is always locked first
//! - `isrc:<code>` is locked second when a valid code is present
//!
//! The fixed order keeps concurrent resolutions from deadlocking.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use super::domain::TrackCandidate;
use super::isrc::normalize_isrc;
use super::normalize::{normalize_artist, normalize_title};
use super::traits::{NewTrack, TrackCatalog};
use crate::error::{Error, Result};

/// Prune idle lock entries once the table grows past this size.
const LOCK_TABLE_PRUNE_AT: usize = 1024;

/// Per-key async locks.
#[derive(Default)]
pub struct KeyedLocks {
    table: parking_lot::Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let mutex = {
            let mut table = self.table.lock();
            if table.len() >= LOCK_TABLE_PRUNE_AT {
                // Only the table holds a reference to idle entries
                table.retain(|_, m| Arc::strong_count(m) > 1);
            }
            table
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        mutex.lock_owned().await
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.table.lock().len()
    }
}

pub struct IdentityResolver {
    catalog: Arc<dyn TrackCatalog>,
    locks: KeyedLocks,
}

impl IdentityResolver {
    pub fn new(catalog: Arc<dyn TrackCatalog>) -> Self {
        Self {
            catalog,
            locks: KeyedLocks::new(),
        }
    }

    /// Resolve a matched candidate to a catalog track id, creating the
    /// track (and its artist) on first sighting.
    pub async fn resolve(&self, candidate: &TrackCandidate) -> Result<i64> {
        if let Some(track_id) = candidate.track_id
            && self.catalog.track_exists(track_id).await?
        {
            return Ok(track_id);
        }

        let title = candidate
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::resolution("candidate has no title"))?;

        let title_normalized = normalize_title(title);
        if title_normalized.is_empty() {
            return Err(Error::resolution(format!(
                "title '{}' is empty after normalization",
                title
            )));
        }

        let artist = candidate
            .artist
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty());
        let artist_normalized = artist.map(normalize_artist).filter(|a| !a.is_empty());

        let isrc = match candidate.isrc.as_deref() {
            Some(raw) => {
                let valid = normalize_isrc(raw);
                if valid.is_none() {
                    tracing::warn!(target: "resolver", code = raw, "Dropping malformed ISRC from candidate");
                }
                valid
            }
            None => None,
        };

        let name_key = format!(
            "name:{}|{}",
            title_normalized,
            artist_normalized.as_deref().unwrap_or("")
        );
        let _name_guard = self.locks.lock(&name_key).await;
        let _isrc_guard = match &isrc {
            Some(code) => Some(self.locks.lock(&format!("isrc:{}", code)).await),
            None => None,
        };

        if let Some(code) = &isrc
            && let Some(track) = self.catalog.find_track_by_isrc(code).await?
        {
            return Ok(track.id);
        }

        let artist_id = match (artist, &artist_normalized) {
            (Some(name), Some(normalized)) => {
                Some(self.catalog.get_or_create_artist(name, normalized).await?)
            }
            _ => None,
        };

        if let Some(track) = self
            .catalog
            .find_track_by_name(&title_normalized, artist_id)
            .await?
        {
            match (&isrc, &track.isrc) {
                (Some(code), None) => {
                    tracing::info!(target: "resolver", track_id = track.id, isrc = %code, "Attaching ISRC to existing track");
                    self.catalog.set_track_isrc(track.id, code).await?;
                    return Ok(track.id);
                }
                // Same name, different recording code: a distinct recording
                (Some(code), Some(existing)) if code != existing => {}
                _ => return Ok(track.id),
            }
        }

        let new_track = NewTrack {
            title: title.to_string(),
            title_normalized,
            artist_id,
            isrc,
            album: candidate.album.clone(),
            label: candidate.label.clone(),
            duration_secs: candidate.duration.map(|d| d.as_secs() as i64),
        };
        let track_id = self.catalog.create_track(&new_track).await?;
        tracing::info!(
            target: "resolver",
            track_id,
            candidate = %candidate.label(),
            "Created track"
        );
        Ok(track_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::traits::mocks::MemoryStore;

    fn candidate(title: &str, artist: &str, isrc: Option<&str>) -> TrackCandidate {
        TrackCandidate {
            title: Some(title.to_string()),
            artist: Some(artist.to_string()),
            isrc: isrc.map(String::from),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_dedupes_by_normalized_name() {
        let store = Arc::new(MemoryStore::new());
        let resolver = IdentityResolver::new(store.clone());

        let a = resolver
            .resolve(&candidate("Blinding Lights", "The Weeknd", None))
            .await
            .unwrap();
        let b = resolver
            .resolve(&candidate("Blinding Lights (Official Video)", "The Weeknd", None))
            .await
            .unwrap();

        assert_eq!(a, b);
        assert_eq!(store.tracks().len(), 1);
    }

    #[tokio::test]
    async fn test_isrc_is_authoritative() {
        let store = Arc::new(MemoryStore::new());
        let resolver = IdentityResolver::new(store.clone());

        let a = resolver
            .resolve(&candidate("Song", "Artist", Some("FR6Z91234560")))
            .await
            .unwrap();
        // Different spelling of the metadata, same code
        let b = resolver
            .resolve(&candidate("Totally Different", "Someone", Some("FR-6Z9-12-34560")))
            .await
            .unwrap();

        assert_eq!(a, b);
        assert_eq!(store.tracks().len(), 1);
    }

    #[tokio::test]
    async fn test_attaches_isrc_to_name_match() {
        let store = Arc::new(MemoryStore::new());
        let resolver = IdentityResolver::new(store.clone());

        let a = resolver.resolve(&candidate("Song", "Artist", None)).await.unwrap();
        let b = resolver
            .resolve(&candidate("Song", "Artist", Some("FR6Z91234560")))
            .await
            .unwrap();

        assert_eq!(a, b);
        assert_eq!(store.tracks()[0].isrc.as_deref(), Some("FR6Z91234560"));
    }

    #[tokio::test]
    async fn test_malformed_isrc_never_persisted() {
        let store = Arc::new(MemoryStore::new());
        let resolver = IdentityResolver::new(store.clone());

        resolver
            .resolve(&candidate("Song", "Artist", Some("FR6Z9123456")))
            .await
            .unwrap();

        assert_eq!(store.tracks()[0].isrc, None);
    }

    #[tokio::test]
    async fn test_known_track_id_short_circuits() {
        let store = Arc::new(MemoryStore::new());
        let resolver = IdentityResolver::new(store.clone());
        let id = resolver.resolve(&candidate("Song", "Artist", None)).await.unwrap();

        let known = TrackCandidate::known(id, "whatever", None);
        assert_eq!(resolver.resolve(&known).await.unwrap(), id);
        assert_eq!(store.track_creations(), 1);
    }

    #[tokio::test]
    async fn test_missing_title_is_an_error() {
        let resolver = IdentityResolver::new(Arc::new(MemoryStore::new()));
        let result = resolver.resolve(&TrackCandidate::default()).await;
        assert!(matches!(result, Err(Error::Resolution(_))));

        let result = resolver.resolve(&candidate("(Official Video)", "A", None)).await;
        assert!(matches!(result, Err(Error::Resolution(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_resolution_creates_one_track() {
        let store = Arc::new(MemoryStore::new());
        let resolver = Arc::new(IdentityResolver::new(store.clone()));

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let resolver = resolver.clone();
                // Mix display variants of the same logical track
                let title = if i % 2 == 0 { "Levitating" } else { "Levitating (Lyrics)" };
                tokio::spawn(async move {
                    resolver
                        .resolve(&candidate(title, "Dua Lipa feat. DaBaby", None))
                        .await
                })
            })
            .collect();

        let ids: Vec<i64> = futures::future::join_all(handles)
            .await
            .into_iter()
            .map(|r| r.unwrap().unwrap())
            .collect();

        assert!(ids.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(store.track_creations(), 1);
    }

    #[tokio::test]
    async fn test_lock_table_reuses_keys() {
        let locks = KeyedLocks::new();
        drop(locks.lock("a").await);
        drop(locks.lock("a").await);
        drop(locks.lock("b").await);
        assert_eq!(locks.len(), 2);
    }
}
