use serde_json::{json, Value};
use std::ops::Deref;
use std::path::PathBuf;
use tempfile::TempDir;
use tunr_search::search::{ProviderItem, RawCandidate};
use tunr_search::SqliteCacheStore;

/// A cache store backed by a file in a temporary directory. The directory
/// lives as long as the fixture.
pub struct TestStore {
    pub store: SqliteCacheStore,
    pub db_path: PathBuf,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestStore {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("cache").join("tunr.db");
        let store = SqliteCacheStore::new(&db_path).expect("Failed to open cache store");
        Self {
            store,
            db_path,
            _temp_dir: temp_dir,
        }
    }

    /// A second handle on the same database file.
    pub fn reopen(&self) -> SqliteCacheStore {
        SqliteCacheStore::new(&self.db_path).expect("Failed to reopen cache store")
    }
}

impl Deref for TestStore {
    type Target = SqliteCacheStore;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

pub fn candidate_from_json(value: Value) -> RawCandidate {
    ProviderItem::from_value(value)
        .into_candidate()
        .expect("fixture must be a known provider item")
}

/// A result with a rationale but no citations.
pub fn candidate(song: &str, artist: &str) -> RawCandidate {
    candidate_from_json(json!({
        "song": song,
        "artist": artist,
        "why": format!("{} has a hazy, slow late night mood", song),
    }))
}

/// A cited result, with one extra uncited link in its source details.
pub fn evidenced_candidate(song: &str, artist: &str, year: &str) -> RawCandidate {
    let slug = song.to_lowercase().replace(' ', "-");
    candidate_from_json(json!({
        "song": song,
        "artist": artist,
        "year": year,
        "why": format!("{} is a slow, smoky trip-hop track", song),
        "sources": [
            format!("https://musicbrainz.example/{}", slug),
            format!("https://press.example/{}", slug),
        ],
        "source_details": [
            {
                "url": format!("https://musicbrainz.example/{}", slug),
                "title": format!("{} - MusicBrainz", song),
            },
            {
                "url": format!("https://blog.example/{}", slug),
                "title": "A fan blog",
                "snippet": "one of the best of the decade",
            },
        ],
        "providers": ["claude", "codex"],
    }))
}
