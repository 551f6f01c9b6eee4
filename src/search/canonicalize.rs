//! Stable track identity and deduplication of provider results.

use std::collections::HashMap;

use super::candidate::RawCandidate;

/// A provider result that survived canonicalization.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalCandidate {
    /// `lower(artist)|||lower(song)`.
    pub track_id: String,
    /// Whitespace-normalized, original casing. Same for `artist`.
    pub song: String,
    pub artist: String,
    pub raw: RawCandidate,
}

/// Trims and collapses internal whitespace runs into single spaces.
pub fn normalize_text(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn canonical_track_id(artist: &str, song: &str) -> String {
    format!(
        "{}|||{}",
        normalize_text(artist).to_lowercase(),
        normalize_text(song).to_lowercase()
    )
}

/// Deduplicates candidates by track identity.
///
/// Items without a song or artist are dropped. When two items share an
/// identity, the later one replaces the earlier only if it carries strictly
/// more sources; the surviving entry keeps the first-seen position.
pub fn canonicalize(candidates: Vec<RawCandidate>) -> Vec<CanonicalCandidate> {
    let mut deduped: Vec<CanonicalCandidate> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for mut raw in candidates {
        let song = normalize_text(&raw.song);
        let artist = normalize_text(&raw.artist);
        if song.is_empty() || artist.is_empty() {
            tracing::debug!("Dropping provider item without song or artist");
            continue;
        }
        let track_id = canonical_track_id(&artist, &song);
        raw.song = song.clone();
        raw.artist = artist.clone();
        let candidate = CanonicalCandidate {
            track_id: track_id.clone(),
            song,
            artist,
            raw,
        };

        match positions.get(&track_id) {
            None => {
                positions.insert(track_id, deduped.len());
                deduped.push(candidate);
            }
            Some(&index) => {
                if candidate.raw.sources.len() > deduped[index].raw.sources.len() {
                    deduped[index] = candidate;
                }
            }
        }
    }
    deduped
}
