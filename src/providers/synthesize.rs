//! Merges result lists from several providers into one ranked list.

use std::collections::{BTreeSet, HashMap};

use serde_json::Map;

use crate::search::RawCandidate;

struct Merged {
    candidate: RawCandidate,
    why: Vec<String>,
    sources: BTreeSet<String>,
    providers: BTreeSet<String>,
    scores: Vec<f64>,
    first_seen: usize,
    identified: bool,
}

impl Merged {
    fn new(item: &RawCandidate, first_seen: usize) -> Self {
        Self {
            candidate: RawCandidate {
                why: None,
                sources: Vec::new(),
                metrics: Map::new(),
                providers: Vec::new(),
                mentions: 0,
                score: None,
                ..item.clone()
            },
            why: Vec::new(),
            sources: BTreeSet::new(),
            providers: BTreeSet::new(),
            scores: Vec::new(),
            first_seen,
            identified: is_identified(item),
        }
    }

    fn absorb(&mut self, provider: &str, item: &RawCandidate) {
        let merged = &mut self.candidate;
        let has_year = merged.year.as_deref().is_some_and(|y| !y.is_empty());
        if !has_year && item.year.as_deref().is_some_and(|y| !y.is_empty()) {
            merged.year = item.year.clone();
        }
        if let Some(why) = item.why.as_deref().filter(|w| !w.is_empty()) {
            self.why.push(format!("{}: {}", provider, why));
        }
        self.providers.insert(provider.to_string());
        self.sources.extend(item.sources.iter().cloned());
        for (key, value) in &item.metrics {
            if !merged.metrics.contains_key(key) {
                merged.metrics.insert(key.clone(), value.clone());
            }
        }
        for detail in &item.source_details {
            if !merged.source_details.iter().any(|d| d.url == detail.url) {
                merged.source_details.push(detail.clone());
            }
        }
        if let Some(score) = item.score {
            self.scores.push(score);
        }
    }

    fn finish(self) -> (RawCandidate, f64, usize) {
        let average = if self.scores.is_empty() {
            None
        } else {
            Some(self.scores.iter().sum::<f64>() / self.scores.len() as f64)
        };
        let why = self.why.join(" | ");
        let candidate = RawCandidate {
            why: (!why.is_empty()).then_some(why),
            sources: self.sources.into_iter().collect(),
            mentions: self.providers.len(),
            providers: self.providers.into_iter().collect(),
            score: average,
            ..self.candidate
        };
        (candidate, average.unwrap_or(0.0), self.first_seen)
    }
}

fn is_identified(item: &RawCandidate) -> bool {
    !item.song.trim().is_empty() && !item.artist.trim().is_empty()
}

fn merge_key(item: &RawCandidate, provider: &str, index: usize) -> String {
    if !is_identified(item) {
        // Unidentifiable items are left for the canonicalizer to drop.
        return format!("#{}#{}", provider, index);
    }
    format!("{}|||{}", item.artist.to_lowercase(), item.song.to_lowercase())
}

/// Merges per-provider results by lowercase `artist|||song`.
///
/// Ranked by number of distinct providers, then average provider score,
/// then first appearance. A `limit` of zero keeps everything. Items without
/// a song or artist do not count towards the limit and trail the list.
pub fn synthesize_results(
    provider_results: &[(String, Vec<RawCandidate>)],
    limit: usize,
) -> Vec<RawCandidate> {
    let mut merged: Vec<Merged> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for (provider, results) in provider_results {
        for (index, item) in results.iter().enumerate() {
            let key = merge_key(item, provider, index);
            let position = *positions.entry(key).or_insert_with(|| {
                merged.push(Merged::new(item, merged.len()));
                merged.len() - 1
            });
            merged[position].absorb(provider, item);
        }
    }

    let (identified, unidentified): (Vec<Merged>, Vec<Merged>) =
        merged.into_iter().partition(|m| m.identified);

    let mut ranked: Vec<(RawCandidate, f64, usize)> =
        identified.into_iter().map(Merged::finish).collect();
    ranked.sort_by(|a, b| {
        b.0.mentions
            .cmp(&a.0.mentions)
            .then(b.1.total_cmp(&a.1))
            .then(a.2.cmp(&b.2))
    });
    if limit > 0 {
        ranked.truncate(limit);
    }
    ranked
        .into_iter()
        .map(|(candidate, _, _)| candidate)
        .chain(unidentified.into_iter().map(|m| m.finish().0))
        .collect()
}

/// One summary for the whole search.
pub fn synthesize_summary(provider_summaries: &[(String, String)], query: &str) -> String {
    match provider_summaries {
        [] => format!("Recommendations align with: {}", query),
        [(_, only)] => only.clone(),
        several => several
            .iter()
            .map(|(provider, summary)| format!("{}: {}", provider, summary))
            .collect::<Vec<_>>()
            .join(" | "),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::canonicalize;
    use serde_json::json;

    fn item(song: &str, artist: &str) -> RawCandidate {
        RawCandidate {
            song: song.to_string(),
            artist: artist.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn merges_across_providers() {
        let claude = RawCandidate {
            why: Some("hazy".to_string()),
            sources: vec!["https://b".to_string()],
            metrics: json!({"bpm": 80}).as_object().unwrap().clone(),
            score: Some(0.8),
            ..item("Teardrop", "Massive Attack")
        };
        let codex = RawCandidate {
            year: Some("1998".to_string()),
            why: Some("classic".to_string()),
            sources: vec!["https://a".to_string(), "https://b".to_string()],
            metrics: json!({"bpm": 81, "mood": "dark"}).as_object().unwrap().clone(),
            score: Some(0.6),
            ..item("teardrop", "massive attack")
        };
        let out = synthesize_results(
            &[
                ("claude".to_string(), vec![claude]),
                ("codex".to_string(), vec![codex]),
            ],
            10,
        );
        assert_eq!(out.len(), 1);
        let merged = &out[0];
        assert_eq!(merged.song, "Teardrop");
        assert_eq!(merged.year.as_deref(), Some("1998"));
        assert_eq!(merged.why.as_deref(), Some("claude: hazy | codex: classic"));
        assert_eq!(merged.sources, vec!["https://a", "https://b"]);
        assert_eq!(merged.metrics["bpm"], json!(80));
        assert_eq!(merged.metrics["mood"], json!("dark"));
        assert_eq!(merged.providers, vec!["claude", "codex"]);
        assert_eq!(merged.mentions, 2);
        assert!((merged.score.unwrap() - 0.7).abs() < 1e-9);
    }

    #[test]
    fn ranks_by_mentions_then_score_then_order() {
        let scored = |song: &str, score: f64| RawCandidate {
            score: Some(score),
            ..item(song, "X")
        };
        let out = synthesize_results(
            &[
                (
                    "a".to_string(),
                    vec![item("First", "X"), scored("Low", 0.2), scored("High", 0.9)],
                ),
                ("b".to_string(), vec![item("Shared", "Y")]),
                ("c".to_string(), vec![item("Shared", "Y"), item("Last", "X")]),
            ],
            0,
        );
        let songs: Vec<_> = out.iter().map(|c| c.song.as_str()).collect();
        assert_eq!(songs, vec!["Shared", "High", "Low", "First", "Last"]);
    }

    #[test]
    fn truncates_to_limit() {
        let out = synthesize_results(
            &[(
                "a".to_string(),
                vec![item("1", "X"), item("2", "X"), item("3", "X")],
            )],
            2,
        );
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn unidentifiable_items_do_not_take_limit_slots() {
        let untitled = RawCandidate {
            song: "Untitled".to_string(),
            score: Some(1.0),
            ..Default::default()
        };
        let out = synthesize_results(
            &[(
                "p".to_string(),
                vec![untitled, item("A", "X"), item("B", "Y")],
            )],
            2,
        );
        assert_eq!(out.len(), 3);
        assert_eq!(out[2].song, "Untitled");

        let survivors: Vec<_> = canonicalize(out)
            .into_iter()
            .map(|c| c.track_id)
            .collect();
        assert_eq!(survivors, vec!["x|||a", "y|||b"]);
    }

    #[test]
    fn same_provider_twice_counts_once() {
        let out = synthesize_results(
            &[("a".to_string(), vec![item("S", "X"), item("s", "x")])],
            0,
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].mentions, 1);
    }

    #[test]
    fn summaries() {
        assert_eq!(
            synthesize_summary(&[], "late night jazz"),
            "Recommendations align with: late night jazz"
        );
        assert_eq!(
            synthesize_summary(&[("a".to_string(), "one".to_string())], "q"),
            "one"
        );
        assert_eq!(
            synthesize_summary(
                &[
                    ("a".to_string(), "one".to_string()),
                    ("b".to_string(), "two".to_string())
                ],
                "q"
            ),
            "a: one | b: two"
        );
    }
}
