//! The search pipeline: cache lookup, provider search, extraction,
//! embedding, scoring and persistence for one query.

use std::time::Instant;

use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::canonicalize::{canonicalize, CanonicalCandidate};
use super::context_card::{build_context_card, ContextCard};
use super::error::SearchError;
use super::extract::{extract_context, ExtractedContext, ExtractionThresholds};
use super::query_analysis::extract_year_target;
use super::scoring::{rank_scores, score_candidates, CandidateMeta, ScoreConfig};
use crate::cache_store::{
    canonical_json, derive_source_id, now_timestamp, query_hash, vector_norm, ArtistRecord,
    CacheStore, CachedCandidateRow, QueryRecord, RunStatus, SearchCandidateRecord,
    SearchRunRecord, TrackContextRecord, TrackEmbeddingRecord, TrackRecord, TrackSourceRecord,
    TrackStatus,
};
use crate::embedding::Embedder;
use crate::providers::{ProviderRun, ProviderRunner};

const CONTEXT_VERSION: &str = "v1";
const RUN_PROVIDER_LABEL: &str = "combined";
/// Periodic progress messages are sent every this many items.
const PROGRESS_EVERY: usize = 25;

/// Stage-name progress callback.
pub type ProgressCallback<'c> = &'c mut dyn FnMut(&str);
/// Called once per ranked result with its 1-based rank and the total count.
pub type ResultCallback<'c> = &'c mut dyn FnMut(&SearchResult, usize, usize);

#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub track_id: String,
    pub song: String,
    pub artist: String,
    pub year: Option<String>,
    pub score: f64,
    pub strict_ratio: f64,
    pub sources: Vec<String>,
    /// Empty for results served from cache.
    pub providers: Vec<String>,
}

impl SearchResult {
    fn from_cached(row: CachedCandidateRow) -> Self {
        let artist = row.artist.unwrap_or_else(|| {
            row.track_id
                .split("|||")
                .next()
                .unwrap_or_default()
                .to_string()
        });
        Self {
            track_id: row.track_id,
            song: row.song,
            artist,
            year: row.release_date,
            score: row.score_final,
            strict_ratio: row.strict_ratio,
            sources: row.sources,
            providers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchOutcome {
    pub results: Vec<SearchResult>,
    pub run_id: String,
    /// Whether the results were reconstructed from a previous run.
    pub cached: bool,
}

/// What the caller remembers about its last search.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchSessionState {
    pub query: String,
    pub expanded: bool,
    pub run_id: Option<String>,
    pub cached: bool,
    pub track_ids: Vec<String>,
}

impl SearchSessionState {
    fn record(query: &str, expanded: bool, outcome: &SearchOutcome) -> Self {
        Self {
            query: query.to_string(),
            expanded,
            run_id: Some(outcome.run_id.clone()),
            cached: outcome.cached,
            track_ids: outcome.results.iter().map(|r| r.track_id.clone()).collect(),
        }
    }

    pub fn has_search(&self) -> bool {
        self.run_id.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineSettings {
    pub thresholds: ExtractionThresholds,
    pub score_config: ScoreConfig,
}

struct Reporter<'c> {
    progress: Option<ProgressCallback<'c>>,
}

impl Reporter<'_> {
    fn stage(&mut self, stage: &str) {
        debug!("Pipeline stage: {}", stage);
        if let Some(progress) = self.progress.as_deref_mut() {
            progress(stage);
        }
    }

    fn every(&mut self, stage: &str, done: usize, total: usize) {
        if done % PROGRESS_EVERY == 0 {
            if let Some(progress) = self.progress.as_deref_mut() {
                progress(&format!("{} {}/{}", stage, done, total));
            }
        }
    }
}

/// A canonical candidate after extraction, ready to embed.
struct Prepared {
    candidate: CanonicalCandidate,
    card: ContextCard,
}

/// Stateless orchestrator over a shared store, an embedder and a provider
/// runner. Each [`SearchPipeline::run`] is synchronous.
pub struct SearchPipeline<'a> {
    store: &'a dyn CacheStore,
    embedder: &'a dyn Embedder,
    runner: &'a dyn ProviderRunner,
    settings: PipelineSettings,
}

impl<'a> SearchPipeline<'a> {
    pub fn new(
        store: &'a dyn CacheStore,
        embedder: &'a dyn Embedder,
        runner: &'a dyn ProviderRunner,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            store,
            embedder,
            runner,
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Runs one query. A previous successful run for the same normalized
    /// query is served from storage without calling any provider.
    pub fn run(
        &self,
        query: &str,
        expanded: bool,
        progress: Option<ProgressCallback<'_>>,
        mut on_result: Option<ResultCallback<'_>>,
    ) -> Result<SearchOutcome, SearchError> {
        let started = Instant::now();
        let mut reporter = Reporter { progress };

        reporter.stage("cache");
        let mut hash_constraints = Map::new();
        hash_constraints.insert("expanded".to_string(), Value::Bool(expanded));
        let hash = query_hash(query, &hash_constraints);
        let score_config = self
            .settings
            .score_config
            .with_year_target(extract_year_target(query));

        if let Some(outcome) = self.load_cached(&hash, &score_config.config_hash())? {
            info!(
                "Cache hit for query {:?}: run {} ({} results)",
                query,
                outcome.run_id,
                outcome.results.len()
            );
            emit_results(&outcome.results, &mut on_result);
            return Ok(outcome);
        }
        info!("Cache miss for query {:?}", query);

        reporter.stage("search");
        let provider_run = self
            .runner
            .run_providers(query, expanded)
            .map_err(|e| SearchError::ProviderFailure(e.to_string()))?;

        let run_id = Uuid::new_v4().to_string();
        let now = now_timestamp();

        let mut constraints = provider_run.constraints.clone();
        constraints.insert("expanded".to_string(), Value::Bool(expanded));
        let mut query_record = QueryRecord {
            query_hash: hash.clone(),
            query_text: query.to_string(),
            constraints_json: canonical_json(&constraints),
            embedding: None,
            model_name: Some(self.embedder.model_name().to_string()),
            created_at: now.clone(),
            last_used_at: now.clone(),
        };
        self.store.upsert_query(&query_record)?;
        self.store.insert_search_run(&SearchRunRecord {
            run_id: run_id.clone(),
            query_hash: hash,
            provider: RUN_PROVIDER_LABEL.to_string(),
            expanded,
            status: RunStatus::Ok,
            error: None,
            started_at: now.clone(),
            finished_at: Some(now.clone()),
            score_config_hash: Some(score_config.config_hash()),
            results_count: provider_run.results.len(),
        })?;

        let processed = self.process_run(
            query,
            &run_id,
            &now,
            provider_run,
            &score_config,
            &mut query_record,
            &mut reporter,
        );
        let results = match processed {
            Ok(results) => results,
            Err(e) => {
                warn!("Search run {} failed: {}", run_id, e);
                if let Err(mark_err) =
                    self.store
                        .update_run_status(&run_id, RunStatus::Error, Some(&e.to_string()))
                {
                    warn!("Could not mark run {} as failed: {}", run_id, mark_err);
                }
                return Err(e);
            }
        };
        self.store.update_run_status(&run_id, RunStatus::Ok, None)?;

        emit_results(&results, &mut on_result);
        reporter.stage("cache");
        info!(
            "Search run {} complete: {} results in {:.1}s",
            run_id,
            results.len(),
            started.elapsed().as_secs_f64()
        );
        Ok(SearchOutcome {
            results,
            run_id,
            cached: false,
        })
    }

    /// Runs a query and records it as the session's last search.
    pub fn run_session(
        &self,
        session: &mut SearchSessionState,
        query: &str,
        expanded: bool,
        progress: Option<ProgressCallback<'_>>,
        on_result: Option<ResultCallback<'_>>,
    ) -> Result<SearchOutcome, SearchError> {
        let outcome = self.run(query, expanded, progress, on_result)?;
        *session = SearchSessionState::record(query, expanded, &outcome);
        Ok(outcome)
    }

    /// Repeats the session's last query as an expanded search. Returns
    /// `None` when the session has no previous search.
    pub fn expand_last(
        &self,
        session: &mut SearchSessionState,
        progress: Option<ProgressCallback<'_>>,
        on_result: Option<ResultCallback<'_>>,
    ) -> Option<Result<SearchOutcome, SearchError>> {
        if !session.has_search() {
            return None;
        }
        let query = session.query.clone();
        Some(self.run_session(session, &query, true, progress, on_result))
    }

    /// Runs scored under different weights are not reused. Runs that
    /// recorded no scoring hash are.
    fn load_cached(
        &self,
        hash: &str,
        config_hash: &str,
    ) -> Result<Option<SearchOutcome>, SearchError> {
        let Some(run_id) = self.store.latest_successful_run(hash)? else {
            return Ok(None);
        };
        let recorded = self
            .store
            .get_search_run(&run_id)?
            .and_then(|run| run.score_config_hash);
        if let Some(recorded) = recorded {
            if recorded != config_hash {
                info!(
                    "Scoring changed since run {} ({} -> {}), searching again",
                    run_id, recorded, config_hash
                );
                return Ok(None);
            }
        }
        let rows = self.store.load_ranked_results(&run_id)?;
        if rows.is_empty() {
            debug!("Run {} has no candidates, searching again", run_id);
            return Ok(None);
        }
        if let Some(mut query) = self.store.get_query(hash)? {
            query.last_used_at = now_timestamp();
            query.embedding = None;
            self.store.upsert_query(&query)?;
        }
        Ok(Some(SearchOutcome {
            results: rows.into_iter().map(SearchResult::from_cached).collect(),
            run_id,
            cached: true,
        }))
    }

    #[allow(clippy::too_many_arguments)]
    fn process_run(
        &self,
        query: &str,
        run_id: &str,
        now: &str,
        provider_run: ProviderRun,
        score_config: &ScoreConfig,
        query_record: &mut QueryRecord,
        reporter: &mut Reporter<'_>,
    ) -> Result<Vec<SearchResult>, SearchError> {
        reporter.stage("extract");
        let canonical = canonicalize(provider_run.results);
        let total = canonical.len();
        let mut prepared: Vec<Prepared> = Vec::with_capacity(total);
        for (index, candidate) in canonical.into_iter().enumerate() {
            let extracted = extract_context(&candidate.raw, self.settings.thresholds);
            if extracted.context_missing {
                warn!(
                    "Missing context fields for {} by {}",
                    candidate.song, candidate.artist
                );
            }
            let card = build_context_card(
                &candidate.song,
                &candidate.artist,
                candidate.raw.year.as_deref(),
                &extracted.fields,
                &extracted.sources,
                self.settings.thresholds.strict_threshold,
            );
            self.persist_candidate(&candidate, &card, &extracted, &provider_run.providers, now)?;
            prepared.push(Prepared { candidate, card });
            reporter.every("extract", index + 1, total);
        }

        if prepared.is_empty() {
            info!("No usable candidates in run {}", run_id);
            return Ok(Vec::new());
        }

        reporter.stage("embed");
        let texts: Vec<String> = prepared.iter().map(|p| p.card.context_text.clone()).collect();
        let track_vectors = self.embedder.embed_exact(&texts)?;
        let query_vector = self
            .embedder
            .embed_exact(&[query.to_string()])?
            .pop()
            .unwrap_or_default();

        for (p, vector) in prepared.iter().zip(&track_vectors) {
            self.store.upsert_track_embedding(&TrackEmbeddingRecord {
                track_id: p.candidate.track_id.clone(),
                model_name: self.embedder.model_name().to_string(),
                vector: vector.clone(),
                norm: vector_norm(vector),
                strict_ratio: p.card.strict_ratio,
                created_at: now.to_string(),
            })?;
        }
        query_record.embedding = Some(query_vector.clone());
        self.store.upsert_query(query_record)?;

        reporter.stage("score");
        let strict_ratios: Vec<f64> = prepared.iter().map(|p| p.card.strict_ratio).collect();
        let metadata: Vec<CandidateMeta> = prepared
            .iter()
            .map(|p| CandidateMeta {
                sources_count: p.candidate.raw.sources.len(),
                year: p.candidate.raw.year.clone(),
            })
            .collect();
        let scores = score_candidates(
            &query_vector,
            &track_vectors,
            &strict_ratios,
            &metadata,
            score_config,
        );
        let order = rank_scores(&scores);

        let mut records = Vec::with_capacity(order.len());
        let mut results = Vec::with_capacity(order.len());
        for (position, &index) in order.iter().enumerate() {
            let rank = position + 1;
            let p = &prepared[index];
            let score = scores[index];
            let strict_ratio = p.card.strict_ratio;
            records.push(SearchCandidateRecord {
                run_id: run_id.to_string(),
                track_id: p.candidate.track_id.clone(),
                rank,
                score_text: Some(score),
                score_audio: None,
                score_final: score,
                strict_ratio,
                lenient_ratio: 1.0 - strict_ratio,
                sources_count: p.candidate.raw.sources.len(),
            });
            let providers = if p.candidate.raw.providers.is_empty() {
                provider_run.providers.clone()
            } else {
                p.candidate.raw.providers.clone()
            };
            results.push(SearchResult {
                track_id: p.candidate.track_id.clone(),
                song: p.candidate.song.clone(),
                artist: p.candidate.artist.clone(),
                year: p.candidate.raw.year.clone(),
                score,
                strict_ratio,
                sources: p.candidate.raw.sources.clone(),
                providers,
            });
            reporter.every("score", rank, order.len());
        }
        self.store.insert_candidates(&records)?;
        Ok(results)
    }

    /// Artist, track, context card and evidence rows for one candidate.
    fn persist_candidate(
        &self,
        candidate: &CanonicalCandidate,
        card: &ContextCard,
        extracted: &ExtractedContext,
        run_providers: &[String],
        now: &str,
    ) -> anyhow::Result<()> {
        let artist_id = candidate.artist.to_lowercase();
        self.store.upsert_artist(&ArtistRecord {
            artist_id: artist_id.clone(),
            name: candidate.artist.clone(),
            genres: Vec::new(),
            popularity: None,
            updated_at: now.to_string(),
        })?;

        let raw = &candidate.raw;
        self.store.upsert_track(&TrackRecord {
            track_id: candidate.track_id.clone(),
            spotify_id: raw.spotify_uri.clone(),
            name: candidate.song.clone(),
            artist_id: Some(artist_id),
            album_name: None,
            release_date: raw.year.clone(),
            duration_ms: None,
            explicit: None,
            popularity: None,
            spotify_url: raw.spotify_url.clone(),
            status: TrackStatus::Candidate,
            last_decision: None,
            decision_reason: None,
            created_at: now.to_string(),
            updated_at: now.to_string(),
        })?;

        self.store.upsert_track_context(&TrackContextRecord {
            track_id: candidate.track_id.clone(),
            context_text: card.context_text.clone(),
            strict_text: card.strict_text.clone(),
            lenient_text: card.lenient_text.clone(),
            fields_json: card.fields_json.clone(),
            sources_json: card.sources_json.clone(),
            strict_ratio: card.strict_ratio,
            context_version: CONTEXT_VERSION.to_string(),
            generated_at: now.to_string(),
        })?;

        let provider_label = if raw.providers.is_empty() {
            run_providers.join(",")
        } else {
            raw.providers.join(",")
        };
        let detail_for = |url: &str| raw.source_details.iter().find(|d| d.url == url);
        let lenient_urls = raw
            .source_details
            .iter()
            .map(|d| d.url.as_str())
            .filter(|url| !extracted.sources.iter().any(|s| s == url));
        let evidence = extracted
            .sources
            .iter()
            .map(|url| (url.as_str(), true))
            .chain(lenient_urls.map(|url| (url, false)));

        for (url, is_strict) in evidence {
            let detail = detail_for(url);
            self.store.upsert_track_source(&TrackSourceRecord {
                source_id: derive_source_id(&candidate.track_id, url),
                track_id: candidate.track_id.clone(),
                url: url.to_string(),
                title: detail.and_then(|d| d.title.clone()),
                snippet: detail.and_then(|d| d.snippet.clone()),
                provider: (!provider_label.is_empty()).then(|| provider_label.clone()),
                is_strict,
                retrieved_at: now.to_string(),
            })?;
        }
        Ok(())
    }
}

fn emit_results(results: &[SearchResult], on_result: &mut Option<ResultCallback<'_>>) {
    if let Some(on_result) = on_result.as_deref_mut() {
        let total = results.len();
        for (index, result) in results.iter().enumerate() {
            on_result(result, index + 1, total);
        }
    }
}
