use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use sha2::{Digest, Sha256};
use tunr_search::providers::{ProviderError, ProviderRun, ProviderRunner};
use tunr_search::search::query_analysis::extract_constraints;
use tunr_search::search::RawCandidate;
use tunr_search::{Embedder, EmbeddingError};

const FAKE_DIMENSION: usize = 32;

/// Bag-of-words hashing embedder: texts sharing words get similar vectors.
pub struct FakeEmbedder {
    failing: AtomicBool,
    calls: AtomicUsize,
}

#[allow(dead_code)]
impl FakeEmbedder {
    pub fn new() -> Self {
        Self {
            failing: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        let embedder = Self::new();
        embedder.set_failing(true);
        embedder
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn vector_for(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; FAKE_DIMENSION];
        for word in text.split_whitespace() {
            let word = word
                .trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase();
            if word.is_empty() {
                continue;
            }
            let digest = Sha256::digest(word.as_bytes());
            vector[digest[0] as usize % FAKE_DIMENSION] += 1.0;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }
}

impl Embedder for FakeEmbedder {
    fn model_name(&self) -> &str {
        "fake-bow-32"
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(EmbeddingError::Inference("fake model offline".to_string()));
        }
        Ok(texts.iter().map(|t| Self::vector_for(t)).collect())
    }
}

enum Script {
    Results(Vec<RawCandidate>),
    NoResults,
}

/// Provider runner that replays canned responses and records every call.
///
/// Responses are consumed in order; the last one repeats once the queue
/// runs dry.
pub struct ScriptedRunner {
    script: Mutex<VecDeque<Script>>,
    calls: Mutex<Vec<(String, bool)>>,
}

#[allow(dead_code)]
impl ScriptedRunner {
    pub fn returning(results: Vec<RawCandidate>) -> Self {
        Self::from_script(vec![Script::Results(results)])
    }

    pub fn failing() -> Self {
        Self::from_script(vec![Script::NoResults])
    }

    /// First call returns `first`, every later call returns `then`.
    pub fn sequence(first: Vec<RawCandidate>, then: Vec<RawCandidate>) -> Self {
        Self::from_script(vec![Script::Results(first), Script::Results(then)])
    }

    fn from_script(script: Vec<Script>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<(String, bool)> {
        self.calls.lock().unwrap().clone()
    }
}

impl ProviderRunner for ScriptedRunner {
    fn run_providers(&self, query: &str, expanded: bool) -> Result<ProviderRun, ProviderError> {
        self.calls
            .lock()
            .unwrap()
            .push((query.to_string(), expanded));

        let mut script = self.script.lock().unwrap();
        let step = if script.len() > 1 {
            script.pop_front()
        } else {
            None
        };
        let results = match step.as_ref().or(script.front()) {
            Some(Script::Results(results)) => results.clone(),
            Some(Script::NoResults) | None => return Err(ProviderError::NoResults),
        };

        Ok(ProviderRun {
            results,
            providers: vec!["scripted".to_string()],
            summary: format!("Recommendations align with: {}", query),
            constraints: extract_constraints(query),
            requested_metrics: Vec::new(),
            policy: tunr_search::providers::build_source_policy(expanded),
        })
    }
}
