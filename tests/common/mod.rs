//! Common test infrastructure
//!
//! Deterministic stand-ins for the embedding model and the provider runner,
//! plus a throwaway on-disk cache store. Tests should only import from this
//! module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{candidate, FakeEmbedder, ScriptedRunner, TestStore};
//!
//! let store = TestStore::new();
//! let embedder = FakeEmbedder::new();
//! let runner = ScriptedRunner::returning(vec![candidate("Roads", "Portishead")]);
//! ```

mod fakes;
mod fixtures;

// Public API - this is what tests import
#[allow(unused_imports)]
pub use fakes::{FakeEmbedder, ScriptedRunner};
#[allow(unused_imports)]
pub use fixtures::{candidate, candidate_from_json, evidenced_candidate, TestStore};
