//! External search providers: language-model CLIs with web search, run as
//! subprocesses and merged into one candidate list.

mod command;
mod output;
mod payload;
mod runner;
mod synthesize;

pub use command::{CommandProviderRunner, CommandRunnerSettings, RetryStrategy};
pub use output::{extract_output, parse_json_output};
pub use payload::{build_search_payload, build_source_policy, detect_search_commands};
pub use runner::{ProviderError, ProviderRun, ProviderRunner};
pub use synthesize::{synthesize_results, synthesize_summary};
