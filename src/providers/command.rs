//! Runs provider CLIs as subprocesses and merges what they print.

use std::process::Stdio;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use lazy_static::lazy_static;
use regex::Regex;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

use super::output::{extract_output, parse_json_output, strip_flag};
use super::payload::{build_search_payload, build_source_policy};
use super::runner::{ProviderError, ProviderRun, ProviderRunner};
use super::synthesize::{synthesize_results, synthesize_summary};
use crate::search::query_analysis::{extract_constraints, metrics_for, resolve_limit};
use crate::search::RawCandidate;

/// Total tries per invocation, the first call included.
const MAX_ATTEMPTS: usize = 3;

lazy_static! {
    static ref UNEXPECTED_ARGUMENT_RE: Regex =
        Regex::new(r"(?i)unexpected argument '([^']+)'").unwrap();
}

/// A rewrite of the argument list to try after a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryStrategy {
    /// The CLI does not know `--json`.
    DropJsonFlag,
    /// The CLI rejected a flag by name; `--output-schema` loses its value too.
    DropUnexpectedArgument,
}

impl RetryStrategy {
    pub const ORDERED: [RetryStrategy; 2] = [
        RetryStrategy::DropJsonFlag,
        RetryStrategy::DropUnexpectedArgument,
    ];

    /// New argument list, or `None` when the strategy does not apply.
    pub fn apply(&self, args: &[String], stderr: &str) -> Option<Vec<String>> {
        match self {
            RetryStrategy::DropJsonFlag => {
                let lowered = stderr.to_lowercase();
                let applies = args.iter().any(|a| a == "--json")
                    && lowered.contains("unknown option")
                    && lowered.contains("--json");
                applies.then(|| strip_flag(args, "--json", false))
            }
            RetryStrategy::DropUnexpectedArgument => {
                let flag = UNEXPECTED_ARGUMENT_RE
                    .captures(stderr)?
                    .get(1)?
                    .as_str()
                    .to_string();
                if !args.iter().any(|a| *a == flag) {
                    return None;
                }
                Some(strip_flag(args, &flag, flag == "--output-schema"))
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct CommandRunnerSettings {
    pub timeout: Duration,
    pub invocations_per_provider: usize,
    pub max_concurrency: usize,
    /// Overrides the limit parsed from the query.
    pub limit: Option<usize>,
}

impl Default for CommandRunnerSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            invocations_per_provider: 1,
            max_concurrency: 2,
            limit: None,
        }
    }
}

#[derive(Debug, Default)]
struct InvocationOutput {
    results: Vec<RawCandidate>,
    summary: String,
}

enum Attempt {
    Done(InvocationOutput),
    Failed { stderr: String },
}

/// Subprocess-backed [`ProviderRunner`].
///
/// Owns a small tokio runtime so callers stay synchronous.
pub struct CommandProviderRunner {
    commands: Vec<(String, String)>,
    settings: CommandRunnerSettings,
    runtime: Runtime,
}

impl CommandProviderRunner {
    pub fn new(
        commands: Vec<(String, String)>,
        settings: CommandRunnerSettings,
    ) -> Result<Self, ProviderError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| ProviderError::Runtime(e.to_string()))?;
        Ok(Self {
            commands,
            settings,
            runtime,
        })
    }

    pub fn commands(&self) -> &[(String, String)] {
        &self.commands
    }

    async fn attempt(&self, label: &str, args: &[String], input: &str) -> Attempt {
        let Some((program, rest)) = args.split_first() else {
            return Attempt::Done(InvocationOutput::default());
        };
        let child = Command::new(program)
            .args(rest)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();
        let mut child = match child {
            Ok(child) => child,
            Err(e) => {
                warn!("Search command failed for {}: {}", label, e);
                return Attempt::Done(InvocationOutput::default());
            }
        };

        let stdin = child.stdin.take();
        let write = async move {
            if let Some(mut stdin) = stdin {
                if let Err(e) = stdin.write_all(input.as_bytes()).await {
                    debug!("Could not write payload to {}: {}", label, e);
                }
            }
        };
        let run = async { tokio::join!(write, child.wait_with_output()).1 };

        let output = match tokio::time::timeout(self.settings.timeout, run).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                warn!("Search command failed for {}: {}", label, e);
                return Attempt::Done(InvocationOutput::default());
            }
            Err(_) => {
                warn!(
                    "Search command for {} timed out after {}s",
                    label,
                    self.settings.timeout.as_secs()
                );
                return Attempt::Done(InvocationOutput::default());
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!(
                "Search command for {} exited with {}",
                label,
                output.status.code().unwrap_or(-1)
            );
            if !stderr.is_empty() {
                warn!("{} stderr: {}", label, stderr);
            }
            return Attempt::Failed { stderr };
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        match parse_json_output(&stdout) {
            Some(value) => {
                let (results, summary) = extract_output(value);
                Attempt::Done(InvocationOutput { results, summary })
            }
            None => {
                warn!("Search command for {} returned invalid JSON.", label);
                Attempt::Done(InvocationOutput::default())
            }
        }
    }

    /// One provider invocation, retried through [`RetryStrategy::ORDERED`].
    async fn invoke(&self, label: &str, command: &str, input: &str) -> InvocationOutput {
        let Some(mut args) = shlex::split(command) else {
            warn!("Invalid search command for {}: {}", label, command);
            return InvocationOutput::default();
        };

        for attempt in 1..=MAX_ATTEMPTS {
            let stderr = match self.attempt(label, &args, input).await {
                Attempt::Done(output) => return output,
                Attempt::Failed { stderr } => stderr,
            };
            if attempt == MAX_ATTEMPTS {
                break;
            }
            let retry = RetryStrategy::ORDERED
                .iter()
                .find_map(|strategy| strategy.apply(&args, &stderr).map(|a| (*strategy, a)));
            match retry {
                Some((strategy, rewritten)) => {
                    info!("Retrying {} with {:?}", label, strategy);
                    args = rewritten;
                }
                None => break,
            }
        }
        InvocationOutput::default()
    }

    async fn run_all(&self, input: &str) -> Vec<(String, InvocationOutput)> {
        let jobs: Vec<(&str, &str)> = self
            .commands
            .iter()
            .flat_map(|(label, command)| {
                std::iter::repeat((label.as_str(), command.as_str()))
                    .take(self.settings.invocations_per_provider.max(1))
            })
            .collect();

        stream::iter(jobs)
            .map(|(label, command)| async move {
                info!("Searching with {}...", label);
                let started = Instant::now();
                let output = self.invoke(label, command, input).await;
                info!(
                    "{} returned {} results in {:.1}s.",
                    label,
                    output.results.len(),
                    started.elapsed().as_secs_f64()
                );
                (label.to_string(), output)
            })
            .buffered(self.settings.max_concurrency.max(1))
            .collect()
            .await
    }
}

impl ProviderRunner for CommandProviderRunner {
    fn run_providers(&self, query: &str, expanded: bool) -> Result<ProviderRun, ProviderError> {
        if self.commands.is_empty() {
            return Err(ProviderError::NoProvidersConfigured);
        }

        let limit = resolve_limit(query, self.settings.limit, expanded);
        let constraints = extract_constraints(query);
        let requested_metrics = metrics_for(query, &constraints);
        let payload = build_search_payload(query, limit, &requested_metrics, &constraints, expanded);
        let input = payload.to_string();

        info!(
            "Deep search started (expanded={}, limit={}).",
            if expanded { "yes" } else { "no" },
            limit
        );
        let labels: Vec<&str> = self.commands.iter().map(|(l, _)| l.as_str()).collect();
        info!("Using providers: {}", labels.join(", "));

        let started = Instant::now();
        let outputs = self.runtime.block_on(self.run_all(&input));

        let mut provider_results: Vec<(String, Vec<RawCandidate>)> = Vec::new();
        let mut provider_summaries: Vec<(String, String)> = Vec::new();
        for (label, output) in outputs {
            if !output.results.is_empty() {
                match provider_results.iter_mut().find(|(l, _)| *l == label) {
                    Some((_, results)) => results.extend(output.results),
                    None => provider_results.push((label.clone(), output.results)),
                }
            }
            if !output.summary.is_empty() && !provider_summaries.iter().any(|(l, _)| *l == label)
            {
                provider_summaries.push((label, output.summary));
            }
        }

        if provider_results.is_empty() {
            return Err(ProviderError::NoResults);
        }

        let results = synthesize_results(&provider_results, limit);
        info!(
            "Deep search complete ({} results, {:.1}s).",
            results.len(),
            started.elapsed().as_secs_f64()
        );
        Ok(ProviderRun {
            results,
            providers: provider_results.into_iter().map(|(l, _)| l).collect(),
            summary: synthesize_summary(&provider_summaries, query),
            constraints,
            requested_metrics,
            policy: build_source_policy(expanded),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn runner(commands: &[(&str, &str)], settings: CommandRunnerSettings) -> CommandProviderRunner {
        CommandProviderRunner::new(
            commands
                .iter()
                .map(|(l, c)| (l.to_string(), c.to_string()))
                .collect(),
            settings,
        )
        .unwrap()
    }

    #[test]
    fn drop_json_flag_needs_matching_stderr() {
        let original = args(&["claude", "-p", "--json"]);
        assert_eq!(
            RetryStrategy::DropJsonFlag.apply(&original, "error: Unknown option '--json'"),
            Some(args(&["claude", "-p"]))
        );
        assert_eq!(RetryStrategy::DropJsonFlag.apply(&original, "rate limited"), None);
        assert_eq!(
            RetryStrategy::DropJsonFlag.apply(&args(&["claude"]), "unknown option --json"),
            None
        );
    }

    #[test]
    fn drop_unexpected_argument_strips_schema_value() {
        let original = args(&["codex", "exec", "--output-schema", "{}", "--search", "-"]);
        assert_eq!(
            RetryStrategy::DropUnexpectedArgument
                .apply(&original, "error: unexpected argument '--output-schema' found"),
            Some(args(&["codex", "exec", "--search", "-"]))
        );
        assert_eq!(
            RetryStrategy::DropUnexpectedArgument
                .apply(&original, "error: unexpected argument '--search' found"),
            Some(args(&["codex", "exec", "--output-schema", "{}", "-"]))
        );
        assert_eq!(
            RetryStrategy::DropUnexpectedArgument
                .apply(&original, "error: unexpected argument '--nope' found"),
            None
        );
    }

    #[test]
    fn no_commands_is_a_configuration_error() {
        let runner = runner(&[], CommandRunnerSettings::default());
        assert!(matches!(
            runner.run_providers("jazz", false),
            Err(ProviderError::NoProvidersConfigured)
        ));
    }

    #[cfg(unix)]
    #[test]
    fn merges_output_of_two_providers() {
        let runner = runner(
            &[
                (
                    "one",
                    r#"sh -c 'cat > /dev/null; echo "{\"summary\": \"s1\", \"results\": [{\"song\": \"A\", \"artist\": \"X\", \"sources\": [\"https://a\"]}]}"'"#,
                ),
                (
                    "two",
                    r#"sh -c 'cat > /dev/null; echo "[\"A by X\", \"B by Y\"]"'"#,
                ),
            ],
            CommandRunnerSettings::default(),
        );
        let run = runner.run_providers("some jazz", false).unwrap();
        assert_eq!(run.providers, vec!["one", "two"]);
        assert_eq!(run.results.len(), 2);
        assert_eq!(run.results[0].song, "A");
        assert_eq!(run.results[0].mentions, 2);
        assert_eq!(run.summary, "s1");
        assert_eq!(run.policy["expanded"], false);
    }

    #[cfg(unix)]
    #[test]
    fn payload_reaches_stdin() {
        // Echoes the query back as a song title.
        let runner = runner(
            &[(
                "echo",
                r#"sh -c 'q=$(sed -n "s/.*\"query\":\"\([^\"]*\)\".*/\1/p"); echo "[\"$q by Echo\"]"'"#,
            )],
            CommandRunnerSettings::default(),
        );
        let run = runner.run_providers("night drive", false).unwrap();
        assert_eq!(run.results[0].song, "night drive");
    }

    #[cfg(unix)]
    #[test]
    fn retries_without_json_flag() {
        let script = r#"sh -c 'for a in "$@"; do if [ "$a" = "--json" ]; then echo "error: unknown option --json" >&2; exit 2; fi; done; cat > /dev/null; echo "[\"A by X\"]"' sh --json"#;
        let runner = runner(&[("cli", script)], CommandRunnerSettings::default());
        let run = runner.run_providers("jazz", false).unwrap();
        assert_eq!(run.results.len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn timeouts_and_failures_yield_no_results() {
        let runner = runner(
            &[
                ("slow", "sh -c 'sleep 5'"),
                ("broken", "sh -c 'exit 1'"),
                ("garbage", "sh -c 'echo not json'"),
            ],
            CommandRunnerSettings {
                timeout: Duration::from_millis(300),
                max_concurrency: 3,
                ..CommandRunnerSettings::default()
            },
        );
        assert!(matches!(
            runner.run_providers("jazz", false),
            Err(ProviderError::NoResults)
        ));
    }

    #[cfg(unix)]
    #[test]
    fn one_slow_invocation_does_not_sink_the_run() {
        let runner = runner(
            &[
                ("slow", "sh -c 'sleep 5'"),
                ("fast", r#"sh -c 'cat > /dev/null; echo "[\"A by X\"]"'"#),
            ],
            CommandRunnerSettings {
                timeout: Duration::from_millis(500),
                ..CommandRunnerSettings::default()
            },
        );
        let run = runner.run_providers("jazz", false).unwrap();
        assert_eq!(run.providers, vec!["fast"]);
    }

    #[cfg(unix)]
    #[test]
    fn repeated_invocations_count_as_one_provider() {
        let runner = runner(
            &[("one", r#"sh -c 'cat > /dev/null; echo "[\"A by X\"]"'"#)],
            CommandRunnerSettings {
                invocations_per_provider: 3,
                ..CommandRunnerSettings::default()
            },
        );
        let run = runner.run_providers("jazz", false).unwrap();
        assert_eq!(run.providers, vec!["one"]);
        assert_eq!(run.results.len(), 1);
        assert_eq!(run.results[0].mentions, 1);
    }
}
