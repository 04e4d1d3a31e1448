//! Collection progress reporting.
//!
//! Reports what `sourcing collect` is doing so users can see which query is
//! running, how many candidates were accepted, and why a run stopped early.
//! Progress is emitted on **stderr** so stdout remains parseable for scripts.

use std::io::Write;

/// A single progress event emitted by the collector.
#[derive(Clone, Debug, PartialEq)]
pub enum CollectProgressEvent {
    /// A query is about to be sent. `n` is 1-based across the whole run.
    QueryStarted {
        category: String,
        query: String,
        n: u64,
        total: u64,
    },
    /// A query's batch was folded into the dataset.
    QueryFinished {
        category: String,
        query: String,
        examined: u64,
        accepted: u64,
        skipped_known: u64,
        dropped: u64,
    },
    /// The search API answered the query with partial results; lower-ranked
    /// repositories may be missing.
    IncompleteResults { category: String, query: String },
    /// A candidate was discarded because it could not be normalized.
    RowDropped {
        query: String,
        repository_id: Option<i64>,
        reason: String,
    },
    /// The search collaborator failed; the run stops here.
    Interrupted {
        category: String,
        query: String,
        reason: String,
    },
}

/// Reports collection progress. Implementations write to stderr (human or JSON).
pub trait CollectProgressReporter: Send + Sync {
    /// Emit a progress event. Called from the collection loop.
    fn report(&self, event: CollectProgressEvent);
}

/// Human-friendly progress on stderr: "collect privacy  [3 / 40]  data privacy".
pub struct StderrProgress;

impl CollectProgressReporter for StderrProgress {
    fn report(&self, event: CollectProgressEvent) {
        let line = match &event {
            CollectProgressEvent::QueryStarted {
                category,
                query,
                n,
                total,
            } => format!(
                "collect {}  [{} / {}]  {}\n",
                category,
                format_number(*n),
                format_number(*total),
                query
            ),
            CollectProgressEvent::QueryFinished {
                examined,
                accepted,
                skipped_known,
                dropped,
                ..
            } => format!(
                "  examined {}  new {}  known {}  dropped {}\n",
                format_number(*examined),
                format_number(*accepted),
                format_number(*skipped_known),
                format_number(*dropped)
            ),
            CollectProgressEvent::IncompleteResults { query, .. } => format!(
                "  Warning: search for '{}' returned incomplete results\n",
                query
            ),
            CollectProgressEvent::RowDropped {
                repository_id,
                reason,
                ..
            } => match repository_id {
                Some(id) => format!("  Warning: dropped repository {}: {}\n", id, reason),
                None => format!("  Warning: dropped candidate: {}\n", reason),
            },
            CollectProgressEvent::Interrupted {
                category,
                query,
                reason,
            } => format!(
                "collect {}  stopped at '{}': {}\n",
                category, query, reason
            ),
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl JsonProgress {
    fn to_json(event: &CollectProgressEvent) -> serde_json::Value {
        match event {
            CollectProgressEvent::QueryStarted {
                category,
                query,
                n,
                total,
            } => serde_json::json!({
                "event": "query_started",
                "category": category,
                "query": query,
                "n": n,
                "total": total
            }),
            CollectProgressEvent::QueryFinished {
                category,
                query,
                examined,
                accepted,
                skipped_known,
                dropped,
            } => serde_json::json!({
                "event": "query_finished",
                "category": category,
                "query": query,
                "examined": examined,
                "accepted": accepted,
                "skipped_known": skipped_known,
                "dropped": dropped
            }),
            CollectProgressEvent::IncompleteResults { category, query } => serde_json::json!({
                "event": "incomplete_results",
                "category": category,
                "query": query
            }),
            CollectProgressEvent::RowDropped {
                query,
                repository_id,
                reason,
            } => serde_json::json!({
                "event": "row_dropped",
                "query": query,
                "repository_id": repository_id,
                "reason": reason
            }),
            CollectProgressEvent::Interrupted {
                category,
                query,
                reason,
            } => serde_json::json!({
                "event": "interrupted",
                "category": category,
                "query": query,
                "reason": reason
            }),
        }
    }
}

impl CollectProgressReporter for JsonProgress {
    fn report(&self, event: CollectProgressEvent) {
        if let Ok(line) = serde_json::to_string(&Self::to_json(&event)) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl CollectProgressReporter for NoProgress {
    fn report(&self, _event: CollectProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    /// Parse the `--progress` flag: `auto`, `off`, `human`, or `json`.
    pub fn parse(value: &str) -> anyhow::Result<Self> {
        match value {
            "auto" => Ok(Self::default_for_tty()),
            "off" => Ok(ProgressMode::Off),
            "human" => Ok(ProgressMode::Human),
            "json" => Ok(ProgressMode::Json),
            other => anyhow::bail!(
                "Unknown progress mode: '{}'. Use auto, off, human, or json.",
                other
            ),
        }
    }

    /// Build a reporter for this mode. Caller passes it to the collector.
    pub fn reporter(&self) -> Box<dyn CollectProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
