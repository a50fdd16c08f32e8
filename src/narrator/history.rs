//! Narration session history.
//!
//! Stores one record per finished session in JSONL files at
//! `<dir>/{date}-narration.jsonl`.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::session::{SessionOutcome, SessionSummary};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrationRecord {
    pub timestamp: String,
    pub outcome: SessionOutcome,
    pub paragraphs_played: usize,
    pub total_paragraphs: usize,
    pub text_chars: usize,
    pub voice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

impl NarrationRecord {
    pub fn from_summary(summary: SessionSummary) -> Self {
        Self {
            timestamp: Local::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
            outcome: summary.outcome,
            paragraphs_played: summary.paragraphs_played,
            total_paragraphs: summary.total_paragraphs,
            text_chars: summary.text_chars,
            voice: summary.voice_id,
            error: summary.error,
            elapsed_ms: summary.elapsed_ms,
        }
    }
}

pub struct NarrationHistory {
    dir: PathBuf,
}

impl NarrationHistory {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn file(&self, date: &str) -> PathBuf {
        self.dir.join(format!("{date}-narration.jsonl"))
    }

    pub fn save(&self, record: &NarrationRecord) {
        if let Err(e) = fs::create_dir_all(&self.dir) {
            warn!("Failed to create narration history dir: {e}");
            return;
        }

        let date = record.timestamp.get(..10).unwrap_or("unknown");
        let path = self.file(date);

        let mut file = match fs::OpenOptions::new().create(true).append(true).open(&path) {
            Ok(f) => f,
            Err(e) => {
                warn!("Failed to open narration history file: {e}");
                return;
            }
        };

        match serde_json::to_string(record) {
            Ok(line) => {
                if let Err(e) = writeln!(file, "{line}") {
                    warn!("Failed to write narration history record: {e}");
                }
            }
            Err(e) => warn!("Failed to serialize narration record: {e}"),
        }
    }

    pub fn load(&self, date: &str) -> Vec<NarrationRecord> {
        let contents = match fs::read_to_string(self.file(date)) {
            Ok(c) => c,
            Err(_) => return Vec::new(),
        };

        contents
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    }

    pub fn list_dates(&self) -> Vec<String> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(e) => e,
            Err(_) => return Vec::new(),
        };

        let mut dates: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let name = e.file_name().to_string_lossy().to_string();
                name.strip_suffix("-narration.jsonl").map(str::to_string)
            })
            .collect();
        dates.sort();
        dates
    }
}

/// Summarize one day of narration sessions as markdown.
pub fn generate_report(history: &NarrationHistory, date: &str) -> String {
    let records = history.load(date);
    if records.is_empty() {
        let dates = history.list_dates();
        return if dates.is_empty() {
            format!("No narration records for {date}.")
        } else {
            format!("No narration records for {date}. Available: {}", dates.join(", "))
        };
    }

    let total = records.len();
    let count = |outcome: SessionOutcome| records.iter().filter(|r| r.outcome == outcome).count();
    let paragraphs: usize = records.iter().map(|r| r.paragraphs_played).sum();
    let avg_elapsed: f64 =
        records.iter().map(|r| r.elapsed_ms as f64).sum::<f64>() / total as f64;

    let mut report = format!(
        "# Narration Report for {date}\n\n\
        - Sessions: {total}\n\
        - Completed: {}\n\
        - Stopped: {}\n\
        - Failed: {}\n\
        - Paragraphs played: {paragraphs}\n\
        - Avg session length: {avg_elapsed:.0}ms\n",
        count(SessionOutcome::Done),
        count(SessionOutcome::Stopped),
        count(SessionOutcome::Failed),
    );

    let errors: Vec<&str> = records.iter().filter_map(|r| r.error.as_deref()).collect();
    if !errors.is_empty() {
        report.push_str("\n## Errors\n");
        for error in errors {
            report.push_str(&format!("- {error}\n"));
        }
    }

    report
}
