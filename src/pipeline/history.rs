//! Post-hoc record of every item that left the queue.
//!
//! Entries are kept newest-first in memory (capped) and, when file logging
//! is on, appended to one JSONL file per local calendar day:
//!
//! ```text
//! <log_dir>/tts-history-2024-05-17.jsonl
//! <log_dir>/tts-history-2024-05-18.jsonl
//! ```

use std::collections::VecDeque;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{HistoryConfig, VoiceProfile};
use crate::text::TruncatedBy;

use super::item::{RequestItem, StageSnapshots};

const FILE_PREFIX: &str = "tts-history-";
const FILE_SUFFIX: &str = ".jsonl";

// ---------------------------------------------------------------------------
// HistoryEntry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryStatus {
    Completed,
    Error,
    Blocked,
    Cancelled,
}

/// Generative-stage metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryTiming {
    pub total_ms: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub parallel_tasks: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub display_text: String,
    pub original_text: String,
    #[serde(flatten)]
    pub stages: StageSnapshots,
    pub final_text: Option<String>,

    pub moderation_override: bool,
    pub was_truncated: bool,
    pub truncated_by: Option<TruncatedBy>,
    pub sanitization_applied: Vec<String>,
    pub moderation_used: bool,
    pub tags_added: Vec<String>,
    pub timing: Option<HistoryTiming>,
    pub model: Option<String>,
    pub block_reason: Option<String>,
    pub characters_sent: usize,

    pub voice_alias: String,
    pub voice_id: Option<String>,
    pub model_id: Option<String>,
    pub duration_ms: Option<u64>,

    pub status: HistoryStatus,
    pub error: Option<String>,

    pub username: Option<String>,
    pub redemption_id: Option<String>,
    pub reward_id: Option<String>,
    pub refunded: bool,
    /// Provider-side reference; present entries can be replayed.
    pub history_item_id: Option<String>,
}

impl HistoryEntry {
    /// Final record for `item`.
    pub fn from_item(
        item: &RequestItem,
        voice: Option<&VoiceProfile>,
        status: HistoryStatus,
        duration_ms: Option<u64>,
    ) -> Self {
        let report = item.moderation.report.as_ref();
        let characters_sent = match status {
            HistoryStatus::Completed => item
                .final_text
                .as_deref()
                .map(|t| t.chars().count())
                .unwrap_or(0),
            _ => 0,
        };

        Self {
            id: item.id,
            timestamp: Utc::now(),
            display_text: item.display_text().to_string(),
            original_text: item.text.clone(),
            stages: item.stages.clone(),
            final_text: item.final_text.clone(),
            moderation_override: item.moderation_override,
            was_truncated: item.was_truncated,
            truncated_by: item.truncated_by,
            sanitization_applied: item.sanitization_applied.clone(),
            moderation_used: item.moderation.used,
            tags_added: item.moderation.tags_added.clone(),
            timing: report.map(|r| HistoryTiming {
                total_ms: r.total_ms,
                prompt_tokens: r.usage.prompt_tokens,
                completion_tokens: r.usage.completion_tokens,
                total_tokens: r.usage.total_tokens,
                parallel_tasks: r.parallel_tasks,
            }),
            model: report.map(|r| r.model.clone()).filter(|m| !m.is_empty()),
            block_reason: item.block_reason.clone(),
            characters_sent,
            voice_alias: item.alias.clone(),
            voice_id: voice.map(|v| v.voice_id.clone()),
            model_id: voice.map(|v| v.model_id.clone()),
            duration_ms,
            status,
            error: item.error.clone(),
            username: item.username.clone(),
            redemption_id: item.redemption_id.clone(),
            reward_id: item.reward_id.clone(),
            refunded: item.refunded,
            history_item_id: item
                .audio
                .as_ref()
                .and_then(|a| a.history_item_id.clone()),
        }
    }

    /// Whether a refund can still be issued for this entry.
    pub fn has_redemption(&self) -> bool {
        self.redemption_id.is_some() && self.reward_id.is_some()
    }
}

// ---------------------------------------------------------------------------
// HistoryLog
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct HistoryLog {
    entries: VecDeque<HistoryEntry>,
    limit: usize,
    /// `Some` when file logging is on.
    log_dir: Option<PathBuf>,
}

impl HistoryLog {
    pub fn new(limit: usize, log_dir: Option<PathBuf>) -> Self {
        Self {
            entries: VecDeque::new(),
            limit,
            log_dir,
        }
    }

    /// Build from config and pre-load the newest entries from disk.
    ///
    /// A missing directory is not an error; unreadable lines are skipped.
    pub fn from_config(config: &HistoryConfig) -> Self {
        let log_dir = config.file_logging.then(|| config.resolved_log_dir());
        let mut log = Self::new(config.in_app_limit, log_dir);

        if let Some(dir) = log.log_dir.clone() {
            match load(&dir, log.limit) {
                Ok(entries) => {
                    log::info!("history: loaded {} entries from {}", entries.len(), dir.display());
                    log.entries = entries.into();
                }
                Err(e) => log::warn!("history: could not load {}: {e:#}", dir.display()),
            }
        }
        log
    }

    /// Store `entry` as the newest record.
    pub fn record(&mut self, entry: HistoryEntry) {
        if let Some(dir) = &self.log_dir {
            if let Err(e) = append(dir, &entry) {
                log::warn!("history: failed to append entry {}: {e:#}", entry.id);
            }
        }
        self.entries.push_front(entry);
        self.entries.truncate(self.limit);
    }

    /// Entries, newest first.
    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn find(&self, id: Uuid) -> Option<&HistoryEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn find_mut(&mut self, id: Uuid) -> Option<&mut HistoryEntry> {
        self.entries.iter_mut().find(|e| e.id == id)
    }
}

// ---------------------------------------------------------------------------
// JSONL files
// ---------------------------------------------------------------------------

fn file_for(dir: &Path, date: DateTime<Local>) -> PathBuf {
    dir.join(format!("{FILE_PREFIX}{}{FILE_SUFFIX}", date.format("%Y-%m-%d")))
}

fn append(dir: &Path, entry: &HistoryEntry) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let path = file_for(dir, Local::now());
    let mut line = serde_json::to_string(entry)?;
    line.push('\n');
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .and_then(|mut f| f.write_all(line.as_bytes()))
        .with_context(|| format!("writing {}", path.display()))
}

/// Read up to `limit` entries, newest first, from the daily files in `dir`.
pub fn load(dir: &Path, limit: usize) -> Result<Vec<HistoryEntry>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("reading {}", dir.display()))?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(FILE_PREFIX) && n.ends_with(FILE_SUFFIX))
        })
        .collect();
    // Date-stamped names sort chronologically.
    files.sort();

    let mut entries = Vec::new();
    for path in files.iter().rev() {
        let contents = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                log::warn!("history: skipping {}: {e}", path.display());
                continue;
            }
        };
        for line in contents.lines().rev().filter(|l| !l.trim().is_empty()) {
            match serde_json::from_str::<HistoryEntry>(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => log::debug!("history: corrupt line in {}: {e}", path.display()),
            }
            if entries.len() >= limit {
                return Ok(entries);
            }
        }
    }
    Ok(entries)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::item::EnqueueRequest;
    use crate::tts::SynthesizedAudio;

    fn item(text: &str) -> RequestItem {
        let mut item = RequestItem::new(
            EnqueueRequest {
                text: text.into(),
                username: Some("viewer".into()),
                redemption_id: Some("red-1".into()),
                reward_id: Some("rew-1".into()),
                ..EnqueueRequest::default()
            },
            "narrator",
        );
        item.final_text = Some(text.to_string());
        item
    }

    #[test]
    fn completed_entry_counts_characters_and_keeps_reference() {
        let mut it = item("hello chat");
        it.audio = Some(SynthesizedAudio {
            bytes: vec![1, 2, 3],
            history_item_id: Some("hist-9".into()),
        });
        let voice = VoiceProfile::named("narrator", "voice-123");
        let entry = HistoryEntry::from_item(&it, Some(&voice), HistoryStatus::Completed, Some(900));

        assert_eq!(entry.characters_sent, 10);
        assert_eq!(entry.voice_id.as_deref(), Some("voice-123"));
        assert_eq!(entry.history_item_id.as_deref(), Some("hist-9"));
        assert_eq!(entry.duration_ms, Some(900));
        assert!(entry.has_redemption());
    }

    #[test]
    fn blocked_entry_sends_nothing() {
        let mut it = item("bad words");
        it.block_reason = Some("PROFANITY".into());
        let entry = HistoryEntry::from_item(&it, None, HistoryStatus::Blocked, None);
        assert_eq!(entry.characters_sent, 0);
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["status"], "blocked");
        assert_eq!(json["blockReason"], "PROFANITY");
        assert_eq!(json["originalText"], "bad words");
    }

    #[test]
    fn log_is_newest_first_and_capped() {
        let mut log = HistoryLog::new(2, None);
        for text in ["one", "two", "three"] {
            log.record(HistoryEntry::from_item(&item(text), None, HistoryStatus::Completed, None));
        }
        let texts: Vec<_> = log.entries().map(|e| e.original_text.as_str()).collect();
        assert_eq!(texts, vec!["three", "two"]);
    }

    #[test]
    fn find_mut_updates_in_place() {
        let mut log = HistoryLog::new(10, None);
        let entry = HistoryEntry::from_item(&item("x"), None, HistoryStatus::Blocked, None);
        let id = entry.id;
        log.record(entry);
        log.find_mut(id).unwrap().refunded = true;
        assert!(log.find(id).unwrap().refunded);
    }

    #[test]
    fn jsonl_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = HistoryLog::new(10, Some(dir.path().to_path_buf()));
        log.record(HistoryEntry::from_item(&item("first"), None, HistoryStatus::Completed, None));
        log.record(HistoryEntry::from_item(&item("second"), None, HistoryStatus::Error, None));

        let loaded = load(dir.path(), 10).unwrap();
        let texts: Vec<_> = loaded.iter().map(|e| e.original_text.as_str()).collect();
        assert_eq!(texts, vec!["second", "first"]);
        assert_eq!(loaded[0].status, HistoryStatus::Error);
    }

    #[test]
    fn load_skips_corrupt_lines_and_respects_limit() {
        let dir = tempfile::tempdir().unwrap();
        let good = serde_json::to_string(&HistoryEntry::from_item(
            &item("ok"),
            None,
            HistoryStatus::Completed,
            None,
        ))
        .unwrap();
        let older = dir.path().join("tts-history-2020-01-01.jsonl");
        let newer = dir.path().join("tts-history-2020-01-02.jsonl");
        fs::write(&older, format!("{good}\n{good}\n")).unwrap();
        fs::write(&newer, format!("{{not json\n{good}\n")).unwrap();
        fs::write(dir.path().join("unrelated.txt"), "ignored").unwrap();

        assert_eq!(load(dir.path(), 10).unwrap().len(), 3);
        assert_eq!(load(dir.path(), 2).unwrap().len(), 2);
    }

    #[test]
    fn missing_directory_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let entries = load(&dir.path().join("absent"), 10).unwrap();
        assert!(entries.is_empty());
    }
}
