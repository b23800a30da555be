// SPDX-License-Identifier: MIT

//! Write-ahead log for the event-sourced job/pipeline state.
//!
//! Every [`loom_core::Event`] is appended here before it is applied to the
//! in-memory [`crate::state::MaterializedState`]. On startup the daemon
//! replays `entries_after(snapshot.processedSeq)` to catch up past the last
//! snapshot. The log is newline-delimited JSON so a partially-written final
//! record (crash mid-write) is detectable and recoverable without losing
//! everything before it.

use loom_core::Event;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

#[derive(Debug, thiserror::Error)]
pub enum WalError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

type Result<T> = std::result::Result<T, WalError>;

/// Flush to disk after this many buffered appends even if the interval
/// hasn't elapsed.
const FLUSH_THRESHOLD: usize = 100;
/// Flush to disk after this much wall time even under the threshold.
const FLUSH_INTERVAL: Duration = Duration::from_secs(1);
/// Number of rotated `.bak` generations kept on corruption recovery.
const MAX_BACKUPS: usize = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WalRecord {
    seq: u64,
    event: Event,
}

/// One durable log entry, decorated with its monotonic sequence number.
#[derive(Debug, Clone)]
pub struct Entry {
    pub seq: u64,
    pub event: Event,
}

/// Append-only, crash-tolerant event log backed by a single file.
pub struct Wal {
    path: PathBuf,
    writer: BufWriter<File>,
    log: Vec<Entry>,
    unprocessed: VecDeque<Entry>,
    write_seq: u64,
    processed_seq: u64,
    unflushed_count: usize,
    last_flush: Instant,
}

impl Wal {
    /// Open (or create) the log at `path`, recovering from any trailing
    /// corruption, and seed the unprocessed queue with entries past
    /// `processed_seq` (the sequence the last snapshot already captured).
    pub fn open(path: impl AsRef<Path>, processed_seq: u64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let raw = if path.exists() { std::fs::read(&path)? } else { Vec::new() };
        let (valid_entries, corrupted) = parse_valid_prefix(&raw);

        if corrupted {
            rotate_backups(&path)?;
            std::fs::write(path.with_extension("bak"), &raw)?;
            rewrite_clean(&path, &valid_entries)?;
        } else if !path.exists() {
            File::create(&path)?;
        }

        let write_seq = valid_entries.last().map(|e| e.seq).unwrap_or(0);
        let unprocessed: VecDeque<Entry> =
            valid_entries.iter().filter(|e| e.seq > processed_seq).cloned().collect();

        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            path,
            writer: BufWriter::new(file),
            log: valid_entries,
            unprocessed,
            write_seq,
            processed_seq,
            unflushed_count: 0,
            last_flush: Instant::now(),
        })
    }

    pub fn write_seq(&self) -> u64 {
        self.write_seq
    }

    pub fn processed_seq(&self) -> u64 {
        self.processed_seq
    }

    /// Append an event, returning its assigned sequence number. Buffered;
    /// call [`Wal::flush`] (or rely on [`Wal::needs_flush`]) to durably
    /// persist it.
    pub fn append(&mut self, event: &Event) -> Result<u64> {
        let seq = self.write_seq + 1;
        let record = WalRecord { seq, event: event.clone() };
        let line = serde_json::to_string(&record).expect("Event must serialize");
        writeln!(self.writer, "{line}")?;

        self.write_seq = seq;
        let entry = Entry { seq, event: event.clone() };
        self.log.push(entry.clone());
        self.unprocessed.push_back(entry);
        self.unflushed_count += 1;
        Ok(seq)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        self.unflushed_count = 0;
        self.last_flush = Instant::now();
        Ok(())
    }

    pub fn needs_flush(&self) -> bool {
        self.unflushed_count >= FLUSH_THRESHOLD || self.last_flush.elapsed() >= FLUSH_INTERVAL
    }

    /// Pop the next entry not yet marked processed, in sequence order.
    pub fn next_unprocessed(&mut self) -> Result<Option<Entry>> {
        Ok(self.unprocessed.pop_front())
    }

    pub fn mark_processed(&mut self, seq: u64) {
        if seq > self.processed_seq {
            self.processed_seq = seq;
        }
    }

    /// All entries with `seq > after`, in order. Used on startup to replay
    /// past the last snapshot.
    pub fn entries_after(&self, after: u64) -> Result<Vec<Entry>> {
        Ok(self.log.iter().filter(|e| e.seq > after).cloned().collect())
    }

    /// Compact the on-disk log, dropping entries with `seq < keep_from`.
    /// Used after a snapshot makes older entries redundant.
    pub fn truncate_before(&mut self, keep_from: u64) -> Result<()> {
        self.log.retain(|e| e.seq >= keep_from);
        rewrite_clean(&self.path, &self.log)?;
        let file = OpenOptions::new().append(true).open(&self.path)?;
        self.writer = BufWriter::new(file);
        Ok(())
    }
}

/// Parse newline-delimited `WalRecord` JSON from `raw`, stopping at the
/// first line that fails to parse (invalid JSON or non-UTF-8 bytes).
/// Returns the valid prefix and whether any trailing bytes were dropped.
fn parse_valid_prefix(raw: &[u8]) -> (Vec<Entry>, bool) {
    let mut entries = Vec::new();
    let mut consumed = 0usize;

    for line in raw.split(|&b| b == b'\n') {
        if line.is_empty() {
            consumed += 1;
            continue;
        }
        let Ok(text) = std::str::from_utf8(line) else { break };
        let Ok(record) = serde_json::from_str::<WalRecord>(text) else { break };
        entries.push(Entry { seq: record.seq, event: record.event });
        consumed += line.len() + 1;
    }

    let corrupted = consumed < raw.len();
    (entries, corrupted)
}

fn rewrite_clean(path: &Path, entries: &[Entry]) -> Result<()> {
    let mut file = File::create(path)?;
    for entry in entries {
        let record = WalRecord { seq: entry.seq, event: entry.event.clone() };
        let line = serde_json::to_string(&record).expect("Event must serialize");
        writeln!(file, "{line}")?;
    }
    file.sync_data()?;
    Ok(())
}

fn rotate_backups(path: &Path) -> Result<()> {
    let gen_path = |n: usize| if n == 1 { path.with_extension("bak") } else { path.with_extension(format!("bak.{n}")) };

    let oldest = gen_path(MAX_BACKUPS);
    if oldest.exists() {
        std::fs::remove_file(&oldest)?;
    }
    for n in (1..MAX_BACKUPS).rev() {
        let from = gen_path(n);
        if from.exists() {
            std::fs::rename(&from, gen_path(n + 1))?;
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "wal_tests.rs"]
mod tests;
