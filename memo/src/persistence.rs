// Persistence for the task stack and the activity log
// The snapshot is replaced atomically after every mutation; the log is a
// pure append-only history and is never rewritten or compacted

use crate::config::Config;
use crate::stack::TaskStack;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

/// Why a task left the active slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Pushed,
    Popped,
    Switched,
    Reordered,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::Pushed => write!(f, "pushed"),
            StopReason::Popped => write!(f, "popped"),
            StopReason::Switched => write!(f, "switched"),
            StopReason::Reordered => write!(f, "reordered"),
        }
    }
}

/// One record of a task's departure from the active slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub task: String,
    pub started: DateTime<Utc>,
    pub stopped: DateTime<Utc>,
    pub reason: StopReason,
}

/// Load the stack snapshot from disk.
///
/// An absent (or empty) snapshot is the first-run case and yields an empty
/// stack. Any other failure is returned so the daemon can refuse to start
/// instead of silently resetting state.
pub fn load_stack(config: &Config) -> Result<TaskStack> {
    let path = config.state_file();

    if !path.exists() {
        return Ok(TaskStack::default());
    }

    let contents = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read state file: {}", path.display()))?;

    if contents.trim().is_empty() {
        return Ok(TaskStack::default());
    }

    serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse state file: {}", path.display()))
}

/// Save the full stack snapshot, replacing the previous one atomically so
/// a crash mid-write always leaves the prior snapshot intact.
pub fn save_stack(config: &Config, stack: &TaskStack) -> Result<()> {
    config
        .ensure_dirs()
        .context("Failed to create state directory")?;

    let contents =
        serde_json::to_string_pretty(stack).context("Failed to serialize task stack")?;
    atomic_write(&config.state_file(), &contents)
}

/// Append one entry to the activity log, creating the file on first use.
/// Each entry is a single JSON line; an exclusive lock keeps concurrent
/// appends from interleaving mid-record.
pub fn append_log(config: &Config, entry: &LogEntry) -> Result<()> {
    config
        .ensure_dirs()
        .context("Failed to create state directory")?;

    let path = config.log_file();
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open activity log: {}", path.display()))?;

    file.lock_exclusive()
        .context("Failed to lock activity log")?;

    let line = serde_json::to_string(entry).context("Failed to serialize log entry")?;
    writeln!(file, "{}", line)
        .with_context(|| format!("Failed to append to activity log: {}", path.display()))?;

    // Lock is released when the file is dropped
    Ok(())
}

/// Read the whole activity log, oldest entry first. An absent log is empty
/// history, not an error.
pub fn read_log(config: &Config) -> Result<Vec<LogEntry>> {
    let path = config.log_file();

    if !path.exists() {
        return Ok(Vec::new());
    }

    let contents = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read activity log: {}", path.display()))?;

    let mut entries = Vec::new();
    for (number, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let entry: LogEntry = serde_json::from_str(line).with_context(|| {
            format!("Malformed log entry at {}:{}", path.display(), number + 1)
        })?;
        entries.push(entry);
    }
    Ok(entries)
}

/// Atomically replace `path` using write-to-temp + rename. The temp file
/// lives in the same directory so the rename never crosses filesystems.
pub fn atomic_write(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("Invalid path: {}", path.display()))?;

    let temp_path = parent.join(format!(
        ".{}.tmp.{}",
        path.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown"),
        std::process::id()
    ));

    fs::write(&temp_path, contents)
        .with_context(|| format!("Failed to write temp file: {}", temp_path.display()))?;

    fs::rename(&temp_path, path).with_context(|| {
        format!(
            "Failed to rename {} to {}",
            temp_path.display(),
            path.display()
        )
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_config() -> (Config, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::at(temp_dir.path().to_path_buf());
        (config, temp_dir)
    }

    fn entry(task: &str, reason: StopReason) -> LogEntry {
        let now = Utc::now();
        LogEntry {
            task: task.to_string(),
            started: now,
            stopped: now,
            reason,
        }
    }

    #[test]
    fn test_stack_roundtrip() {
        let (config, _temp) = test_config();

        let mut stack = TaskStack::default();
        stack.push("write spec");
        stack.queue("review PR");

        save_stack(&config, &stack).unwrap();
        let loaded = load_stack(&config).unwrap();
        assert_eq!(loaded, stack);
    }

    #[test]
    fn test_load_absent_snapshot_is_empty_stack() {
        let (config, _temp) = test_config();
        let loaded = load_stack(&config).unwrap();
        assert!(loaded.is_empty());
        assert_eq!(loaded.next_id, 0);
    }

    #[test]
    fn test_load_corrupt_snapshot_is_an_error() {
        let (config, _temp) = test_config();
        config.ensure_dirs().unwrap();
        fs::write(config.state_file(), "{not json").unwrap();

        assert!(load_stack(&config).is_err());
    }

    #[test]
    fn test_interrupted_save_leaves_previous_snapshot_intact() {
        let (config, _temp) = test_config();

        let mut stack = TaskStack::default();
        stack.push("committed");
        save_stack(&config, &stack).unwrap();

        // A crash between serializing and renaming leaves only a partial
        // temp file behind; the canonical snapshot must still load.
        let orphan = config.state_dir.join(format!(
            ".{}.tmp.{}",
            "state.json",
            std::process::id()
        ));
        fs::write(&orphan, "{\"next_id\": 2, \"tas").unwrap();

        let loaded = load_stack(&config).unwrap();
        assert_eq!(loaded, stack);
    }

    #[test]
    fn test_save_replaces_previous_snapshot() {
        let (config, _temp) = test_config();

        let mut stack = TaskStack::default();
        stack.push("first");
        save_stack(&config, &stack).unwrap();

        stack.push("second");
        save_stack(&config, &stack).unwrap();

        let loaded = load_stack(&config).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.peek().unwrap().description, "second");
    }

    #[test]
    fn test_append_log_accumulates_entries_in_order() {
        let (config, _temp) = test_config();

        append_log(&config, &entry("write spec", StopReason::Pushed)).unwrap();
        append_log(&config, &entry("review PR", StopReason::Popped)).unwrap();

        let entries = read_log(&config).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].task, "write spec");
        assert_eq!(entries[0].reason, StopReason::Pushed);
        assert_eq!(entries[1].task, "review PR");
        assert_eq!(entries[1].reason, StopReason::Popped);
    }

    #[test]
    fn test_read_absent_log_is_empty() {
        let (config, _temp) = test_config();
        assert!(read_log(&config).unwrap().is_empty());
    }

    #[test]
    fn test_read_log_rejects_malformed_line() {
        let (config, _temp) = test_config();
        append_log(&config, &entry("ok", StopReason::Popped)).unwrap();

        let mut file = OpenOptions::new()
            .append(true)
            .open(config.log_file())
            .unwrap();
        writeln!(file, "not json").unwrap();

        assert!(read_log(&config).is_err());
    }

    #[test]
    fn test_log_entries_serialize_reason_snake_case() {
        let line = serde_json::to_string(&entry("a", StopReason::Reordered)).unwrap();
        assert!(line.contains("\"reason\":\"reordered\""));
    }

    #[test]
    fn test_atomic_write() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("test.json");

        atomic_write(&path, "{\"ok\":true}").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "{\"ok\":true}");
    }
}
