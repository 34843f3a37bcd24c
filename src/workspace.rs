//! Typed paths and file primitives for an on-disk workspace.
//!
//! Centralizing path construction keeps file access consistent across the
//! CLI commands and the JSON-file store backend.
use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

/// Convenience wrapper for locating workspace artifacts.
#[derive(Debug, Clone)]
pub struct WorkspacePaths {
    root: PathBuf,
}

impl WorkspacePaths {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Return the `config.json` path.
    pub fn config_path(&self) -> PathBuf {
        self.root.join("config.json")
    }

    /// Return the `templates.json` path.
    pub fn templates_path(&self) -> PathBuf {
        self.root.join("templates.json")
    }

    /// Return the `state/` directory path.
    pub fn state_dir(&self) -> PathBuf {
        self.root.join("state")
    }

    /// Return the `state/contacts.json` path.
    pub fn contacts_path(&self) -> PathBuf {
        self.state_dir().join("contacts.json")
    }

    /// Return the `state/enrollments.json` path.
    pub fn enrollments_path(&self) -> PathBuf {
        self.state_dir().join("enrollments.json")
    }

    /// Return the `state/tasks.json` path.
    pub fn tasks_path(&self) -> PathBuf {
        self.state_dir().join("tasks.json")
    }

    /// Return the `state/weights.json` path.
    pub fn weights_path(&self) -> PathBuf {
        self.state_dir().join("weights.json")
    }

    /// Return the `state/governor.json` path.
    pub fn governor_path(&self) -> PathBuf {
        self.state_dir().join("governor.json")
    }

    /// Return the `state/feedback.jsonl` path.
    pub fn feedback_log_path(&self) -> PathBuf {
        self.state_dir().join("feedback.jsonl")
    }

    /// Return the `state/outbox.jsonl` path.
    pub fn outbox_path(&self) -> PathBuf {
        self.state_dir().join("outbox.jsonl")
    }

    /// Return the `state/state.lock` path.
    pub fn state_lock_path(&self) -> PathBuf {
        self.state_dir().join("state.lock")
    }
}

pub fn ensure_workspace_root(path: &Path, create: bool) -> Result<PathBuf> {
    if create {
        fs::create_dir_all(path).context("create workspace root")?;
    }
    path.canonicalize()
        .with_context(|| format!("resolve workspace root {}", path.display()))
}

/// Read a JSON document, returning `None` when the file does not exist.
pub fn read_json_optional<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err).with_context(|| format!("read {}", path.display())),
    };
    let value = serde_json::from_slice(&bytes)
        .with_context(|| format!("parse {}", path.display()))?;
    Ok(Some(value))
}

/// Write pretty JSON via a sibling temp file and rename.
///
/// Readers never observe a half-written document.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("state");
    let tmp_path = parent.join(format!(".{file_name}.tmp"));
    let text = serde_json::to_string_pretty(value).context("serialize JSON")?;
    fs::write(&tmp_path, text.as_bytes())
        .with_context(|| format!("write {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("publish {}", path.display()))?;
    Ok(())
}

/// Append one record as a JSONL line.
pub fn append_jsonl<T: Serialize>(path: &Path, entry: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open {}", path.display()))?;
    let mut line = serde_json::to_string(entry).context("serialize JSONL entry")?;
    line.push('\n');
    file.write_all(line.as_bytes())
        .with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

/// Read every JSONL record; a missing file is an empty log.
pub fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err).with_context(|| format!("read {}", path.display())),
    };
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("parse {} line {}", path.display(), index + 1))
        })
        .collect()
}

/// Exclusive marker held by every command that mutates workspace state.
///
/// Contenders poll until `wait` elapses. Released on drop; a stale lock left
/// by a crashed process must be removed by hand (the error names the file).
#[derive(Debug)]
pub struct StateLock {
    path: PathBuf,
}

const LOCK_POLL: Duration = Duration::from_millis(20);

impl StateLock {
    pub fn acquire(path: PathBuf, now: u64, wait: Duration) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        let deadline = Instant::now() + wait;
        let mut file = loop {
            match fs::OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => break file,
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                    if Instant::now() >= deadline {
                        return Err(anyhow!(
                            "another command holds {} (remove it if no outreach command is running)",
                            path.display()
                        ));
                    }
                    thread::sleep(LOCK_POLL);
                }
                Err(err) => return Err(err).with_context(|| format!("create {}", path.display())),
            }
        };
        writeln!(file, "pid={} started_at={now}", std::process::id())
            .with_context(|| format!("write {}", path.display()))?;
        Ok(Self { path })
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %err, "failed to release state lock");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_json_round_trips_and_missing_reads_none() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("state/value.json");
        let missing: Option<Vec<u32>> = read_json_optional(&path).expect("read missing");
        assert!(missing.is_none());

        write_json_atomic(&path, &vec![1u32, 2, 3]).expect("write");
        let loaded: Option<Vec<u32>> = read_json_optional(&path).expect("read");
        assert_eq!(loaded, Some(vec![1, 2, 3]));
        assert!(!dir.path().join("state/.value.json.tmp").exists());
    }

    #[test]
    fn jsonl_appends_in_order() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("log.jsonl");
        append_jsonl(&path, &"first").expect("append");
        append_jsonl(&path, &"second").expect("append");
        let entries: Vec<String> = read_jsonl(&path).expect("read");
        assert_eq!(entries, vec!["first".to_string(), "second".to_string()]);
    }

    #[test]
    fn state_lock_is_exclusive_until_dropped() {
        let dir = tempfile::tempdir().expect("temp dir");
        let paths = WorkspacePaths::new(dir.path().to_path_buf());
        let held = StateLock::acquire(paths.state_lock_path(), 1, Duration::ZERO).expect("first lock");
        let err = StateLock::acquire(paths.state_lock_path(), 2, Duration::ZERO).expect_err("held");
        assert!(err.to_string().contains("state.lock"));
        drop(held);
        assert!(StateLock::acquire(paths.state_lock_path(), 3, Duration::ZERO).is_ok());
    }

    #[test]
    fn state_lock_waiter_gets_in_after_release() {
        let dir = tempfile::tempdir().expect("temp dir");
        let paths = WorkspacePaths::new(dir.path().to_path_buf());
        let held = StateLock::acquire(paths.state_lock_path(), 1, Duration::ZERO).expect("first lock");
        let waiter = {
            let path = paths.state_lock_path();
            thread::spawn(move || StateLock::acquire(path, 2, Duration::from_secs(5)).map(drop))
        };
        thread::sleep(Duration::from_millis(100));
        drop(held);
        waiter.join().expect("thread").expect("waiter acquires");
        assert!(!paths.state_lock_path().exists());
    }
}
