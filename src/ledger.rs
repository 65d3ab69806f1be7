//! Durable request ledger.
//!
//! Persists a mapping from idempotency key to the last successful result
//! payload. The table is loaded fresh from disk on every operation and
//! fully rewritten on every update; entries are never deleted. Callers
//! treat an entry as proof that the exact round/nonce was already served.

use crate::request::ResultPayload;
use fs2::FileExt;
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

const LEDGER_LOCK_TIMEOUT_SECS: u64 = 5;
const LEDGER_LOCK_RETRY_MS: u64 = 50;

/// The whole persisted table. Small enough to rewrite wholesale.
pub type LedgerTable = BTreeMap<String, ResultPayload>;

/// Storage seam for the ledger so tests can swap in a memory table.
pub trait LedgerStore: Send + Sync {
    /// Look up the stored payload for a key, reading fresh from storage.
    fn get(&self, key: &str) -> anyhow::Result<Option<ResultPayload>>;

    /// Record a completed request. Load-modify-save of the whole table;
    /// implementations must serialize concurrent callers.
    fn record(&self, key: &str, payload: &ResultPayload) -> anyhow::Result<()>;
}

/// File-backed ledger: one JSON object in a single file.
///
/// Concurrent pipelines for different keys all write this file, so every
/// load-modify-save runs under an in-process mutex plus an exclusive
/// advisory lock on a sibling `.lock` file.
pub struct FileLedger {
    path: PathBuf,
    guard: Mutex<()>,
}

struct LedgerLock {
    file: std::fs::File,
}

impl Drop for LedgerLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

impl FileLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> anyhow::Result<LedgerLock> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let lock_path = self.path.with_extension("lock");
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        let start = Instant::now();
        loop {
            match FileExt::try_lock_exclusive(&file) {
                Ok(()) => break,
                Err(err) => {
                    if err.kind() != ErrorKind::WouldBlock {
                        return Err(err.into());
                    }
                    if start.elapsed() >= Duration::from_secs(LEDGER_LOCK_TIMEOUT_SECS) {
                        return Err(anyhow::anyhow!(
                            "Timed out waiting for ledger lock ({}s)",
                            LEDGER_LOCK_TIMEOUT_SECS
                        ));
                    }
                    std::thread::sleep(Duration::from_millis(LEDGER_LOCK_RETRY_MS));
                }
            }
        }

        Ok(LedgerLock { file })
    }

    /// Read the whole table. A missing or corrupt file loads as empty;
    /// the record that mattered will simply be rebuilt on resubmission.
    fn load(&self) -> anyhow::Result<LedgerTable> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(serde_json::from_str(&content).unwrap_or_default()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(LedgerTable::new()),
            Err(err) => Err(err.into()),
        }
    }

    fn save(&self, table: &LedgerTable) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(table)?;
        write_atomic(&self.path, &content)
    }
}

impl LedgerStore for FileLedger {
    fn get(&self, key: &str) -> anyhow::Result<Option<ResultPayload>> {
        let _guard = self.guard.lock().expect("ledger mutex poisoned");
        let _lock = self.lock()?;
        Ok(self.load()?.get(key).cloned())
    }

    fn record(&self, key: &str, payload: &ResultPayload) -> anyhow::Result<()> {
        let _guard = self.guard.lock().expect("ledger mutex poisoned");
        let _lock = self.lock()?;
        let mut table = self.load()?;
        table.insert(key.to_string(), payload.clone());
        self.save(&table)
    }
}

/// In-memory ledger used by tests and available for dry runs.
#[derive(Default)]
pub struct MemoryLedger {
    table: Mutex<LedgerTable>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LedgerStore for MemoryLedger {
    fn get(&self, key: &str) -> anyhow::Result<Option<ResultPayload>> {
        Ok(self.table.lock().expect("ledger mutex poisoned").get(key).cloned())
    }

    fn record(&self, key: &str, payload: &ResultPayload) -> anyhow::Result<()> {
        self.table
            .lock()
            .expect("ledger mutex poisoned")
            .insert(key.to_string(), payload.clone());
        Ok(())
    }
}

/// Write content atomically by writing to a temp file first, then renaming.
fn write_atomic(path: &Path, content: &str) -> anyhow::Result<()> {
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, content)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = fs::Permissions::from_mode(0o600);
        let _ = fs::set_permissions(&tmp_path, perms);
    }

    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err.into());
    }
    Ok(())
}
