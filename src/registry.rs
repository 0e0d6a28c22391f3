//! Bookkeeping of running server instances.
//!
//! A JSON file of `{pid, interface, port, cwd, started_at}` records shared by
//! every sharebox process on the machine, pruned by PID liveness. Registry
//! I/O is best-effort glue; failures are logged by callers and never take the
//! server down.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::PathBuf;

pub const REGISTRY_ENV: &str = "SHAREBOX_REGISTRY";
const REGISTRY_FILE: &str = "sharebox-registry.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub pid: u32,
    pub interface: String,
    pub port: u16,
    pub cwd: PathBuf,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Registry {
    path: PathBuf,
}

impl Registry {
    /// The machine-wide registry: `$SHAREBOX_REGISTRY` if set, otherwise a
    /// file in the OS temp directory.
    pub fn open_default() -> Self {
        let path = std::env::var_os(REGISTRY_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| std::env::temp_dir().join(REGISTRY_FILE));
        Self { path }
    }

    pub fn open(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn load(&self) -> io::Result<Vec<RegistryEntry>> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err),
        };
        serde_json::from_slice(&bytes).map_err(io::Error::other)
    }

    pub fn save(&self, entries: &[RegistryEntry]) -> io::Result<()> {
        let bytes = serde_json::to_vec_pretty(entries).map_err(io::Error::other)?;
        std::fs::write(&self.path, bytes)
    }

    /// Records one instance, replacing any stale record under the same PID.
    pub fn register(&self, entry: RegistryEntry) -> io::Result<()> {
        let mut entries = self.load()?;
        entries.retain(|existing| existing.pid != entry.pid);
        entries.push(entry);
        self.save(&entries)
    }

    pub fn deregister(&self, pid: u32) -> io::Result<()> {
        let mut entries = self.load()?;
        entries.retain(|entry| entry.pid != pid);
        self.save(&entries)
    }

    /// Loads the registry, drops records whose process is gone, and persists
    /// the pruned list.
    pub fn live_entries(&self) -> io::Result<Vec<RegistryEntry>> {
        let mut entries = self.load()?;
        let before = entries.len();
        entries.retain(|entry| is_process_alive(entry.pid));
        if entries.len() != before {
            self.save(&entries)?;
        }
        Ok(entries)
    }
}

/// Signal 0 probes for existence without delivering anything; EPERM still
/// proves the process is there.
#[cfg(unix)]
pub fn is_process_alive(pid: u32) -> bool {
    let rc = unsafe { libc::kill(pid as libc::pid_t, 0) };
    rc == 0 || io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
pub fn is_process_alive(_pid: u32) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn entry(pid: u32, port: u16) -> RegistryEntry {
        RegistryEntry {
            pid,
            interface: "0.0.0.0".to_string(),
            port,
            cwd: PathBuf::from("/srv/share"),
            started_at: Utc::now(),
        }
    }

    #[test]
    fn missing_file_loads_as_empty() {
        let temp = tempdir().expect("tempdir");
        let registry = Registry::open(temp.path().join("registry.json"));
        assert!(registry.load().expect("load").is_empty());
    }

    #[test]
    fn register_and_deregister_round_trip() {
        let temp = tempdir().expect("tempdir");
        let registry = Registry::open(temp.path().join("registry.json"));

        registry.register(entry(100, 8000)).expect("register");
        registry.register(entry(200, 8001)).expect("register");
        // Re-registering a PID replaces the old record.
        registry.register(entry(100, 9000)).expect("register");

        let entries = registry.load().expect("load");
        assert_eq!(entries.len(), 2);
        let own = entries.iter().find(|e| e.pid == 100).expect("pid 100");
        assert_eq!(own.port, 9000);

        registry.deregister(100).expect("deregister");
        let entries = registry.load().expect("load");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].pid, 200);
    }

    #[test]
    fn live_entries_prunes_dead_pids() {
        let temp = tempdir().expect("tempdir");
        let registry = Registry::open(temp.path().join("registry.json"));

        registry
            .register(entry(std::process::id(), 8000))
            .expect("register self");
        // Far outside the kernel's pid range, so certainly not running.
        registry.register(entry(999_999_999, 8001)).expect("register ghost");

        let live = registry.live_entries().expect("live");
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].pid, std::process::id());

        // The prune is persisted.
        let entries = registry.load().expect("load");
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn current_process_counts_as_alive() {
        assert!(is_process_alive(std::process::id()));
    }
}
