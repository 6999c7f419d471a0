//! Byte storage for replays and settings
//!
//! Features:
//! - `Storage` trait: named byte blobs, medium-agnostic
//! - `MemoryStorage` for tests and headless runs
//! - `DirStorage`: one file per name, written via tmp file then rename
//! - `spawn_load`: background read polled without blocking the tick loop

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::{Arc, Mutex};
use std::thread;

/// Named byte storage used by the replay store and settings
pub trait Storage: Send + Sync {
    fn read_bytes(&self, name: &str) -> io::Result<Vec<u8>>;
    fn write_bytes(&self, name: &str, bytes: &[u8]) -> io::Result<()>;
    /// Stored names, sorted
    fn names(&self) -> io::Result<Vec<String>>;
}

/// In-process storage
#[derive(Debug, Default)]
pub struct MemoryStorage {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> io::Result<std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>>> {
        self.blobs
            .lock()
            .map_err(|_| io::Error::other("memory storage lock poisoned"))
    }
}

impl Storage for MemoryStorage {
    fn read_bytes(&self, name: &str) -> io::Result<Vec<u8>> {
        self.lock()?
            .get(name)
            .cloned()
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::NotFound, format!("no blob named '{}'", name))
            })
    }

    fn write_bytes(&self, name: &str, bytes: &[u8]) -> io::Result<()> {
        self.lock()?.insert(name.to_string(), bytes.to_vec());
        Ok(())
    }

    fn names(&self) -> io::Result<Vec<String>> {
        let mut names: Vec<String> = self.lock()?.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

/// Files under a directory, one per name
#[derive(Debug, Clone)]
pub struct DirStorage {
    root: PathBuf,
}

impl DirStorage {
    /// Use `root`, creating it if needed
    pub fn open(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, name: &str) -> io::Result<PathBuf> {
        let valid = !name.is_empty()
            && !name.starts_with('.')
            && !name.contains(['/', '\\'])
            && !name.ends_with(".tmp");
        if !valid {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid storage name '{}'", name),
            ));
        }
        Ok(self.root.join(name))
    }
}

impl Storage for DirStorage {
    fn read_bytes(&self, name: &str) -> io::Result<Vec<u8>> {
        fs::read(self.path_for(name)?)
    }

    fn write_bytes(&self, name: &str, bytes: &[u8]) -> io::Result<()> {
        let path = self.path_for(name)?;
        let tmp = path.with_file_name(format!("{}.tmp", name));
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &path)?;
        log::debug!("Wrote {} bytes to {}", bytes.len(), path.display());
        Ok(())
    }

    fn names(&self) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            match entry.file_name().to_str() {
                Some(name) if !name.ends_with(".tmp") => names.push(name.to_string()),
                _ => {}
            }
        }
        names.sort();
        Ok(names)
    }
}

/// A read running off the tick loop
#[derive(Debug)]
pub struct PendingLoad {
    name: String,
    rx: Option<Receiver<io::Result<Vec<u8>>>>,
    ready: Option<io::Result<Vec<u8>>>,
}

impl PendingLoad {
    /// Already-completed load
    pub fn ready(name: &str, result: io::Result<Vec<u8>>) -> Self {
        Self {
            name: name.to_string(),
            rx: None,
            ready: Some(result),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Non-blocking check; yields the result exactly once
    pub fn poll(&mut self) -> Option<io::Result<Vec<u8>>> {
        if let Some(result) = self.ready.take() {
            return Some(result);
        }
        let rx = self.rx.as_ref()?;
        match rx.try_recv() {
            Ok(result) => {
                self.rx = None;
                Some(result)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.rx = None;
                Some(Err(io::Error::other("loader thread exited without a result")))
            }
        }
    }

    /// Block until the load completes (outside the tick loop only)
    pub fn wait(mut self) -> io::Result<Vec<u8>> {
        if let Some(result) = self.ready.take() {
            return result;
        }
        match self.rx.take() {
            Some(rx) => rx
                .recv()
                .unwrap_or_else(|_| Err(io::Error::other("loader thread exited without a result"))),
            None => Err(io::Error::other("load already consumed")),
        }
    }
}

/// Read `name` from `storage` on a background thread
pub fn spawn_load(storage: Arc<dyn Storage>, name: &str) -> PendingLoad {
    let (tx, rx) = mpsc::channel();
    let owned = name.to_string();
    thread::spawn(move || {
        let result = storage.read_bytes(&owned);
        // Receiver may be gone if the ghost was removed while loading
        let _ = tx.send(result);
    });
    PendingLoad {
        name: name.to_string(),
        rx: Some(rx),
        ready: None,
    }
}
