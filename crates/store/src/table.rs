//! A single record kind: one directory, one JSON file per record.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;

use nx_domain::error::{Error, Result};

/// In-memory rows backed by `<dir>/<hex(id)>.json`.
///
/// Remote ids are opaque, so the file name is the hex encoding of the id
/// and the map is keyed by the id read back out of each record.
///
/// The write lock is held across the file write so the cache and disk
/// never disagree for a given id. Tables share nothing, so writers of
/// different kinds never contend.
pub(crate) struct Table<T> {
    kind: &'static str,
    dir: PathBuf,
    key: fn(&T) -> &str,
    rows: RwLock<BTreeMap<String, T>>,
}

impl<T> Table<T>
where
    T: Serialize + DeserializeOwned + Clone,
{
    /// Create `root/kind` if needed and load every readable record.
    ///
    /// Unreadable or corrupt files are skipped with a warning.
    pub(crate) fn open(root: &Path, kind: &'static str, key: fn(&T) -> &str) -> Result<Self> {
        let dir = root.join(kind);
        std::fs::create_dir_all(&dir)
            .map_err(|e| Error::Storage(format!("creating {}: {e}", dir.display())))?;

        let mut rows = BTreeMap::new();
        let entries = std::fs::read_dir(&dir)
            .map_err(|e| Error::Storage(format!("listing {}: {e}", dir.display())))?;

        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let parsed = std::fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|raw| serde_json::from_str::<T>(&raw).map_err(|e| e.to_string()));
            match parsed {
                Ok(record) => {
                    rows.insert(key(&record).to_owned(), record);
                }
                Err(e) => {
                    tracing::warn!(
                        kind,
                        path = %path.display(),
                        error = %e,
                        "skipping unreadable record"
                    );
                }
            }
        }

        tracing::debug!(kind, records = rows.len(), "table loaded");

        Ok(Self {
            kind,
            dir,
            key,
            rows: RwLock::new(rows),
        })
    }

    pub(crate) fn get(&self, id: &str) -> Option<T> {
        self.rows.read().get(id).cloned()
    }

    pub(crate) fn list(&self) -> Vec<T> {
        self.rows.read().values().cloned().collect()
    }

    pub(crate) fn filter(&self, keep: impl Fn(&T) -> bool) -> Vec<T> {
        self.rows.read().values().filter(|r| keep(r)).cloned().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.rows.read().len()
    }

    /// Insert or overwrite the record stored under its own id.
    pub(crate) fn upsert(&self, record: &T) -> Result<()> {
        let id = (self.key)(record);
        if id.is_empty() {
            return Err(Error::Storage(format!("{}: empty record id", self.kind)));
        }
        let mut rows = self.rows.write();
        self.write_file(id, record)?;
        rows.insert(id.to_owned(), record.clone());
        Ok(())
    }

    /// Apply `change` to every record matching `select`, one file write
    /// per record. Returns how many records were rewritten.
    ///
    /// Stops at the first failed write; earlier rewrites stay applied.
    pub(crate) fn update_where(
        &self,
        select: impl Fn(&str, &T) -> bool,
        mut change: impl FnMut(&mut T),
    ) -> Result<usize> {
        let mut rows = self.rows.write();
        let ids: Vec<String> = rows
            .iter()
            .filter(|(id, r)| select(id, r))
            .map(|(id, _)| id.clone())
            .collect();

        for id in &ids {
            let Some(current) = rows.get(id) else {
                continue;
            };
            let mut updated = current.clone();
            change(&mut updated);
            self.write_file(id, &updated)?;
            rows.insert(id.clone(), updated);
        }
        Ok(ids.len())
    }

    /// Write to a temp file in the same directory, then rename over the
    /// target. Temp files are created `0o600` on Unix, which also keeps
    /// session tokens private.
    fn write_file(&self, id: &str, record: &T) -> Result<()> {
        let path = self.dir.join(file_name(id));
        let json = serde_json::to_vec_pretty(record)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)
            .map_err(|e| Error::Storage(format!("{}: temp file: {e}", self.kind)))?;
        tmp.write_all(&json)
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(|e| Error::Storage(format!("{}: writing {id}: {e}", self.kind)))?;
        tmp.persist(&path).map_err(|e| {
            Error::Storage(format!("{}: persisting {}: {}", self.kind, path.display(), e.error))
        })?;
        Ok(())
    }
}

/// `<hex(id)>.json`. Any byte sequence maps to a flat, unique name.
pub(crate) fn file_name(id: &str) -> String {
    format!("{}.json", hex::encode(id.as_bytes()))
}
