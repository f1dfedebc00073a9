//! Rendered artifacts on disk.
//!
//! Files are named `certificate_<unixMillis>_<serialNumber>.<ext>` and never
//! overwritten. The artifact with the highest timestamp for a serial number
//! and kind is the current one. Writes land in a hidden partial file and are
//! renamed into place, so a failed write never becomes current.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Mutex;

use crate::error::StorageError;
use crate::models::{ArtifactKind, RenderArtifact};

const STORED_PREFIX: &str = "certificate_";
const TEMP_PREFIX: &str = "temp_";
const PARTIAL_PREFIX: &str = ".partial_";

/// Temp files younger than this are assumed to be mid-stream
pub const TEMP_GRACE: Duration = Duration::from_secs(60);

struct ParsedName<'a> {
    millis: i64,
    serial: &'a str,
    kind: ArtifactKind,
}

fn parse_name<'a>(name: &'a str, prefix: &str) -> Option<ParsedName<'a>> {
    let (stem, ext) = name.rsplit_once('.')?;
    let kind = ArtifactKind::from_extension(ext)?;
    let (millis, serial) = stem.strip_prefix(prefix)?.split_once('_')?;
    if millis.is_empty() || !millis.bytes().all(|b| b.is_ascii_digit()) || serial.is_empty() {
        return None;
    }
    Some(ParsedName {
        millis: millis.parse().ok()?,
        serial,
        kind,
    })
}

fn file_name(prefix: &str, millis: i64, serial: &str, kind: ArtifactKind) -> String {
    format!("{prefix}{millis}_{serial}.{}", kind.extension())
}

fn timestamp(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
}

/// A temporary artifact, deleted when dropped
#[derive(Debug)]
pub struct TempArtifact {
    path: PathBuf,
    pub kind: ArtifactKind,
    pub serial_number: String,
}

impl TempArtifact {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn read(&self) -> Result<Vec<u8>, StorageError> {
        tokio::fs::read(&self.path)
            .await
            .map_err(|e| StorageError::io(&self.path, e))
    }
}

impl Drop for TempArtifact {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "Removed temporary artifact"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to remove temporary artifact"
            ),
        }
    }
}

#[derive(Default)]
struct WriteState {
    /// Set once the awaiting caller is gone
    abandoned: bool,
    renamed: Option<PathBuf>,
}

fn lock_state(state: &StdMutex<WriteState>) -> MutexGuard<'_, WriteState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn remove_quietly(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::debug!(path = %path.display(), "Removed abandoned write"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to remove abandoned write"),
    }
}

/// Cleans up a write whose caller went away before it finished
struct PendingWrite {
    partial: PathBuf,
    state: Arc<StdMutex<WriteState>>,
    armed: bool,
}

impl PendingWrite {
    fn new(partial: PathBuf) -> Self {
        Self {
            partial,
            state: Arc::new(StdMutex::new(WriteState::default())),
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for PendingWrite {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = lock_state(&self.state);
        state.abandoned = true;
        // A write still in flight sees the flag and removes its own partial
        remove_quietly(&self.partial);
        if let Some(renamed) = state.renamed.take() {
            remove_quietly(&renamed);
        }
    }
}

/// Content directory holding every rendered certificate file
pub struct ArtifactStore {
    dir: PathBuf,
    /// Serializes name selection and rename-into-place
    naming: Mutex<()>,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            naming: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn ensure_dir(&self) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| StorageError::io(&self.dir, e))
    }

    /// Persist a new artifact. Timestamps for one serial number and kind are
    /// strictly increasing, so the newest save is always current.
    pub async fn save(
        &self,
        bytes: &[u8],
        serial: &str,
        kind: ArtifactKind,
    ) -> Result<RenderArtifact, StorageError> {
        self.ensure_dir().await?;
        let _naming = self.naming.lock().await;

        let now = Utc::now().timestamp_millis();
        let millis = match self.latest_millis(STORED_PREFIX, serial, kind).await? {
            Some(latest) if latest >= now => latest + 1,
            _ => now,
        };
        if millis != now {
            tracing::debug!(serial = %serial, kind = %kind, millis, "Timestamp bumped to keep names unique");
        }

        let path = self.dir.join(file_name(STORED_PREFIX, millis, serial, kind));
        self.write_atomic(&path, bytes, millis, serial, kind).await?;

        tracing::info!(
            serial = %serial,
            kind = %kind,
            path = %path.display(),
            bytes = bytes.len(),
            "Artifact saved"
        );

        Ok(RenderArtifact {
            kind,
            path,
            serial_number: serial.to_string(),
            created_at: timestamp(millis),
        })
    }

    /// Write a `temp_` artifact for streaming; it is deleted when the
    /// returned guard drops
    pub async fn save_temp(
        &self,
        bytes: &[u8],
        serial: &str,
        kind: ArtifactKind,
    ) -> Result<TempArtifact, StorageError> {
        self.ensure_dir().await?;
        let _naming = self.naming.lock().await;

        let mut millis = Utc::now().timestamp_millis();
        let path = loop {
            let candidate = self.dir.join(file_name(TEMP_PREFIX, millis, serial, kind));
            if !tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
                break candidate;
            }
            millis += 1;
        };
        self.write_atomic(&path, bytes, millis, serial, kind).await?;

        tracing::debug!(serial = %serial, kind = %kind, path = %path.display(), "Temporary artifact written");
        Ok(TempArtifact {
            path,
            kind,
            serial_number: serial.to_string(),
        })
    }

    /// Write to a `.partial_` file and rename it into place on a blocking
    /// thread. If the caller is dropped before this returns, nothing is left
    /// behind: the partial or the renamed file is removed.
    async fn write_atomic(
        &self,
        path: &Path,
        bytes: &[u8],
        millis: i64,
        serial: &str,
        kind: ArtifactKind,
    ) -> Result<(), StorageError> {
        let partial = self
            .dir
            .join(file_name(PARTIAL_PREFIX, millis, serial, kind));
        let mut pending = PendingWrite::new(partial.clone());
        let shared = pending.state.clone();
        let target = path.to_path_buf();
        let bytes = bytes.to_vec();

        let task = tokio::task::spawn_blocking(move || {
            let written = std::fs::write(&partial, &bytes);
            let mut state = lock_state(&shared);
            if let Err(e) = written {
                remove_quietly(&partial);
                return Err(StorageError::io(&partial, e));
            }
            if state.abandoned {
                remove_quietly(&partial);
                return Ok(());
            }
            if let Err(e) = std::fs::rename(&partial, &target) {
                remove_quietly(&partial);
                return Err(StorageError::io(&target, e));
            }
            state.renamed = Some(target);
            Ok(())
        });

        let result = task.await.map_err(|e| {
            StorageError::io(path, std::io::Error::other(format!("write task failed: {e}")))
        });
        pending.disarm();
        result?
    }

    /// Most recent stored artifact of `kind` for `serial`
    pub async fn find_current(
        &self,
        serial: &str,
        kind: ArtifactKind,
    ) -> Result<RenderArtifact, StorageError> {
        self.list(serial)
            .await?
            .into_iter()
            .filter(|a| a.kind == kind)
            .max_by_key(|a| a.created_at)
            .ok_or_else(|| StorageError::NotFound {
                serial: serial.to_string(),
                kind,
            })
    }

    /// Every stored artifact for `serial`, oldest first
    pub async fn list(&self, serial: &str) -> Result<Vec<RenderArtifact>, StorageError> {
        let mut artifacts: Vec<RenderArtifact> = self
            .scan(STORED_PREFIX)
            .await?
            .into_iter()
            .filter(|(_, parsed_serial, _, _)| parsed_serial == serial)
            .map(|(path, serial_number, millis, kind)| RenderArtifact {
                kind,
                path,
                serial_number,
                created_at: timestamp(millis),
            })
            .collect();
        artifacts.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.kind.extension().cmp(b.kind.extension()))
        });
        Ok(artifacts)
    }

    /// Remove every stored artifact of `serial`, all kinds and timestamps
    pub async fn delete(&self, serial: &str) -> Result<usize, StorageError> {
        let mut removed = 0;
        for artifact in self.list(serial).await? {
            match tokio::fs::remove_file(&artifact.path).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(StorageError::io(&artifact.path, e)),
            }
        }
        tracing::info!(serial = %serial, removed, "Artifacts deleted");
        Ok(removed)
    }

    /// Remove a single stored artifact
    pub async fn discard(&self, artifact: &RenderArtifact) -> Result<(), StorageError> {
        match tokio::fs::remove_file(&artifact.path).await {
            Ok(()) => {
                tracing::info!(path = %artifact.path.display(), "Artifact discarded");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::io(&artifact.path, e)),
        }
    }

    /// Remove lingering `temp_` files of `kind` and `.partial_` files of any
    /// kind older than [`TEMP_GRACE`]. Best effort: individual failures are
    /// logged and skipped.
    pub async fn sweep_temporary(&self, kind: ArtifactKind) -> Result<usize, StorageError> {
        let cutoff = Utc::now().timestamp_millis() - TEMP_GRACE.as_millis() as i64;
        let mut stale: Vec<PathBuf> = self
            .scan(TEMP_PREFIX)
            .await?
            .into_iter()
            .filter(|(_, _, millis, temp_kind)| *temp_kind == kind && *millis <= cutoff)
            .map(|(path, ..)| path)
            .collect();
        stale.extend(
            self.scan(PARTIAL_PREFIX)
                .await?
                .into_iter()
                .filter(|(_, _, millis, _)| *millis <= cutoff)
                .map(|(path, ..)| path),
        );

        let mut removed = 0;
        for path in stale {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to sweep temporary artifact")
                }
            }
        }

        if removed > 0 {
            tracing::info!(kind = %kind, removed, "Swept temporary artifacts");
        }
        Ok(removed)
    }

    async fn latest_millis(
        &self,
        prefix: &str,
        serial: &str,
        kind: ArtifactKind,
    ) -> Result<Option<i64>, StorageError> {
        Ok(self
            .scan(prefix)
            .await?
            .into_iter()
            .filter(|(_, s, _, k)| s == serial && *k == kind)
            .map(|(_, _, millis, _)| millis)
            .max())
    }

    /// (path, serial, millis, kind) of every file carrying `prefix`
    async fn scan(
        &self,
        prefix: &str,
    ) -> Result<Vec<(PathBuf, String, i64, ArtifactKind)>, StorageError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::io(&self.dir, e)),
        };

        let mut found = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::io(&self.dir, e))?
        {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if let Some(parsed) = parse_name(name, prefix) {
                found.push((entry.path(), parsed.serial.to_string(), parsed.millis, parsed.kind));
            }
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn store() -> (tempfile::TempDir, ArtifactStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().join("certs"));
        (dir, store)
    }

    #[test]
    fn test_parse_name() {
        let parsed = parse_name("certificate_1700000000000_C-1001.jpg", STORED_PREFIX).unwrap();
        assert_eq!(parsed.millis, 1_700_000_000_000);
        assert_eq!(parsed.serial, "C-1001");
        assert_eq!(parsed.kind, ArtifactKind::Raster);

        let parsed = parse_name("certificate_5_GRH_TO_2022.v2.pdf", STORED_PREFIX).unwrap();
        assert_eq!(parsed.serial, "GRH_TO_2022.v2");
        assert_eq!(parsed.kind, ArtifactKind::Pdf);

        assert!(parse_name("certificate_x_C-1.pdf", STORED_PREFIX).is_none());
        assert!(parse_name("certificate_1_C-1.png", STORED_PREFIX).is_none());
        assert!(parse_name("temp_1_C-1.pdf", STORED_PREFIX).is_none());
        assert!(parse_name(".partial_1_C-1.pdf", STORED_PREFIX).is_none());
        assert!(parse_name("certificate_1_.pdf", STORED_PREFIX).is_none());
    }

    #[tokio::test]
    async fn test_save_names_and_finds_current() {
        let (_tmp, store) = store();

        let artifact = store.save(b"jpeg", "C-1001", ArtifactKind::Raster).await.unwrap();
        let name = artifact.file_name();
        assert!(name.starts_with("certificate_"));
        assert!(name.ends_with("_C-1001.jpg"));
        assert_eq!(std::fs::read(&artifact.path).unwrap(), b"jpeg");

        let current = store.find_current("C-1001", ArtifactKind::Raster).await.unwrap();
        assert_eq!(current, artifact);
    }

    #[tokio::test]
    async fn test_regeneration_keeps_history_and_newest_is_current() {
        let (_tmp, store) = store();

        let first = store.save(b"one", "C-1001", ArtifactKind::Pdf).await.unwrap();
        let second = store.save(b"two", "C-1001", ArtifactKind::Pdf).await.unwrap();

        assert_ne!(first.path, second.path);
        assert!(second.created_at > first.created_at);
        assert!(first.path.exists());

        let current = store.find_current("C-1001", ArtifactKind::Pdf).await.unwrap();
        assert_eq!(current.path, second.path);
        assert_eq!(store.list("C-1001").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_find_current_not_found() {
        let (_tmp, store) = store();
        store.save(b"x", "C-1001", ArtifactKind::Raster).await.unwrap();

        let err = store.find_current("C-1001", ArtifactKind::Pdf).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound { kind: ArtifactKind::Pdf, .. }));

        let err = store.find_current("C-9999", ArtifactKind::Raster).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_serials_sharing_a_prefix_are_separate() {
        let (_tmp, store) = store();
        store.save(b"a", "C-1", ArtifactKind::Raster).await.unwrap();
        store.save(b"b", "C-10", ArtifactKind::Raster).await.unwrap();

        assert_eq!(store.list("C-1").await.unwrap().len(), 1);
        assert_eq!(store.delete("C-1").await.unwrap(), 1);
        assert!(store.find_current("C-10", ArtifactKind::Raster).await.is_ok());
    }

    #[tokio::test]
    async fn test_delete_removes_all_kinds_and_timestamps() {
        let (_tmp, store) = store();
        store.save(b"1", "C-1001", ArtifactKind::Raster).await.unwrap();
        store.save(b"2", "C-1001", ArtifactKind::Raster).await.unwrap();
        store.save(b"3", "C-1001", ArtifactKind::Pdf).await.unwrap();

        assert_eq!(store.delete("C-1001").await.unwrap(), 3);
        assert!(store.list("C-1001").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_temp_artifact_removed_on_drop() {
        let (_tmp, store) = store();

        let temp = store.save_temp(b"%PDF", "C-1001", ArtifactKind::Pdf).await.unwrap();
        let path = temp.path().to_path_buf();
        assert!(path.file_name().unwrap().to_str().unwrap().starts_with("temp_"));
        assert_eq!(temp.read().await.unwrap(), b"%PDF");

        // temp files never count as stored artifacts
        assert!(store.find_current("C-1001", ArtifactKind::Pdf).await.is_err());

        drop(temp);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_sweep_removes_only_lingering_temp_files_of_kind() {
        let (_tmp, store) = store();
        store.ensure_dir().await.unwrap();

        let old_pdf = store.dir().join("temp_1000_C-1.pdf");
        let old_jpg = store.dir().join("temp_1000_C-1.jpg");
        std::fs::write(&old_pdf, b"x").unwrap();
        std::fs::write(&old_jpg, b"x").unwrap();
        let fresh = store.save_temp(b"y", "C-2", ArtifactKind::Pdf).await.unwrap();
        let stored = store.save(b"z", "C-1", ArtifactKind::Pdf).await.unwrap();

        assert_eq!(store.sweep_temporary(ArtifactKind::Pdf).await.unwrap(), 1);
        assert!(!old_pdf.exists());
        assert!(old_jpg.exists());
        assert!(fresh.path().exists());
        assert!(stored.path.exists());
    }

    #[tokio::test]
    async fn test_sweep_removes_stale_partial_files() {
        let (_tmp, store) = store();
        store.ensure_dir().await.unwrap();

        let stale_pdf = store.dir().join(".partial_1000_C-1.pdf");
        let stale_jpg = store.dir().join(".partial_1000_C-1.jpg");
        let now = Utc::now().timestamp_millis();
        let in_flight = store.dir().join(format!(".partial_{now}_C-2.pdf"));
        for path in [&stale_pdf, &stale_jpg, &in_flight] {
            std::fs::write(path, b"x").unwrap();
        }

        assert_eq!(store.sweep_temporary(ArtifactKind::Pdf).await.unwrap(), 2);
        assert!(!stale_pdf.exists());
        assert!(!stale_jpg.exists());
        assert!(in_flight.exists());
    }

    fn leftovers(store: &ArtifactStore) -> Vec<String> {
        std::fs::read_dir(store.dir())
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancelled_write_leaves_no_files() {
        let (_tmp, store) = store();
        let bytes = vec![7u8; 200 * 1024 * 1024];

        let outcome = tokio::time::timeout(
            Duration::from_millis(5),
            store.save_temp(&bytes, "C-1001", ArtifactKind::Pdf),
        )
        .await;
        // A write that beat the timeout is owned by its guard
        drop(outcome);

        // The blocking write may still be running; wait for it to clean up
        let deadline = std::time::Instant::now() + Duration::from_secs(10);
        while !leftovers(&store).is_empty() && std::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert_eq!(leftovers(&store), Vec::<String>::new());
    }

    #[tokio::test]
    async fn test_missing_directory_lists_empty() {
        let (_tmp, store) = store();
        assert!(store.list("C-1").await.unwrap().is_empty());
        assert_eq!(store.sweep_temporary(ArtifactKind::Pdf).await.unwrap(), 0);
    }
}
