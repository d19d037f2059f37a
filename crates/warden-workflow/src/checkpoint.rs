//! File-level checkpoint store: snapshot files before a risky step runs,
//! restore them if the step (or a later one in the same transaction)
//! fails.
//!
//! Backups are laid out as
//! `backup_root/transactions/<tx_id>/<checkpoint_id>/<mangled_path>`,
//! where `<mangled_path>` is the snapshotted file's absolute path with
//! every `/` swapped for `__` so a single flat directory can hold
//! backups of files from anywhere on disk without collisions.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

/// Failure modes for checkpoint persistence and restore.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    /// No checkpoint exists for the given transaction/checkpoint id pair.
    #[error("no checkpoint '{checkpoint_id}' in transaction '{tx_id}'")]
    NotFound {
        /// The transaction the lookup was scoped to.
        tx_id: String,
        /// The checkpoint id that was not found.
        checkpoint_id: String,
    },
    /// A filesystem operation (read, write, create_dir) failed.
    #[error("checkpoint I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// One file captured by a checkpoint, original path plus its snapshotted
/// backup path under the backup root.
#[derive(Debug, Clone)]
pub struct FileBackup {
    /// The file's real path at backup time.
    pub source: PathBuf,
    /// Where the snapshot was written under the backup root.
    pub backup_path: PathBuf,
}

/// A point-in-time snapshot of every file a risky step is about to touch.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    /// Transaction this checkpoint belongs to.
    pub tx_id: String,
    /// Unique id within the transaction, typically the step id.
    pub checkpoint_id: String,
    /// Every file backed up at checkpoint creation time.
    pub files: Vec<FileBackup>,
}

/// Snapshot/restore of files, scoped by transaction and checkpoint id.
///
/// Implementations must make `save` and `restore` safe to call
/// concurrently for distinct `(tx_id, checkpoint_id)` pairs.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Back up every path in `paths` that currently exists, recording the
    /// snapshot under `(tx_id, checkpoint_id)`. Paths that don't exist yet
    /// (the step is about to create them) are recorded with no backup —
    /// restoring removes them instead of overwriting.
    async fn save(
        &self,
        tx_id: &str,
        checkpoint_id: &str,
        paths: &[PathBuf],
    ) -> Result<Checkpoint, CheckpointError>;

    /// Restore every file in a previously saved checkpoint to its
    /// snapshotted content, deleting files that did not exist at backup
    /// time.
    async fn restore(&self, tx_id: &str, checkpoint_id: &str) -> Result<(), CheckpointError>;

    /// Restore every checkpoint belonging to `tx_id`, most-recently-created
    /// first, so a transaction with several risky steps unwinds in the
    /// reverse order it was built up in. Used when a later step's failure
    /// means earlier, already-succeeded risky steps must also be undone.
    async fn restore_transaction(&self, tx_id: &str) -> Result<(), CheckpointError>;

    /// Discard every checkpoint belonging to `tx_id`, once the
    /// transaction has committed and rollback is no longer possible.
    async fn discard_transaction(&self, tx_id: &str) -> Result<(), CheckpointError>;
}

/// A [`CheckpointStore`] backed by plain files under `backup_root`.
pub struct FileCheckpointStore {
    backup_root: PathBuf,
    checkpoints: tokio::sync::RwLock<Vec<Checkpoint>>,
}

impl FileCheckpointStore {
    /// Build a store rooted at `backup_root`, created lazily on first use.
    #[must_use]
    pub fn new(backup_root: impl Into<PathBuf>) -> Self {
        Self {
            backup_root: backup_root.into(),
            checkpoints: tokio::sync::RwLock::new(Vec::new()),
        }
    }

    fn checkpoint_dir(&self, tx_id: &str, checkpoint_id: &str) -> PathBuf {
        self.backup_root.join("transactions").join(tx_id).join(checkpoint_id)
    }

    async fn find(&self, tx_id: &str, checkpoint_id: &str) -> Result<Checkpoint, CheckpointError> {
        let checkpoints = self.checkpoints.read().await;
        checkpoints
            .iter()
            .find(|c| c.tx_id == tx_id && c.checkpoint_id == checkpoint_id)
            .cloned()
            .ok_or_else(|| CheckpointError::NotFound {
                tx_id: tx_id.to_string(),
                checkpoint_id: checkpoint_id.to_string(),
            })
    }
}

/// Replace every `/` in `path` with `__` so it can live as a flat
/// filename under the checkpoint directory.
fn mangle(path: &Path) -> String {
    path.to_string_lossy().replace('/', "__")
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn save(
        &self,
        tx_id: &str,
        checkpoint_id: &str,
        paths: &[PathBuf],
    ) -> Result<Checkpoint, CheckpointError> {
        let dir = self.checkpoint_dir(tx_id, checkpoint_id);
        tokio::fs::create_dir_all(&dir).await?;

        let mut files = Vec::with_capacity(paths.len());
        for source in paths {
            let backup_path = dir.join(mangle(source));
            if tokio::fs::try_exists(source).await.unwrap_or(false) {
                tokio::fs::copy(source, &backup_path).await?;
            }
            files.push(FileBackup { source: source.clone(), backup_path });
        }

        let checkpoint = Checkpoint { tx_id: tx_id.to_string(), checkpoint_id: checkpoint_id.to_string(), files };
        self.checkpoints.write().await.push(checkpoint.clone());
        Ok(checkpoint)
    }

    async fn restore(&self, tx_id: &str, checkpoint_id: &str) -> Result<(), CheckpointError> {
        let checkpoint = self.find(tx_id, checkpoint_id).await?;
        for file in &checkpoint.files {
            if tokio::fs::try_exists(&file.backup_path).await.unwrap_or(false) {
                if let Some(parent) = file.source.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::copy(&file.backup_path, &file.source).await?;
            } else {
                let _ = tokio::fs::remove_file(&file.source).await;
            }
        }
        Ok(())
    }

    async fn restore_transaction(&self, tx_id: &str) -> Result<(), CheckpointError> {
        let checkpoint_ids: Vec<String> = {
            let checkpoints = self.checkpoints.read().await;
            checkpoints
                .iter()
                .filter(|c| c.tx_id == tx_id)
                .map(|c| c.checkpoint_id.clone())
                .collect()
        };
        for checkpoint_id in checkpoint_ids.into_iter().rev() {
            self.restore(tx_id, &checkpoint_id).await?;
        }
        Ok(())
    }

    async fn discard_transaction(&self, tx_id: &str) -> Result<(), CheckpointError> {
        let dir = self.backup_root.join("transactions").join(tx_id);
        if tokio::fs::try_exists(&dir).await.unwrap_or(false) {
            tokio::fs::remove_dir_all(&dir).await?;
        }
        self.checkpoints.write().await.retain(|c| c.tx_id != tx_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    async fn write_file(path: &Path, contents: &str) {
        let mut f = tokio::fs::File::create(path).await.unwrap();
        f.write_all(contents.as_bytes()).await.unwrap();
    }

    #[tokio::test]
    async fn save_and_restore_round_trips_content() {
        let workdir = tempfile::tempdir().unwrap();
        let backup_root = tempfile::tempdir().unwrap();
        let target = workdir.path().join("data.txt");
        write_file(&target, "original").await;

        let store = FileCheckpointStore::new(backup_root.path());
        store.save("tx-1", "cp-1", &[target.clone()]).await.unwrap();

        write_file(&target, "mutated").await;
        store.restore("tx-1", "cp-1").await.unwrap();

        let restored = tokio::fs::read_to_string(&target).await.unwrap();
        assert_eq!(restored, "original");
    }

    #[tokio::test]
    async fn restoring_a_newly_created_file_removes_it() {
        let workdir = tempfile::tempdir().unwrap();
        let backup_root = tempfile::tempdir().unwrap();
        let target = workdir.path().join("new.txt");

        let store = FileCheckpointStore::new(backup_root.path());
        store.save("tx-1", "cp-1", &[target.clone()]).await.unwrap();

        write_file(&target, "created after checkpoint").await;
        store.restore("tx-1", "cp-1").await.unwrap();

        assert!(!tokio::fs::try_exists(&target).await.unwrap());
    }

    #[tokio::test]
    async fn restore_of_unknown_checkpoint_errors() {
        let backup_root = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(backup_root.path());
        let err = store.restore("tx-1", "nope").await.unwrap_err();
        assert!(matches!(err, CheckpointError::NotFound { .. }));
    }

    #[tokio::test]
    async fn restore_transaction_undoes_every_checkpoint_in_reverse_order() {
        let workdir = tempfile::tempdir().unwrap();
        let backup_root = tempfile::tempdir().unwrap();
        let first = workdir.path().join("first.txt");
        let second = workdir.path().join("second.txt");
        write_file(&first, "first-original").await;
        write_file(&second, "second-original").await;

        let store = FileCheckpointStore::new(backup_root.path());
        store.save("tx-1", "cp-1", &[first.clone()]).await.unwrap();
        write_file(&first, "first-mutated-by-cp-1").await;
        store.save("tx-1", "cp-2", &[second.clone()]).await.unwrap();
        write_file(&second, "second-mutated-by-cp-2").await;

        store.restore_transaction("tx-1").await.unwrap();

        assert_eq!(tokio::fs::read_to_string(&first).await.unwrap(), "first-original");
        assert_eq!(tokio::fs::read_to_string(&second).await.unwrap(), "second-original");
    }

    #[tokio::test]
    async fn discard_transaction_removes_backups() {
        let workdir = tempfile::tempdir().unwrap();
        let backup_root = tempfile::tempdir().unwrap();
        let target = workdir.path().join("data.txt");
        write_file(&target, "v1").await;

        let store = FileCheckpointStore::new(backup_root.path());
        store.save("tx-1", "cp-1", &[target.clone()]).await.unwrap();
        store.discard_transaction("tx-1").await.unwrap();

        let err = store.restore("tx-1", "cp-1").await.unwrap_err();
        assert!(matches!(err, CheckpointError::NotFound { .. }));
    }
}
