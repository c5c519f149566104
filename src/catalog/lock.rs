use crate::Result;
use camino::Utf8Path;
use fs4::fs_std::FileExt;
use ohno::IntoAppError;
use std::fs::{File, OpenOptions};

const LOG_TARGET: &str = "      lock";

/// Name of the lock file created in the catalog's source directory
pub const LOCK_FILE_NAME: &str = ".catalog.lock";

/// Guard that releases the catalog lock when dropped
#[derive(Debug)]
pub struct CatalogLockGuard(File);

impl Drop for CatalogLockGuard {
    fn drop(&mut self) {
        if let Err(e) = self.0.unlock() {
            log::warn!(target: LOG_TARGET, "Failed to unlock catalog: {e}");
        }
    }
}

/// Take an exclusive advisory lock on the catalog, waiting for any other run to finish
pub async fn acquire_catalog_lock(source_dir: &Utf8Path) -> Result<CatalogLockGuard> {
    let lock_path = source_dir.join(LOCK_FILE_NAME);

    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)
        .into_app_err_with(|| format!("Failed to open catalog lock file at '{lock_path}'"))?;

    // Blocking wait, kept off the runtime threads
    let file = tokio::task::spawn_blocking(move || {
        file.lock_exclusive()
            .into_app_err_with(|| format!("Failed to acquire exclusive lock on catalog at '{lock_path}'"))?;
        log::debug!(target: LOG_TARGET, "Acquired catalog lock at '{lock_path}'");
        Ok::<_, ohno::AppError>(file)
    })
    .await
    .into_app_err("Lock task panicked")??;

    Ok(CatalogLockGuard(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;

    #[tokio::test]
    async fn test_lock_is_released_on_drop() {
        let dir = std::env::temp_dir().join(format!("catalog_meta_lock_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let dir = Utf8PathBuf::from_path_buf(dir).unwrap();

        let guard = acquire_catalog_lock(&dir).await.unwrap();
        assert!(dir.join(LOCK_FILE_NAME).exists());
        drop(guard);

        // A second acquisition would block forever if the first was not released
        let guard = tokio::time::timeout(core::time::Duration::from_secs(5), acquire_catalog_lock(&dir))
            .await
            .unwrap()
            .unwrap();
        drop(guard);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
