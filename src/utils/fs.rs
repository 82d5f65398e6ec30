//! Atomic file helpers
//!
//! Readers must never observe a half-written file, so every write goes
//! to a uniquely named temp file in the target directory and is renamed
//! into place. Concurrent writers to the same path never share a temp
//! file; the last rename wins.

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::fs;

async fn ensure_parent(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }
    Ok(())
}

fn parent_dir(path: &Path) -> PathBuf {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Fill a fresh temp file next to `target` and rename it over `target`
async fn replace_with<F, T>(target: &Path, fill: F) -> io::Result<T>
where
    F: FnOnce(&mut File) -> io::Result<T> + Send + 'static,
    T: Send + 'static,
{
    ensure_parent(target).await?;
    let target = target.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let mut temp = NamedTempFile::new_in(parent_dir(&target))?;
        let result = fill(temp.as_file_mut())?;
        temp.as_file_mut().flush()?;
        temp.as_file().sync_all()?;
        temp.persist(&target).map_err(|e| e.error)?;
        Ok(result)
    })
    .await
    .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
}

/// Write `contents` to `path` via a temp file and rename
pub async fn write_atomic<C: AsRef<[u8]>>(path: &Path, contents: C) -> io::Result<()> {
    let contents = contents.as_ref().to_vec();
    replace_with(path, move |file| file.write_all(&contents)).await
}

/// Copy `from` over `to` via a temp file and rename
pub async fn copy_atomic(from: &Path, to: &Path) -> io::Result<u64> {
    let from = from.to_path_buf();
    replace_with(to, move |file| {
        let mut source = File::open(&from)?;
        io::copy(&mut source, file)
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_write_atomic_creates_parents() -> Result<(), Box<dyn std::error::Error>> {
        let temp_dir = tempfile::tempdir()?;
        let path = temp_dir.path().join("nested/dir/state.json");

        write_atomic(&path, "{}").await?;
        assert_eq!(fs::read_to_string(&path).await?, "{}");

        write_atomic(&path, "{\"a\":1}").await?;
        assert_eq!(fs::read_to_string(&path).await?, "{\"a\":1}");
        assert_eq!(entries(&temp_dir.path().join("nested/dir")), vec!["state.json"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_copy_atomic() -> Result<(), Box<dyn std::error::Error>> {
        let temp_dir = tempfile::tempdir()?;
        let from = temp_dir.path().join("working.xml");
        let to = temp_dir.path().join("published/feed.xml");
        fs::write(&from, "<productFeed/>").await?;

        let bytes = copy_atomic(&from, &to).await?;
        assert_eq!(bytes, 14);
        assert_eq!(fs::read_to_string(&to).await?, "<productFeed/>");
        assert!(from.exists());
        assert_eq!(entries(&temp_dir.path().join("published")), vec!["feed.xml"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_copy_atomic_missing_source_leaves_target() -> Result<(), Box<dyn std::error::Error>> {
        let temp_dir = tempfile::tempdir()?;
        let to = temp_dir.path().join("feed.xml");
        fs::write(&to, "old").await?;

        assert!(copy_atomic(&temp_dir.path().join("missing.xml"), &to).await.is_err());
        assert_eq!(fs::read_to_string(&to).await?, "old");
        assert_eq!(entries(temp_dir.path()), vec!["feed.xml"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_concurrent_writers_never_share_a_temp_file() -> Result<(), Box<dyn std::error::Error>> {
        let temp_dir = tempfile::tempdir()?;
        let path = temp_dir.path().join("state.json");
        let first = "a".repeat(64 * 1024);
        let second = "b".repeat(64 * 1024);

        let (a, b) = tokio::join!(write_atomic(&path, &first), write_atomic(&path, &second));
        a?;
        b?;

        // Either write may land last, but never a mix of both
        let contents = fs::read_to_string(&path).await?;
        assert!(contents == first || contents == second);
        assert_eq!(entries(temp_dir.path()), vec!["state.json"]);
        Ok(())
    }
}
