//! File system helpers for staging package roots.
//!
//! Framework bundles rely on relative symlinks (`Versions/Current`), so
//! copies preserve links instead of following them; following them would
//! duplicate content and invalidate the framework's signature.

use std::io;
use std::path::Path;
use tokio::fs;

/// Removes the directory and its contents if it exists.
pub async fn remove_dir_all(path: &Path) -> io::Result<()> {
    if fs::try_exists(path).await? {
        fs::remove_dir_all(path).await
    } else {
        Ok(())
    }
}

/// Creates all of the directories of the specified path, erasing it first if specified.
pub async fn create_dir_all(path: &Path, erase: bool) -> io::Result<()> {
    if erase {
        remove_dir_all(path).await?;
    }
    fs::create_dir_all(path).await
}

#[cfg(unix)]
fn symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn symlink(target: &Path, link: &Path) -> io::Result<()> {
    if target.is_dir() {
        std::os::windows::fs::symlink_dir(target, link)
    } else {
        std::os::windows::fs::symlink_file(target, link)
    }
}

/// Recursively copies a directory, creating parents of the destination.
///
/// Preserves symlinks and file permissions. Fails if the source is not a
/// directory or if the destination already exists.
pub async fn copy_dir(from: &Path, to: &Path) -> io::Result<()> {
    if !from.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{} is not a directory", from.display()),
        ));
    }
    if fs::try_exists(to).await? {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("{} already exists", to.display()),
        ));
    }
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).await?;
    }

    for entry in walkdir::WalkDir::new(from) {
        let entry = entry.map_err(io::Error::other)?;
        let rel_path = entry
            .path()
            .strip_prefix(from)
            .map_err(io::Error::other)?;
        let dest_path = to.join(rel_path);

        if entry.file_type().is_symlink() {
            let target = fs::read_link(entry.path()).await?;
            symlink(&target, &dest_path)?;
        } else if entry.file_type().is_dir() {
            fs::create_dir_all(&dest_path).await?;
        } else {
            fs::copy(entry.path(), &dest_path).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_copy_dir_copies_tree() {
        let dir = tempfile::tempdir().expect("tempdir");
        let src = dir.path().join("Viewer.app");
        std::fs::create_dir_all(src.join("Contents/MacOS")).expect("mkdir");
        std::fs::write(src.join("Contents/MacOS/Viewer"), b"bin").expect("write");

        let dst = dir.path().join("root/Viewer.app");
        copy_dir(&src, &dst).await.expect("copy");
        assert_eq!(
            std::fs::read(dst.join("Contents/MacOS/Viewer")).expect("read"),
            b"bin"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_copy_dir_preserves_symlinks() {
        let dir = tempfile::tempdir().expect("tempdir");
        let framework = dir.path().join("Qt.framework");
        std::fs::create_dir_all(framework.join("Versions/A")).expect("mkdir");
        std::os::unix::fs::symlink("A", framework.join("Versions/Current")).expect("link");

        let dst = dir.path().join("copy/Qt.framework");
        copy_dir(&framework, &dst).await.expect("copy");

        let link = dst.join("Versions/Current");
        assert!(
            std::fs::symlink_metadata(&link)
                .expect("meta")
                .file_type()
                .is_symlink()
        );
        assert_eq!(std::fs::read_link(&link).expect("readlink"), Path::new("A"));
    }

    #[tokio::test]
    async fn test_copy_dir_refuses_existing_destination() {
        let dir = tempfile::tempdir().expect("tempdir");
        let src = dir.path().join("a");
        let dst = dir.path().join("b");
        std::fs::create_dir_all(&src).expect("mkdir");
        std::fs::create_dir_all(&dst).expect("mkdir");

        let err = copy_dir(&src, &dst).await.expect_err("exists");
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
    }
}
