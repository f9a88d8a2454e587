//! Directory copy / move helpers

use std::fs;
use std::io;
use std::path::Path;
use std::time::SystemTime;

/// Recursively copy `src` into `dst`, creating `dst`.
///
/// Symlinks are recreated as links on Unix and skipped elsewhere.
pub(crate) fn copy_dir(src: &Path, dst: &Path) -> io::Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let from = entry.path();
        let to = dst.join(entry.file_name());
        if file_type.is_dir() {
            copy_dir(&from, &to)?;
        } else if file_type.is_symlink() {
            copy_symlink(&from, &to)?;
        } else {
            fs::copy(&from, &to)?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(from: &Path, to: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(fs::read_link(from)?, to)
}

#[cfg(not(unix))]
fn copy_symlink(_from: &Path, _to: &Path) -> io::Result<()> {
    Ok(())
}

/// Move `src` to `dst`, replacing any existing directory at `dst`.
///
/// Renames when possible and falls back to copy-then-delete across
/// filesystems.
pub(crate) fn move_dir(src: &Path, dst: &Path) -> io::Result<()> {
    if dst.exists() {
        fs::remove_dir_all(dst)?;
    }
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)?;
    }
    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(_) => {
            copy_dir(src, dst)?;
            fs::remove_dir_all(src)
        }
    }
}

/// Replace `dst` with a copy of `src`
pub(crate) fn replace_with_copy(src: &Path, dst: &Path) -> io::Result<()> {
    if dst.exists() {
        fs::remove_dir_all(dst)?;
    }
    copy_dir(src, dst)
}

/// Subdirectories of `dir`, or nothing if `dir` does not exist
pub(crate) fn subdirs(dir: &Path) -> io::Result<Vec<fs::DirEntry>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut out = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            out.push(entry);
        }
    }
    out.sort_by_key(|e| e.file_name());
    Ok(out)
}

/// Modification time of `path`
pub(crate) fn modified(path: &Path) -> io::Result<SystemTime> {
    fs::metadata(path)?.modified()
}

/// `path` relative to `root`, with `/` separators
pub(crate) fn relative_display(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
