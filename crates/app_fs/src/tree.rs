//! Tree operations: move, copy, delete, create and touch

use crate::encoding::encode_text;
use crate::stat::{is_missing, map_io, stat_path};
use crate::{ContentStore, FsError, Result, Stat, Uri};
use filetime::FileTime;
use std::fs;
use std::io::Write;
use std::path::Path;
use walkdir::WalkDir;

/// Options for [`move_entry`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MoveOptions {
    /// Replace an existing target of the same kind
    pub overwrite: bool,
}

/// Move `source` to `target`
///
/// A file never replaces a directory and vice versa, even with `overwrite`.
/// A directory only replaces an empty directory.
pub fn move_entry(source: &Uri, target: &Uri, options: MoveOptions) -> Result<Stat> {
    let source_path = source.to_file_path()?;
    let target_path = target.to_file_path()?;

    let source_stat = stat_path(&source_path, source, false)?;

    if source == target {
        return Ok(source_stat);
    }

    if source_stat.is_directory && source.is_equal_or_parent_of(target) {
        return Err(FsError::InvalidOperation(format!(
            "Cannot move {} into itself",
            source
        )));
    }

    match stat_path(&target_path, target, false) {
        Ok(target_stat) => {
            if target_stat.is_directory != source_stat.is_directory {
                return Err(FsError::TypeConflict {
                    from: source.clone(),
                    to: target.clone(),
                });
            }

            if !options.overwrite {
                return Err(FsError::AlreadyExists(target.clone()));
            }

            if target_stat.is_directory {
                if target_stat.has_children == Some(true) {
                    return Err(FsError::NotEmpty(target.clone()));
                }
                fs::remove_dir(&target_path).map_err(|e| map_io(e, target))?;
            }
        }
        Err(FsError::NotFound(_)) => ensure_parent(&target_path, target)?,
        Err(e) => return Err(e),
    }

    rename_or_copy(&source_path, &target_path)?;
    tracing::info!("Moved: {} -> {}", source, target);

    stat_path(&target_path, target, false)
}

/// Recursively copy `source` to a new location `target`
pub fn copy(source: &Uri, target: &Uri) -> Result<Stat> {
    let source_path = source.to_file_path()?;
    let target_path = target.to_file_path()?;

    let source_stat = stat_path(&source_path, source, false)?;

    if fs::symlink_metadata(&target_path).is_ok() {
        return Err(FsError::AlreadyExists(target.clone()));
    }

    if source_stat.is_directory && source.is_equal_or_parent_of(target) {
        return Err(FsError::InvalidOperation(format!(
            "Cannot copy {} into itself",
            source
        )));
    }

    ensure_parent(&target_path, target)?;

    if source_stat.is_directory {
        copy_dir_recursive(&source_path, &target_path)?;
    } else {
        fs::copy(&source_path, &target_path).map_err(|e| map_io(e, source))?;
    }

    tracing::info!("Copied: {} -> {}", source, target);
    stat_path(&target_path, target, false)
}

/// Create a new file, creating missing parent directories
pub fn create_file(
    uri: &Uri,
    content: Option<&str>,
    encoding: Option<&str>,
    store: &ContentStore,
) -> Result<Stat> {
    let encoding = store.encoding_for(encoding)?;
    let path = uri.to_file_path()?;

    if fs::symlink_metadata(&path).is_ok() {
        return Err(FsError::AlreadyExists(uri.clone()));
    }

    ensure_parent(&path, uri)?;

    let bytes = encode_text(content.unwrap_or_default(), encoding);
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::AlreadyExists => FsError::AlreadyExists(uri.clone()),
            _ => map_io(e, uri),
        })?;
    file.write_all(&bytes)?;
    drop(file);

    tracing::info!("Created file: {} ({} bytes)", uri, bytes.len());
    stat_path(&path, uri, false)
}

/// Create a new folder, creating missing intermediate directories
pub fn create_folder(uri: &Uri) -> Result<Stat> {
    let path = uri.to_file_path()?;

    if fs::symlink_metadata(&path).is_ok() {
        return Err(FsError::AlreadyExists(uri.clone()));
    }

    ensure_parent(&path, uri)?;

    fs::create_dir(&path).map_err(|e| match e.kind() {
        std::io::ErrorKind::AlreadyExists => FsError::AlreadyExists(uri.clone()),
        _ => map_io(e, uri),
    })?;

    tracing::info!("Created directory: {}", uri);
    stat_path(&path, uri, true)
}

/// Create an empty file, or bump the modification time of an existing entry
pub fn touch_file(uri: &Uri, store: &ContentStore) -> Result<Stat> {
    let path = uri.to_file_path()?;

    let before = match stat_path(&path, uri, false) {
        Ok(stat) => stat,
        Err(FsError::NotFound(_)) => return create_file(uri, None, None, store),
        Err(e) => return Err(e),
    };

    filetime::set_file_mtime(&path, FileTime::now()).map_err(|e| map_io(e, uri))?;
    let mut after = stat_path(&path, uri, false)?;

    // Coarse timestamps may swallow the update; step past the old second
    if after.last_modification <= before.last_modification {
        let next_second = before.last_modification.div_euclid(1000) + 1;
        filetime::set_file_mtime(&path, FileTime::from_unix_time(next_second, 0))
            .map_err(|e| map_io(e, uri))?;
        after = stat_path(&path, uri, false)?;
    }

    tracing::debug!("Touched: {} ({} -> {})", uri, before.last_modification, after.last_modification);
    Ok(after)
}

/// Delete a file, or a directory with all of its contents
pub fn delete(uri: &Uri) -> Result<()> {
    let path = uri.to_file_path()?;
    let metadata = fs::symlink_metadata(&path).map_err(|e| map_io(e, uri))?;

    if metadata.is_dir() {
        fs::remove_dir_all(&path)?;
    } else {
        fs::remove_file(&path)?;
    }

    tracing::info!("Deleted: {}", uri);
    Ok(())
}

/// Create the parent directories of `path`
fn ensure_parent(path: &Path, uri: &Uri) -> Result<()> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).map_err(|e| {
        if e.kind() == std::io::ErrorKind::AlreadyExists || is_missing(&e) {
            FsError::NotADirectory(uri.parent().unwrap_or_else(|| uri.clone()))
        } else {
            FsError::Io(e)
        }
    })
}

/// Rename, falling back to copy + delete across file systems
fn rename_or_copy(source: &Path, target: &Path) -> Result<()> {
    match fs::rename(source, target) {
        Ok(()) => Ok(()),
        Err(e) => {
            // Unix: EXDEV = 18, Windows: ERROR_NOT_SAME_DEVICE = 0x11 (17)
            let is_cross_device = match e.raw_os_error() {
                Some(18) => cfg!(unix),
                Some(17) => cfg!(windows),
                _ => false,
            };

            if !is_cross_device {
                return Err(e.into());
            }

            tracing::info!(
                "Cross-filesystem move, using copy+delete: {} -> {}",
                source.display(),
                target.display()
            );
            let file_type = fs::symlink_metadata(source)?.file_type();
            if file_type.is_dir() {
                copy_dir_recursive(source, target)?;
                fs::remove_dir_all(source)?;
            } else {
                if file_type.is_symlink() {
                    copy_symlink(source, target)?;
                } else {
                    fs::copy(source, target)?;
                }
                fs::remove_file(source)?;
            }
            Ok(())
        }
    }
}

/// Recursively copy a directory
///
/// Symlinks inside the tree are recreated, never followed.
fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<()> {
    for entry in WalkDir::new(src).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        let Ok(relative) = entry.path().strip_prefix(src) else {
            continue;
        };
        let dst_path = dst.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&dst_path)?;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &dst_path)?;
        } else {
            fs::copy(entry.path(), &dst_path)?;
        }
    }

    Ok(())
}

/// Create a link at `dst` pointing where `src` points
#[cfg(unix)]
fn copy_symlink(src: &Path, dst: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(fs::read_link(src)?, dst)
}

#[cfg(windows)]
fn copy_symlink(src: &Path, dst: &Path) -> std::io::Result<()> {
    let link = fs::read_link(src)?;
    if fs::metadata(src).map(|m| m.is_dir()).unwrap_or(false) {
        std::os::windows::fs::symlink_dir(link, dst)
    } else {
        std::os::windows::fs::symlink_file(link, dst)
    }
}
