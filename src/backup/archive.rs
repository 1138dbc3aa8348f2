// backuptool/src/backup/archive.rs
use flate2::Compression;
use flate2::write::GzEncoder;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tar::Builder;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::errors::{BackupError, Result};

/// Creates a GZipped TAR archive from a source directory.
///
/// The archive holds a single root directory entry named after the last
/// component of `source_dir`, followed by one entry per regular file with its
/// path relative to that root. Sub-directories get no entries of their own.
/// Symlinks and special files are skipped with a warning; regular files keep
/// their mode bits.
///
/// File contents are streamed one at a time, and the archive is flushed and
/// synced before returning. On error the partial archive is removed.
///
/// # Arguments
/// * `source_dir` - The directory whose contents will be archived.
/// * `archive_dest_path` - The full path where the `.tar.gz` archive will be created.
///
/// # Returns
/// Path to the created archive file.
pub fn tar_directory(source_dir: &Path, archive_dest_path: &Path) -> Result<PathBuf> {
    if !source_dir.is_dir() {
        return Err(BackupError::io(
            "Source for archival is not a directory:",
            source_dir,
            io::Error::new(io::ErrorKind::NotFound, "not a directory"),
        ));
    }
    ensure_parent(archive_dest_path)?;

    info!(
        "Creating tar.gz archive from {} to {}",
        source_dir.display(),
        archive_dest_path.display()
    );

    let result = write_directory_tar(source_dir, archive_dest_path);
    finish_or_discard(result, archive_dest_path)?;

    info!("✓ Tar.gz archive created successfully at {}", archive_dest_path.display());
    Ok(archive_dest_path.to_path_buf())
}

fn write_directory_tar(source_dir: &Path, archive_dest_path: &Path) -> Result<()> {
    let root_name = archive_root_name(source_dir)?;

    let archive_file = File::create(archive_dest_path)
        .map_err(|e| BackupError::io("Failed to create archive file", archive_dest_path, e))?;
    let mut tar_builder = Builder::new(GzEncoder::new(archive_file, Compression::default()));

    tar_builder
        .append_dir(&root_name, source_dir)
        .map_err(|e| BackupError::io("Failed to append root directory", source_dir, e))?;

    for entry in WalkDir::new(source_dir).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(|e| BackupError::io("Failed to walk directory", source_dir, e.into()))?;
        let path = entry.path();
        let file_type = entry.file_type();

        if file_type.is_dir() {
            continue;
        }
        if !file_type.is_file() {
            warn!(path = %path.display(), "Skipping symlink or special file");
            continue;
        }

        let relative = path
            .strip_prefix(source_dir)
            .map_err(|e| BackupError::io("Failed to strip prefix from", path, io::Error::other(e)))?;
        let name = root_name.join(relative);

        tar_builder
            .append_path_with_name(path, &name)
            .map_err(|e| BackupError::io("Failed to append file to archive:", path, e))?;
    }

    let encoder = tar_builder
        .into_inner()
        .map_err(|e| BackupError::io("Failed to finish tar stream for", archive_dest_path, e))?;
    let archive_file = encoder
        .finish()
        .map_err(|e| BackupError::io("Failed to finish Gzip encoding for", archive_dest_path, e))?;
    archive_file
        .sync_all()
        .map_err(|e| BackupError::io("Failed to sync archive", archive_dest_path, e))
}

/// Gzips a single file next to itself (`dump.sql` -> `dump.sql.gz`).
///
/// The source file is left in place; callers decide when to remove it.
pub fn compress_file(source_path: &Path) -> Result<PathBuf> {
    let mut target = source_path.as_os_str().to_owned();
    target.push(".gz");
    let target = PathBuf::from(target);

    info!("Compressing {} to {}", source_path.display(), target.display());

    let result = (|| -> Result<()> {
        let mut input = File::open(source_path)
            .map_err(|e| BackupError::io("Failed to open file for compression", source_path, e))?;
        let output = File::create(&target)
            .map_err(|e| BackupError::io("Failed to create compressed file", &target, e))?;
        let mut encoder = GzEncoder::new(output, Compression::default());
        io::copy(&mut input, &mut encoder)
            .map_err(|e| BackupError::io("Failed to compress", source_path, e))?;
        let output = encoder
            .finish()
            .map_err(|e| BackupError::io("Failed to finish Gzip encoding for", &target, e))?;
        output
            .sync_all()
            .map_err(|e| BackupError::io("Failed to sync compressed file", &target, e))
    })();
    finish_or_discard(result, &target)?;

    Ok(target)
}

/// Packs a whole directory, sub-directories included, into a gzipped tar.
///
/// The layout matches `tar -czf <target> -C <parent> <base>`: every entry is
/// prefixed with the directory's own name. Used for dump tools that write a
/// directory tree rather than a single file.
pub fn compress_directory(source_dir: &Path, archive_dest_path: &Path) -> Result<PathBuf> {
    if !source_dir.is_dir() {
        return Err(BackupError::io(
            "Dump output is not a directory:",
            source_dir,
            io::Error::new(io::ErrorKind::NotFound, "not a directory"),
        ));
    }
    ensure_parent(archive_dest_path)?;

    info!(
        "Packing directory {} into {}",
        source_dir.display(),
        archive_dest_path.display()
    );

    let result = (|| -> Result<()> {
        let root_name = archive_root_name(source_dir)?;
        let archive_file = File::create(archive_dest_path)
            .map_err(|e| BackupError::io("Failed to create archive file", archive_dest_path, e))?;
        let mut tar_builder = Builder::new(GzEncoder::new(archive_file, Compression::default()));
        tar_builder.follow_symlinks(false);
        tar_builder
            .append_dir_all(&root_name, source_dir)
            .map_err(|e| BackupError::io("Failed to append directory", source_dir, e))?;
        let encoder = tar_builder
            .into_inner()
            .map_err(|e| BackupError::io("Failed to finish tar stream for", archive_dest_path, e))?;
        let archive_file = encoder
            .finish()
            .map_err(|e| BackupError::io("Failed to finish Gzip encoding for", archive_dest_path, e))?;
        archive_file
            .sync_all()
            .map_err(|e| BackupError::io("Failed to sync archive", archive_dest_path, e))
    })();
    finish_or_discard(result, archive_dest_path)?;

    Ok(archive_dest_path.to_path_buf())
}

/// Extracts a GZipped TAR archive to a destination directory.
///
/// # Arguments
/// * `archive_path` - Path to the `.tar.gz` archive file.
/// * `extract_to_dir` - The directory where the contents will be extracted.
///
/// # Returns
/// Path to the directory where files were extracted.
#[cfg(test)]
pub fn extract_tar_gz_archive(archive_path: &Path, extract_to_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(extract_to_dir)
        .map_err(|e| BackupError::io("Failed to create extraction directory", extract_to_dir, e))?;

    let archive_file = File::open(archive_path)
        .map_err(|e| BackupError::io("Failed to open archive file", archive_path, e))?;
    let mut archive = tar::Archive::new(flate2::read::GzDecoder::new(archive_file));
    archive
        .unpack(extract_to_dir)
        .map_err(|e| BackupError::io("Failed to unpack archive", archive_path, e))?;

    Ok(extract_to_dir.to_path_buf())
}

fn archive_root_name(source_dir: &Path) -> Result<PathBuf> {
    let canonical;
    let dir = if source_dir.file_name().is_some() {
        source_dir
    } else {
        canonical = source_dir
            .canonicalize()
            .map_err(|e| BackupError::io("Failed to resolve", source_dir, e))?;
        canonical.as_path()
    };
    Ok(dir
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("root")))
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)
                .map_err(|e| BackupError::io("Failed to create parent directory for archive", parent, e))?;
        }
    }
    Ok(())
}

/// A half-written archive must never be picked up for upload.
fn finish_or_discard(result: Result<()>, target: &Path) -> Result<()> {
    if result.is_err() && target.exists() {
        if let Err(e) = fs::remove_file(target) {
            warn!(path = %target.display(), error = %e, "Failed to remove partial archive");
        }
    }
    result
}
