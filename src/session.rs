//! Caller-owned binding of one [`Archive`] to one file on disk.
//!
//! A [`Session`] replaces any notion of a process-wide "current addon": the
//! caller creates or opens one, mutates its archive, calls
//! [`Session::persist`] whenever the changes should reach the disk, and drops
//! it (or calls [`Session::close`]) to discard unsaved state.
//!
//! The backing file is only open for the duration of a single `create`,
//! `open` or `persist` call.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::archive::Archive;
use crate::codec;
use crate::differ::{StreamDiffer, DEFAULT_BLOCK_SIZE};
use crate::error::{ArchiveError, Result};
use crate::whitelist;

/// Extension forced onto newly created archives.
pub const EXTENSION: &str = "gma";

// ── SessionOptions ────────────────────────────────────────────────────────────

/// Configuration for [`Session::create`] and [`Session::open`].
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Comparison block used when persisting.
    pub block_size: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self { block_size: DEFAULT_BLOCK_SIZE }
    }
}

// ── FolderReport ──────────────────────────────────────────────────────────────

/// Outcome of [`Session::add_folder`].
#[derive(Debug, Default)]
pub struct FolderReport {
    /// In-archive paths that were added, in walk order.
    pub added:   Vec<String>,
    /// Files that were refused, with the reason.
    pub skipped: Vec<(PathBuf, ArchiveError)>,
}

// ── Session ───────────────────────────────────────────────────────────────────

pub struct Session {
    path:    PathBuf,
    archive: Archive,
    options: SessionOptions,
}

impl Session {
    /// Write `archive` to a new file and bind it.
    ///
    /// The path gets a `.gma` extension if it does not already have one. An
    /// existing file is never overwritten. Returns the session and the
    /// number of bytes written.
    pub fn create<P: AsRef<Path>>(
        path:    P,
        archive: Archive,
        options: SessionOptions,
    ) -> Result<(Self, u64)> {
        let path = with_extension(path.as_ref());
        // Validate before anything touches the disk.
        let image = codec::encode(&archive)?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| match e.kind() {
                io::ErrorKind::AlreadyExists => ArchiveError::AlreadyExists(path.clone()),
                _ => e.into(),
            })?;
        let written = reconcile(file, &image, options.block_size)?;

        info!("Created {} ({} bytes)", path.display(), written);
        Ok((Self { path, archive, options }, written))
    }

    /// Load and bind an existing archive.
    pub fn open<P: AsRef<Path>>(path: P, options: SessionOptions) -> Result<Self> {
        let path = path.as_ref().to_owned();
        let archive = codec::read_archive(File::open(&path)?)?;
        info!("Opened {} ({} entries)", path.display(), archive.len());
        Ok(Self { path, archive, options })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn archive(&self) -> &Archive {
        &self.archive
    }

    pub fn archive_mut(&mut self) -> &mut Archive {
        &mut self.archive
    }

    /// Encode the archive and reconcile it with the file on disk.
    /// Returns the number of bytes modified.
    pub fn persist(&mut self) -> Result<u64> {
        let image = codec::encode(&self.archive)?;
        let file = OpenOptions::new().read(true).write(true).open(&self.path)?;
        let modified = reconcile(file, &image, self.options.block_size)?;
        info!("Saved {} ({} bytes modified)", self.path.display(), modified);
        Ok(modified)
    }

    /// Drop the in-memory archive without persisting.
    pub fn close(self) {
        debug!("Closed {}", self.path.display());
    }

    // ── File-system ingestion ───────────────────────────────────────────────

    /// Read a file from disk and add it.
    ///
    /// The in-archive path is the part of `file` that a whitelist pattern
    /// recognises (see [`whitelist::locate`]), so both `lua/init.lua` and
    /// `/home/me/addon/lua/init.lua` land as `lua/init.lua`. Admission is
    /// checked before the file is read. Returns the in-archive path.
    pub fn add_file<P: AsRef<Path>>(&mut self, file: P) -> Result<String> {
        let file = file.as_ref();
        let display = file.to_string_lossy().replace('\\', "/");
        let candidate = whitelist::locate(&display).unwrap_or(&display);

        let path = Archive::admit(candidate)?;
        if self.archive.contains(&path) {
            return Err(ArchiveError::DuplicatePath(path));
        }
        let bytes = fs::read(file)?;
        let entry = self.archive.add_entry(&path, bytes)?;
        Ok(entry.path().to_owned())
    }

    /// Add every file under `dir`, recursively, in sorted order.
    ///
    /// Files refused by admission or already present are collected in the
    /// report; I/O errors abort the walk.
    pub fn add_folder<P: AsRef<Path>>(&mut self, dir: P) -> Result<FolderReport> {
        let mut files = Vec::new();
        walk(dir.as_ref(), &mut files)?;

        let mut report = FolderReport::default();
        for file in files {
            match self.add_file(&file) {
                Ok(path) => report.added.push(path),
                Err(e @ (ArchiveError::NotWhitelisted(_)
                    | ArchiveError::Ignored(_)
                    | ArchiveError::DuplicatePath(_))) => {
                    debug!("Skipping {}: {}", file.display(), e);
                    report.skipped.push((file, e));
                }
                Err(e) => return Err(e),
            }
        }
        info!(
            "Added {} file(s) from {}, skipped {}",
            report.added.len(),
            dir.as_ref().display(),
            report.skipped.len()
        );
        Ok(report)
    }
}

fn reconcile(file: File, image: &[u8], block_size: usize) -> Result<u64> {
    let mut differ = StreamDiffer::with_block_size(file, block_size);
    let modified = differ.reconcile(image)?;
    differ
        .into_inner()
        .sync_all()
        .map_err(|source| ArchiveError::IoFailure { source, bytes_written: modified })?;
    Ok(modified)
}

fn with_extension(path: &Path) -> PathBuf {
    match path.extension() {
        Some(ext) if ext.eq_ignore_ascii_case(EXTENSION) => path.to_owned(),
        _ => path.with_extension(EXTENSION),
    }
}

/// Collect the files under `dir` in sorted order. Symlinked directories are
/// not followed, so a link back up the tree cannot loop; symlinked files are
/// kept.
fn walk(dir: &Path, out: &mut Vec<PathBuf>) -> io::Result<()> {
    let mut children = fs::read_dir(dir)?
        .map(|entry| entry.and_then(|e| Ok((e.path(), e.file_type()?))))
        .collect::<io::Result<Vec<_>>>()?;
    children.sort_by(|a, b| a.0.cmp(&b.0));
    for (child, kind) in children {
        if kind.is_dir() {
            walk(&child, out)?;
        } else if kind.is_symlink() && child.is_dir() {
            warn!("Not following directory link {}", child.display());
        } else {
            out.push(child);
        }
    }
    Ok(())
}
