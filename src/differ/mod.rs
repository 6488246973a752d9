//! Incremental update writer: rewrite only the blocks that changed.
//!
//! [`StreamDiffer`] walks a freshly encoded image in fixed-size, aligned
//! blocks and compares each one against the same range of the backing
//! store:
//!   - equal block: nothing is written,
//!   - different (or short) block: the whole new block is written in place,
//!   - block past the old end: appended.
//!
//! Afterwards a store longer than the image is truncated to the image length.
//!
//! The reported count is bytes written plus bytes truncated away, so an empty
//! image reports the previous length and an identical image reports zero.
//!
//! # Failure
//! There is no rollback. A write error half-way leaves a mix of old and new
//! blocks on disk and is reported as `IoFailure` carrying the bytes already
//! committed, including any leading part of the block that failed.

use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::ops::Range;

use tracing::debug;

use crate::error::{ArchiveError, Result};

/// Default comparison block: 4 KiB, one disk sector on most systems.
pub const DEFAULT_BLOCK_SIZE: usize = 4096;

/// Largest accepted block size. Larger requests are clamped to this.
pub const MAX_BLOCK_SIZE: usize = 16 * 1024 * 1024;

// ── BackingStore ──────────────────────────────────────────────────────────────

/// Something the differ can read, overwrite, and resize.
pub trait BackingStore: Read + Write + Seek {
    fn set_len(&mut self, len: u64) -> io::Result<()>;

    fn byte_len(&mut self) -> io::Result<u64> {
        self.seek(SeekFrom::End(0))
    }
}

impl BackingStore for File {
    fn set_len(&mut self, len: u64) -> io::Result<()> {
        File::set_len(self, len)
    }
}

impl BackingStore for Cursor<Vec<u8>> {
    fn set_len(&mut self, len: u64) -> io::Result<()> {
        let len = usize::try_from(len)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "length exceeds memory"))?;
        self.get_mut().resize(len, 0);
        Ok(())
    }
}

impl<S: BackingStore + ?Sized> BackingStore for &mut S {
    fn set_len(&mut self, len: u64) -> io::Result<()> {
        (**self).set_len(len)
    }
}

// ── Planning ──────────────────────────────────────────────────────────────────

/// The byte ranges [`StreamDiffer::reconcile`] would write when turning
/// `existing` into `image`. Truncation is not a range and is not listed.
pub fn plan(existing: &[u8], image: &[u8], block_size: usize) -> Vec<Range<u64>> {
    let block_size = block_size.clamp(1, MAX_BLOCK_SIZE);
    image
        .chunks(block_size)
        .enumerate()
        .filter_map(|(i, new_block)| {
            let start = i * block_size;
            let end = (start + new_block.len()).min(existing.len());
            let unchanged = start < existing.len() && existing[start..end] == *new_block;
            (!unchanged).then(|| start as u64..(start + new_block.len()) as u64)
        })
        .collect()
}

// ── StreamDiffer ──────────────────────────────────────────────────────────────

pub struct StreamDiffer<S: BackingStore> {
    store:      S,
    block_size: usize,
    writes:     Vec<Range<u64>>,
    truncated:  u64,
}

impl<S: BackingStore> StreamDiffer<S> {
    pub fn new(store: S) -> Self {
        Self::with_block_size(store, DEFAULT_BLOCK_SIZE)
    }

    /// `block_size` is clamped to `1..=MAX_BLOCK_SIZE`.
    pub fn with_block_size(store: S, block_size: usize) -> Self {
        Self {
            store,
            block_size: block_size.clamp(1, MAX_BLOCK_SIZE),
            writes:     Vec::new(),
            truncated:  0,
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Ranges written by the last [`reconcile`](Self::reconcile), in order.
    pub fn writes(&self) -> &[Range<u64>] {
        &self.writes
    }

    /// Bytes cut from the end of the store by the last reconcile.
    pub fn truncated(&self) -> u64 {
        self.truncated
    }

    pub fn get_ref(&self) -> &S {
        &self.store
    }

    pub fn into_inner(self) -> S {
        self.store
    }

    /// Make the store hold exactly `image`, touching only differing blocks.
    /// Returns the number of bytes modified.
    pub fn reconcile(&mut self, image: &[u8]) -> Result<u64> {
        self.writes.clear();
        self.truncated = 0;

        let old_len = self.store.byte_len()?;
        let new_len = image.len() as u64;
        let mut written: u64 = 0;
        let mut old = vec![0u8; self.block_size];

        for (i, new_block) in image.chunks(self.block_size).enumerate() {
            let offset = (i * self.block_size) as u64;

            if offset < old_len {
                let avail = ((old_len - offset) as usize).min(new_block.len());
                read_at(&mut self.store, offset, &mut old[..avail])
                    .map_err(|e| partial(e, written))?;
                if avail == new_block.len() && old[..avail] == *new_block {
                    continue;
                }
            }

            write_at(&mut self.store, offset, new_block, &mut written)
                .map_err(|e| partial(e, written))?;
            self.writes.push(offset..offset + new_block.len() as u64);
        }

        if old_len > new_len {
            self.store.set_len(new_len).map_err(|e| partial(e, written))?;
            self.truncated = old_len - new_len;
        }
        if written > 0 || self.truncated > 0 {
            self.store.flush().map_err(|e| partial(e, written))?;
        }

        debug!(
            "Reconciled {} -> {} bytes: {} block(s) written, {} byte(s) truncated",
            old_len,
            new_len,
            self.writes.len(),
            self.truncated
        );
        Ok(written + self.truncated)
    }
}

fn read_at<S: Read + Seek>(store: &mut S, offset: u64, buf: &mut [u8]) -> io::Result<()> {
    store.seek(SeekFrom::Start(offset))?;
    store.read_exact(buf)
}

/// Like `write_all`, but every byte the store accepts is added to `written`
/// as it lands, so a failure mid-block is still counted exactly.
fn write_at<S: Write + Seek>(
    store:   &mut S,
    offset:  u64,
    mut buf: &[u8],
    written: &mut u64,
) -> io::Result<()> {
    store.seek(SeekFrom::Start(offset))?;
    while !buf.is_empty() {
        match store.write(buf) {
            Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
            Ok(n) => {
                *written += n as u64;
                buf = &buf[n..];
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

fn partial(source: io::Error, bytes_written: u64) -> ArchiveError {
    ArchiveError::IoFailure { source, bytes_written }
}
