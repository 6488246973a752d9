//! Container codec: [`Archive`] ⇄ bytes.
//!
//! # Layout
//! ```text
//! "GMAD"                                   identity marker
//! u8                                       format version (3)
//! u64                                      origin id
//! u64                                      timestamp
//! cstr* ""                                 required content, only when version > 1
//! cstr                                     title
//! cstr                                     description document (JSON)
//! cstr                                     author
//! i32                                      addon version
//! { u32 index, cstr path, i64 size, u32 crc }*   file table, 1-based indices
//! u32 0                                    end of file table
//! bytes                                    payloads, in table order
//! u32                                      CRC-32 of everything above
//! ```
//!
//! # Endianness
//! All integers are little-endian. Strings are UTF-8 followed by one NUL.
//!
//! # Determinism
//! [`encode`] has no hidden inputs: the same [`Archive`] always produces the
//! same bytes. The incremental writer relies on this to find unchanged
//! blocks.

use std::collections::HashSet;
use std::io::{self, Read, Write};

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use tracing::{debug, warn};

use crate::archive::{Archive, Identity};
use crate::error::{ArchiveError, Result};
use crate::manifest::Description;

pub const IDENT: &[u8; 4] = b"GMAD";
/// Version written by [`encode`]. Versions `1..=FORMAT_VERSION` decode.
pub const FORMAT_VERSION: u8 = 3;

// ── Encode ────────────────────────────────────────────────────────────────────

/// Serialize `archive` into a complete container image.
///
/// Fails with `InvalidType` when no type has been set and with `EmbeddedNul`
/// when a string field cannot be NUL-terminated.
pub fn encode(archive: &Archive) -> Result<Vec<u8>> {
    let addon_type = archive
        .addon_type()
        .ok_or_else(|| ArchiveError::InvalidType(String::new()))?;

    let description = Description {
        text:       archive.description().to_owned(),
        addon_type: Some(addon_type),
        tags:       archive.tags().to_vec(),
    }
    .to_json()
    .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

    let table_len: usize = archive.entries().iter().map(|e| e.path().len() + 17).sum();
    let mut buf = Vec::with_capacity(
        64 + archive.title().len() + description.len() + archive.author().len()
            + table_len + archive.payload_size() as usize,
    );

    // Header
    buf.write_all(IDENT)?;
    buf.write_u8(FORMAT_VERSION)?;
    let identity = archive.identity();
    buf.write_u64::<LittleEndian>(identity.origin_id)?;
    buf.write_u64::<LittleEndian>(identity.timestamp)?;
    for required in archive.required() {
        write_cstr(&mut buf, "required", required)?;
    }
    write_cstr(&mut buf, "required", "")?;

    // Manifest
    write_cstr(&mut buf, "title", archive.title())?;
    write_cstr(&mut buf, "description", &description)?;
    write_cstr(&mut buf, "author", archive.author())?;
    buf.write_i32::<LittleEndian>(archive.addon_version())?;

    // File table
    for (i, entry) in archive.entries().iter().enumerate() {
        buf.write_u32::<LittleEndian>(i as u32 + 1)?;
        write_cstr(&mut buf, "path", entry.path())?;
        buf.write_i64::<LittleEndian>(entry.size() as i64)?;
        buf.write_u32::<LittleEndian>(entry.crc())?;
    }
    buf.write_u32::<LittleEndian>(0)?;

    // Payload
    for entry in archive.entries() {
        buf.write_all(entry.payload())?;
    }

    let checksum = crc32fast::hash(&buf);
    buf.write_u32::<LittleEndian>(checksum)?;

    debug!("Encoded {} entries into {} bytes", archive.len(), buf.len());
    Ok(buf)
}

/// Encode `archive` and write the image to `writer`. Returns the byte count.
pub fn write_archive<W: Write>(archive: &Archive, mut writer: W) -> Result<u64> {
    let image = encode(archive)?;
    writer.write_all(&image)?;
    Ok(image.len() as u64)
}

fn write_cstr(buf: &mut Vec<u8>, field: &'static str, s: &str) -> Result<()> {
    if s.contains('\0') {
        return Err(ArchiveError::EmbeddedNul { field });
    }
    buf.write_all(s.as_bytes())?;
    buf.write_u8(0)?;
    Ok(())
}

// ── Decode ────────────────────────────────────────────────────────────────────

struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize, what: &str) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.buf.len())
            .ok_or_else(|| {
                ArchiveError::malformed(format!("truncated {what} at offset {}", self.pos))
            })?;
        let bytes = &self.buf[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn u8(&mut self, what: &str) -> Result<u8> {
        Ok(self.take(1, what)?[0])
    }

    fn u32(&mut self, what: &str) -> Result<u32> {
        Ok(LittleEndian::read_u32(self.take(4, what)?))
    }

    fn u64(&mut self, what: &str) -> Result<u64> {
        Ok(LittleEndian::read_u64(self.take(8, what)?))
    }

    fn i32(&mut self, what: &str) -> Result<i32> {
        Ok(LittleEndian::read_i32(self.take(4, what)?))
    }

    fn i64(&mut self, what: &str) -> Result<i64> {
        Ok(LittleEndian::read_i64(self.take(8, what)?))
    }

    fn cstr(&mut self, what: &str) -> Result<String> {
        let rest = &self.buf[self.pos..];
        let len = rest.iter().position(|&b| b == 0).ok_or_else(|| {
            ArchiveError::malformed(format!("unterminated {what} at offset {}", self.pos))
        })?;
        let s = std::str::from_utf8(&rest[..len]).map_err(|_| {
            ArchiveError::malformed(format!("{what} at offset {} is not valid UTF-8", self.pos))
        })?;
        self.pos += len + 1;
        Ok(s.to_owned())
    }
}

struct TableRecord {
    path: String,
    size: usize,
    crc:  u32,
}

/// Parse a complete container image.
///
/// Either the whole image is valid and an [`Archive`] comes back, or an
/// error does; no partially filled archive is ever returned. Entries keep
/// their file-table order. Paths are taken as stored and are not re-checked
/// against the whitelist.
pub fn decode(bytes: &[u8]) -> Result<Archive> {
    let mut r = ByteReader::new(bytes);

    if r.take(IDENT.len(), "identity marker")? != IDENT {
        return Err(ArchiveError::malformed("identity marker mismatch"));
    }
    let version = r.u8("format version")?;
    if !(1..=FORMAT_VERSION).contains(&version) {
        return Err(ArchiveError::malformed(format!("unsupported format version {version}")));
    }
    let identity = Identity {
        origin_id: r.u64("origin id")?,
        timestamp: r.u64("timestamp")?,
    };

    let mut required = Vec::new();
    if version > 1 {
        loop {
            let s = r.cstr("required content")?;
            if s.is_empty() {
                break;
            }
            required.push(s);
        }
    }

    let title         = r.cstr("title")?;
    let description   = r.cstr("description")?;
    let author        = r.cstr("author")?;
    let addon_version = r.i32("addon version")?;

    let mut table: Vec<TableRecord> = Vec::new();
    loop {
        let index = r.u32("file table")?;
        if index == 0 {
            break;
        }
        let expected = table.len() as u64 + 1;
        if u64::from(index) != expected {
            return Err(ArchiveError::malformed(format!(
                "file table index {index} out of sequence (expected {expected})"
            )));
        }
        let path = r.cstr("file path")?;
        let size = r.i64("file size")?;
        let size = usize::try_from(size).map_err(|_| {
            ArchiveError::malformed(format!("invalid size {size} for {path}"))
        })?;
        let crc = r.u32("file checksum")?;
        table.push(TableRecord { path, size, crc });
    }

    let declared = table
        .iter()
        .try_fold(0u64, |acc, rec| acc.checked_add(rec.size as u64))
        .ok_or_else(|| ArchiveError::malformed("declared payload size overflows"))?;
    if declared > r.remaining() as u64 {
        return Err(ArchiveError::malformed(format!(
            "declared payload of {declared} bytes exceeds the {} bytes remaining",
            r.remaining()
        )));
    }

    let mut entries = Vec::with_capacity(table.len());
    let mut seen = HashSet::with_capacity(table.len());
    for rec in table {
        let payload = r.take(rec.size, "payload")?;
        if crc32fast::hash(payload) != rec.crc {
            return Err(ArchiveError::malformed(format!("checksum mismatch for {}", rec.path)));
        }
        if !seen.insert(rec.path.clone()) {
            return Err(ArchiveError::malformed(format!("duplicate path {}", rec.path)));
        }
        entries.push((rec.path, payload.to_vec()));
    }

    let body_len = r.pos;
    let stored = r.u32("trailing checksum")?;
    // Legacy writers leave the archive checksum at zero.
    if stored != 0 {
        let actual = crc32fast::hash(&bytes[..body_len]);
        if stored != actual {
            return Err(ArchiveError::malformed(format!(
                "archive checksum mismatch (stored {stored:08x}, computed {actual:08x})"
            )));
        }
    }
    if r.remaining() > 0 {
        warn!("Ignoring {} byte(s) after the archive checksum", r.remaining());
    }

    let description = Description::parse(&description)?;

    let mut archive = Archive::new();
    archive.set_title(title);
    archive.set_description(description.text);
    archive.set_author(author);
    if let Some(addon_type) = description.addon_type {
        archive.set_addon_type(addon_type);
    }
    archive.set_tags(description.tags.iter().map(|t| t.name()))?;
    archive.set_identity(identity);
    archive.set_required(required);
    archive.set_addon_version(addon_version);
    for (path, payload) in entries {
        archive.push_decoded(path, payload);
    }

    debug!("Decoded {} entries from {} bytes (format version {version})", archive.len(), bytes.len());
    Ok(archive)
}

/// Read a whole container from `reader` and decode it.
pub fn read_archive<R: Read>(mut reader: R) -> Result<Archive> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    decode(&bytes)
}
