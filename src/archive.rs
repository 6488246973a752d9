//! In-memory addon model, the primary embedding surface.
//!
//! ```
//! use gmapack::archive::Archive;
//! use gmapack::codec;
//!
//! let mut addon = Archive::new();
//! addon.set_title("My addon");
//! addon.set_type("tool")?;
//! addon.add_entry("lua/autorun/hello.lua", b"print('hi')".to_vec())?;
//!
//! let image = codec::encode(&addon)?;
//! assert_eq!(codec::decode(&image)?, addon);
//! # Ok::<(), gmapack::ArchiveError>(())
//! ```
//!
//! An [`Archive`] knows nothing about files on disk; binding one to a path is
//! the job of [`crate::session::Session`].

use tracing::debug;

use crate::error::{ArchiveError, Result};
use crate::manifest::{parse_tags, AddonType, MetadataField, Tag, TagsTruncated};
use crate::whitelist;

/// Author written when the caller never sets one.
pub const DEFAULT_AUTHOR: &str = "Author Name";

/// Addon version field written for locally authored archives.
pub const DEFAULT_ADDON_VERSION: i32 = 1;

// ── Identity ──────────────────────────────────────────────────────────────────

/// Numeric identity fields stored in the container header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Identity {
    /// Account id of whoever built the archive. Zero when unknown.
    pub origin_id: u64,
    /// Creation time, seconds since the Unix epoch.
    pub timestamp: u64,
}

// ── ContentEntry ──────────────────────────────────────────────────────────────

/// One named payload inside an archive.
///
/// The size is always derived from the payload, so the two cannot disagree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentEntry {
    path:    String,
    payload: Vec<u8>,
}

impl ContentEntry {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.payload.len() as u64
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Decoded paths keep their stored case, so they are normalized before
    /// comparing.
    fn is_named(&self, raw: &str, normalized: &str) -> bool {
        self.path == raw || normalize_path(&self.path) == normalized
    }

    /// CRC-32 of the payload, as stored in the file table.
    pub fn crc(&self) -> u32 {
        crc32fast::hash(&self.payload)
    }
}

/// Normalize a candidate entry path: forward slashes, no leading `./` or
/// `/`, lower case.
pub fn normalize_path(path: &str) -> String {
    let path = path.replace('\\', "/");
    let mut rest = path.as_str();
    loop {
        if let Some(r) = rest.strip_prefix("./") {
            rest = r;
        } else if let Some(r) = rest.strip_prefix('/') {
            rest = r;
        } else {
            break;
        }
    }
    rest.to_lowercase()
}

// ── Archive ───────────────────────────────────────────────────────────────────

/// Manifest plus an ordered set of content entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Archive {
    title:         String,
    description:   String,
    author:        String,
    addon_type:    Option<AddonType>,
    tags:          Vec<Tag>,
    identity:      Identity,
    required:      Vec<String>,
    addon_version: i32,
    entries:       Vec<ContentEntry>,
}

impl Default for Archive {
    fn default() -> Self {
        Self::new()
    }
}

impl Archive {
    /// An empty archive with no type set and the default author.
    pub fn new() -> Self {
        Self {
            title:         String::new(),
            description:   String::new(),
            author:        DEFAULT_AUTHOR.to_owned(),
            addon_type:    None,
            tags:          Vec::new(),
            identity:      Identity::default(),
            required:      Vec::new(),
            addon_version: DEFAULT_ADDON_VERSION,
            entries:       Vec::new(),
        }
    }

    // ── Entries ─────────────────────────────────────────────────────────────

    /// Check that `path` may enter the archive and return its normalized
    /// form. The ignore list is consulted before the whitelist. Does not
    /// look for duplicates.
    pub fn admit(path: &str) -> Result<String> {
        let normalized = normalize_path(path);
        if whitelist::is_ignored(&normalized) {
            return Err(ArchiveError::Ignored(normalized));
        }
        if whitelist::classify(&normalized).is_none() {
            return Err(ArchiveError::NotWhitelisted(normalized));
        }
        Ok(normalized)
    }

    /// Append a new entry. Nothing is modified when this fails.
    pub fn add_entry(&mut self, path: &str, payload: impl Into<Vec<u8>>) -> Result<&ContentEntry> {
        let path = Self::admit(path)?;
        if self.contains(&path) {
            return Err(ArchiveError::DuplicatePath(path));
        }
        let payload = payload.into();
        debug!("Adding {} ({} bytes)", path, payload.len());
        self.entries.push(ContentEntry { path, payload });
        Ok(&self.entries[self.entries.len() - 1])
    }

    /// Append an entry read back from a container. Admission has already
    /// happened when the archive was written, so it is not repeated here.
    pub(crate) fn push_decoded(&mut self, path: String, payload: Vec<u8>) {
        self.entries.push(ContentEntry { path, payload });
    }

    /// Remove an entry, keeping the order of the rest.
    pub fn remove_entry(&mut self, path: &str) -> Result<ContentEntry> {
        let wanted = normalize_path(path);
        let pos = self
            .entries
            .iter()
            .position(|e| e.is_named(path, &wanted))
            .ok_or_else(|| ArchiveError::NotFound(path.to_owned()))?;
        debug!("Removing {}", self.entries[pos].path);
        Ok(self.entries.remove(pos))
    }

    pub fn entries(&self) -> &[ContentEntry] {
        &self.entries
    }

    pub fn entry(&self, path: &str) -> Option<&ContentEntry> {
        let wanted = normalize_path(path);
        self.entries.iter().find(|e| e.is_named(path, &wanted))
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entry(path).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of all payload sizes.
    pub fn payload_size(&self) -> u64 {
        self.entries.iter().map(ContentEntry::size).sum()
    }

    // ── Manifest ────────────────────────────────────────────────────────────

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn set_author(&mut self, author: impl Into<String>) {
        self.author = author.into();
    }

    pub fn addon_type(&self) -> Option<AddonType> {
        self.addon_type
    }

    /// Set the type from its name. Unknown names leave the type unchanged.
    pub fn set_type(&mut self, value: &str) -> Result<()> {
        self.addon_type = Some(value.parse()?);
        Ok(())
    }

    pub fn set_addon_type(&mut self, addon_type: AddonType) {
        self.addon_type = Some(addon_type);
    }

    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    /// Replace the tag list.
    ///
    /// Fails with `InvalidTag`, leaving the tags untouched, if any value is
    /// not a known tag. Only the first two distinct tags are kept; when more
    /// are given the overflow is reported through [`TagsTruncated`].
    pub fn set_tags<I, S>(&mut self, values: I) -> Result<Option<TagsTruncated>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let (tags, warning) = parse_tags(values)?;
        self.tags = tags;
        Ok(warning)
    }

    pub fn identity(&self) -> Identity {
        self.identity
    }

    pub fn set_identity(&mut self, identity: Identity) {
        self.identity = identity;
    }

    /// Paths of content this addon depends on. Always empty for locally
    /// authored archives; preserved when a container is decoded.
    pub fn required(&self) -> &[String] {
        &self.required
    }

    pub(crate) fn set_required(&mut self, required: Vec<String>) {
        self.required = required;
    }

    pub fn addon_version(&self) -> i32 {
        self.addon_version
    }

    pub fn set_addon_version(&mut self, version: i32) {
        self.addon_version = version;
    }

    // ── Field accessor ──────────────────────────────────────────────────────

    /// Read a manifest field as display text. Tags are space separated; an
    /// unset type reads as the empty string.
    pub fn get(&self, field: MetadataField) -> String {
        match field {
            MetadataField::Author      => self.author.clone(),
            MetadataField::Description => self.description.clone(),
            MetadataField::Title       => self.title.clone(),
            MetadataField::Type        => self.addon_type.map(|t| t.name().to_owned()).unwrap_or_default(),
            MetadataField::Tags        => {
                self.tags.iter().map(|t| t.name()).collect::<Vec<_>>().join(" ")
            }
        }
    }

    /// Write a manifest field from text. Tags are split on whitespace.
    pub fn set(&mut self, field: MetadataField, value: &str) -> Result<Option<TagsTruncated>> {
        match field {
            MetadataField::Author      => self.set_author(value),
            MetadataField::Description => self.set_description(value),
            MetadataField::Title       => self.set_title(value),
            MetadataField::Type        => self.set_type(value)?,
            MetadataField::Tags        => return self.set_tags(value.split_whitespace()),
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_archive_defaults() {
        let a = Archive::new();
        assert!(a.is_empty());
        assert_eq!(a.author(), DEFAULT_AUTHOR);
        assert_eq!(a.addon_type(), None);
        assert_eq!(a.addon_version(), DEFAULT_ADDON_VERSION);
    }

    #[test]
    fn add_entry_normalizes_and_records_size() {
        let mut a = Archive::new();
        let e = a.add_entry(r".\Lua\Autorun\Init.lua", b"print(1)".to_vec()).unwrap();
        assert_eq!(e.path(), "lua/autorun/init.lua");
        assert_eq!(e.size(), 8);
        assert_eq!(e.crc(), crc32fast::hash(b"print(1)"));
    }

    #[test]
    fn duplicate_path_is_rejected_without_mutation() {
        let mut a = Archive::new();
        a.add_entry("lua/init.lua", b"a".to_vec()).unwrap();
        let before = a.clone();
        assert!(matches!(
            a.add_entry("LUA/init.lua", b"b".to_vec()),
            Err(ArchiveError::DuplicatePath(p)) if p == "lua/init.lua"
        ));
        assert_eq!(a, before);
    }

    #[test]
    fn non_whitelisted_path_is_rejected_without_mutation() {
        let mut a = Archive::new();
        assert!(matches!(
            a.add_entry("evil/payload.exe", b"MZ".to_vec()),
            Err(ArchiveError::NotWhitelisted(_))
        ));
        assert!(a.is_empty());
    }

    #[test]
    fn ignore_list_wins_over_whitelist() {
        let mut a = Archive::new();
        // Whitelisted by materials/*.png, but also ignored.
        assert!(matches!(
            a.add_entry("materials/.git/x.png", vec![0]),
            Err(ArchiveError::Ignored(_))
        ));
        assert!(matches!(a.add_entry("addon.json", vec![]), Err(ArchiveError::Ignored(_))));
        assert!(a.is_empty());
    }

    #[test]
    fn remove_entry_keeps_order() {
        let mut a = Archive::new();
        for name in ["lua/a.lua", "lua/b.lua", "lua/c.lua"] {
            a.add_entry(name, name.as_bytes().to_vec()).unwrap();
        }
        let removed = a.remove_entry("lua/b.lua").unwrap();
        assert_eq!(removed.into_payload(), b"lua/b.lua".to_vec());
        let paths: Vec<_> = a.entries().iter().map(|e| e.path()).collect();
        assert_eq!(paths, ["lua/a.lua", "lua/c.lua"]);
        assert!(matches!(a.remove_entry("lua/b.lua"), Err(ArchiveError::NotFound(_))));
    }

    #[test]
    fn decoded_mixed_case_path_blocks_lowercase_duplicate() {
        let mut a = Archive::new();
        a.push_decoded("Lua/A.lua".to_owned(), b"old".to_vec());
        assert!(a.contains("lua/a.lua"));
        assert!(matches!(
            a.add_entry("lua/a.lua", b"new".to_vec()),
            Err(ArchiveError::DuplicatePath(p)) if p == "lua/a.lua"
        ));
        assert_eq!(a.len(), 1);
        assert_eq!(a.remove_entry("lua/a.lua").unwrap().path(), "Lua/A.lua");
    }

    #[test]
    fn set_type_validates() {
        let mut a = Archive::new();
        a.set_type("Weapon").unwrap();
        assert_eq!(a.addon_type(), Some(AddonType::Weapon));
        assert!(matches!(a.set_type("boat"), Err(ArchiveError::InvalidType(_))));
        assert_eq!(a.addon_type(), Some(AddonType::Weapon));
    }

    #[test]
    fn set_tags_keeps_first_two_and_warns() {
        let mut a = Archive::new();
        let warning = a.set_tags(["Fun", "Build", "Roleplay"]).unwrap();
        assert_eq!(a.tags(), &[Tag::Fun, Tag::Build]);
        assert_eq!(warning.unwrap().dropped, vec![Tag::Roleplay]);
    }

    #[test]
    fn invalid_tag_leaves_tags_untouched() {
        let mut a = Archive::new();
        a.set_tags(["water"]).unwrap();
        assert!(matches!(a.set_tags(["fun", "bogus"]), Err(ArchiveError::InvalidTag(_))));
        assert_eq!(a.tags(), &[Tag::Water]);
    }

    #[test]
    fn field_accessor() {
        let mut a = Archive::new();
        a.set(MetadataField::Title, "Hover boards").unwrap();
        a.set(MetadataField::Type, "vehicle").unwrap();
        let warning = a.set(MetadataField::Tags, "fun  scenic").unwrap();
        assert!(warning.is_none());
        assert_eq!(a.get(MetadataField::Title), "Hover boards");
        assert_eq!(a.get(MetadataField::Type), "vehicle");
        assert_eq!(a.get(MetadataField::Tags), "fun scenic");
        assert_eq!(a.get(MetadataField::Author), DEFAULT_AUTHOR);
    }

    #[test]
    fn normalize_path_variants() {
        assert_eq!(normalize_path("/lua/x.lua"), "lua/x.lua");
        assert_eq!(normalize_path("././Lua\\X.LUA"), "lua/x.lua");
        assert_eq!(normalize_path("maps/gm_flat.bsp"), "maps/gm_flat.bsp");
    }
}
