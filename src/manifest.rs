//! Manifest vocabulary: addon types, tags, metadata fields, and the
//! structured description document stored in the container.
//!
//! The container has a single "description" string slot. It carries a small
//! JSON document holding the free-text description together with the type
//! and tags:
//!
//! ```text
//! {"description":"A cool addon","type":"tool","tags":["fun","build"]}
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::error::{ArchiveError, Result};

/// Maximum number of tags an addon may carry.
pub const MAX_TAGS: usize = 2;

// ── AddonType ─────────────────────────────────────────────────────────────────

/// What kind of content an addon provides. Exactly one per addon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddonType {
    Gamemode,
    Map,
    Weapon,
    Vehicle,
    Npc,
    Entity,
    Tool,
    Effects,
    Model,
    ServerContent,
}

impl AddonType {
    pub const ALL: [AddonType; 10] = [
        AddonType::Gamemode,
        AddonType::Map,
        AddonType::Weapon,
        AddonType::Vehicle,
        AddonType::Npc,
        AddonType::Entity,
        AddonType::Tool,
        AddonType::Effects,
        AddonType::Model,
        AddonType::ServerContent,
    ];

    /// Canonical spelling, as written to disk.
    pub fn name(self) -> &'static str {
        match self {
            AddonType::Gamemode      => "gamemode",
            AddonType::Map           => "map",
            AddonType::Weapon        => "weapon",
            AddonType::Vehicle       => "vehicle",
            AddonType::Npc           => "npc",
            AddonType::Entity        => "entity",
            AddonType::Tool          => "tool",
            AddonType::Effects       => "effects",
            AddonType::Model         => "model",
            AddonType::ServerContent => "servercontent",
        }
    }
}

impl FromStr for AddonType {
    type Err = ArchiveError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        AddonType::ALL
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ArchiveError::InvalidType(s.to_owned()))
    }
}

impl fmt::Display for AddonType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── Tag ───────────────────────────────────────────────────────────────────────

/// Free classification tags. An addon carries at most [`MAX_TAGS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    Fun,
    Roleplay,
    Scenic,
    Movie,
    Realism,
    Cartoon,
    Water,
    Comic,
    Build,
}

impl Tag {
    pub const ALL: [Tag; 9] = [
        Tag::Fun,
        Tag::Roleplay,
        Tag::Scenic,
        Tag::Movie,
        Tag::Realism,
        Tag::Cartoon,
        Tag::Water,
        Tag::Comic,
        Tag::Build,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Tag::Fun      => "fun",
            Tag::Roleplay => "roleplay",
            Tag::Scenic   => "scenic",
            Tag::Movie    => "movie",
            Tag::Realism  => "realism",
            Tag::Cartoon  => "cartoon",
            Tag::Water    => "water",
            Tag::Comic    => "comic",
            Tag::Build    => "build",
        }
    }
}

impl FromStr for Tag {
    type Err = ArchiveError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        Tag::ALL
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ArchiveError::InvalidTag(s.to_owned()))
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Returned by tag setters when more than [`MAX_TAGS`] tags were supplied.
/// Not an error: the first tags are kept and the rest are dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct TagsTruncated {
    pub kept:    Vec<Tag>,
    pub dropped: Vec<Tag>,
}

impl fmt::Display for TagsTruncated {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "More than {MAX_TAGS} tags specified. Only the first {MAX_TAGS} are saved; dropped:")?;
        for tag in &self.dropped {
            write!(f, " {tag}")?;
        }
        Ok(())
    }
}

/// Parse, de-duplicate and cap a tag list.
///
/// Every value is validated before anything is dropped, so an invalid tag in
/// the overflow still fails the whole call.
pub(crate) fn parse_tags<I, S>(values: I) -> Result<(Vec<Tag>, Option<TagsTruncated>)>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut tags: Vec<Tag> = Vec::new();
    for value in values {
        let value = value.as_ref();
        if value.trim().is_empty() {
            continue;
        }
        let tag: Tag = value.parse()?;
        if !tags.contains(&tag) {
            tags.push(tag);
        }
    }

    if tags.len() <= MAX_TAGS {
        return Ok((tags, None));
    }
    let dropped = tags.split_off(MAX_TAGS);
    let warning = TagsTruncated { kept: tags.clone(), dropped };
    warn!("{warning}");
    Ok((tags, Some(warning)))
}

// ── MetadataField ─────────────────────────────────────────────────────────────

/// The manifest fields a caller can read and write by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetadataField {
    Author,
    Description,
    Tags,
    Title,
    Type,
}

impl MetadataField {
    pub const ALL: [MetadataField; 5] = [
        MetadataField::Author,
        MetadataField::Description,
        MetadataField::Tags,
        MetadataField::Title,
        MetadataField::Type,
    ];

    pub fn name(self) -> &'static str {
        match self {
            MetadataField::Author      => "author",
            MetadataField::Description => "description",
            MetadataField::Tags        => "tags",
            MetadataField::Title       => "title",
            MetadataField::Type        => "type",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown metadata field {0:?}. The valid fields are: author description tags title type")]
pub struct UnknownField(pub String);

impl FromStr for MetadataField {
    type Err = UnknownField;

    fn from_str(s: &str) -> std::result::Result<Self, UnknownField> {
        MetadataField::ALL
            .into_iter()
            .find(|f| f.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownField(s.to_owned()))
    }
}

impl fmt::Display for MetadataField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── Description document ──────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize, Default)]
struct DescriptionDoc {
    #[serde(default)]
    description: String,
    #[serde(default, rename = "type")]
    addon_type:  String,
    #[serde(default)]
    tags:        Vec<String>,
}

/// Decoded form of the description slot.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) struct Description {
    pub text:       String,
    pub addon_type: Option<AddonType>,
    pub tags:       Vec<Tag>,
}

impl Description {
    /// Render the JSON document. Field order is fixed, so the output is
    /// deterministic.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&DescriptionDoc {
            description: self.text.clone(),
            addon_type:  self.addon_type.map(|t| t.name().to_owned()).unwrap_or_default(),
            tags:        self.tags.iter().map(|t| t.name().to_owned()).collect(),
        })
    }

    /// Parse the description slot. Text that is not a JSON document is kept
    /// verbatim as the description, with no type and no tags.
    pub fn parse(raw: &str) -> Result<Self> {
        let doc: DescriptionDoc = match serde_json::from_str(raw) {
            Ok(doc) => doc,
            Err(_)  => return Ok(Self { text: raw.to_owned(), ..Self::default() }),
        };

        let addon_type = match doc.addon_type.trim() {
            "" => None,
            t  => Some(t.parse()?),
        };
        let (tags, _) = parse_tags(&doc.tags)?;

        Ok(Self { text: doc.description, addon_type, tags })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_parsing_is_case_insensitive() {
        assert_eq!("Tool".parse::<AddonType>().unwrap(), AddonType::Tool);
        assert_eq!("SERVERCONTENT".parse::<AddonType>().unwrap(), AddonType::ServerContent);
        assert!(matches!(
            "spaceship".parse::<AddonType>(),
            Err(ArchiveError::InvalidType(t)) if t == "spaceship"
        ));
    }

    #[test]
    fn tags_are_capped_at_two() {
        let (tags, warning) = parse_tags(["Fun", "Build", "Roleplay"]).unwrap();
        assert_eq!(tags, vec![Tag::Fun, Tag::Build]);
        let warning = warning.unwrap();
        assert_eq!(warning.dropped, vec![Tag::Roleplay]);
        assert!(warning.to_string().contains("roleplay"));
    }

    #[test]
    fn invalid_tag_in_overflow_still_fails() {
        assert!(matches!(
            parse_tags(["fun", "build", "nonsense"]),
            Err(ArchiveError::InvalidTag(t)) if t == "nonsense"
        ));
    }

    #[test]
    fn duplicate_and_blank_tags_collapse() {
        let (tags, warning) = parse_tags(["fun", "", "FUN", "water"]).unwrap();
        assert_eq!(tags, vec![Tag::Fun, Tag::Water]);
        assert!(warning.is_none());
    }

    #[test]
    fn metadata_field_names() {
        assert_eq!("Title".parse::<MetadataField>().unwrap(), MetadataField::Title);
        assert_eq!("type".parse::<MetadataField>().unwrap(), MetadataField::Type);
        assert_eq!("colour".parse::<MetadataField>(), Err(UnknownField("colour".into())));
    }

    #[test]
    fn description_document_roundtrip() {
        let d = Description {
            text:       "Adds \"quotes\" and\nnewlines".into(),
            addon_type: Some(AddonType::Weapon),
            tags:       vec![Tag::Realism, Tag::Movie],
        };
        let json = d.to_json().unwrap();
        assert_eq!(
            json,
            r#"{"description":"Adds \"quotes\" and\nnewlines","type":"weapon","tags":["realism","movie"]}"#
        );
        assert_eq!(Description::parse(&json).unwrap(), d);
    }

    #[test]
    fn plain_text_description_is_kept() {
        let d = Description::parse("just some words").unwrap();
        assert_eq!(d.text, "just some words");
        assert_eq!(d.addon_type, None);
        assert!(d.tags.is_empty());
    }

    #[test]
    fn unknown_type_in_document_is_rejected() {
        let raw = r#"{"description":"x","type":"spaceship","tags":[]}"#;
        assert!(matches!(Description::parse(raw), Err(ArchiveError::InvalidType(_))));
    }
}
