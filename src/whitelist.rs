//! Path admission: which files may be packed into an addon.
//!
//! # Glob syntax
//! Patterns are written over forward-slash relative paths:
//!   - `*` matches any run of characters, `/` included.
//!   - `?` matches exactly one character.
//!   - Everything else is literal.
//!
//! Matching is always case-insensitive. Each glob is compiled once into an
//! anchored [`Regex`]; the tables below are compiled lazily on first use.
//!
//! # Order
//! [`WHITELIST`] is scanned in declaration order and the first full match
//! wins. The patterns are disjoint suffix rules in practice, so order only
//! decides which pattern gets reported.

use std::sync::OnceLock;

use regex::{Regex, RegexBuilder};

// ── Static tables ─────────────────────────────────────────────────────────────

/// Paths allowed inside an addon, in match order.
pub const WHITELIST: &[&str] = &[
    "maps/*.bsp",
    "maps/*.png",
    "maps/*.nav",
    "maps/*.ain",
    "sound/*.wav",
    "sound/*.mp3",
    "lua/*.lua",
    "materials/*.vmt",
    "materials/*.vtf",
    "materials/*.png",
    "models/*.mdl",
    "models/*.vtx",
    "models/*.phy",
    "models/*.ani",
    "models/*.vvd",
    "gamemodes/*.txt",
    "gamemodes/*.lua",
    "scenes/*.vcd",
    "particles/*.pcf",
    "gamemodes/*/backgrounds/*.jpg",
    "gamemodes/*/icon24.png",
    "gamemodes/*/logo.png",
    "scripts/vehicles/*.txt",
    "resource/fonts/*.ttf",
];

/// Paths that never go into an archive, even when whitelisted.
pub const IGNORED: &[&str] = &[
    "addon.json",
    "*thumbs.db",
    "*desktop.ini",
    "*.psd",
    "*.vcproj",
    "*.svn*",
    "*.git*",
];

/// Known extensions grouped by category, for display only.
pub const CATEGORIES: &[(&str, &[&str])] = &[
    ("Maps",             &["*.bsp", "*.png", "*.nav", "*.ain"]),
    ("Lua script files", &["*.lua"]),
    ("Materials",        &["*.vmt", "*.vtf", "*.png"]),
    ("Models",           &["*.mdl", "*.vtx", "*.phy", "*.ani", "*.vvd"]),
    ("Text files",       &["*.txt"]),
    ("Fonts",            &["*.ttf"]),
    ("Images",           &["*.png", "*.jpg"]),
    ("Scenes",           &["*.vcd"]),
    ("Particle effects", &["*.pcf"]),
];

// ── Glob ──────────────────────────────────────────────────────────────────────

/// A compiled, case-insensitive glob.
#[derive(Debug, Clone)]
pub struct Glob {
    pattern: String,
    regex:   Regex,
}

impl Glob {
    /// Compile `pattern` so that it must match a whole path.
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Self::compile(pattern, |body| format!("^{body}$"))
    }

    /// Compile `pattern` so that it matches a trailing run of whole path
    /// segments. The pattern body is capture group 1.
    fn suffix(pattern: &str) -> Result<Self, regex::Error> {
        Self::compile(pattern, |body| format!("(?:^|/)({body})$"))
    }

    fn compile(pattern: &str, wrap: impl Fn(&str) -> String) -> Result<Self, regex::Error> {
        let body = regex::escape(pattern)
            .replace(r"\*", ".*")
            .replace(r"\?", ".");
        let regex = RegexBuilder::new(&wrap(&body))
            .case_insensitive(true)
            .build()?;
        Ok(Self { pattern: pattern.to_owned(), regex })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn is_match(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }

    fn find<'p>(&self, path: &'p str) -> Option<&'p str> {
        self.regex.find(path).map(|m| m.as_str())
    }

    fn find_suffix<'p>(&self, path: &'p str) -> Option<&'p str> {
        self.regex
            .captures(path)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
    }
}

struct Tables {
    whitelist: Vec<Glob>,
    suffixes:  Vec<Glob>,
    ignored:   Vec<Glob>,
}

fn tables() -> &'static Tables {
    static TABLES: OnceLock<Tables> = OnceLock::new();
    TABLES.get_or_init(|| {
        // The inputs are escaped before compiling, so these cannot fail.
        let compile = |patterns: &[&str], f: fn(&str) -> Result<Glob, regex::Error>| {
            patterns
                .iter()
                .map(|p| f(p).expect("escaped glob is a valid regex"))
                .collect()
        };
        Tables {
            whitelist: compile(WHITELIST, Glob::new),
            suffixes:  compile(WHITELIST, Glob::suffix),
            ignored:   compile(IGNORED, Glob::suffix),
        }
    })
}

// ── Queries ───────────────────────────────────────────────────────────────────

/// Result of a successful [`classify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification<'p> {
    /// The whitelist pattern that matched first.
    pub pattern: &'static str,
    /// The matched text. Patterns are anchored, so this is the whole path.
    pub matched: &'p str,
}

/// Find the first whitelist pattern that fully matches `path`.
pub fn classify(path: &str) -> Option<Classification<'_>> {
    WHITELIST
        .iter()
        .zip(&tables().whitelist)
        .find_map(|(pattern, glob)| {
            glob.find(path).map(|matched| Classification { pattern: *pattern, matched })
        })
}

/// `true` when some whitelist pattern fully matches `path`.
pub fn accepts(path: &str) -> bool {
    tables().whitelist.iter().any(|g| g.is_match(path))
}

/// `true` when `path`, or a trailing run of its segments, is on the ignore
/// list, so `/home/me/addon/addon.json` is ignored like `addon.json`.
pub fn is_ignored(path: &str) -> bool {
    tables().ignored.iter().any(|g| g.is_match(path))
}

/// Find the in-archive path hidden inside an arbitrary file-system path.
///
/// Returns the trailing run of whole segments of `path` that a whitelist
/// pattern matches, e.g. `/home/me/addon/lua/autorun/a.lua` gives
/// `lua/autorun/a.lua`. `path` must already use forward slashes.
pub fn locate(path: &str) -> Option<&str> {
    tables().suffixes.iter().find_map(|g| g.find_suffix(path))
}

/// Extensions grouped by human category. Has no effect on matching.
pub fn categories() -> &'static [(&'static str, &'static [&'static str])] {
    CATEGORIES
}
