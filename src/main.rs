use clap::{Parser, Subcommand};
use gmapack::archive::{Archive, Identity};
use gmapack::differ::{DEFAULT_BLOCK_SIZE, MAX_BLOCK_SIZE};
use gmapack::manifest::{AddonType, MetadataField, Tag};
use gmapack::session::{Session, SessionOptions};
use gmapack::whitelist;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "gmapack", about = "Create and edit .gma addon archives in place")]
struct Cli {
    /// Comparison block size in bytes used when saving
    #[arg(long, global = true, default_value_t = DEFAULT_BLOCK_SIZE, value_parser = parse_block_size)]
    block_size: usize,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new, empty addon
    New {
        output: PathBuf,
        #[arg(short, long)]
        title: String,
        #[arg(short, long, default_value = "")]
        description: String,
        /// One of: gamemode map weapon vehicle npc entity tool effects model servercontent
        #[arg(short = 'y', long = "type")]
        addon_type: String,
        /// Zero, one or two of: fun roleplay scenic movie realism cartoon water comic build
        #[arg(long, num_args = 0..)]
        tags: Vec<String>,
        #[arg(short, long)]
        author: Option<String>,
        /// Account id recorded in the header
        #[arg(long, default_value_t = 0)]
        origin_id: u64,
    },
    /// List the files in an addon
    List {
        input: PathBuf,
    },
    /// Add files or whole folders to an addon
    Add {
        input: PathBuf,
        #[arg(required = true, num_args = 1..)]
        paths: Vec<PathBuf>,
    },
    /// Remove files from an addon
    Remove {
        input: PathBuf,
        #[arg(required = true, num_args = 1..)]
        entries: Vec<String>,
    },
    /// Print one metadata field (author description tags title type)
    Get {
        input: PathBuf,
        field: MetadataField,
    },
    /// Set one metadata field (author description tags title type)
    Set {
        input: PathBuf,
        field: MetadataField,
        value: Vec<String>,
    },
    /// Show addon metadata
    Info {
        input: PathBuf,
    },
    /// Show which files may be packed
    Whitelist,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let opts = SessionOptions { block_size: cli.block_size };

    match cli.command {

        // ── New ──────────────────────────────────────────────────────────────
        Commands::New { output, title, description, addon_type, tags, author, origin_id } => {
            let mut addon = Archive::new();
            addon.set_title(title);
            addon.set_description(description);
            if let Some(author) = author {
                addon.set_author(author);
            }
            addon.set_type(&addon_type)?;
            if let Some(warning) = addon.set_tags(&tags)? {
                println!("{warning}");
            }
            addon.set_identity(Identity {
                origin_id,
                timestamp: chrono::Utc::now().timestamp().max(0) as u64,
            });

            let (session, written) = Session::create(&output, addon, opts)?;
            println!("Created: {} ({})", session.path().display(), human_size(written));
        }

        // ── List ─────────────────────────────────────────────────────────────
        Commands::List { input } => {
            let session = Session::open(&input, opts)?;
            let entries = session.archive().entries();
            println!("{} files in archive:", entries.len());
            for entry in entries {
                println!("{:<60} {:>10}  {:08x}", entry.path(), human_size(entry.size()), entry.crc());
            }
        }

        // ── Add ──────────────────────────────────────────────────────────────
        Commands::Add { input, paths } => {
            let mut session = Session::open(&input, opts)?;
            for path in &paths {
                if path.is_dir() {
                    let report = session.add_folder(path)?;
                    for added in &report.added {
                        println!("  added   {added}");
                    }
                    for (file, reason) in &report.skipped {
                        println!("  skipped {}  [{}]", file.display(), reason);
                    }
                } else {
                    match session.add_file(path) {
                        Ok(added) => println!("  added   {added}"),
                        Err(e)    => println!("  skipped {}  [{}]", path.display(), e),
                    }
                }
            }
            save(&mut session)?;
        }

        // ── Remove ───────────────────────────────────────────────────────────
        Commands::Remove { input, entries } => {
            let mut session = Session::open(&input, opts)?;
            for name in &entries {
                match session.archive_mut().remove_entry(name) {
                    Ok(entry) => println!("  removed {}", entry.path()),
                    Err(e)    => println!("  {e}"),
                }
            }
            save(&mut session)?;
        }

        // ── Get ──────────────────────────────────────────────────────────────
        Commands::Get { input, field } => {
            let session = Session::open(&input, opts)?;
            println!("{}", session.archive().get(field));
        }

        // ── Set ──────────────────────────────────────────────────────────────
        Commands::Set { input, field, value } => {
            let mut session = Session::open(&input, opts)?;
            if let Some(warning) = session.archive_mut().set(field, &value.join(" "))? {
                println!("{warning}");
            }
            save(&mut session)?;
        }

        // ── Info ─────────────────────────────────────────────────────────────
        Commands::Info { input } => {
            let session = Session::open(&input, opts)?;
            let addon = session.archive();
            let identity = addon.identity();
            let created = chrono::DateTime::from_timestamp(identity.timestamp as i64, 0)
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "-".into());
            let tags: Vec<&str> = addon.tags().iter().map(|t| t.name()).collect();

            println!("── Addon ────────────────────────────────────────────────");
            println!("  Path           {}", session.path().display());
            println!("  Title          {}", addon.title());
            println!("  Description    {}", addon.description());
            println!("  Author         {}", addon.author());
            println!("  Type           {}", addon.addon_type().map(AddonType::name).unwrap_or("-"));
            println!("  Tags           {}", tags.join(" "));
            println!("  Origin id      {}", identity.origin_id);
            println!("  Created        {}", created);
            println!("  Addon version  {}", addon.addon_version());
            println!("  Files          {}", addon.len());
            println!("  Payload        {}", human_size(addon.payload_size()));
            if !addon.required().is_empty() {
                println!("  Requires ({}):", addon.required().len());
                for dep in addon.required() {
                    println!("    {dep}");
                }
            }
        }

        // ── Whitelist ────────────────────────────────────────────────────────
        Commands::Whitelist => {
            println!("Allowed paths:");
            for pattern in whitelist::WHITELIST {
                println!("  {pattern}");
            }
            println!("By category:");
            for (category, extensions) in whitelist::categories() {
                println!("  {:<18} {}", category, extensions.join(" "));
            }
            println!("Types: {}", AddonType::ALL.map(AddonType::name).join(" "));
            println!("Tags:  {}", Tag::ALL.map(Tag::name).join(" "));
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn save(session: &mut Session) -> Result<(), Box<dyn std::error::Error>> {
    let modified = session.persist()?;
    println!("Successfully saved. {} was modified.", human_size(modified));
    Ok(())
}

fn parse_block_size(s: &str) -> Result<usize, String> {
    let size: usize = s.parse().map_err(|e| format!("{e}"))?;
    if (1..=MAX_BLOCK_SIZE).contains(&size) {
        Ok(size)
    } else {
        Err(format!("must be between 1 and {MAX_BLOCK_SIZE}"))
    }
}

fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}", value, UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_size_flag_is_bounded() {
        assert_eq!(parse_block_size("4096"), Ok(4096));
        assert!(parse_block_size("0").is_err());
        assert!(parse_block_size(&(MAX_BLOCK_SIZE + 1).to_string()).is_err());
        assert!(parse_block_size("18446744073709551615").is_err());
        assert!(Cli::try_parse_from(["gmapack", "--block-size", "99999999999", "whitelist"]).is_err());
    }

    #[test]
    fn sizes_are_human_readable() {
        assert_eq!(human_size(512), "512 B");
        assert_eq!(human_size(1536), "1.50 KiB");
        assert_eq!(human_size(3 * 1024 * 1024), "3.00 MiB");
    }
}
