//! Command-line interface, parsed with clap.

mod commands;

use clap::{Parser, Subcommand};

use crate::domain::{ContentType, SourceKind};

/// catalog-sync - keeps a local anime/manga catalog in step with AniList
/// and MyAnimeList
#[derive(Parser)]
#[command(name = "catalog-sync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the HTTP API and run scheduled syncs
    #[command(alias = "daemon")]
    Serve,

    /// Run one sync and print its report
    Sync {
        /// anime or manga
        content_type: ContentType,

        /// Number of pages to fetch
        #[arg(long, default_value_t = 1)]
        max_pages: u32,

        /// First page to fetch (1-based)
        #[arg(long)]
        start_page: Option<u32>,

        /// anilist or jikan; defaults to sync.default_source
        #[arg(long)]
        source: Option<SourceKind>,
    },

    /// Re-fetch titles that are missing their detail row
    Repair {
        #[arg(long)]
        source: Option<SourceKind>,

        /// Maximum number of titles to repair
        #[arg(long, default_value_t = crate::constants::limits::DEFAULT_REPAIR_LIMIT)]
        limit: u64,
    },

    /// Show recent sync runs
    #[command(alias = "history")]
    Runs {
        #[arg(long, default_value_t = 10)]
        limit: u64,
    },

    /// Create default config file
    #[command(alias = "init")]
    InitConfig,
}

pub use commands::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sync_arguments() {
        let cli = Cli::try_parse_from([
            "catalog-sync",
            "sync",
            "manga",
            "--max-pages",
            "3",
            "--source",
            "mal",
        ])
        .unwrap();

        match cli.command {
            Some(Commands::Sync {
                content_type,
                max_pages,
                start_page,
                source,
            }) => {
                assert_eq!(content_type, ContentType::Manga);
                assert_eq!(max_pages, 3);
                assert_eq!(start_page, None);
                assert_eq!(source, Some(SourceKind::Jikan));
            }
            _ => panic!("expected sync command"),
        }
    }

    #[test]
    fn rejects_unknown_content_type() {
        assert!(Cli::try_parse_from(["catalog-sync", "sync", "novel"]).is_err());
    }

    #[test]
    fn init_alias() {
        let cli = Cli::try_parse_from(["catalog-sync", "init"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::InitConfig)));
    }
}
