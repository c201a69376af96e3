//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use media_resolver::fetch::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use media_resolver::{DEFAULT_CONCURRENCY, DEFAULT_MAX_ATTEMPTS};

/// Extract media items from galleries and streams, and resolve their URLs.
///
/// Items are printed as JSON lines so they can be saved and resolved later
/// without repeating discovery.
#[derive(Parser, Debug)]
#[command(name = "media-resolver")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Maximum concurrent resolutions (1-100)
    #[arg(short = 'c', long, global = true, default_value_t = DEFAULT_CONCURRENCY as u8, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub concurrency: u8,

    /// Maximum attempts per network operation (1-10)
    #[arg(short = 'r', long, global = true, default_value_t = DEFAULT_MAX_ATTEMPTS as u8, value_parser = clap::value_parser!(u8).range(1..=10))]
    pub max_attempts: u8,

    /// Connect timeout in seconds
    #[arg(long, global = true, default_value_t = CONNECT_TIMEOUT_SECS, value_parser = clap::value_parser!(u64).range(1..=300))]
    pub connect_timeout: u64,

    /// Total request timeout in seconds
    #[arg(long, global = true, default_value_t = READ_TIMEOUT_SECS, value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub read_timeout: u64,

    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Extract a source and print its record and items
    Extract {
        /// Gallery id, gallery URL, stream URL or feed entry URL
        input: String,

        /// Resolve every item and print its URL instead of the persisted item
        #[arg(long)]
        resolve: bool,
    },

    /// Resolve previously extracted items read from a JSON-lines file
    Resolve {
        /// File with one persisted item per line
        file: PathBuf,
    },
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_extract_defaults() {
        let args = Args::try_parse_from(["media-resolver", "extract", "177013"]).unwrap();
        assert_eq!(args.verbose, 0);
        assert!(!args.quiet);
        assert_eq!(args.concurrency, 16);
        assert_eq!(args.max_attempts, 4);
        assert_eq!(args.connect_timeout, 10);
        assert_eq!(args.read_timeout, 30);
        match args.command {
            Command::Extract { input, resolve } => {
                assert_eq!(input, "177013");
                assert!(!resolve);
            }
            Command::Resolve { .. } => panic!("expected extract"),
        }
    }

    #[test]
    fn test_cli_resolve_takes_file() {
        let args = Args::try_parse_from(["media-resolver", "resolve", "items.jsonl"]).unwrap();
        match args.command {
            Command::Resolve { file } => assert_eq!(file, PathBuf::from("items.jsonl")),
            Command::Extract { .. } => panic!("expected resolve"),
        }
    }

    #[test]
    fn test_cli_global_flags_after_subcommand() {
        let args =
            Args::try_parse_from(["media-resolver", "extract", "1", "--resolve", "-vv", "-c", "5"])
                .unwrap();
        assert_eq!(args.verbose, 2);
        assert_eq!(args.concurrency, 5);
        assert!(matches!(args.command, Command::Extract { resolve: true, .. }));
    }

    #[test]
    fn test_cli_subcommand_required() {
        let err = Args::try_parse_from(["media-resolver"]).unwrap_err();
        assert_eq!(
            err.kind(),
            clap::error::ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
        );
    }

    #[test]
    fn test_cli_concurrency_bounds() {
        for bad in ["0", "101"] {
            let err = Args::try_parse_from(["media-resolver", "-c", bad, "extract", "1"]).unwrap_err();
            assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
        }
        let args = Args::try_parse_from(["media-resolver", "-c", "100", "extract", "1"]).unwrap();
        assert_eq!(args.concurrency, 100);
    }

    #[test]
    fn test_cli_max_attempts_bounds() {
        let err = Args::try_parse_from(["media-resolver", "-r", "0", "extract", "1"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
        let err = Args::try_parse_from(["media-resolver", "-r", "11", "extract", "1"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
        let args =
            Args::try_parse_from(["media-resolver", "--max-attempts", "1", "extract", "1"]).unwrap();
        assert_eq!(args.max_attempts, 1);
    }

    #[test]
    fn test_cli_version_flag_shows_version() {
        let err = Args::try_parse_from(["media-resolver", "--version"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
    }
}
