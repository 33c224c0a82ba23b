//! Auricle Command-Line Interface
//!
//! Inspects the artifacts the background service produces: daily
//! transcripts, speaker profiles, and the on-disk layout. All commands
//! operate on files; the service does not need to be running.

mod colors;
mod commands;
mod exit_codes;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use exit_codes::ExitCode;

/// Auricle - Local Speech Capture CLI
#[derive(Parser, Debug)]
#[command(name = "auricle")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output in JSON format for scripting
    #[arg(long, global = true)]
    json: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show service data locations and today's capture activity
    Status,
    /// List known speaker profiles
    Speakers,
    /// Delete all speaker profiles
    ResetSpeakers,
    /// Print a day's transcript
    Transcript {
        /// Date to print (YYYY-MM-DD, defaults to today, UTC)
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Only the last N lines
        #[arg(short, long)]
        limit: Option<usize>,
    },
}

fn main() {
    let cli = Cli::parse();
    let exit_code = run(cli);
    std::process::exit(exit_code.as_i32());
}

fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Commands::Status => commands::status(cli.json),
        Commands::Speakers => commands::speakers(cli.json),
        Commands::ResetSpeakers => commands::reset_speakers(cli.json, cli.quiet),
        Commands::Transcript { date, limit } => commands::transcript(date, limit, cli.json),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    /// Verify the CLI definition is valid
    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_status() {
        let cli = Cli::try_parse_from(["auricle", "status"]).unwrap();
        assert!(matches!(cli.command, Commands::Status));
        assert!(!cli.json);
        assert!(!cli.quiet);
    }

    #[test]
    fn parse_speakers_with_json() {
        let cli = Cli::try_parse_from(["auricle", "--json", "speakers"]).unwrap();
        assert!(cli.json);
        assert!(matches!(cli.command, Commands::Speakers));
    }

    #[test]
    fn parse_reset_speakers() {
        let cli = Cli::try_parse_from(["auricle", "reset-speakers", "-q"]).unwrap();
        assert!(cli.quiet);
        assert!(matches!(cli.command, Commands::ResetSpeakers));
    }

    #[test]
    fn parse_transcript_defaults() {
        let cli = Cli::try_parse_from(["auricle", "transcript"]).unwrap();
        match cli.command {
            Commands::Transcript { date, limit } => {
                assert!(date.is_none());
                assert!(limit.is_none());
            }
            _ => panic!("Expected Transcript command"),
        }
    }

    #[test]
    fn parse_transcript_with_date_and_limit() {
        let cli = Cli::try_parse_from([
            "auricle",
            "transcript",
            "--date",
            "2026-03-09",
            "--limit",
            "20",
        ])
        .unwrap();
        match cli.command {
            Commands::Transcript { date, limit } => {
                assert_eq!(date, NaiveDate::from_ymd_opt(2026, 3, 9));
                assert_eq!(limit, Some(20));
            }
            _ => panic!("Expected Transcript command"),
        }
    }

    #[test]
    fn parse_invalid_date_fails() {
        let result = Cli::try_parse_from(["auricle", "transcript", "--date", "03/09/2026"]);
        assert!(result.is_err());
    }

    #[test]
    fn parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["auricle", "status", "--json", "-q"]).unwrap();
        assert!(cli.json);
        assert!(cli.quiet);
    }

    #[test]
    fn parse_invalid_command() {
        let result = Cli::try_parse_from(["auricle", "invalid"]);
        assert!(result.is_err());
    }
}
