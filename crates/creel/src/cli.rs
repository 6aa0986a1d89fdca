//! CLI argument parsing with clap

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand, ValueEnum};
use creel_backup::Tier;

// Re-export command types for convenience
pub use crate::commands::backup::BackupArgs;
pub use crate::commands::emergency::EmergencyArgs;
pub use crate::commands::list::ListArgs;
pub use crate::commands::prune::PruneArgs;
pub use crate::commands::restore::RestoreArgs;
pub use crate::commands::schedule::ScheduleArgs;
pub use crate::commands::verify::VerifyArgs;

/// Creel - backups of a Supabase project's tables and storage listings
#[derive(Parser, Debug)]
#[command(name = "creel")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to creel.yaml config file
    #[arg(short, long, global = true)]
    pub config: Option<Utf8PathBuf>,

    /// Backup repository root (overrides backup.root)
    #[arg(long, global = true)]
    pub root: Option<Utf8PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Take a backup of every configured table and bucket
    Backup(BackupArgs),

    /// Take an emergency backup before a risky change
    Emergency(EmergencyArgs),

    /// List backups, or deep-verify one backup
    Verify(VerifyArgs),

    /// List backups
    List(ListArgs),

    /// Restore tables from a backup
    Restore(RestoreArgs),

    /// Apply the retention policy
    Prune(PruneArgs),

    /// Take backups on a timer until interrupted
    Schedule(ScheduleArgs),

    /// Configuration management
    #[command(subcommand)]
    Config(ConfigCommands),
}

/// Tier of a manual backup
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ManualTier {
    Daily,
    Weekly,
    Monthly,
}

impl From<ManualTier> for Tier {
    fn from(tier: ManualTier) -> Self {
        match tier {
            ManualTier::Daily => Tier::Daily,
            ManualTier::Weekly => Tier::Weekly,
            ManualTier::Monthly => Tier::Monthly,
        }
    }
}

/// Any retention tier, for filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TierArg {
    Emergency,
    Daily,
    Weekly,
    Monthly,
}

impl From<TierArg> for Tier {
    fn from(tier: TierArg) -> Self {
        match tier {
            TierArg::Emergency => Tier::Emergency,
            TierArg::Daily => Tier::Daily,
            TierArg::Weekly => Tier::Weekly,
            TierArg::Monthly => Tier::Monthly,
        }
    }
}

// Config commands
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show the resolved configuration
    Show(ConfigShowArgs),

    /// Write a default creel.yaml
    Init(ConfigInitArgs),
}

#[derive(Args, Debug)]
pub struct ConfigShowArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct ConfigInitArgs {
    /// Output file
    #[arg(short, long, default_value = "creel.yaml")]
    pub output: Utf8PathBuf,

    /// Overwrite an existing file
    #[arg(short, long)]
    pub force: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["creel", "list", "-vv", "--root", "/tmp/backups"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.root, Some(Utf8PathBuf::from("/tmp/backups")));
        assert!(matches!(cli.command, Commands::List(_)));
    }

    #[test]
    fn test_backup_rejects_emergency_tier() {
        assert!(Cli::try_parse_from(["creel", "backup", "--tier", "emergency"]).is_err());
        let cli = Cli::try_parse_from(["creel", "backup", "pre-release", "--tier", "weekly"]).unwrap();
        match cli.command {
            Commands::Backup(args) => {
                assert_eq!(args.name.as_deref(), Some("pre-release"));
                assert_eq!(Tier::from(args.tier), Tier::Weekly);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_emergency_reason_words_are_joined() {
        let cli = Cli::try_parse_from(["creel", "emergency", "before", "schema", "change"]).unwrap();
        match cli.command {
            Commands::Emergency(args) => {
                assert_eq!(args.reason().as_deref(), Some("before schema change"))
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_restore_flags() {
        let cli = Cli::try_parse_from([
            "creel",
            "restore",
            "daily/backup-2026-01-01-1",
            "--allow-partial",
            "--override-consistency",
        ])
        .unwrap();
        match cli.command {
            Commands::Restore(args) => {
                assert!(args.allow_partial);
                assert!(args.override_consistency);
                assert_eq!(args.name, "daily/backup-2026-01-01-1");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
