use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::execution::step::Stage;
use crate::phase::Phase;
use crate::ui::OutputFormat;

/// Two-phase Arch Linux installer for an LVM layout.
///
/// Without a subcommand the installer looks for its sentinel in the home
/// directory and runs the pre-boot or the post-boot phase accordingly. This is
/// how it resumes from the login profile after the first reboot.
#[derive(Parser, Debug)]
#[command(name = "archlvm", author, version, about, long_about)]
pub struct Cli {
    /// Show debug output
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Configuration file (defaults to ~/.config/archlvm/install.toml, then
    /// /etc/archlvm/install.toml)
    #[arg(short, long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Print every step instead of running it
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Output format
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    pub output: OutputFormat,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Append every message to this file (defaults to /var/log/archlvm.log as root)
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the pre-boot installation from the live medium
    Install {
        /// Run only this stage
        #[arg(long, value_enum)]
        stage: Option<Stage>,
    },
    /// Run the post-boot finalization on the installed system
    Finish,
    /// Show which phase the next run would execute
    Phase,
    /// Print the steps of a phase without running them
    Plan {
        /// Phase to show (defaults to the detected phase)
        #[arg(long, value_enum)]
        phase: Option<Phase>,
    },
    /// Add boot hooks to the HOOKS line of a mkinitcpio configuration
    Hooks {
        /// Add the lvm2 hook
        #[arg(short, long)]
        lvm2: bool,
        /// Add the encrypt hook
        #[arg(short, long)]
        encrypt: bool,
        /// File to read
        #[arg(default_value = crate::mkinitcpio::DEFAULT_FILE)]
        input: PathBuf,
        /// File to write (defaults to the input file)
        #[arg(id = "output_file", value_name = "OUTPUT")]
        output: Option<PathBuf>,
    },
    /// Print the effective configuration as TOML
    Config,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_hooks_defaults() {
        let cli = Cli::try_parse_from(["archlvm", "hooks", "--lvm2"]).unwrap();
        match cli.command {
            Some(Commands::Hooks {
                lvm2,
                encrypt,
                input,
                output,
            }) => {
                assert!(lvm2);
                assert!(!encrypt);
                assert_eq!(input, PathBuf::from("/etc/mkinitcpio.conf"));
                assert_eq!(output, None);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_hooks_short_flags() {
        let cli = Cli::try_parse_from(["archlvm", "hooks", "-l", "-e", "in.conf", "out.conf"])
            .unwrap();
        match cli.command {
            Some(Commands::Hooks {
                lvm2,
                encrypt,
                input,
                output,
            }) => {
                assert!(lvm2);
                assert!(encrypt);
                assert_eq!(input, PathBuf::from("in.conf"));
                assert_eq!(output, Some(PathBuf::from("out.conf")));
            }
            other => panic!("unexpected command {:?}", other),
        }

        let cli = Cli::try_parse_from(["archlvm", "hooks", "-le"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Hooks {
                lvm2: true,
                encrypt: true,
                ..
            })
        ));
    }

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "archlvm",
            "install",
            "--stage",
            "boot",
            "--dry-run",
            "--output",
            "json",
        ])
        .unwrap();
        assert!(cli.dry_run);
        assert_eq!(cli.output, OutputFormat::Json);
        assert!(matches!(
            cli.command,
            Some(Commands::Install {
                stage: Some(Stage::Boot)
            })
        ));
    }

    #[test]
    fn test_no_subcommand_is_resume_entry_point() {
        let cli = Cli::try_parse_from(["archlvm"]).unwrap();
        assert!(cli.command.is_none());

        let cli = Cli::try_parse_from(["archlvm", "plan", "--phase", "post-boot"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Plan {
                phase: Some(Phase::PostBoot)
            })
        ));
    }
}
