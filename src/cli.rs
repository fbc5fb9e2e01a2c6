use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "nodeprep")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Provision third-party software onto a freshly started node", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Settings file (defaults to the platform config directory)
    #[arg(short, long, global = true, env = "NODEPREP_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Download, install and configure every configured item
    Run(RunArgs),

    /// Show what is cached, installed and configured (read-only)
    Status(StatusArgs),

    /// Show resolved settings and the heap-size hint
    Settings,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Parser)]
pub struct RunArgs {
    /// Only provision these items (e.g. java, elasticsearch)
    #[arg(short, long, value_delimiter = ',')]
    pub only: Vec<String>,

    /// Number of items to provision in parallel
    #[arg(short, long, default_value = "1")]
    pub jobs: usize,
}

#[derive(Parser)]
pub struct StatusArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_args() {
        let cli = Cli::try_parse_from(["nodeprep", "run", "--only", "java,elasticsearch", "-j", "2"])
            .unwrap();
        match cli.command {
            Command::Run(args) => {
                assert_eq!(args.only, vec!["java", "elasticsearch"]);
                assert_eq!(args.jobs, 2);
            }
            _ => panic!("Expected run command"),
        }
    }

    #[test]
    fn test_global_config_flag() {
        let cli =
            Cli::try_parse_from(["nodeprep", "status", "--json", "--config", "/etc/np.toml", "-vv"])
                .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/etc/np.toml")));
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Command::Status(StatusArgs { json: true })));
    }
}
