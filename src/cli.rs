//! Command line arguments.

use clap::Parser;
use std::path::PathBuf;

/// elo - run elo scripts or start an interactive session
#[derive(Parser, Debug)]
#[command(name = "elo")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Script to run; starts the REPL when omitted
    pub file: Option<PathBuf>,

    /// Evaluate CODE and print its value
    #[arg(short, long, value_name = "CODE", conflicts_with = "file")]
    pub eval: Option<String>,

    /// Read settings from a TOML file
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Log every executed instruction
    #[arg(long)]
    pub trace: bool,

    /// Maximum call depth (at most 255)
    #[arg(long, value_name = "N")]
    pub stack_size: Option<usize>,

    /// Do not load or save REPL history
    #[arg(long)]
    pub no_history: bool,

    /// Print the compiled bytecode instead of running it
    #[arg(short, long)]
    pub disassemble: bool,
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
    fn test_parse_file_and_flags() {
        let cli = Cli::parse_from(["elo", "-v", "--stack-size", "64", "main.elo"]);
        assert_eq!(cli.file, Some(PathBuf::from("main.elo")));
        assert!(cli.verbose);
        assert_eq!(cli.stack_size, Some(64));
    }

    #[test]
    fn test_eval_conflicts_with_file() {
        assert!(Cli::try_parse_from(["elo", "-e", "1", "main.elo"]).is_err());
        let cli = Cli::parse_from(["elo", "-e", "1 + 2"]);
        assert_eq!(cli.eval.as_deref(), Some("1 + 2"));
    }

    #[test]
    fn test_disassemble_flag() {
        let cli = Cli::parse_from(["elo", "-d", "main.elo"]);
        assert!(cli.disassemble);
        assert!(!Cli::parse_from(["elo", "main.elo"]).disassemble);
    }
}
