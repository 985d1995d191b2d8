mod context;
mod execute;
mod execute_standalone;
mod generate;

use std::{fs, path::Path};

use clap::{Parser, Subcommand};
use eyre::{Result, WrapErr};
use execute::ExecuteCommand;
use execute_standalone::ExecuteStandaloneCommand;
use generate::GenerateCommand;

/// Extension trait for exiting on library errors with pretty formatting
pub(crate) trait UnwrapOrExit<T> {
    fn unwrap_or_exit(self) -> T;
}

impl<T, E> UnwrapOrExit<T> for std::result::Result<T, E>
where
    E: miette::Diagnostic + Send + Sync + 'static,
{
    fn unwrap_or_exit(self) -> T {
        match self {
            Ok(v) => v,
            Err(e) => {
                eprintln!("{:?}", miette::Report::new(e));
                std::process::exit(1);
            }
        }
    }
}

/// Print `text`, or write it to `output` when given.
fn write_output(text: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => fs::write(path, text)
            .wrap_err_with(|| format!("Failed to write {}", path.display())),
        None => {
            println!("{text}");
            Ok(())
        }
    }
}

#[derive(Parser)]
#[command(name = "quill")]
#[command(version)]
#[command(about = "Transpile indentation-structured templates into code and render them")]
pub(crate) struct Cli {
    /// Show debug logs
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    pub fn run(&self) -> Result<()> {
        match &self.command {
            Commands::Generate(cmd) => cmd.run(),
            Commands::Execute(cmd) => cmd.run(),
            Commands::ExecuteStandalone(cmd) => cmd.run(),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a template into code
    Generate(GenerateCommand),

    /// Generate a template and run the code
    #[command(alias = "render")]
    Execute(ExecuteCommand),

    /// Run code written by `generate --standalone`
    ExecuteStandalone(ExecuteStandaloneCommand),
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_subcommands() {
        let args = ["quill", "render", "page.txt", "name=x", "-c", "ctx.json"];
        let cli = Cli::try_parse_from(args).unwrap();
        assert!(matches!(cli.command, Commands::Execute(_)));

        let cli = Cli::try_parse_from(["quill", "-v", "generate", "-s", "page.txt"]).unwrap();
        assert!(cli.verbose);
        let Commands::Generate(cmd) = cli.command else {
            panic!("expected generate");
        };
        assert!(cmd.standalone);
    }
}
