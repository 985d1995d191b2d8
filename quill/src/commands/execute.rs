use std::path::PathBuf;

use clap::Args;
use eyre::Result;

use super::{UnwrapOrExit, context::ContextArgs, write_output};

#[derive(Args)]
pub struct ExecuteCommand {
    /// Template file
    pub template: PathBuf,

    #[command(flatten)]
    pub context: ContextArgs,

    /// Write the output to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl ExecuteCommand {
    pub fn run(&self) -> Result<()> {
        let context = self.context.build()?;
        let output = quill_codegen::execute(self.template.as_path(), &context).unwrap_or_exit();
        write_output(&output, self.output.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn test_execute_with_context() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.txt");
        fs::write(&path, "%emit {greeting}, {{name}}").unwrap();

        let cmd = ExecuteCommand {
            template: path,
            context: ContextArgs {
                variables: vec!["name=world".to_string(), "g_greeting=\"hello\"".to_string()],
                ..ContextArgs::default()
            },
            output: Some(dir.path().join("out.txt")),
        };
        cmd.run().unwrap();
        assert_eq!(
            fs::read_to_string(dir.path().join("out.txt")).unwrap(),
            "hello, world"
        );
    }
}
