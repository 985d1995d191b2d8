use std::{fs, path::PathBuf};

use clap::Args;
use eyre::{Result, WrapErr};

use super::{UnwrapOrExit, context::ContextArgs, write_output};

#[derive(Args)]
pub struct ExecuteStandaloneCommand {
    /// Code file written by `generate --standalone`
    pub code: PathBuf,

    #[command(flatten)]
    pub context: ContextArgs,

    /// Write the output to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl ExecuteStandaloneCommand {
    pub fn run(&self) -> Result<()> {
        let output = self.execute()?.map_err(|error| *error).unwrap_or_exit();
        write_output(&output, self.output.as_deref())
    }

    /// Only the runtime is involved: plugins given here are not loaded.
    fn execute(&self) -> Result<quill_runtime::Result<String>> {
        let text = fs::read_to_string(&self.code)
            .wrap_err_with(|| format!("Failed to read {}", self.code.display()))?;
        let context = self.context.build()?;
        if !context.plugins().is_empty() {
            tracing::warn!("plugins are ignored when executing standalone code");
        }
        Ok(quill_runtime::execute_standalone(&text, context.variables()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execute_standalone() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("page.txt");
        fs::write(&template, "%load common\n!for name in names:\n    {snake_case(name)}").unwrap();
        let context = quill_codegen::Context::new();
        let text = quill_codegen::generate_standalone(template.as_path(), &context).unwrap();
        let code = dir.path().join("page.code");
        fs::write(&code, text).unwrap();
        fs::remove_file(&template).unwrap();

        let cmd = ExecuteStandaloneCommand {
            code,
            context: ContextArgs {
                variables: vec![r#"names=["FooBar", "Baz"]"#.to_string()],
                ..ContextArgs::default()
            },
            output: None,
        };
        assert_eq!(cmd.execute().unwrap().unwrap(), "foo_bar\nbaz");
    }

    #[test]
    fn test_missing_code_file() {
        let cmd = ExecuteStandaloneCommand {
            code: PathBuf::from("does-not-exist.code"),
            context: ContextArgs::default(),
            output: None,
        };
        let error = cmd.execute().unwrap_err();
        assert!(error.to_string().starts_with("Failed to read"), "{error}");
    }
}
