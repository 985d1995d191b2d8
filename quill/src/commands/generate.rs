use std::path::PathBuf;

use clap::Args;
use eyre::Result;

use super::{UnwrapOrExit, context::ContextArgs, write_output};

#[derive(Args)]
pub struct GenerateCommand {
    /// Template file
    pub template: PathBuf,

    #[command(flatten)]
    pub context: ContextArgs,

    /// Generate code that `execute-standalone` can run without the generation engine
    #[arg(short, long)]
    pub standalone: bool,

    /// Write the code to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl GenerateCommand {
    pub fn run(&self) -> Result<()> {
        let context = self.context.build()?;
        let code = self.generate(&context).unwrap_or_exit();
        write_output(&code, self.output.as_deref())
    }

    fn generate(&self, context: &quill_codegen::Context) -> quill_codegen::api::Result<String> {
        if self.standalone {
            quill_codegen::generate_standalone(self.template.as_path(), context)
        } else {
            quill_codegen::generate(self.template.as_path(), context).map(|code| code.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn command(template: PathBuf, standalone: bool) -> GenerateCommand {
        GenerateCommand {
            template,
            context: ContextArgs::default(),
            standalone,
            output: None,
        }
    }

    #[test]
    fn test_generate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.txt");
        fs::write(&path, "!for i in range(n):\n    line {i}").unwrap();

        let cmd = command(path, false);
        let code = cmd.generate(&cmd.context.build().unwrap()).unwrap();
        assert_eq!(code, "for i in range(n):\n    emit(0, \"line \", i)");
    }

    #[test]
    fn test_generate_standalone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.txt");
        fs::write(&path, "%load common\n{camel_case(name)}").unwrap();

        let cmd = command(path, true);
        let code = cmd.generate(&cmd.context.build().unwrap()).unwrap();
        assert!(code.starts_with("# quill: "), "{code}");
        assert!(code.ends_with("load(\"common\")\nemit(0, camel_case(name))"), "{code}");
    }

    #[test]
    fn test_generate_writes_output_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.txt");
        fs::write(&path, "hello").unwrap();

        let mut cmd = command(path, false);
        cmd.output = Some(dir.path().join("page.code"));
        cmd.run().unwrap();
        assert_eq!(
            fs::read_to_string(dir.path().join("page.code")).unwrap(),
            "emit(0, \"hello\")"
        );
    }
}
