use std::collections::BTreeMap;

use minijinja::Value;

use crate::{Code, Runtime, error::Result};

/// Execute serialized code without the generation engine.
///
/// The text is restored with [`Code::restore`]; any runtime libraries the code
/// needs are loaded by its preamble.
pub fn execute_standalone(text: &str, variables: &BTreeMap<String, Value>) -> Result<String> {
    let code = Code::restore(text)?;
    let mut runtime = Runtime::new();
    runtime.extend(variables);
    runtime.execute(&code)
}
