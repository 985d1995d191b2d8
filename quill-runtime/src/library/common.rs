use quill_core::{to_camel_case, to_kebab_case, to_pascal_case, to_snake_case};

use crate::evaluator::{Helper, string_helper};

pub(super) fn helpers() -> Vec<(&'static str, Helper)> {
    vec![
        ("camel_case", string_helper(to_camel_case)),
        ("kebab_case", string_helper(to_kebab_case)),
        ("pascal_case", string_helper(to_pascal_case)),
        ("snake_case", string_helper(to_snake_case)),
    ]
}
