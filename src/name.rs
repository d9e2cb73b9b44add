//! Identifier validation for record and field names

use std::sync::LazyLock;

use regex::Regex;

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_$][A-Za-z_$0-9]*$").expect("identifier pattern compiles"));

/// Check whether `name` is a legal identifier: `^[A-Za-z_$][A-Za-z_$0-9]*$`
pub fn is_valid_name(name: &str) -> bool {
    IDENTIFIER.is_match(name)
}

/// Render a validated name as an Avro identifier.
///
/// Avro names may not contain `$`, so it is escaped as `_S_`.
pub(crate) fn wire_name(name: &str) -> String {
    if name.contains('$') {
        name.replace('$', "_S_")
    } else {
        name.to_string()
    }
}
