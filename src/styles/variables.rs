//! Line-oriented scanner for stylesheet variable definitions.
//!
//! Only top-level definitions written on a single line are recognized:
//!
//! ```scss
//! $brand-primary: #337ab7 !default;
//! $font-size-h1: 36px;
//! ```

use std::fs;
use std::sync::LazyLock;

use camino::Utf8Path;
use regex::Regex;

use crate::sanitize::sanitize_key;

static RE_VARIABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\$([a-zA-Z0-9_-]+?)\s?:\s?(.+?);").unwrap());
static RE_DEFAULT_FLAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*!default\s*$").unwrap());

/// A variable found in the variables file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    /// Key-normalized name, also used as the settings field name.
    pub name: String,
    /// Name with its sigil, e.g. `$brand-primary`.
    pub label: String,
    /// Value from the file, without a `!default` flag.
    pub default: String,
}

pub fn scan_variables(text: &str) -> Vec<Variable> {
    text.lines()
        .filter_map(|line| RE_VARIABLE.captures(line))
        .filter_map(|caps| {
            let name = sanitize_key(&caps[1]);
            if name.is_empty() {
                return None;
            }

            let default = RE_DEFAULT_FLAG.replace(caps[2].trim(), "").into_owned();

            Some(Variable {
                label: format!("${name}"),
                name,
                default,
            })
        })
        .collect()
}

/// Scans the variables file at `path`.
///
/// Returns `None` when there's no such file, so a theme without variables
/// simply gets no variables page.
pub fn read_variables(path: &Utf8Path) -> std::io::Result<Option<Vec<Variable>>> {
    if !path.is_file() {
        return Ok(None);
    }

    let text = fs::read_to_string(path)?;
    Ok(Some(scan_variables(&text)))
}
