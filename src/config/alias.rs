//! Locate the alias the YAML parser refused.
//!
//! The parser only reports the position of an unknown alias, so we scan the
//! text for anchors (`&name`) and aliases (`*name`) in document order and
//! return the first alias used before its anchor is defined.

use regex::Regex;
use std::collections::BTreeSet;

pub(crate) fn first_undefined_alias(text: &str) -> Option<String> {
    const MARKER_RE: &str = r#"(?:^|[\s\[\{,:-])([&*])([^\s\[\]\{\},]+)"#;
    let re = Regex::new(MARKER_RE).ok()?;

    let mut anchors = BTreeSet::<&str>::new();
    for line in text.lines() {
        let line = strip_comment(line);
        for caps in re.captures_iter(line) {
            let (Some(marker), Some(name)) = (caps.get(1), caps.get(2)) else {
                continue;
            };
            match marker.as_str() {
                "&" => {
                    anchors.insert(name.as_str());
                }
                _ if !anchors.contains(name.as_str()) => return Some(name.as_str().to_string()),
                _ => {}
            }
        }
    }
    None
}

/// Drop a trailing `# comment`. Quoted `#` is not special-cased.
fn strip_comment(line: &str) -> &str {
    if line.trim_start().starts_with('#') {
        return "";
    }
    match line.find(" #") {
        Some(idx) => &line[..idx],
        None => line,
    }
}
