//! Minimal `.env`-style file parser: `KEY=value` per line, `#` comments, blank lines
//! ignored. Intentionally tiny — this is plumbing, not an ambient concern that needs
//! an ecosystem crate.

use std::collections::HashMap;

pub fn parse(contents: &str) -> HashMap<String, String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().trim_matches('"').to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_pairs() {
        let parsed = parse("A=1\n# comment\n\nB=\"two\"\n");
        assert_eq!(parsed.get("A").map(String::as_str), Some("1"));
        assert_eq!(parsed.get("B").map(String::as_str), Some("two"));
        assert_eq!(parsed.len(), 2);
    }
}
