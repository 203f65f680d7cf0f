//! Glob-style patterns compiled to anchored regexes.
//!
//! - `*` matches any run of characters except the separator
//! - `**` matches anything, separators included (`**/` also matches nothing)
//! - `?` matches one non-separator character
//!
//! File globs use `/` as the separator; name and decorator patterns use `.`.

use regex::Regex;

use crate::error::{GhostbustError, GhostbustResult};

/// Translate `glob` into an anchored regex.
pub fn glob_to_regex(glob: &str, separator: char) -> GhostbustResult<Regex> {
    let sep = regex::escape(&separator.to_string());
    let mut out = String::with_capacity(glob.len() * 2 + 2);
    out.push('^');

    let chars: Vec<char> = glob.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' if chars.get(i + 1) == Some(&'*') => {
                if chars.get(i + 2) == Some(&separator) {
                    out.push_str(&format!("(?:.*{})?", sep));
                    i += 3;
                } else {
                    out.push_str(".*");
                    i += 2;
                }
            }
            '*' => {
                out.push_str(&format!("[^{}]*", sep));
                i += 1;
            }
            '?' => {
                out.push_str(&format!("[^{}]", sep));
                i += 1;
            }
            c => {
                out.push_str(&regex::escape(&c.to_string()));
                i += 1;
            }
        }
    }
    out.push('$');

    Regex::new(&out).map_err(|e| {
        GhostbustError::invalid_argument(format!("invalid pattern '{}': {}", glob, e))
    })
}

/// Whether `s` contains glob metacharacters.
pub fn is_glob(s: &str) -> bool {
    s.contains(['*', '?'])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_star_stops_at_separator() {
        let re = glob_to_regex("src/*.py", '/').unwrap();
        assert!(re.is_match("src/app.py"));
        assert!(!re.is_match("src/pkg/app.py"));
    }

    #[test]
    fn test_double_star_crosses_separators() {
        let re = glob_to_regex("src/**/*.py", '/').unwrap();
        assert!(re.is_match("src/app.py"));
        assert!(re.is_match("src/pkg/sub/app.py"));
        assert!(!re.is_match("tests/app.py"));
    }

    #[test]
    fn test_dotted_names() {
        let re = glob_to_regex("*.setter", '.').unwrap();
        assert!(re.is_match("value.setter"));
        assert!(!re.is_match("a.value.setter"));

        let re = glob_to_regex("test_*", '.').unwrap();
        assert!(re.is_match("test_login"));
        assert!(!re.is_match("helper"));
    }

    #[test]
    fn test_literal_characters_escaped() {
        let re = glob_to_regex("a+b(c)", '.').unwrap();
        assert!(re.is_match("a+b(c)"));
        assert!(!re.is_match("aab(c)"));
    }

    #[test]
    fn test_is_glob() {
        assert!(is_glob("**/*.py"));
        assert!(is_glob("mod?.py"));
        assert!(!is_glob("src/app.py"));
    }
}
