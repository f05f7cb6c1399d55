//! Glob-style key patterns used for bulk deletes.

use crate::error::{BackendError, BackendResult};
use regex::Regex;

/// Compile a glob (`*` any run, `?` one char) into an anchored regex.
pub fn glob_to_regex(pattern: &str) -> BackendResult<Regex> {
    let mut source = String::with_capacity(pattern.len() + 8);
    source.push('^');
    for ch in pattern.chars() {
        match ch {
            '*' => source.push_str(".*"),
            '?' => source.push('.'),
            other => source.push_str(&regex::escape(other.encode_utf8(&mut [0u8; 4]))),
        }
    }
    source.push('$');

    Regex::new(&source).map_err(|e| BackendError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

/// Translate a glob into a SQL `LIKE` pattern with `\` as the escape char.
pub fn glob_to_like(pattern: &str) -> String {
    let mut like = String::with_capacity(pattern.len());
    for ch in pattern.chars() {
        match ch {
            '*' => like.push('%'),
            '?' => like.push('_'),
            '%' | '_' | '\\' => {
                like.push('\\');
                like.push(ch);
            }
            other => like.push(other),
        }
    }
    like
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_star_matches_suffix() -> BackendResult<()> {
        let re = glob_to_regex("rate_limit:user:ALICE:*")?;
        assert!(re.is_match("rate_limit:user:ALICE:/api/v1/products"));
        assert!(!re.is_match("rate_limit:user:ALICE2:/api/v1/products"));
        assert!(!re.is_match("rate_limit:ip:ALICE:/"));
        Ok(())
    }

    #[test]
    fn test_regex_metacharacters_are_literal() -> BackendResult<()> {
        let re = glob_to_regex("cache:/api/v1/products:a=1.*")?;
        assert!(re.is_match("cache:/api/v1/products:a=1.b=2"));
        assert!(!re.is_match("cache:/api/v1/products:a=1xb"));
        Ok(())
    }

    #[test]
    fn test_like_escapes_wildcards() {
        assert_eq!(glob_to_like("rate_limit:*"), "rate\\_limit:%");
        assert_eq!(glob_to_like("a?c"), "a_c");
    }
}
