//! SQL LIKE pattern matching.
//!
//! Supports `%` (any run of characters, including empty), `_` (exactly one
//! character), and `\` as the escape prefix. The matcher is a recursive
//! scan with a three-valued result: besides matched / not matched, an
//! `Abort` outcome reports that the remaining string is already too short
//! for the rest of the pattern, which stops the `%` retry loop early
//! instead of re-failing at every start position.

use super::error::ExecutorError;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum LikeResult {
    Matched,
    NotMatched,
    /// The string ran out while the pattern still requires characters;
    /// shorter suffixes cannot match either.
    Abort,
}

/// Matches `s` against the LIKE pattern `p`.
///
/// A pattern ending in a bare escape character is an argument error.
pub fn string_like(s: &str, p: &str) -> Result<bool, ExecutorError> {
    Ok(like_internal(s.as_bytes(), p.as_bytes())? == LikeResult::Matched)
}

fn trailing_escape_error() -> ExecutorError {
    ExecutorError::InvalidArgument("LIKE pattern must not end with the escape character".into())
}

fn like_internal(mut s: &[u8], mut p: &[u8]) -> Result<LikeResult, ExecutorError> {
    if p == b"%" {
        return Ok(LikeResult::Matched);
    }

    while !p.is_empty() && !s.is_empty() {
        if p[0] == b'\\' {
            p = &p[1..];
            if p.is_empty() {
                return Err(trailing_escape_error());
            }
            if p[0] != s[0] {
                return Ok(LikeResult::NotMatched);
            }
        } else if p[0] == b'%' {
            p = &p[1..];

            // Slide over any further % and _, consuming one string byte
            // per _, to find the first concrete pattern byte.
            while !p.is_empty() {
                if p[0] == b'%' {
                    p = &p[1..];
                } else if p[0] == b'_' {
                    if s.is_empty() {
                        return Ok(LikeResult::Abort);
                    }
                    p = &p[1..];
                    s = &s[1..];
                } else {
                    break;
                }
            }
            if p.is_empty() {
                return Ok(LikeResult::Matched);
            }
            let first = if p[0] == b'\\' {
                *p.get(1).ok_or_else(trailing_escape_error)?
            } else {
                p[0]
            };

            // Try every suffix of s starting with `first`. NotMatched
            // retries the next start; Matched and Abort end the loop.
            while !s.is_empty() {
                if s[0] == first {
                    let matched = like_internal(s, p)?;
                    if matched != LikeResult::NotMatched {
                        return Ok(matched);
                    }
                }
                s = &s[1..];
            }
            return Ok(LikeResult::Abort);
        } else if p[0] == b'_' {
            // any single byte
        } else if p[0] != s[0] {
            return Ok(LikeResult::NotMatched);
        }
        p = &p[1..];
        s = &s[1..];
    }

    if !s.is_empty() {
        return Ok(LikeResult::NotMatched);
    }

    // The string is exhausted; only a run of % may remain in the pattern.
    while !p.is_empty() && p[0] == b'%' {
        p = &p[1..];
    }
    if p.is_empty() {
        Ok(LikeResult::Matched)
    } else {
        Ok(LikeResult::Abort)
    }
}
