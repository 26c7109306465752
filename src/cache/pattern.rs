//! Glob matching for invalidation patterns.
//!
//! `*` matches any run of characters, including `:` segment separators.
//! Every other character matches itself.

/// True when `pattern` matches the whole of `key`.
pub fn matches(pattern: &str, key: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if !pattern.contains('*') {
        return pattern == key;
    }

    let pattern = pattern.as_bytes();
    let key = key.as_bytes();
    let (mut p, mut k) = (0, 0);
    // Position after the most recent `*` and the key index it was tried at
    let mut backtrack: Option<(usize, usize)> = None;

    while k < key.len() {
        if p < pattern.len() && pattern[p] == b'*' {
            backtrack = Some((p + 1, k));
            p += 1;
        } else if p < pattern.len() && pattern[p] == key[k] {
            p += 1;
            k += 1;
        } else if let Some((star_p, star_k)) = backtrack {
            p = star_p;
            k = star_k + 1;
            backtrack = Some((star_p, star_k + 1));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|&b| b == b'*')
}

/// True when the pattern removes everything.
pub fn is_match_all(pattern: &str) -> bool {
    !pattern.is_empty() && pattern.bytes().all(|b| b == b'*')
}
