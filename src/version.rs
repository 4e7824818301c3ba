// src/version.rs

//! Package version comparison
//!
//! Versions are compared run by run: digit runs numerically (leading zeros
//! ignored), letter runs case-insensitively, and everything else as separator
//! characters where `-` and `_` count as `.` and the end of the string sorts
//! below any separator.

use std::cmp::Ordering;

/// Compare two version strings.
pub fn compare(a: &str, b: &str) -> Ordering {
    let a = a.as_bytes();
    let b = b.as_bytes();
    let (mut i, mut j) = (0, 0);

    while i < a.len() || j < b.len() {
        let ca = a.get(i).copied();
        let cb = b.get(j).copied();

        if ca.is_some_and(|c| c.is_ascii_digit()) || cb.is_some_and(|c| c.is_ascii_digit()) {
            let (ra, ni) = digit_run(a, i);
            let (rb, nj) = digit_run(b, j);
            match compare_numeric(ra, rb) {
                Ordering::Equal => {
                    i = ni;
                    j = nj;
                }
                ord => return ord,
            }
        } else if let (Some(x), Some(y)) = (ca, cb)
            && x.is_ascii_alphabetic()
            && y.is_ascii_alphabetic()
        {
            match x.to_ascii_lowercase().cmp(&y.to_ascii_lowercase()) {
                Ordering::Equal => {
                    i += 1;
                    j += 1;
                }
                ord => return ord,
            }
        } else {
            let sa = separator(ca);
            let sb = separator(cb);
            if sa != sb {
                return sa.cmp(&sb);
            }
            if ca.is_some() {
                i += 1;
            }
            if cb.is_some() {
                j += 1;
            }
        }
    }

    Ordering::Equal
}

/// `-1`, `0` or `1`, for callers that want the C-style contract.
pub fn vercmp(a: &str, b: &str) -> i32 {
    match compare(a, b) {
        Ordering::Less => -1,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
    }
}

/// Maximal digit run starting at `start` with leading zeros stripped,
/// plus the index just past the run.
fn digit_run(s: &[u8], start: usize) -> (&[u8], usize) {
    let mut begin = start;
    while s.get(begin) == Some(&b'0') {
        begin += 1;
    }
    let mut end = begin;
    while s.get(end).is_some_and(|c| c.is_ascii_digit()) {
        end += 1;
    }
    (&s[begin..end], end)
}

/// Digit runs without leading zeros: longer is bigger, then lexical.
fn compare_numeric(a: &[u8], b: &[u8]) -> Ordering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn separator(c: Option<u8>) -> u8 {
    match c {
        None => 0,
        Some(b'-' | b'_') => b'.',
        Some(c) => c,
    }
}
