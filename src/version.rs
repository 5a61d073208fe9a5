// src/version.rs

//! Version comparison with epoch/release semantics
//!
//! Implements the pacman-style total ordering over version strings of the
//! form `[epoch:]version[-release]`. Comparison is never lexical: versions
//! are split into alternating alphabetic and numeric runs which are compared
//! pairwise. The epoch, when present, overrides everything else.

use std::cmp::Ordering;

/// Compare two version strings of the form `[epoch:]version[-release]`.
///
/// Epochs are compared numerically first (a missing epoch counts as 0),
/// then the upstream version segment-wise, then the release. If either
/// side has no release at all, the release comparison is skipped, so
/// `vercmp("1.0", "1.0-10") == Ordering::Equal`. This is intentional and
/// matches the reference behavior.
///
/// Any string is comparable; there is no failure mode.
pub fn vercmp(a: &str, b: &str) -> Ordering {
    let (epoch_a, ver_a, rel_a) = parse_evr(a);
    let (epoch_b, ver_b, rel_b) = parse_evr(b);

    let ret = compare_segments(epoch_a, epoch_b);
    if ret != Ordering::Equal {
        return ret;
    }

    let ret = compare_segments(ver_a, ver_b);
    if ret != Ordering::Equal {
        return ret;
    }

    // Release only matters when both sides carry one.
    match (rel_a, rel_b) {
        (Some(ra), Some(rb)) => compare_segments(ra, rb),
        _ => Ordering::Equal,
    }
}

/// Split a full version string into (epoch, version, release).
///
/// The epoch is the run of leading digits terminated by `:`; a `:` appearing
/// after any non-digit is ordinary version text. The release is everything
/// after the last `-`, absent when there is no `-` at all.
fn parse_evr(evr: &str) -> (&str, &str, Option<&str>) {
    let digits = evr.bytes().take_while(u8::is_ascii_digit).count();
    let (epoch, rest) = match evr.as_bytes().get(digits) {
        Some(b':') => (&evr[..digits], &evr[digits + 1..]),
        _ => ("0", evr),
    };
    let epoch = if epoch.is_empty() { "0" } else { epoch };

    match rest.rfind('-') {
        Some(pos) => (epoch, &rest[..pos], Some(&rest[pos + 1..])),
        None => (epoch, rest, None),
    }
}

/// Segment-wise comparison of two bare version fragments.
///
/// Walks both strings in alternating maximal numeric/alphabetic runs,
/// skipping separator characters. Numeric runs compare by value (leading
/// zeros stripped), alphabetic runs byte-wise. A numeric run beats an
/// alphabetic run at the same position, and a trailing alphabetic run makes
/// a version older (`1.0a` < `1.0`) while a trailing numeric one makes it
/// newer (`1.0.1` > `1.0`).
fn compare_segments(a: &str, b: &str) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }

    let one = a.as_bytes();
    let two = b.as_bytes();
    let (mut i, mut j) = (0, 0);

    while i < one.len() && j < two.len() {
        let sep_one = count_separators(&one[i..]);
        let sep_two = count_separators(&two[j..]);
        i += sep_one;
        j += sep_two;

        if i >= one.len() || j >= two.len() {
            break;
        }

        // More separators sorts later: "1..0" > "1.0".
        if sep_one != sep_two {
            return sep_one.cmp(&sep_two);
        }

        let is_num = one[i].is_ascii_digit();
        let run_one = run_len(&one[i..], is_num);
        let run_two = run_len(&two[j..], is_num);

        // The other side starts a run of the other kind: numeric wins.
        if run_two == 0 {
            return if is_num {
                Ordering::Greater
            } else {
                Ordering::Less
            };
        }

        let seg_one = &one[i..i + run_one];
        let seg_two = &two[j..j + run_two];
        let ret = if is_num {
            compare_numeric(seg_one, seg_two)
        } else {
            seg_one.cmp(seg_two)
        };
        if ret != Ordering::Equal {
            return ret;
        }

        i += run_one;
        j += run_two;
    }

    // One side ran out of segments inside the other's run.
    match (i < one.len(), j < two.len()) {
        (false, false) => Ordering::Equal,
        (true, false) => {
            if one[i].is_ascii_alphabetic() {
                Ordering::Less
            } else {
                Ordering::Greater
            }
        }
        (false, true) => {
            if two[j].is_ascii_alphabetic() {
                Ordering::Greater
            } else {
                Ordering::Less
            }
        }
        (true, true) => unreachable!("loop exits when a side is exhausted"),
    }
}

fn count_separators(s: &[u8]) -> usize {
    s.iter().take_while(|c| !c.is_ascii_alphanumeric()).count()
}

fn run_len(s: &[u8], numeric: bool) -> usize {
    s.iter()
        .take_while(|c| {
            if numeric {
                c.is_ascii_digit()
            } else {
                c.is_ascii_alphabetic()
            }
        })
        .count()
}

/// Compare two all-digit runs by numeric value without overflow concerns.
fn compare_numeric(a: &[u8], b: &[u8]) -> Ordering {
    let a = strip_leading_zeros(a);
    let b = strip_leading_zeros(b);
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn strip_leading_zeros(s: &[u8]) -> &[u8] {
    let zeros = s.iter().take_while(|&&c| c == b'0').count();
    &s[zeros..]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmp(a: &str, b: &str) -> i32 {
        match vercmp(a, b) {
            Ordering::Less => -1,
            Ordering::Equal => 0,
            Ordering::Greater => 1,
        }
    }

    #[test]
    fn test_smaller() {
        assert_eq!(cmp("1", "2"), -1);
    }

    #[test]
    fn test_greater() {
        assert_eq!(cmp("2", "1"), 1);
        assert_eq!(cmp("2.0-1", "1.7-6"), 1);
    }

    #[test]
    fn test_equal() {
        assert_eq!(cmp("1", "1"), 0);
        assert_eq!(cmp("1.0", "1.0-10"), 0);
    }

    #[test]
    fn test_epoch() {
        assert_eq!(cmp("4.34", "1:001"), -1);
        assert_eq!(cmp("1:1.0", "1.0"), 1);
        assert_eq!(cmp("0:1.0", "1.0"), 0);
    }

    #[test]
    fn test_release_compared_when_both_present() {
        assert_eq!(cmp("1.0-1", "1.0-2"), -1);
        assert_eq!(cmp("1.0-2", "1.0-1"), 1);
        assert_eq!(cmp("1.0-1", "1.0-1"), 0);
    }

    #[test]
    fn test_alpha_ordering() {
        // pacman convention: 1.0a < 1.0b < 1.0 < 1.0.1
        assert_eq!(cmp("1.0a", "1.0b"), -1);
        assert_eq!(cmp("1.0a", "1.0"), -1);
        assert_eq!(cmp("1.0a", "1.0.1"), -1);
        assert_eq!(cmp("1.0", "1.0.1"), -1);
        assert_eq!(cmp("1.0rc1", "1.0"), -1);
    }

    #[test]
    fn test_numeric_by_value() {
        assert_eq!(cmp("1.9", "1.10"), -1);
        assert_eq!(cmp("1.010", "1.10"), 0);
        assert_eq!(cmp("1.001", "1.1"), 0);
    }

    #[test]
    fn test_mixed_runs() {
        assert_eq!(cmp("1.5b", "1.5"), -1);
        assert_eq!(cmp("1.5b", "1.5.1"), -1);
        assert_eq!(cmp("2.0rc2", "2.0rc1"), 1);
    }

    #[test]
    fn test_antisymmetry() {
        let versions = [
            "1", "2", "1.0", "1.0-10", "1.0a", "1.0.1", "1:001", "4.34", "2.0rc1",
        ];
        for a in &versions {
            for b in &versions {
                assert_eq!(
                    cmp(a, b),
                    -cmp(b, a),
                    "antisymmetry violated for {a} vs {b}"
                );
            }
        }
    }

    #[test]
    fn test_equality_transitive() {
        assert_eq!(cmp("1.0", "1.0-10"), 0);
        assert_eq!(cmp("1.0-10", "1.0-010"), 0);
        assert_eq!(cmp("1.0", "1.0-010"), 0);
    }
}
