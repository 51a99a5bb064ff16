//! Build-tool version ordering.
//!
//! Versions are compared segment by segment, never byte by byte:
//!
//! - the text is lowercased and split on `.`, `-`, `_` and on every switch
//!   between digits and letters (`1.0rc2` → `1`, `0`, `rc`, `2`)
//! - numeric segments compare by value, whatever their length
//!   (`1.10 > 1.9`)
//! - qualifiers rank `alpha < beta < milestone < rc < snapshot < release <
//!   sp < anything unknown`, unknown ones ordered alphabetically
//! - at the same position a number outranks a qualifier (`1.0.1 > 1.0-rc1`)
//! - trailing zeros and release markers carry no weight (`1 == 1.0 == 1.0-ga`)
//!
//! A version that runs out of segments compares as if padded with a marker
//! that sits above every pre-release qualifier and below everything else.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Qualifier {
    Alpha,
    Beta,
    Milestone,
    Rc,
    Snapshot,
    Release,
    Sp,
    Other(String),
}

impl Qualifier {
    /// `a`, `b` and `m` are shorthands only when a number follows directly
    /// (`1.0a1`, not `1.0-a`).
    fn parse(word: &str, joined_to_number: bool) -> Self {
        match word {
            "alpha" => Self::Alpha,
            "beta" => Self::Beta,
            "milestone" => Self::Milestone,
            "rc" | "cr" => Self::Rc,
            "snapshot" => Self::Snapshot,
            "" | "ga" | "final" | "release" => Self::Release,
            "sp" => Self::Sp,
            "a" if joined_to_number => Self::Alpha,
            "b" if joined_to_number => Self::Beta,
            "m" if joined_to_number => Self::Milestone,
            other => Self::Other(other.to_string()),
        }
    }

    const fn rank(&self) -> u8 {
        match self {
            Self::Alpha => 0,
            Self::Beta => 1,
            Self::Milestone => 2,
            Self::Rc => 3,
            Self::Snapshot => 4,
            Self::Release => 5,
            Self::Sp => 6,
            Self::Other(_) => 7,
        }
    }
}

impl Ord for Qualifier {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Other(a), Self::Other(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for Qualifier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Item {
    /// Decimal digits without leading zeros; `"0"` for zero.
    Number(String),
    Qualifier(Qualifier),
}

impl Item {
    /// Compare against a missing segment (the shorter version ran out).
    /// A missing segment sits just above the pre-release qualifiers.
    fn cmp_null(&self) -> Ordering {
        match self {
            Self::Number(_) => Ordering::Greater,
            Self::Qualifier(q) => q.cmp(&Qualifier::Release),
        }
    }
}

impl Ord for Item {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => a.len().cmp(&b.len()).then_with(|| a.cmp(b)),
            (Self::Number(_), Self::Qualifier(_)) => Ordering::Greater,
            (Self::Qualifier(_), Self::Number(_)) => Ordering::Less,
            (Self::Qualifier(a), Self::Qualifier(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for Item {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A parsed, comparable version string.
#[derive(Debug, Clone)]
pub struct Version {
    raw: String,
    items: Vec<Item>,
}

impl Version {
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        Self {
            raw: raw.to_string(),
            items: tokenize(raw),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// True when the version carries a pre-release qualifier.
    #[must_use]
    pub fn is_prerelease(&self) -> bool {
        self.items
            .iter()
            .any(|item| matches!(item, Item::Qualifier(q) if q.rank() < Qualifier::Release.rank()))
    }
}

fn tokenize(raw: &str) -> Vec<Item> {
    let lower = raw.trim().to_ascii_lowercase();
    // (text, is_digit, directly followed by the next segment)
    let mut segments: Vec<(String, bool, bool)> = Vec::new();
    let mut current = String::new();
    let mut current_is_digit = false;

    for ch in lower.chars() {
        if matches!(ch, '.' | '-' | '_' | '+') {
            if !current.is_empty() {
                segments.push((std::mem::take(&mut current), current_is_digit, false));
            }
            continue;
        }
        let is_digit = ch.is_ascii_digit();
        if !current.is_empty() && is_digit != current_is_digit {
            segments.push((std::mem::take(&mut current), current_is_digit, true));
        }
        current_is_digit = is_digit;
        current.push(ch);
    }
    if !current.is_empty() {
        segments.push((current, current_is_digit, false));
    }

    let items = segments.into_iter().map(|(segment, is_digit, joined)| {
        if is_digit {
            let trimmed = segment.trim_start_matches('0');
            Item::Number(if trimmed.is_empty() { "0" } else { trimmed }.to_string())
        } else {
            Item::Qualifier(Qualifier::parse(&segment, joined))
        }
    });
    normalize(items.collect())
}

/// Drop release markers everywhere, and zeros that are only followed by
/// zeros before a qualifier or the end (`1.0.0-rc1` → `1-rc1`, `1.0` → `1`).
fn normalize(items: Vec<Item>) -> Vec<Item> {
    let mut kept = Vec::with_capacity(items.len());
    let mut strip_zeros = true;
    for item in items.into_iter().rev() {
        match &item {
            Item::Qualifier(Qualifier::Release) => continue,
            Item::Qualifier(_) => strip_zeros = true,
            Item::Number(digits) if digits == "0" => {
                if strip_zeros {
                    continue;
                }
            }
            Item::Number(_) => strip_zeros = false,
        }
        kept.push(item);
    }
    kept.reverse();
    kept
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.items.len().max(other.items.len());
        for idx in 0..len {
            let ordering = match (self.items.get(idx), other.items.get(idx)) {
                (Some(a), Some(b)) => a.cmp(b),
                (Some(a), None) => a.cmp_null(),
                (None, Some(b)) => b.cmp_null().reverse(),
                (None, None) => Ordering::Equal,
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for Version {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

/// Compare two version strings.
#[must_use]
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    Version::parse(a).cmp(&Version::parse(b))
}

/// Sort newest first. Equal versions keep their input order.
pub fn sort_descending(versions: &mut [String]) {
    let mut keyed: Vec<(Version, String)> = versions
        .iter()
        .map(|raw| (Version::parse(raw), raw.clone()))
        .collect();
    keyed.sort_by(|(a, _), (b, _)| b.cmp(a));
    for (slot, (_, raw)) in versions.iter_mut().zip(keyed) {
        *slot = raw;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sorted_desc(input: &[&str]) -> Vec<String> {
        let mut versions: Vec<String> = input.iter().map(ToString::to_string).collect();
        sort_descending(&mut versions);
        versions
    }

    #[test]
    fn numeric_segments_are_not_lexicographic() {
        assert_eq!(sorted_desc(&["1.10", "1.9", "1.0"]), vec!["1.10", "1.9", "1.0"]);
        assert_eq!(sorted_desc(&["1.9", "1.10", "1.0"]), vec!["1.10", "1.9", "1.0"]);
        assert_eq!(compare_versions("2.0", "10.0"), Ordering::Less);
    }

    #[test]
    fn qualifiers_rank_below_release() {
        let ladder = [
            "1.0-alpha1",
            "1.0-beta",
            "1.0-m3",
            "1.0-rc1",
            "1.0-SNAPSHOT",
            "1.0",
            "1.0-sp1",
        ];
        for pair in ladder.windows(2) {
            assert_eq!(
                compare_versions(pair[0], pair[1]),
                Ordering::Less,
                "{} < {}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn trailing_zeros_and_release_markers_are_insignificant() {
        assert_eq!(compare_versions("1", "1.0.0"), Ordering::Equal);
        assert_eq!(compare_versions("1.0-GA", "1.0"), Ordering::Equal);
        assert_eq!(compare_versions("1.0.final", "1"), Ordering::Equal);
        assert_eq!(Version::parse("1.0"), Version::parse("1"));
    }

    #[test]
    fn number_outranks_qualifier_at_same_position() {
        assert_eq!(compare_versions("1.0.1", "1.0-rc1"), Ordering::Greater);
        assert_eq!(compare_versions("1.1", "1-sp"), Ordering::Greater);
    }

    #[test]
    fn letter_digit_transitions_split_segments() {
        assert_eq!(compare_versions("1.0rc2", "1.0-rc-2"), Ordering::Equal);
        assert_eq!(compare_versions("1.0rc10", "1.0rc9"), Ordering::Greater);
        assert_eq!(compare_versions("2.0b1", "2.0-beta-1"), Ordering::Equal);
    }

    #[test]
    fn huge_numbers_do_not_overflow() {
        assert_eq!(
            compare_versions("1.99999999999999999999999", "1.100000000000000000000000"),
            Ordering::Less
        );
        assert_eq!(compare_versions("1.007", "1.7"), Ordering::Equal);
    }

    #[test]
    fn unknown_qualifiers_sort_after_known_ones() {
        assert_eq!(compare_versions("1.0-jre", "1.0"), Ordering::Greater);
        assert_eq!(compare_versions("1.0-android", "1.0-jre"), Ordering::Less);
    }

    #[test]
    fn prerelease_detection() {
        assert!(Version::parse("3.0.0-M1").is_prerelease());
        assert!(Version::parse("3.0.0-SNAPSHOT").is_prerelease());
        assert!(!Version::parse("3.0.0").is_prerelease());
        assert!(!Version::parse("3.0.0-sp2").is_prerelease());
    }
}
