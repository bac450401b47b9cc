//! Dotted numeric version comparison for product version criteria.

/// Whether `actual` is at least `required`, comparing dot-separated numeric
/// segments. Non-numeric trailing characters in a segment are ignored
/// (`"10a"` counts as 10); missing segments count as zero.
pub fn satisfies_minimum(actual: &str, required: &str) -> bool {
    let actual = parse_segments(actual);
    let required = parse_segments(required);
    let len = actual.len().max(required.len());
    for i in 0..len {
        let a = actual.get(i).copied().unwrap_or(0);
        let r = required.get(i).copied().unwrap_or(0);
        if a != r {
            return a > r;
        }
    }
    true
}

fn parse_segments(version: &str) -> Vec<u64> {
    version
        .split('.')
        .map(|segment| {
            let digits: String = segment.chars().take_while(|c| c.is_ascii_digit()).collect();
            digits.parse().unwrap_or(0)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_versions_satisfy() {
        assert!(satisfies_minimum("4.1.0", "4.1.0"));
    }

    #[test]
    fn higher_versions_satisfy() {
        assert!(satisfies_minimum("4.2", "4.1.9"));
        assert!(satisfies_minimum("10.0", "9.9"));
    }

    #[test]
    fn lower_versions_do_not_satisfy() {
        assert!(!satisfies_minimum("4.0.9", "4.1"));
        assert!(!satisfies_minimum("9.9", "10.0"));
    }

    #[test]
    fn missing_segments_count_as_zero() {
        assert!(satisfies_minimum("4.1", "4.1.0"));
        assert!(!satisfies_minimum("4.1", "4.1.1"));
    }

    #[test]
    fn non_numeric_suffixes_are_ignored() {
        assert!(satisfies_minimum("4.1b", "4.1"));
        assert!(!satisfies_minimum("beta", "1.0"));
    }
}
