//! String similarity scores used for disambiguation and corroboration.
//!
//! Both scores are case-sensitive and operate on Unicode scalar values.

use std::collections::BTreeSet;

/// `1 − levenshtein / max(len)`, in [0, 1]. Two empty strings score 1.
pub fn normalized_similarity(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(a, b)
}

/// Token-set ratio in [0, 100].
///
/// Splits both strings on whitespace into sets, then compares the sorted
/// intersection and the two sorted differences. A side whose tokens are all
/// contained in the other side scores 100; an empty side scores 0.
pub fn token_set_ratio(a: &str, b: &str) -> f64 {
    let tokens_a: BTreeSet<&str> = a.split_whitespace().collect();
    let tokens_b: BTreeSet<&str> = b.split_whitespace().collect();
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }

    let intersection: Vec<&str> = tokens_a.intersection(&tokens_b).copied().collect();
    let diff_ab: Vec<&str> = tokens_a.difference(&tokens_b).copied().collect();
    let diff_ba: Vec<&str> = tokens_b.difference(&tokens_a).copied().collect();

    if !intersection.is_empty() && (diff_ab.is_empty() || diff_ba.is_empty()) {
        return 100.0;
    }

    let diff_ab = diff_ab.join(" ");
    let diff_ba = diff_ba.join(" ");
    let ab_len = diff_ab.chars().count();
    let ba_len = diff_ba.chars().count();
    let sect_len = intersection.join(" ").chars().count();

    let result = indel_ratio(&diff_ab, &diff_ba);
    if sect_len == 0 {
        return result;
    }

    // "sect" vs "sect + ' ' + diff" differ by exactly the diff and one space
    let sect_ab_len = sect_len + 1 + ab_len;
    let sect_ba_len = sect_len + 1 + ba_len;
    let sect_ab = 100.0 * (1.0 - (ab_len + 1) as f64 / (sect_len + sect_ab_len) as f64);
    let sect_ba = 100.0 * (1.0 - (ba_len + 1) as f64 / (sect_len + sect_ba_len) as f64);

    result.max(sect_ab).max(sect_ba)
}

/// `100 · (1 − indel / (len a + len b))`, where indel counts insertions and deletions.
fn indel_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 100.0;
    }
    let distance = total - 2 * lcs_len(&a, &b);
    100.0 * (1.0 - distance as f64 / total as f64)
}

fn lcs_len(a: &[char], b: &[char]) -> usize {
    let mut row = vec![0usize; b.len() + 1];
    for &ca in a {
        let mut diagonal = 0;
        for (j, &cb) in b.iter().enumerate() {
            let above = row[j + 1];
            row[j + 1] = if ca == cb { diagonal + 1 } else { above.max(row[j]) };
            diagonal = above;
        }
    }
    row[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_normalized_similarity() {
        assert!(approx(normalized_similarity("J. Smith", "J. Smith"), 1.0));
        assert!(approx(normalized_similarity("J. Smith", "John Smith"), 0.7));
        assert!(approx(normalized_similarity("abc", "xyz"), 0.0));
    }

    #[test]
    fn test_subset_scores_full() {
        assert!(approx(token_set_ratio("University of Antwerp", "ECOOM University of Antwerp"), 100.0));
        assert!(approx(token_set_ratio("Antwerp Antwerp", "Antwerp"), 100.0));
    }

    #[test]
    fn test_empty_side_scores_zero() {
        assert!(approx(token_set_ratio("", "University of Antwerp"), 0.0));
        assert!(approx(token_set_ratio("CWI", "   "), 0.0));
    }

    #[test]
    fn test_disjoint_tokens() {
        assert!(approx(token_set_ratio("abc", "xyz"), 0.0));
        // "Open" vs "Opera": lcs 3, indel 3
        assert!(approx(token_set_ratio("Open", "Opera"), 100.0 * (1.0 - 3.0 / 9.0)));
    }

    #[test]
    fn test_partial_overlap_uses_intersection() {
        // sect "Antwerp" (7), diff_ab "ECOOM" (5): 100 · (1 − 6/20)
        assert!(approx(token_set_ratio("ECOOM Antwerp", "University of Antwerp"), 70.0));
    }

    #[test]
    fn test_is_case_sensitive() {
        assert!(token_set_ratio("university of antwerp", "University of Antwerp") < 100.0);
    }

    #[test]
    fn test_lcs() {
        let a: Vec<char> = "kitten".chars().collect();
        let b: Vec<char> = "sitting".chars().collect();
        assert_eq!(lcs_len(&a, &b), 4);
    }
}
