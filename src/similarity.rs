use similar::{Algorithm, TextDiff};

/// Minimum description similarity for two records to count as the same
/// transaction in the fuzzy passes.
pub const DESCRIPTION_MATCH_THRESHOLD: f64 = 0.75;

/// Case-insensitive similarity of two descriptions in `[0, 1]`.
///
/// The ratio is `2 * M / T`, where `M` is the length of the longest common
/// subsequence of characters and `T` the combined length of both strings.
pub fn description_similarity(a: &str, b: &str) -> f64 {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    let diff = TextDiff::configure()
        .algorithm(Algorithm::Myers)
        .diff_chars(a.as_str(), b.as_str());
    f64::from(diff.ratio())
}

/// Index and score of the most similar candidate, if any reaches `threshold`.
/// Ties keep the first candidate found.
pub fn best_match<'a, I>(needle: &str, candidates: I, threshold: f64) -> Option<(usize, f64)>
where
    I: IntoIterator<Item = (usize, &'a str)>,
{
    let mut best: Option<(usize, f64)> = None;
    for (index, description) in candidates {
        let score = description_similarity(needle, description);
        if score < threshold {
            continue;
        }
        if best.map_or(true, |(_, top)| score > top) {
            best = Some((index, score));
        }
    }
    best
}
