//! Response humanization (spec §4.8): controlled typo and contradiction
//! injection at configured rates, applied by the dispatcher after the model
//! engine returns but before the turn is persisted and published.

use rand::Rng;
use unicode_segmentation::UnicodeSegmentation;

#[derive(Debug, Clone)]
pub struct HumanizationConfig {
    /// Probability, per response, of swapping one pair of adjacent
    /// graphemes within a word.
    pub typo_rate: f32,
    /// Probability, per response, of appending a hedging aside that mildly
    /// contradicts the preceding sentence's certainty.
    pub contradiction_rate: f32,
}

impl Default for HumanizationConfig {
    fn default() -> Self {
        Self {
            typo_rate: 0.0,
            contradiction_rate: 0.0,
        }
    }
}

const HEDGES: &[&str] = &[
    " ...actually, don't quote me on that.",
    " though I could be wrong here.",
    " but double check that one.",
];

/// Applies typo and contradiction injection in place, using `rng` for every
/// random decision so call sites can make the process deterministic in
/// tests.
pub fn humanize(text: &str, config: &HumanizationConfig, rng: &mut impl Rng) -> String {
    let mut out = text.to_string();

    if config.typo_rate > 0.0 && rng.gen::<f32>() < config.typo_rate {
        out = inject_typo(&out, rng);
    }

    if config.contradiction_rate > 0.0 && rng.gen::<f32>() < config.contradiction_rate {
        let hedge = HEDGES[rng.gen_range(0..HEDGES.len())];
        out.push_str(hedge);
    }

    out
}

fn inject_typo(text: &str, rng: &mut impl Rng) -> String {
    let graphemes: Vec<&str> = text.graphemes(true).collect();
    if graphemes.len() < 4 {
        return text.to_string();
    }

    let swap_candidates: Vec<usize> = (1..graphemes.len() - 1)
        .filter(|&i| graphemes[i] != " " && graphemes[i + 1] != " ")
        .collect();

    let Some(&pos) = swap_candidates.get(rng.gen_range(0..swap_candidates.len().max(1))) else {
        return text.to_string();
    };

    let mut swapped = graphemes;
    swapped.swap(pos, pos + 1);
    swapped.concat()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn zero_rates_leave_text_untouched() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(1);
        let config = HumanizationConfig {
            typo_rate: 0.0,
            contradiction_rate: 0.0,
        };
        assert_eq!(humanize("hello world", &config, &mut rng), "hello world");
    }

    #[test]
    fn full_contradiction_rate_always_appends_a_hedge() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(2);
        let config = HumanizationConfig {
            typo_rate: 0.0,
            contradiction_rate: 1.0,
        };
        let out = humanize("the raid ends at noon.", &config, &mut rng);
        assert!(out.len() > "the raid ends at noon.".len());
    }
}
