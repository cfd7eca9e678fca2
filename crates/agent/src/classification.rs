//! Ingress Stage 2 — Classification & Routing (spec §4.4).
//!
//! Regex/keyword scoring over the normalized message text. Emergency
//! phrases take priority over every other rule; a miss in any of these
//! rules logs and falls back to `category = unknown` rather than rejecting
//! the message (spec §4.4 "Stage-2 failures log and fall back...").

use once_cell::sync::Lazy;
use raidcore_core::{Category, Classification};
use regex::RegexSet;

/// Matches first; bypasses the batching the prompt composer might
/// otherwise apply (spec §4.4).
const EMERGENCY_PHRASES: &[&str] = &["i want to hurt myself", "i'm going to kill", "send help now", "this is an emergency"];

struct Rule {
    category: Category,
    patterns: &'static [&'static str],
    weight: f32,
}

static RULES: &[Rule] = &[
    Rule {
        category: Category::RaidControl,
        patterns: &["(?i)\\braid\\b", "(?i)\\bjoin raid\\b", "(?i)\\bleaderboard\\b", "(?i)\\bretweet\\b", "(?i)\\blike and repost\\b"],
        weight: 0.3,
    },
    Rule {
        category: Category::CryptoQuery,
        patterns: &["(?i)\\bprice\\b", "(?i)\\btoken\\b", "(?i)\\bwallet\\b", "(?i)\\bapy\\b", "(?i)\\bmarket cap\\b"],
        weight: 0.25,
    },
    Rule {
        category: Category::Meme,
        patterns: &["(?i)\\blol\\b", "(?i)\\blmao\\b", "(?i)\\bmeme\\b", "😂", "💀"],
        weight: 0.2,
    },
    Rule {
        category: Category::Support,
        patterns: &["(?i)\\bhelp\\b", "(?i)\\bbroken\\b", "(?i)\\bnot working\\b", "(?i)\\bbug\\b", "(?i)\\berror\\b"],
        weight: 0.25,
    },
    Rule {
        category: Category::PersonalityTrigger,
        patterns: &["(?i)\\bwho are you\\b", "(?i)\\bare you (a |an )?(ai|bot|human)\\b", "(?i)\\btell me about yourself\\b"],
        weight: 0.2,
    },
];

static EMERGENCY_SET: Lazy<RegexSet> = Lazy::new(|| RegexSet::new(EMERGENCY_PHRASES.iter().map(|p| regex::escape(p))).expect("static emergency phrases compile"));

static RULE_SETS: Lazy<Vec<RegexSet>> =
    Lazy::new(|| RULES.iter().map(|rule| RegexSet::new(rule.patterns).expect("static rule patterns compile")).collect());

/// Classifies normalized message text into a [`Classification`] (spec
/// §4.4 Stage 2). Never returns an error: failures downgrade to
/// `Category::Unknown`.
pub fn classify(text: &str) -> Classification {
    if text.trim().is_empty() {
        return Classification::unknown();
    }

    if EMERGENCY_SET.is_match(text) {
        return Classification {
            category: Category::Emergency,
            confidence: 1.0,
            suspension_hints: vec!["priority_lane".to_string()],
        };
    }

    let mut best: Option<(Category, f32, usize)> = None;
    for (rule, set) in RULES.iter().zip(RULE_SETS.iter()) {
        let hits = set.matches(text).iter().count();
        if hits == 0 {
            continue;
        }
        let score = (rule.weight * hits as f32).min(1.0);
        if best.as_ref().map(|(_, s, _)| score > *s).unwrap_or(true) {
            best = Some((rule.category, score, hits));
        }
    }

    match best {
        Some((category, confidence, hits)) => Classification {
            category,
            confidence,
            suspension_hints: if hits > 1 { vec!["multi_rule_match".to_string()] } else { vec![] },
        },
        None => Classification {
            category: Category::CommunityChat,
            confidence: 0.1,
            suspension_hints: vec![],
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::empty("", Category::Unknown)]
    #[case::emergency("please send help now, this is urgent", Category::Emergency)]
    #[case::raid_control("can I join raid #3?", Category::RaidControl)]
    #[case::raid_leaderboard("show me the leaderboard", Category::RaidControl)]
    #[case::crypto("what's the token price today?", Category::CryptoQuery)]
    #[case::meme("lmao that's wild 😂", Category::Meme)]
    #[case::support("the bot is broken, help", Category::Support)]
    #[case::personality("who are you?", Category::PersonalityTrigger)]
    #[case::unmatched_chat("good morning everyone", Category::CommunityChat)]
    fn classifies_into_expected_category(#[case] text: &str, #[case] expected: Category) {
        assert_eq!(classify(text).category, expected);
    }

    #[test]
    fn emergency_phrase_takes_priority_lane() {
        let c = classify("please send help now, this is urgent");
        assert!(c.suspension_hints.contains(&"priority_lane".to_string()));
    }
}
