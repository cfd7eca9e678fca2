//! Content heuristics (spec §4.4 substep 6): a small set of regex-driven
//! spam rules. A match produces `spam_detected` with low severity — the
//! message is accepted but not forwarded downstream.

use regex::Regex;

pub struct SpamRule {
    pub name: &'static str,
    pattern: Regex,
}

pub struct SpamClassifier {
    rules: Vec<SpamRule>,
}

impl Default for SpamClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl SpamClassifier {
    pub fn new() -> Self {
        let patterns: &[(&str, &str)] = &[
            ("repeated_char_flood", r"(.)\1{9,}"),
            ("bare_url_spam", r"(?i)^\s*https?://\S+\s*$"),
            ("crypto_giveaway", r"(?i)\b(free|claim)\s+(airdrop|giveaway)\b"),
            ("pump_signal", r"(?i)\b(100x|guaranteed\s+profit|to\s+the\s+moon)\b"),
            ("telegram_invite_spam", r"(?i)t\.me/\S+.*t\.me/\S+"),
        ];

        Self {
            rules: patterns
                .iter()
                .map(|(name, pattern)| SpamRule {
                    name,
                    pattern: Regex::new(pattern).expect("spam rule pattern is a compile-time constant"),
                })
                .collect(),
        }
    }

    /// Returns the names of every rule that matched `text`.
    pub fn matches(&self, text: &str) -> Vec<&'static str> {
        self.rules.iter().filter(|rule| rule.pattern.is_match(text)).map(|rule| rule.name).collect()
    }

    pub fn is_spam(&self, text: &str) -> bool {
        self.rules.iter().any(|rule| rule.pattern.is_match(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_repeated_char_flood() {
        let classifier = SpamClassifier::new();
        assert!(classifier.is_spam("heyyyyyyyyyyyyyy"));
    }

    #[test]
    fn flags_crypto_giveaway_phrasing() {
        let classifier = SpamClassifier::new();
        assert!(classifier.is_spam("FREE AIRDROP for everyone, claim now"));
    }

    #[test]
    fn leaves_ordinary_text_alone() {
        let classifier = SpamClassifier::new();
        assert!(!classifier.is_spam("hey, is the raid still going on?"));
    }
}
