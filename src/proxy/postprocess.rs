// Text clean-up applied to buffered model output

use once_cell::sync::Lazy;
use regex::{NoExpand, Regex};

/// Words models overuse, with their plain replacement.
pub const VOCAB_SWAPS: &[(&str, &str)] = &[
    ("far-reaching", "huge"),
    ("widespread", "common"),
    ("harness", "use"),
    ("enhance", "improve"),
    ("evolving", "changing"),
    ("redefined", "changed"),
    ("crucial", "key"),
    ("pivotal", "main"),
    ("imperative", "must"),
    ("facilitate", "help"),
    ("exacerbate", "worsen"),
    ("mitigate", "fix"),
    ("underscore", "show"),
    ("delve", "dig"),
    ("leverage", "use"),
    ("utilize", "use"),
    ("employ", "use"),
    ("testament", "proof"),
    ("revolutionize", "change"),
    ("paradigm shift", "big change"),
    ("multifaceted", "complex"),
    ("realm", "world"),
    ("landscape", "scene"),
    ("comprehensive", "full"),
    ("capabilities", "skills"),
    ("optimize", "improve"),
    ("seamless", "smooth"),
    ("dynamic", "active"),
    ("holistic", "whole"),
    ("transformative", "big"),
    ("profound", "deep"),
    ("fundamentally", "really"),
    ("empower", "help"),
    ("versatility", "range"),
];

#[derive(Debug, Clone)]
struct Rule {
    pattern: Regex,
    replacement: &'static str,
    /// Replacement refers to capture groups
    expand: bool,
}

impl Rule {
    fn literal(pattern: &str, replacement: &'static str) -> Self {
        Self {
            pattern: Regex::new(pattern).expect("static post-processing pattern"),
            replacement,
            expand: false,
        }
    }

    fn expanding(pattern: &str, replacement: &'static str) -> Self {
        Self {
            expand: true,
            ..Self::literal(pattern, replacement)
        }
    }

    fn apply(&self, text: &str) -> String {
        if self.expand {
            self.pattern.replace_all(text, self.replacement).into_owned()
        } else {
            self.pattern
                .replace_all(text, NoExpand(self.replacement))
                .into_owned()
        }
    }
}

// A stack of preambles on one line goes in a single match.
static PREAMBLE: Lazy<Rule> = Lazy::new(|| {
    Rule::literal(r"(?im)^(?:\s*(?:here is|sure,|below is)[^\n]*?:)+", "")
});

static WRAPPING_QUOTES: Lazy<Rule> = Lazy::new(|| Rule::literal(r#"^["']+|["']+$"#, ""));

static VOCAB: Lazy<Vec<Rule>> = Lazy::new(|| {
    VOCAB_SWAPS
        .iter()
        .map(|&(word, swap)| Rule::literal(&format!(r"(?i)\b{}\b", regex::escape(word)), swap))
        .collect()
});

static PHRASE_FIXES: Lazy<Vec<Rule>> = Lazy::new(|| {
    vec![
        Rule::literal(r"(?i)fundamentally altering", "fundamentally alters"),
        Rule::expanding(r"(?i)empowered(\s+\w)", "helped$1"),
        Rule::literal(r"(?i)accompanied by", "with"),
        Rule::literal(r"computs\b", "computing"),
        Rule::literal(r"showcass\b", "shows"),
        Rule::literal(r"(?i)\bdo not\b", "don't"),
        Rule::literal(r"(?i)\bcan not\b", "can't"),
    ]
});

/// Deterministic rewrite of model prose: drops chatty preambles and
/// wrapping quotes, swaps overused vocabulary and fixes a few
/// contractions and recurring typos.
///
/// The rule set is applied until the text stops changing, so
/// `process(process(x)) == process(x)`.
#[derive(Debug, Clone, Default)]
pub struct PostProcessor;

impl PostProcessor {
    pub fn new() -> Self {
        Self
    }

    pub fn process(&self, text: &str) -> String {
        let mut current = text.to_string();
        loop {
            let next = Self::pass(&current);
            if next == current {
                return current;
            }
            current = next;
        }
    }

    fn pass(text: &str) -> String {
        let mut out = PREAMBLE.apply(text).trim().to_string();
        out = WRAPPING_QUOTES.apply(&out);
        for rule in VOCAB.iter().chain(PHRASE_FIXES.iter()) {
            out = rule.apply(&out);
        }
        out
    }
}
