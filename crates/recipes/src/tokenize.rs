use std::sync::OnceLock;

use regex::Regex;

fn cleaner() -> &'static Regex {
    static CLEANER: OnceLock<Regex> = OnceLock::new();
    CLEANER.get_or_init(|| {
        Regex::new(r"[^\p{L}\p{Nd}\s]+").expect("valid tokenizer regex")
    })
}

pub fn tokenize(input: &str) -> Vec<String> {
    let normalized = cleaner().replace_all(input, " ").to_lowercase();

    normalized
        .split_whitespace()
        .filter(|token| token.chars().count() > 1)
        .map(|token| token.to_string())
        .collect()
}
