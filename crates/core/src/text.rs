use unicode_segmentation::UnicodeSegmentation;

pub fn normalize_text(input: &str) -> String {
    input
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}

/// Bounded, grapheme-safe excerpt for logs.
pub fn preview(input: &str, max_graphemes: usize) -> String {
    let compact = normalize_text(input);
    if compact.graphemes(true).count() <= max_graphemes {
        compact
    } else {
        compact.graphemes(true).take(max_graphemes).collect::<String>() + "..."
    }
}

pub fn slugify(input: &str) -> String {
    let mut slug = String::new();
    for word in input.unicode_words() {
        if !slug.is_empty() {
            slug.push('-');
        }
        slug.push_str(&word.to_lowercase());
    }
    slug
}

/// Case-insensitive containment with a naive singular form of `term`.
pub fn mentions(haystack: &str, term: &str) -> bool {
    let haystack = haystack.to_lowercase();
    let term = term.trim().to_lowercase();
    if term.is_empty() {
        return false;
    }

    if haystack.contains(&term) {
        return true;
    }

    match term.strip_suffix('s') {
        Some(singular) if singular.chars().count() >= 3 => haystack.contains(singular),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugifies_meal_names() {
        assert_eq!(slugify("Cottage Cheese & Berries"), "cottage-cheese-berries");
    }

    #[test]
    fn preview_truncates_on_grapheme_boundaries() {
        assert_eq!(preview("שלום   עולם", 4), "שלום...");
        assert_eq!(preview("short", 20), "short");
    }

    #[test]
    fn mentions_matches_plural_terms() {
        assert!(mentions("Peanut Butter Toast", "peanuts"));
        assert!(!mentions("Oat Porridge", "eggs"));
        assert!(!mentions("anything", "  "));
    }
}
