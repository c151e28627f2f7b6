//! Case styling for assigned names.
//!
//! Stylers run on raw candidate strings after word splitting; they
//! legalize as they go, so any input produces a usable identifier.

use typeforge_core::words::split_into_words;

pub type StyleFn = fn(&str) -> String;

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        None => String::new(),
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
    }
}

/// Words that survive legalization, or a placeholder for degenerate input.
fn legal_words(raw: &str) -> Vec<String> {
    let words = split_into_words(raw);
    if words.is_empty() {
        return vec!["empty".to_string()];
    }
    words
}

pub fn pascal_case(raw: &str) -> String {
    let styled: String = legal_words(raw).iter().map(|w| capitalize(w)).collect();
    prefix_if_digit(styled)
}

pub fn camel_case(raw: &str) -> String {
    let words = legal_words(raw);
    let mut styled = words[0].to_lowercase();
    for word in &words[1..] {
        styled.push_str(&capitalize(word));
    }
    prefix_if_digit(styled)
}

pub fn snake_case(raw: &str) -> String {
    let styled = legal_words(raw)
        .iter()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join("_");
    prefix_if_digit(styled)
}

pub fn upper_snake_case(raw: &str) -> String {
    let styled = legal_words(raw)
        .iter()
        .map(|w| w.to_uppercase())
        .collect::<Vec<_>>()
        .join("_");
    prefix_if_digit(styled)
}

/// Identifiers must not start with a digit.
fn prefix_if_digit(styled: String) -> String {
    match styled.chars().next() {
        Some(c) if c.is_ascii_digit() => format!("the_{}", styled),
        _ => styled,
    }
}
