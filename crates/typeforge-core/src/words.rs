//! Word splitting and light inflection for name handling.
//!
//! Splits identifiers on underscores, dashes, spaces, digit boundaries, and
//! camel-case humps, with acronym awareness ("HTTPProxy" -> ["HTTP",
//! "Proxy"]). The singularizer covers the regular English plurals that show
//! up in property names; anything irregular passes through unchanged.

/// Split an identifier into its words, preserving original casing.
pub fn split_into_words(name: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let chars: Vec<char> = name.chars().collect();

    let flush = |current: &mut String, words: &mut Vec<String>| {
        if !current.is_empty() {
            words.push(std::mem::take(current));
        }
    };

    for (i, &c) in chars.iter().enumerate() {
        if !c.is_alphanumeric() {
            flush(&mut current, &mut words);
            continue;
        }
        let prev = if i > 0 { Some(chars[i - 1]) } else { None };
        let next = chars.get(i + 1).copied();

        let boundary = match prev {
            None => false,
            Some(p) => {
                // aB, 1a, a1, and the last capital of an acronym run: "HTTPProxy"
                (c.is_uppercase() && p.is_lowercase())
                    || (c.is_ascii_digit() != p.is_ascii_digit()
                        && (c.is_alphanumeric() && p.is_alphanumeric()))
                    || (c.is_uppercase()
                        && p.is_uppercase()
                        && next.map_or(false, |n| n.is_lowercase()))
            }
        };
        if boundary {
            flush(&mut current, &mut words);
        }
        current.push(c);
    }
    flush(&mut current, &mut words);
    words
}

/// Lowercased, underscore-joined canonical form used to compare names.
pub fn normalized_words(name: &str) -> String {
    split_into_words(name)
        .iter()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join("_")
}

/// Rule-based singularizer for regular English plurals.
pub fn singularize(word: &str) -> String {
    let lower = word.to_lowercase();
    if lower.len() > 3 && lower.ends_with("ies") {
        let mut s = word[..word.len() - 3].to_string();
        s.push('y');
        return s;
    }
    if lower.len() > 3 && (lower.ends_with("sses") || lower.ends_with("shes") || lower.ends_with("ches") || lower.ends_with("xes"))
    {
        return word[..word.len() - 2].to_string();
    }
    if lower.len() > 1
        && lower.ends_with('s')
        && !lower.ends_with("ss")
        && !lower.ends_with("us")
        && !lower.ends_with("is")
    {
        return word[..word.len() - 1].to_string();
    }
    word.to_string()
}

/// Longest common prefix, in characters, over the given strings.
pub fn common_prefix_length<'a, I: IntoIterator<Item = &'a str>>(strings: I) -> usize {
    let mut iter = strings.into_iter();
    let first = match iter.next() {
        Some(f) => f,
        None => return 0,
    };
    let mut len = first.chars().count();
    for s in iter {
        len = len.min(
            first
                .chars()
                .zip(s.chars())
                .take_while(|(a, b)| a == b)
                .count(),
        );
    }
    len
}

/// Longest common suffix, in characters, over the given strings.
pub fn common_suffix_length<'a, I: IntoIterator<Item = &'a str>>(strings: I) -> usize {
    let mut iter = strings.into_iter();
    let first = match iter.next() {
        Some(f) => f,
        None => return 0,
    };
    let first_rev: Vec<char> = first.chars().rev().collect();
    let mut len = first_rev.len();
    for s in iter {
        len = len.min(
            first_rev
                .iter()
                .zip(s.chars().rev())
                .take_while(|(a, b)| **a == *b)
                .count(),
        );
    }
    len
}
