use unicode_normalization::UnicodeNormalization;

/// Characters the text pipeline treats as whitespace. Covers the
/// no-break variants that chapter markup uses for typographic spacing.
fn is_space(c: char) -> bool {
    c.is_whitespace() || c == '\u{200B}' || c == '\u{FEFF}'
}

/// Normalize Unicode text to NFC form.
///
/// Editions mix precomposed and combining forms for accented letters; NFC
/// gives a single representation so diffs between runs are meaningful.
pub fn nfc(input: &str) -> String {
    input.nfc().collect()
}

/// Collapse every whitespace run (including no-break and zero-width spaces)
/// into one ASCII space and trim both ends.
pub fn collapse_whitespace(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut pending_space = false;

    for c in input.chars() {
        if is_space(c) {
            pending_space = true;
            continue;
        }
        if pending_space && !out.is_empty() {
            out.push(' ');
        }
        pending_space = false;
        out.push(c);
    }

    out
}

/// Remove spaces left in front of closing punctuation and after opening
/// brackets. Tag boundaries insert spaces, so `<span>word</span>.` arrives
/// here as `word .`.
pub fn tighten_punctuation(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());

    for (i, &c) in chars.iter().enumerate() {
        if c == ' ' {
            let next = chars.get(i + 1).copied();
            let prev = out.chars().last();
            if matches!(next, Some(',' | '.' | ';' | ':' | '!' | '?' | ')' | ']')) {
                continue;
            }
            if matches!(prev, Some('(' | '[')) {
                continue;
            }
        }
        out.push(c);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_nfc() {
        // e + combining acute accent -> é (precomposed)
        assert_eq!(nfc("e\u{0301}"), "é");
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(
            collapse_whitespace("  In the\n\t beginning\u{00A0} God  "),
            "In the beginning God"
        );
        assert_eq!(collapse_whitespace("a\u{200B}b"), "a b");
        assert_eq!(collapse_whitespace(""), "");
    }

    #[test]
    fn test_tighten_punctuation() {
        assert_eq!(tighten_punctuation("said , ( he ) ."), "said, (he).");
        assert_eq!(tighten_punctuation("Amen ."), "Amen.");
        assert_eq!(tighten_punctuation("no change"), "no change");
    }
}
