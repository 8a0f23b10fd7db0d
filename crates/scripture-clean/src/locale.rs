/// How quotation marks are unified for a locale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteStyle {
    /// Leave quotation marks as the edition printed them.
    Preserve,
    /// Fold typographic double and single quotes to ASCII `"` and `'`.
    Straight,
    /// Fold curly double quotes to guillemets with no-break inner spacing.
    Guillemets,
}

/// Punctuation rules for one locale.
///
/// Profiles are looked up from a static table by BCP-47 tag, first by the
/// full tag and then by its primary language subtag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocaleProfile {
    pub tag: &'static str,
    pub quotes: QuoteStyle,
    /// Narrow no-break space before `; : ! ?` (French typography).
    pub high_punctuation_space: bool,
    /// Replace `...` with a single ellipsis character.
    pub ellipsis: bool,
}

const GENERIC: LocaleProfile = LocaleProfile {
    tag: "und",
    quotes: QuoteStyle::Preserve,
    high_punctuation_space: false,
    ellipsis: false,
};

const fn profile(
    tag: &'static str,
    quotes: QuoteStyle,
    high_punctuation_space: bool,
) -> LocaleProfile {
    LocaleProfile { tag, quotes, high_punctuation_space, ellipsis: true }
}

const PROFILES: &[LocaleProfile] = &[
    profile("en", QuoteStyle::Straight, false),
    profile("fil", QuoteStyle::Straight, false),
    profile("tl", QuoteStyle::Straight, false),
    profile("fr", QuoteStyle::Guillemets, true),
    profile("fr-ca", QuoteStyle::Guillemets, false),
    profile("de", QuoteStyle::Preserve, false),
    profile("es", QuoteStyle::Preserve, false),
    profile("pt", QuoteStyle::Preserve, false),
];

const NARROW_NBSP: char = '\u{202F}';
const NBSP: char = '\u{00A0}';

impl LocaleProfile {
    /// Resolve the profile for a locale tag such as `en-GB` or `fr_FR`.
    /// Unknown locales get a profile that changes no punctuation.
    pub fn for_locale(locale: &str) -> LocaleProfile {
        let tag = locale.trim().replace('_', "-").to_ascii_lowercase();
        if let Some(p) = PROFILES.iter().find(|p| p.tag == tag) {
            return p.clone();
        }
        let primary = tag.split('-').next().unwrap_or_default();
        PROFILES
            .iter()
            .find(|p| p.tag == primary)
            .cloned()
            .unwrap_or(GENERIC)
    }

    /// Apply this profile's punctuation rules. Input is expected to be
    /// whitespace-collapsed already; output stays idempotent under re-application
    /// after another collapse.
    pub fn apply(&self, text: &str) -> String {
        let mut out = match self.quotes {
            QuoteStyle::Preserve => text.to_string(),
            QuoteStyle::Straight => fold_straight(text),
            QuoteStyle::Guillemets => guillemets(text),
        };
        if self.ellipsis {
            out = out.replace("...", "…");
        }
        if self.high_punctuation_space {
            out = space_high_punctuation(&out);
        }
        out
    }
}

fn fold_straight(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{201F}' | '\u{2033}' | '\u{301D}'
            | '\u{301E}' | '\u{FF02}' => '"',
            '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}' | '\u{2032}' => '\'',
            other => other,
        })
        .collect()
}

fn guillemets(text: &str) -> String {
    let folded: String = text
        .chars()
        .map(|c| match c {
            '\u{201C}' | '\u{201E}' => '«',
            '\u{201D}' | '\u{201F}' => '»',
            other => other,
        })
        .collect();

    // « text » with no-break spaces on the inside.
    let chars: Vec<char> = folded.chars().collect();
    let mut out = String::with_capacity(folded.len() + 8);
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            '«' => {
                out.push('«');
                while chars.get(i + 1).is_some_and(|n| n.is_whitespace()) {
                    i += 1;
                }
                if chars.get(i + 1).is_some() {
                    out.push(NBSP);
                }
            }
            '»' => {
                while out.ends_with(|p: char| p.is_whitespace()) {
                    out.pop();
                }
                if !out.is_empty() {
                    out.push(NBSP);
                }
                out.push('»');
            }
            other => out.push(other),
        }
        i += 1;
    }
    out
}

fn space_high_punctuation(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len() + 8);

    for (i, &c) in chars.iter().enumerate() {
        if matches!(c, ';' | ':' | '!' | '?') {
            let next = chars.get(i + 1).copied();
            // 10:30 style numerals keep their colon tight.
            let numeric = c == ':' && next.is_some_and(|n| n.is_ascii_digit());
            if !numeric {
                while out.ends_with(|p: char| p.is_whitespace()) {
                    out.pop();
                }
                if !out.is_empty() {
                    out.push(NARROW_NBSP);
                }
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
    fn test_lookup_falls_back_to_primary_subtag() {
        assert_eq!(LocaleProfile::for_locale("en-GB").tag, "en");
        assert_eq!(LocaleProfile::for_locale("fr_CA").tag, "fr-ca");
        assert_eq!(LocaleProfile::for_locale("FR").tag, "fr");
        assert_eq!(LocaleProfile::for_locale("sw").tag, "und");
    }

    #[test]
    fn test_straight_quotes() {
        let p = LocaleProfile::for_locale("en-US");
        assert_eq!(p.apply("\u{201C}Let there be light\u{201D}..."), "\"Let there be light\"…");
        assert_eq!(p.apply("God\u{2019}s"), "God's");
    }

    #[test]
    fn test_french_typography() {
        let p = LocaleProfile::for_locale("fr-FR");
        let once = p.apply("Il dit\u{00A0}: \u{201C}Que la lumière soit!\u{201D}");
        assert_eq!(once, "Il dit\u{202F}: «\u{00A0}Que la lumière soit\u{202F}!\u{00A0}»");
        assert_eq!(p.apply("à 10:30 heures"), "à 10:30 heures");
    }

    #[test]
    fn test_generic_profile_leaves_punctuation() {
        let p = LocaleProfile::for_locale("sw");
        assert_eq!(p.apply("\u{201C}Mungu\u{201D}..."), "\u{201C}Mungu\u{201D}...");
    }
}
