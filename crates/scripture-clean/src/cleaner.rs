use crate::locale::LocaleProfile;
use crate::normalize;
use crate::rules::{CleanRule, RuleSet};
use regex::{Captures, Regex};
use scraper::{node::Element, Html, Node};
use scripture_model::{VerseFragment, VerseRecord};

/// Class names of inline elements whose whole subtree is a marker rather than
/// verse text: footnotes, cross-references, and verse-number labels.
const MARKER_CLASSES: &[&str] = &["note", "label", "footnote", "crossref", "fn", "xr"];

/// Superscript glyphs used as verse numbers or footnote calls in plain text.
const SUPERSCRIPT_MARKERS: &str = "⁰¹²³⁴⁵⁶⁷⁸⁹ᵃᵇᶜᵈᵉᶠᵍʰⁱʲᵏˡᵐⁿᵒᵖʳˢᵗᵘᵛʷˣʸᶻ";

/// A tag opener or an entity reference: what makes text worth parsing as HTML.
const MARKUP_HINT: &str = r"<[A-Za-z/!?]|&(?:#[0-9]+|#[xX][0-9a-fA-F]+|[A-Za-z][A-Za-z0-9]*);";

/// Normalizes raw verse text for one locale.
///
/// Cleaning never fails: malformed markup degrades to whatever text the
/// HTML parser recovers. Output is a fixed point, so cleaning already clean
/// text returns it unchanged.
#[derive(Debug, Clone)]
pub struct Cleaner {
    locale: String,
    profile: LocaleProfile,
    rules: Vec<CleanRule>,
    markup_hint: Regex,
    footnote_calls: Regex,
}

impl Cleaner {
    pub fn for_locale(locale: &str) -> Self {
        Self {
            locale: locale.to_string(),
            profile: LocaleProfile::for_locale(locale),
            rules: Vec::new(),
            markup_hint: Regex::new(MARKUP_HINT).expect("valid regex"),
            // said[a], light[12]: calls glued to the preceding word. A
            // bracketed word after a space is text and stays.
            footnote_calls: Regex::new(r"(\w)(?:\[(?:[a-z]|\d{1,3})\])+").expect("valid regex"),
        }
    }

    /// Add the rules from `set` that apply to this cleaner's locale. They run
    /// after the built-in punctuation profile.
    pub fn with_rules(mut self, set: &RuleSet) -> Self {
        self.rules.extend(set.for_locale(&self.locale));
        self
    }

    pub fn clean(&self, fragment: &VerseFragment) -> VerseRecord {
        VerseRecord {
            book: fragment.chapter.book.code.clone(),
            chapter: fragment.chapter.chapter,
            verse: fragment.verse,
            text: self.clean_text(&fragment.raw_text),
        }
    }

    /// Run the full text pipeline:
    /// 1. drop footnote, cross-reference and label spans
    /// 2. flatten remaining markup, spacing at tag boundaries
    /// 3. canonicalize whitespace
    /// 4. apply the locale's punctuation profile, then any user rules
    /// 5. defuse anything in the result that would parse as markup again
    pub fn clean_text(&self, raw: &str) -> String {
        let flat = if self.markup_hint.is_match(raw) {
            strip_markup(raw)
        } else {
            raw.to_string()
        };

        let unmarked: String = flat
            .chars()
            .filter(|c| !SUPERSCRIPT_MARKERS.contains(*c))
            .collect();
        let text = normalize::nfc(&unmarked);
        let text = normalize::collapse_whitespace(&text);
        let text = normalize::tighten_punctuation(&text);
        let text = self.footnote_calls.replace_all(&text, "${1}");

        let mut text = self.profile.apply(&text);
        for rule in &self.rules {
            text = rule.apply(&text);
        }
        self.defuse_markup(&text)
    }

    /// Swap the lead character of tag- or entity-shaped text (left behind by
    /// decoding `&lt;b` or `&amp;amp;`) for a look-alike, so the output is
    /// never re-read as markup.
    fn defuse_markup(&self, text: &str) -> String {
        self.markup_hint
            .replace_all(text, |caps: &Captures| {
                let found = &caps[0];
                let lead = if found.starts_with('<') { '\u{2039}' } else { '\u{FF06}' };
                format!("{lead}{}", &found[1..])
            })
            .into_owned()
    }
}

/// Whether an element's whole subtree is a footnote, cross-reference, label or
/// superscript call rather than verse text.
pub fn is_marker_element(elem: &Element) -> bool {
    elem.name() == "sup" || elem.classes().any(|c| MARKER_CLASSES.contains(&c))
}

/// Whether a text node holds anything that survives cleaning.
pub fn carries_text(text: &str) -> bool {
    text.chars()
        .any(|c| !c.is_whitespace() && !SUPERSCRIPT_MARKERS.contains(c))
}

/// Flatten a markup fragment to text, dropping marker subtrees. Every element
/// boundary becomes a space so words in sibling nodes never fuse.
fn strip_markup(raw: &str) -> String {
    let fragment = Html::parse_fragment(raw);
    let mut out = String::with_capacity(raw.len());
    collect_text(fragment.tree.root(), &mut out);
    out
}

fn collect_text(node: ego_tree::NodeRef<'_, Node>, out: &mut String) {
    for child in node.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(elem) => {
                out.push(' ');
                if !is_marker_element(elem) && !matches!(elem.name(), "script" | "style" | "br") {
                    collect_text(child, out);
                    out.push(' ');
                }
            }
            _ => collect_text(child, out),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scripture_model::Canon;

    fn fragment(verse: u16, raw: &str) -> VerseFragment {
        VerseFragment {
            chapter: Canon::protestant().chapter_ref("GEN", 1).unwrap(),
            verse,
            raw_text: raw.to_string(),
        }
    }

    #[test]
    fn test_footnote_superscript_and_verse_glyph() {
        let cleaner = Cleaner::for_locale("en-GB");
        let record = cleaner.clean(&fragment(1, "¹In the beginning<sup>a</sup> God created"));
        assert_eq!(record.verse, 1);
        assert_eq!(record.book, "GEN");
        assert_eq!(record.chapter, 1);
        assert_eq!(record.text, "In the beginning God created");
    }

    #[test]
    fn test_note_spans_removed() {
        let cleaner = Cleaner::for_locale("en");
        let raw = concat!(
            r#"<span class="content">In the beginning</span>"#,
            r#"<span class="note f"><span class="label">#</span>"#,
            r#"<span class="body">Or <i>When God began</i></span></span>"#,
            r#"<span class="content"> God created the heaven and the earth.</span>"#,
        );
        assert_eq!(
            cleaner.clean_text(raw),
            "In the beginning God created the heaven and the earth."
        );
    }

    #[test]
    fn test_tags_become_spaces_and_entities_decode() {
        let cleaner = Cleaner::for_locale("en");
        let raw = concat!(
            r#"<span class="wj">I am</span>the light<br/>"#,
            r#"of the world &amp; life<span class="wj">.</span>"#,
        );
        assert_eq!(cleaner.clean_text(raw), "I am the light of the world & life.");
    }

    #[test]
    fn test_bracket_markers_and_whitespace() {
        let cleaner = Cleaner::for_locale("en");
        assert_eq!(
            cleaner.clean_text("  And God said[a],\n\t\u{201C}Let there be light[12]\u{201D}  "),
            "And God said, \"Let there be light\""
        );
    }

    #[test]
    fn test_bracketed_words_are_kept() {
        let cleaner = Cleaner::for_locale("en");
        assert_eq!(cleaner.clean_text("God [is] love"), "God [is] love");
        let raw = r#"<span class="content">God [is] love, and [he] that dwelleth</span>"#;
        assert_eq!(cleaner.clean_text(raw), "God [is] love, and [he] that dwelleth");
        assert_eq!(cleaner.clean_text("the Word[a][b] was"), "the Word was");
    }

    #[test]
    fn test_decoded_markup_characters_stay_text() {
        let cleaner = Cleaner::for_locale("en");
        assert_eq!(cleaner.clean_text("if a &lt;b then"), "if a \u{2039}b then");
        assert_eq!(cleaner.clean_text("AT&amp;amp;T"), "AT\u{FF06}amp;T");
        assert_eq!(cleaner.clean_text("you &amp; me"), "you & me");
        assert_eq!(cleaner.clean_text("salt & light"), "salt & light");
    }

    #[test]
    fn test_marker_only_content_cleans_to_nothing() {
        let cleaner = Cleaner::for_locale("en");
        assert_eq!(cleaner.clean_text(r#"<span class="content"><sup>a</sup></span>"#), "");
        assert!(!carries_text(" ¹ "));
        assert!(carries_text("a"));
    }

    #[test]
    fn test_idempotent() {
        let samples = [
            "¹In the beginning<sup>a</sup> God created",
            "if a &lt;b then",
            "AT&amp;amp;T",
            "God [is] love, and [he] that dwelleth",
            "x[a ] y",
            "a &lt;/i&gt; b &amp;#169; c",
            concat!(
                r#"<span class="content">“Hear, O Israel”</span>"#,
                r#"<span class="note x"><span class="body">Deut 6:4</span></span>..."#,
            ),
            "Il dit : “Que la lumière soit !”",
            "  plain   text , with ( odd ) spacing ",
        ];
        for locale in ["en", "fr", "de", "sw"] {
            let cleaner = Cleaner::for_locale(locale);
            for raw in samples {
                let once = cleaner.clean_text(raw);
                let twice = cleaner.clean_text(&once);
                assert_eq!(once, twice, "locale {locale}, input {raw:?}");
            }
        }
    }

    #[test]
    fn test_locale_changes_punctuation_only() {
        let raw = r#"<span class="content">God said, “Let there be light.”</span>"#;
        let en = Cleaner::for_locale("en").clean(&fragment(3, raw));
        let fr = Cleaner::for_locale("fr").clean(&fragment(3, raw));
        assert_eq!(en.verse, fr.verse);
        assert_eq!(en.text, "God said, \"Let there be light.\"");
        assert_eq!(fr.text, "God said, «\u{00A0}Let there be light.\u{00A0}»");
    }

    #[test]
    fn test_user_rules_run_after_profile() {
        let set =
            RuleSet::from_json(r#"{"rules": [{"search": "\"", "replace": "'", "locale": "en"}]}"#)
                .unwrap();
        let cleaner = Cleaner::for_locale("en-US").with_rules(&set);
        assert_eq!(cleaner.clean_text("“light”"), "'light'");
        let untouched = Cleaner::for_locale("fr").with_rules(&set);
        assert_eq!(untouched.clean_text("a\"b"), "a\"b");
    }

    #[test]
    fn test_malformed_markup_degrades() {
        let cleaner = Cleaner::for_locale("en");
        assert_eq!(cleaner.clean_text("<span class=\"content\">unclosed <i>text"), "unclosed text");
        assert_eq!(cleaner.clean_text("a < b"), "a < b");
    }
}
