use scraper::{ElementRef, Html, Node, Selector};
use scripture_clean::{carries_text, is_marker_element};
use scripture_model::{ChapterRef, RawChapterPayload, VerseFragment};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error("payload is not JSON: {0}")]
    NotJson(String),

    #[error("payload has no chapter content")]
    NoContent,

    #[error("no verse markers found in chapter markup")]
    NoVerses,

    #[error("verse marker has no usable number: {0}")]
    BadVerseNumber(String),

    #[error("verse {verse} labelled twice")]
    Duplicate { verse: u16 },

    #[error("verse {verse} follows verse {previous}")]
    Decreasing { previous: u16, verse: u16 },

    #[error("markup belongs to {found}, expected {expected}")]
    WrongChapter { expected: String, found: String },
}

/// One verse marker node as found in the markup.
struct VerseNode {
    verse: u16,
    labelled: bool,
    has_text: bool,
    raw: String,
}

/// Slices chapter markup into verse fragments.
///
/// Verses are `span.verse` nodes keyed by `data-usfm`; a verse broken across
/// paragraph or poetry blocks appears as several nodes with the same number,
/// only the first carrying a label, and those are merged. Inline markup
/// inside a verse is kept verbatim for the cleaner.
#[derive(Debug, Clone)]
pub struct Extractor {
    verse_sel: Selector,
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new()
    }
}

impl Extractor {
    pub fn new() -> Self {
        Self {
            verse_sel: Selector::parse(".verse").expect("valid selector"),
        }
    }

    pub fn extract(&self, payload: &RawChapterPayload) -> Result<Vec<VerseFragment>, ExtractError> {
        let markup = chapter_markup(&payload.body)?;
        self.extract_markup(&payload.chapter, &markup)
    }

    /// Extract fragments from already unwrapped chapter markup.
    pub fn extract_markup(
        &self,
        chapter: &ChapterRef,
        markup: &str,
    ) -> Result<Vec<VerseFragment>, ExtractError> {
        let document = Html::parse_fragment(markup);

        let mut nodes = Vec::new();
        for el in document.select(&self.verse_sel) {
            nodes.push(verse_node(chapter, el)?);
        }
        if nodes.is_empty() {
            return Err(ExtractError::NoVerses);
        }

        let mut merged: Vec<VerseNode> = Vec::new();
        for node in nodes {
            match merged.last_mut() {
                Some(last) if last.verse == node.verse => {
                    if node.labelled && last.labelled {
                        return Err(ExtractError::Duplicate { verse: node.verse });
                    }
                    if !last.raw.is_empty() && !node.raw.is_empty() {
                        last.raw.push(' ');
                    }
                    last.raw.push_str(&node.raw);
                    last.labelled |= node.labelled;
                    last.has_text |= node.has_text;
                }
                Some(last) if node.verse < last.verse => {
                    return Err(ExtractError::Decreasing {
                        previous: last.verse,
                        verse: node.verse,
                    });
                }
                _ => merged.push(node),
            }
        }

        // Label-only nodes are omitted verses; they leave a gap, not a fragment.
        let fragments: Vec<VerseFragment> = merged
            .into_iter()
            .filter(|n| n.has_text)
            .map(|n| VerseFragment {
                chapter: chapter.clone(),
                verse: n.verse,
                raw_text: n.raw,
            })
            .collect();

        if fragments.is_empty() {
            return Err(ExtractError::NoVerses);
        }
        tracing::trace!(chapter = %chapter, verses = fragments.len(), "Extracted verse fragments");
        Ok(fragments)
    }
}

/// Pull the chapter markup out of a service response body. The usual home is
/// `pageProps.chapterInfo.content`; some editions nest it elsewhere, so fall
/// back to the first non-empty string under a `content` key.
pub fn chapter_markup(body: &str) -> Result<String, ExtractError> {
    let json: serde_json::Value =
        serde_json::from_str(body).map_err(|e| ExtractError::NotJson(e.to_string()))?;

    if let Some(content) = json
        .pointer("/pageProps/chapterInfo/content")
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
    {
        return Ok(content.to_string());
    }
    find_content(&json).map(str::to_string).ok_or(ExtractError::NoContent)
}

fn find_content(value: &serde_json::Value) -> Option<&str> {
    match value {
        serde_json::Value::Object(map) => map.iter().find_map(|(key, v)| match v {
            serde_json::Value::String(s) if key == "content" && !s.trim().is_empty() => {
                Some(s.as_str())
            }
            other => find_content(other),
        }),
        serde_json::Value::Array(items) => items.iter().find_map(find_content),
        _ => None,
    }
}

fn verse_node(chapter: &ChapterRef, el: ElementRef) -> Result<VerseNode, ExtractError> {
    let verse = match el.value().attr("data-usfm") {
        Some(usfm) => usfm_verse(chapter, usfm)?,
        None => label_verse(el).ok_or_else(|| ExtractError::BadVerseNumber(el.html()))?,
    };

    let labelled = el.children().any(|c| is_label(c.value()));
    let mut raw = String::new();
    let mut has_text = false;
    for child in el.children() {
        match child.value() {
            Node::Text(text) => {
                has_text |= carries_text(text);
                raw.push_str(&escape_text(text));
            }
            Node::Element(_) if is_label(child.value()) => {}
            Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    has_text |= has_verse_text(child_el);
                    raw.push_str(&child_el.html());
                }
            }
            _ => {}
        }
    }

    Ok(VerseNode {
        verse,
        labelled,
        has_text,
        raw: raw.trim().to_string(),
    })
}

fn is_label(node: &Node) -> bool {
    matches!(node, Node::Element(e) if e.classes().any(|c| c == "label"))
}

/// Whether an element holds any text the cleaner will keep: notes, labels and
/// superscript calls do not count.
fn has_verse_text(el: ElementRef) -> bool {
    if is_marker_element(el.value()) {
        return false;
    }
    el.children().any(|child| match child.value() {
        Node::Text(text) => carries_text(text),
        Node::Element(_) => ElementRef::wrap(child).is_some_and(has_verse_text),
        _ => false,
    })
}

/// `GEN.1.1` or `GEN.1.1+GEN.1.2`: the first reference's verse number, after
/// checking it belongs to the requested chapter.
fn usfm_verse(chapter: &ChapterRef, usfm: &str) -> Result<u16, ExtractError> {
    let first = usfm.split('+').next().unwrap_or(usfm).trim();
    let parts: Vec<&str> = first.split('.').collect();
    let [book, ch, verse] = parts.as_slice() else {
        return Err(ExtractError::BadVerseNumber(usfm.to_string()));
    };
    let expected_ch = chapter.chapter.to_string();
    if !book.eq_ignore_ascii_case(&chapter.book.code) || *ch != expected_ch {
        return Err(ExtractError::WrongChapter {
            expected: chapter.to_string(),
            found: format!("{book}.{ch}"),
        });
    }
    verse
        .parse()
        .map_err(|_| ExtractError::BadVerseNumber(usfm.to_string()))
}

/// Leading digits of a verse's label (`"16"`, `"1-2"`).
fn label_verse(el: ElementRef) -> Option<u16> {
    let label = el.children().find(|c| is_label(c.value())).and_then(ElementRef::wrap)?;
    let text: String = label.text().collect();
    let digits: String = text.trim().chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            c => out.push(c),
        }
    }
    out
}
