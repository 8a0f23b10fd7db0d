use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CanonError {
    #[error("unknown book code: {0}")]
    UnknownBook(String),

    #[error("book {book} has no chapter {chapter} (canon lists {count})")]
    ChapterOutOfRange { book: String, chapter: u16, count: u16 },

    #[error("canon '{0}' lists no books")]
    Empty(String),

    #[error("duplicate book code in canon: {0}")]
    DuplicateBook(String),

    #[error("book {0} declares zero chapters")]
    NoChapters(String),

    #[error("failed to read canon file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse canon JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// A book's fixed position in a canon. `index` is 1-based and is kept when a
/// canon is filtered, so ordering stays comparable across partial runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BookRef {
    pub index: u16,
    /// USFM code used in service URLs and output paths (e.g., "GEN").
    pub code: String,
    pub name: String,
}

/// A single chapter of a book.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChapterRef {
    pub book: BookRef,
    pub chapter: u16,
}

impl ChapterRef {
    /// USFM reference with the edition suffix the content service expects,
    /// e.g. `GEN.1.KJV`.
    pub fn usfm(&self, version_code: &str) -> String {
        format!("{}.{}.{}", self.book.code, self.chapter, version_code)
    }

    /// Canonical sort key: book ordinal, then chapter.
    pub fn ordinal(&self) -> (u16, u16) {
        (self.book.index, self.chapter)
    }
}

impl fmt::Display for ChapterRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.book.code, self.chapter)
    }
}

/// One row of a canon table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookEntry {
    #[serde(default)]
    pub index: u16,
    pub code: String,
    pub name: String,
    pub chapters: u16,
}

impl BookEntry {
    pub fn book_ref(&self) -> BookRef {
        BookRef {
            index: self.index,
            code: self.code.clone(),
            name: self.name.clone(),
        }
    }
}

/// The ordered book list (with chapter counts) of one scripture tradition or
/// one specific edition.
///
/// Canons are plain data: built-in variants, JSON files, and the service's
/// own version metadata all produce the same structure, so adding an edition
/// never touches fetch or extraction code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Canon {
    pub name: String,
    pub books: Vec<BookEntry>,
}

/// Where to resume iteration: the first chapter that is not yet resolved.
/// `next == None` means every chapter has been handled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub next: Option<Position>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub book: String,
    pub chapter: u16,
}

impl Checkpoint {
    pub fn at(chapter: &ChapterRef) -> Self {
        Self {
            next: Some(Position {
                book: chapter.book.code.clone(),
                chapter: chapter.chapter,
            }),
        }
    }

    pub fn finished() -> Self {
        Self { next: None }
    }

    pub fn is_finished(&self) -> bool {
        self.next.is_none()
    }
}

const PROTESTANT: &[(&str, &str, u16)] = &[
    ("GEN", "Genesis", 50),
    ("EXO", "Exodus", 40),
    ("LEV", "Leviticus", 27),
    ("NUM", "Numbers", 36),
    ("DEU", "Deuteronomy", 34),
    ("JOS", "Joshua", 24),
    ("JDG", "Judges", 21),
    ("RUT", "Ruth", 4),
    ("1SA", "1 Samuel", 31),
    ("2SA", "2 Samuel", 24),
    ("1KI", "1 Kings", 22),
    ("2KI", "2 Kings", 25),
    ("1CH", "1 Chronicles", 29),
    ("2CH", "2 Chronicles", 36),
    ("EZR", "Ezra", 10),
    ("NEH", "Nehemiah", 13),
    ("EST", "Esther", 10),
    ("JOB", "Job", 42),
    ("PSA", "Psalms", 150),
    ("PRO", "Proverbs", 31),
    ("ECC", "Ecclesiastes", 12),
    ("SNG", "Song of Songs", 8),
    ("ISA", "Isaiah", 66),
    ("JER", "Jeremiah", 52),
    ("LAM", "Lamentations", 5),
    ("EZK", "Ezekiel", 48),
    ("DAN", "Daniel", 12),
    ("HOS", "Hosea", 14),
    ("JOL", "Joel", 3),
    ("AMO", "Amos", 9),
    ("OBA", "Obadiah", 1),
    ("JON", "Jonah", 4),
    ("MIC", "Micah", 7),
    ("NAM", "Nahum", 3),
    ("HAB", "Habakkuk", 3),
    ("ZEP", "Zephaniah", 3),
    ("HAG", "Haggai", 2),
    ("ZEC", "Zechariah", 14),
    ("MAL", "Malachi", 4),
    ("MAT", "Matthew", 28),
    ("MRK", "Mark", 16),
    ("LUK", "Luke", 24),
    ("JHN", "John", 21),
    ("ACT", "Acts", 28),
    ("ROM", "Romans", 16),
    ("1CO", "1 Corinthians", 16),
    ("2CO", "2 Corinthians", 13),
    ("GAL", "Galatians", 6),
    ("EPH", "Ephesians", 6),
    ("PHP", "Philippians", 4),
    ("COL", "Colossians", 4),
    ("1TH", "1 Thessalonians", 5),
    ("2TH", "2 Thessalonians", 3),
    ("1TI", "1 Timothy", 6),
    ("2TI", "2 Timothy", 4),
    ("TIT", "Titus", 3),
    ("PHM", "Philemon", 1),
    ("HEB", "Hebrews", 13),
    ("JAS", "James", 5),
    ("1PE", "1 Peter", 5),
    ("2PE", "2 Peter", 3),
    ("1JN", "1 John", 5),
    ("2JN", "2 John", 1),
    ("3JN", "3 John", 1),
    ("JUD", "Jude", 1),
    ("REV", "Revelation", 22),
];

/// Deuterocanonical books, each inserted after the listed anchor book.
const DEUTEROCANON: &[(&str, &str, &str, u16)] = &[
    ("NEH", "TOB", "Tobit", 14),
    ("TOB", "JDT", "Judith", 16),
    ("EST", "1MA", "1 Maccabees", 16),
    ("1MA", "2MA", "2 Maccabees", 15),
    ("SNG", "WIS", "Wisdom", 19),
    ("WIS", "SIR", "Sirach", 51),
    ("LAM", "BAR", "Baruch", 6),
];

impl Canon {
    /// The 66-book Protestant canon.
    pub fn protestant() -> Self {
        let books = PROTESTANT
            .iter()
            .map(|(code, name, chapters)| BookEntry {
                index: 0,
                code: code.to_string(),
                name: name.to_string(),
                chapters: *chapters,
            })
            .collect();
        Self::numbered("protestant", books)
    }

    /// The 73-book Catholic canon (Protestant order with the deuterocanon
    /// interleaved; Esther placed after Judith, Maccabees after Esther).
    pub fn catholic() -> Self {
        let mut books: Vec<BookEntry> = Self::protestant().books;

        // Esther moves after Judith in Catholic ordering.
        let est_pos = books.iter().position(|b| b.code == "EST");
        let est = est_pos.map(|p| books.remove(p));

        for (anchor, code, name, chapters) in DEUTEROCANON {
            let entry = BookEntry {
                index: 0,
                code: code.to_string(),
                name: name.to_string(),
                chapters: *chapters,
            };
            match books.iter().position(|b| b.code == *anchor) {
                Some(pos) => books.insert(pos + 1, entry),
                None => books.push(entry),
            }
            if *code == "JDT" {
                if let Some(est) = est.clone() {
                    let pos = books.iter().position(|b| b.code == "JDT").unwrap_or(books.len() - 1);
                    books.insert(pos + 1, est);
                }
            }
        }

        // Greek Daniel carries Susanna and Bel as chapters 13-14.
        if let Some(dan) = books.iter_mut().find(|b| b.code == "DAN") {
            dan.chapters = 14;
        }

        Self::numbered("catholic", books)
    }

    /// Look up a built-in canon by name.
    pub fn builtin(name: &str) -> Option<Self> {
        match name {
            "protestant" => Some(Self::protestant()),
            "catholic" => Some(Self::catholic()),
            _ => None,
        }
    }

    /// Build a canon from an ordered list, assigning 1-based indices.
    pub fn numbered(name: &str, mut books: Vec<BookEntry>) -> Self {
        for (i, book) in books.iter_mut().enumerate() {
            book.index = (i + 1) as u16;
        }
        Self {
            name: name.to_string(),
            books,
        }
    }

    /// Parse a canon JSON document (`{name, books: [{code, name, chapters}]}`).
    /// Indices in the file are ignored and reassigned from list order.
    pub fn from_json(json: &str) -> Result<Self, CanonError> {
        let parsed: Canon = serde_json::from_str(json)?;
        let canon = Self::numbered(&parsed.name, parsed.books);
        canon.check()?;
        Ok(canon)
    }

    pub fn load(path: &Path) -> Result<Self, CanonError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Build a canon from the content service's version metadata
    /// (`{books: [{usfm, human, chapters: [{human, canonical}]}]}`).
    ///
    /// Only canonical chapters with numeric labels are counted; the highest
    /// such label becomes the book's chapter count. Books with no canonical
    /// chapters (introductions, glossaries) are dropped.
    pub fn from_version_metadata(
        name: &str,
        metadata: &serde_json::Value,
    ) -> Result<Self, CanonError> {
        let mut books = Vec::new();
        let listed = metadata
            .get("books")
            .and_then(|b| b.as_array())
            .map(|b| b.as_slice())
            .unwrap_or_default();

        for book in listed {
            let Some(code) = book.get("usfm").and_then(|v| v.as_str()) else {
                continue;
            };
            let human = book.get("human").and_then(|v| v.as_str()).unwrap_or(code);
            let chapters = book
                .get("chapters")
                .and_then(|c| c.as_array())
                .map(|chapters| {
                    chapters
                        .iter()
                        .filter(|ch| ch.get("canonical").and_then(|v| v.as_bool()).unwrap_or(true))
                        .filter_map(|ch| ch.get("human").and_then(|v| v.as_str()))
                        .filter_map(|label| label.trim().parse::<u16>().ok())
                        .max()
                        .unwrap_or(0)
                })
                .unwrap_or(0);
            if chapters == 0 {
                continue;
            }
            books.push(BookEntry {
                index: 0,
                code: code.to_string(),
                name: human.to_string(),
                chapters,
            });
        }

        let canon = Self::numbered(name, books);
        canon.check()?;
        Ok(canon)
    }

    /// Structural sanity: non-empty, unique codes, every book has chapters.
    pub fn check(&self) -> Result<(), CanonError> {
        if self.books.is_empty() {
            return Err(CanonError::Empty(self.name.clone()));
        }
        let mut seen = std::collections::HashSet::new();
        for book in &self.books {
            if !seen.insert(book.code.as_str()) {
                return Err(CanonError::DuplicateBook(book.code.clone()));
            }
            if book.chapters == 0 {
                return Err(CanonError::NoChapters(book.code.clone()));
            }
        }
        Ok(())
    }

    /// Restrict to the given book codes, keeping canonical order and the
    /// original indices.
    pub fn filter_books(&self, codes: &[String]) -> Result<Self, CanonError> {
        for code in codes {
            if self.book(code).is_none() {
                return Err(CanonError::UnknownBook(code.clone()));
            }
        }
        let books = self
            .books
            .iter()
            .filter(|b| codes.iter().any(|c| c.eq_ignore_ascii_case(&b.code)))
            .cloned()
            .collect();
        Ok(Self {
            name: self.name.clone(),
            books,
        })
    }

    pub fn book(&self, code: &str) -> Option<&BookEntry> {
        self.books.iter().find(|b| b.code.eq_ignore_ascii_case(code))
    }

    pub fn chapter_count(&self, code: &str) -> Option<u16> {
        self.book(code).map(|b| b.chapters)
    }

    pub fn total_chapters(&self) -> usize {
        self.books.iter().map(|b| b.chapters as usize).sum()
    }

    /// Resolve a book code and chapter number into a `ChapterRef`.
    pub fn chapter_ref(&self, code: &str, chapter: u16) -> Result<ChapterRef, CanonError> {
        let book = self
            .book(code)
            .ok_or_else(|| CanonError::UnknownBook(code.to_string()))?;
        if chapter == 0 || chapter > book.chapters {
            return Err(CanonError::ChapterOutOfRange {
                book: book.code.clone(),
                chapter,
                count: book.chapters,
            });
        }
        Ok(ChapterRef {
            book: book.book_ref(),
            chapter,
        })
    }

    /// Every chapter in canonical order.
    pub fn chapters(&self) -> ChapterIter<'_> {
        ChapterIter {
            canon: self,
            book_pos: 0,
            chapter: 1,
        }
    }

    /// Chapters starting at a checkpoint. A chapter number past the end of
    /// its book resumes at the next book; a finished checkpoint yields nothing.
    pub fn chapters_from(&self, checkpoint: &Checkpoint) -> Result<ChapterIter<'_>, CanonError> {
        let Some(pos) = &checkpoint.next else {
            return Ok(ChapterIter {
                canon: self,
                book_pos: self.books.len(),
                chapter: 1,
            });
        };
        let book_pos = self
            .books
            .iter()
            .position(|b| b.code.eq_ignore_ascii_case(&pos.book))
            .ok_or_else(|| CanonError::UnknownBook(pos.book.clone()))?;
        Ok(ChapterIter {
            canon: self,
            book_pos,
            chapter: pos.chapter.max(1),
        })
    }
}

impl Canon {
    /// Checkpoint pointing at the chapter that follows `chapter`, or a
    /// finished checkpoint when `chapter` is the last one.
    pub fn checkpoint_after(&self, chapter: &ChapterRef) -> Checkpoint {
        match self.chapters_from(&Checkpoint::at(chapter)) {
            Ok(mut it) => {
                it.next();
                it.checkpoint()
            }
            Err(_) => Checkpoint::at(chapter),
        }
    }
}

/// Lazy walk over a canon in book-then-chapter order.
///
/// The iterator borrows the canon and holds only a cursor, so it can be
/// dropped at any point and recreated from a `Checkpoint`.
#[derive(Debug, Clone)]
pub struct ChapterIter<'a> {
    canon: &'a Canon,
    book_pos: usize,
    chapter: u16,
}

impl ChapterIter<'_> {
    /// Checkpoint describing the next chapter this iterator would yield.
    pub fn checkpoint(&self) -> Checkpoint {
        let mut probe = self.clone();
        match probe.next() {
            Some(next) => Checkpoint::at(&next),
            None => Checkpoint::finished(),
        }
    }
}

impl Iterator for ChapterIter<'_> {
    type Item = ChapterRef;

    fn next(&mut self) -> Option<ChapterRef> {
        loop {
            let book = self.canon.books.get(self.book_pos)?;
            if self.chapter <= book.chapters {
                let item = ChapterRef {
                    book: book.book_ref(),
                    chapter: self.chapter,
                };
                self.chapter += 1;
                return Some(item);
            }
            self.book_pos += 1;
            self.chapter = 1;
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining: usize = self
            .canon
            .books
            .iter()
            .enumerate()
            .skip(self.book_pos)
            .map(|(i, b)| {
                if i == self.book_pos {
                    (b.chapters as usize + 1).saturating_sub(self.chapter as usize)
                } else {
                    b.chapters as usize
                }
            })
            .sum();
        (remaining, Some(remaining))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_sizes() {
        let p = Canon::protestant();
        assert_eq!(p.books.len(), 66);
        assert_eq!(p.total_chapters(), 1189);
        assert_eq!(p.books[0].index, 1);
        assert_eq!(p.books[65].code, "REV");

        let c = Canon::catholic();
        assert_eq!(c.books.len(), 73);
        c.check().unwrap();
        let order: Vec<&str> = c.books.iter().map(|b| b.code.as_str()).collect();
        let pos = |code: &str| order.iter().position(|c| *c == code).unwrap();
        assert!(pos("NEH") < pos("TOB"));
        assert!(pos("TOB") < pos("JDT"));
        assert!(pos("JDT") < pos("EST"));
        assert!(pos("EST") < pos("1MA"));
        assert!(pos("2MA") < pos("JOB"));
        assert!(pos("SIR") < pos("ISA"));
        assert_eq!(pos("BAR"), pos("LAM") + 1);
        assert_eq!(c.chapter_count("DAN"), Some(14));
    }

    #[test]
    fn test_iteration_is_canonical_order() {
        let canon = Canon::numbered(
            "tiny",
            vec![
                BookEntry { index: 0, code: "AAA".into(), name: "A".into(), chapters: 2 },
                BookEntry { index: 0, code: "BBB".into(), name: "B".into(), chapters: 1 },
            ],
        );
        let refs: Vec<String> = canon.chapters().map(|c| c.to_string()).collect();
        assert_eq!(refs, vec!["AAA.1", "AAA.2", "BBB.1"]);
        assert_eq!(canon.chapters().size_hint(), (3, Some(3)));
    }

    #[test]
    fn test_resume_from_checkpoint() {
        let canon = Canon::protestant();
        let cp = Checkpoint::at(&canon.chapter_ref("LEV", 27).unwrap());
        let mut it = canon.chapters_from(&cp).unwrap();
        assert_eq!(it.next().unwrap().to_string(), "LEV.27");
        assert_eq!(it.next().unwrap().to_string(), "NUM.1");
        assert_eq!(it.checkpoint(), Checkpoint::at(&canon.chapter_ref("NUM", 2).unwrap()));

        // Resumed tail plus the skipped head covers the whole canon exactly once.
        let head = canon.chapters().take_while(|c| c.to_string() != "LEV.27").count();
        let tail = canon.chapters_from(&cp).unwrap().count();
        assert_eq!(head + tail, canon.total_chapters());
    }

    #[test]
    fn test_checkpoint_after() {
        let canon = Canon::protestant();
        let gen50 = canon.chapter_ref("GEN", 50).unwrap();
        let exo1 = canon.chapter_ref("EXO", 1).unwrap();
        assert_eq!(canon.checkpoint_after(&gen50), Checkpoint::at(&exo1));
        let rev22 = canon.chapter_ref("REV", 22).unwrap();
        assert!(canon.checkpoint_after(&rev22).is_finished());
    }

    #[test]
    fn test_resume_past_book_end_and_finished() {
        let canon = Canon::protestant();
        let cp = Checkpoint {
            next: Some(Position { book: "RUT".into(), chapter: 5 }),
        };
        assert_eq!(canon.chapters_from(&cp).unwrap().next().unwrap().to_string(), "1SA.1");
        assert_eq!(canon.chapters_from(&Checkpoint::finished()).unwrap().count(), 0);

        let bad = Checkpoint {
            next: Some(Position { book: "XYZ".into(), chapter: 1 }),
        };
        assert!(matches!(canon.chapters_from(&bad), Err(CanonError::UnknownBook(_))));
    }

    #[test]
    fn test_filter_keeps_indices() {
        let canon = Canon::protestant().filter_books(&["exo".into(), "GEN".into()]).unwrap();
        let codes: Vec<&str> = canon.books.iter().map(|b| b.code.as_str()).collect();
        assert_eq!(codes, vec!["GEN", "EXO"]);
        assert_eq!(canon.books[1].index, 2);
        assert!(Canon::protestant().filter_books(&["TOB".into()]).is_err());
    }

    #[test]
    fn test_from_version_metadata() {
        let meta = serde_json::json!({
            "books": [
                {"usfm": "INT", "human": "Introduction", "chapters": [
                    {"human": "Intro", "canonical": false}
                ]},
                {"usfm": "GEN", "human": "Genesis", "chapters": [
                    {"human": "Intro", "canonical": false},
                    {"human": "1", "canonical": true},
                    {"human": "2", "canonical": true}
                ]},
                {"usfm": "TOB", "human": "Tobit", "chapters": [{"human": "1"}]}
            ]
        });
        let canon = Canon::from_version_metadata("remote", &meta).unwrap();
        assert_eq!(canon.books.len(), 2);
        assert_eq!(canon.chapter_count("GEN"), Some(2));
        assert_eq!(canon.book("TOB").unwrap().index, 2);
    }

    #[test]
    fn test_from_json_rejects_duplicates() {
        let json = r#"{"name":"x","books":[
            {"code":"GEN","name":"Genesis","chapters":50},
            {"code":"GEN","name":"Again","chapters":1}
        ]}"#;
        assert!(matches!(Canon::from_json(json), Err(CanonError::DuplicateBook(_))));
    }

    #[test]
    fn test_chapter_ref_bounds() {
        let canon = Canon::protestant();
        assert_eq!(canon.chapter_ref("GEN", 1).unwrap().usfm("KJV"), "GEN.1.KJV");
        assert!(canon.chapter_ref("GEN", 51).is_err());
        assert!(canon.chapter_ref("GEN", 0).is_err());
    }
}
