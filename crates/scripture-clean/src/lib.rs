//! Normalization engine: turns raw verse fragments into markup-free verse
//! records and persists them one chapter per file.

pub mod cleaner;
pub mod export;
pub mod locale;
pub mod normalize;
pub mod output;
pub mod rules;

pub use cleaner::{carries_text, is_marker_element, Cleaner};
pub use export::{export_csv, CsvSummary};
pub use locale::{LocaleProfile, QuoteStyle};
pub use output::{CleanWriter, WriteError};
pub use rules::{CleanRule, RuleError, RuleSet};
