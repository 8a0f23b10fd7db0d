use regex::Regex;
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("failed to read rule file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse rule file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        source: regex::Error,
    },
}

#[derive(Debug, Deserialize)]
struct RuleFile {
    rules: Vec<RuleSpec>,
}

#[derive(Debug, Deserialize)]
struct RuleSpec {
    search: String,
    #[serde(default)]
    replace: String,
    #[serde(default)]
    locale: Option<String>,
}

/// A user-supplied regex search/replace step.
#[derive(Debug, Clone)]
pub struct CleanRule {
    pub pattern: Regex,
    /// Replacement text; `$1`/`${name}` refer to capture groups and the
    /// placeholder `<space>` stands for a literal space.
    pub replace: String,
    /// Locale tag this rule is limited to; `None` applies everywhere.
    pub locale: Option<String>,
}

impl CleanRule {
    pub fn applies_to(&self, locale: &str) -> bool {
        let Some(scope) = &self.locale else {
            return true;
        };
        let scope = scope.replace('_', "-").to_ascii_lowercase();
        let tag = locale.replace('_', "-").to_ascii_lowercase();
        let primary = tag.split('-').next().unwrap_or_default();
        scope == tag || scope == primary
    }

    pub fn apply(&self, text: &str) -> String {
        self.pattern.replace_all(text, self.replace.as_str()).into_owned()
    }
}

/// Ordered collection of cleaning rules loaded from a JSON file:
///
/// ```json
/// {"rules": [{"search": "\\s+([,.])", "replace": "$1", "locale": "en"}]}
/// ```
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    pub rules: Vec<CleanRule>,
}

impl RuleSet {
    pub fn from_json(json: &str) -> Result<Self, RuleError> {
        let file: RuleFile = serde_json::from_str(json)?;
        let mut rules = Vec::with_capacity(file.rules.len());
        for spec in file.rules {
            if spec.search.trim().is_empty() {
                continue;
            }
            let pattern = Regex::new(&spec.search).map_err(|source| RuleError::Pattern {
                pattern: spec.search.clone(),
                source,
            })?;
            rules.push(CleanRule {
                pattern,
                replace: spec.replace.replace("<space>", " "),
                locale: spec.locale,
            });
        }
        Ok(Self { rules })
    }

    pub fn load(path: &Path) -> Result<Self, RuleError> {
        let json = std::fs::read_to_string(path)?;
        let set = Self::from_json(&json)?;
        tracing::info!(path = %path.display(), rules = set.rules.len(), "Loaded cleaning rules");
        Ok(set)
    }

    /// Rules that apply to `locale`, in file order.
    pub fn for_locale(&self, locale: &str) -> Vec<CleanRule> {
        self.rules
            .iter()
            .filter(|r| r.applies_to(locale))
            .cloned()
            .collect()
    }
}
