//! Query-intent to required-column mapping.
//!
//! Some visualization intents only make sense when certain columns exist
//! ("plot sale price by country" needs both). Rather than inline substring
//! checks, the orchestrator consults an explicit rule table resolved through
//! a pluggable matcher, and fails before any model call when the dataset
//! cannot satisfy the query.

use crate::data::Dataset;
use crate::errors::{PlotError, Result};

/// Decides whether a rule applies to a natural-language query.
pub trait IntentMatcher: Send + Sync {
    fn matches(&self, query: &str) -> bool;
}

/// Case-insensitive keyword matcher: the rule applies when any keyword
/// appears in the query.
#[derive(Debug, Clone)]
pub struct KeywordIntent {
    keywords: Vec<String>,
}

impl KeywordIntent {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keywords: keywords
                .into_iter()
                .map(|k| k.into().to_lowercase())
                .collect(),
        }
    }
}

impl IntentMatcher for KeywordIntent {
    fn matches(&self, query: &str) -> bool {
        let query = query.to_lowercase();
        self.keywords.iter().any(|k| query.contains(k.as_str()))
    }
}

/// One intent rule: when the matcher fires, these columns must exist.
pub struct ColumnRequirement {
    matcher: Box<dyn IntentMatcher>,
    required_columns: Vec<String>,
}

impl ColumnRequirement {
    pub fn new<I, S>(matcher: impl IntentMatcher + 'static, required_columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            matcher: Box::new(matcher),
            required_columns: required_columns.into_iter().map(Into::into).collect(),
        }
    }
}

/// The rule table consulted before each query.
#[derive(Default)]
pub struct SchemaRequirements {
    rules: Vec<ColumnRequirement>,
}

impl SchemaRequirements {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rule(mut self, requirement: ColumnRequirement) -> Self {
        self.rules.push(requirement);
        self
    }

    /// Columns every matching rule requires for this query.
    pub fn required_for(&self, query: &str) -> Vec<&str> {
        let mut columns: Vec<&str> = Vec::new();
        for rule in &self.rules {
            if rule.matcher.matches(query) {
                for col in &rule.required_columns {
                    if !columns.contains(&col.as_str()) {
                        columns.push(col);
                    }
                }
            }
        }
        columns
    }

    /// Fails with the missing column names when the dataset cannot satisfy
    /// the query's matched intents. A query matching no rule always passes.
    pub fn validate(&self, query: &str, dataset: &Dataset) -> Result<()> {
        let missing: Vec<String> = self
            .required_for(query)
            .into_iter()
            .filter(|col| !dataset.has_column(col))
            .map(str::to_string)
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(PlotError::MissingColumns(missing))
        }
    }
}
