//! Allow-list gate over the functionality surface of a generated snippet.
//!
//! This is a lexical check, not a static analyzer: language syntax (keywords,
//! literals, operators, bare variable names) passes freely, but any identifier
//! that is *used* (called, attribute-accessed, or subscripted) must be an
//! exact member of the allow list. Fail-closed: a single disallowed token
//! prevents execution entirely.
//!
//! Known limitation, accepted by design: string-based indirection (e.g.
//! building a name at runtime and resolving it via getattr-equivalents) is not
//! caught here. The executor's restricted namespace is the second layer; a
//! security-sensitive deployment needs a real sandbox underneath both.

use std::collections::BTreeSet;

use crate::errors::{PlotError, Result};
use crate::extractor::CodeSnippet;

/// Ordered set of identifier tokens permitted to appear as functionality
/// surface in a snippet. Fixed at construction, shared read-only.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    tokens: BTreeSet<String>,
}

impl AllowList {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tokens: tokens.into_iter().map(Into::into).collect(),
        }
    }

    /// Default allow list for dataframe plotting: the read/aggregate/plot
    /// verbs plus the namespace handles the executor binds (`df`, `pd`,
    /// `plt`). No mutation verbs.
    pub fn dataframe_plotting() -> Self {
        Self::new([
            "df", "pd", "plt", "iloc", "to_dict", "mean", "mode", "std", "max", "min", "color",
            "plot", "unique", "groupby", "show", "figure", "title", "xlabel", "ylabel", "legend",
        ])
    }

    /// Exact membership. No prefix or substring matching; `plotter` does not
    /// pass because `plot` is allowed.
    pub fn contains(&self, token: &str) -> bool {
        self.tokens.contains(token)
    }

    pub fn extend<I, S>(&mut self, tokens: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tokens.extend(tokens.into_iter().map(Into::into));
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.tokens.iter().map(String::as_str)
    }
}

/// Python keywords are intrinsic syntax and never require permission.
/// Note `import` itself passes; the imported *name* is what gets checked.
const PYTHON_KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class", "continue",
    "def", "del", "elif", "else", "except", "finally", "for", "from", "global", "if", "import",
    "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return", "try", "while",
    "with", "yield",
];

/// Decides whether a [`CodeSnippet`] is permitted to execute.
#[derive(Debug, Clone)]
pub struct KeywordValidator {
    allow_list: AllowList,
}

impl KeywordValidator {
    pub fn new(allow_list: AllowList) -> Self {
        Self { allow_list }
    }

    pub fn allow_list(&self) -> &AllowList {
        &self.allow_list
    }

    /// Binary pass/fail. On fail the offending tokens are reported in order
    /// of first appearance. Empty snippets cannot occur ([`CodeSnippet`] is
    /// non-empty by construction); raw empty text is rejected by extraction.
    pub fn validate(&self, snippet: &CodeSnippet) -> Result<()> {
        let rejected = self.disallowed_tokens(snippet.as_str());
        if rejected.is_empty() {
            Ok(())
        } else {
            Err(PlotError::ValidationRejected(rejected))
        }
    }

    /// Tokens in `code` that require permission but are not in the allow
    /// list, deduplicated, in order of first appearance.
    pub fn disallowed_tokens(&self, code: &str) -> Vec<String> {
        let mut rejected: Vec<String> = Vec::new();
        for token in identifier_tokens(code) {
            if !token.requires_permission {
                continue;
            }
            if PYTHON_KEYWORDS.contains(&token.text.as_str()) {
                continue;
            }
            if self.allow_list.contains(&token.text) {
                continue;
            }
            if !rejected.iter().any(|t| t == &token.text) {
                rejected.push(token.text);
            }
        }
        rejected
    }
}

struct IdentToken {
    text: String,
    /// True when the identifier is functionality surface: called, attribute-
    /// accessed (either side of a `.`), or subscripted.
    requires_permission: bool,
}

/// Scans `code` for identifier tokens, skipping string-literal contents
/// (column names and plot labels live there) and numeric literals.
fn identifier_tokens(code: &str) -> Vec<IdentToken> {
    let bytes = code.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    let mut prev_significant: Option<u8> = None;

    while i < bytes.len() {
        let c = bytes[i];

        // Skip string literals entirely.
        if c == b'\'' || c == b'"' {
            let quote = c;
            i += 1;
            while i < bytes.len() && bytes[i] != quote {
                if bytes[i] == b'\\' {
                    i += 1;
                }
                i += 1;
            }
            i += 1; // closing quote
            prev_significant = Some(quote);
            continue;
        }

        // Skip comments to end of line.
        if c == b'#' {
            while i < bytes.len() && bytes[i] != b'\n' {
                i += 1;
            }
            continue;
        }

        if c.is_ascii_alphabetic() || c == b'_' {
            let start = i;
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            let text = code[start..i].to_string();
            let next = next_significant(bytes, i);
            let accessed_from = prev_significant == Some(b'.');
            let uses_functionality =
                accessed_from || matches!(next, Some(b'(') | Some(b'[') | Some(b'.'));
            tokens.push(IdentToken {
                text,
                requires_permission: uses_functionality,
            });
            prev_significant = Some(b'a'); // any identifier byte
            continue;
        }

        // Numeric literal. A `.` belongs to the number only when a digit
        // follows; otherwise it starts an attribute access on the literal
        // (`1..__class__`) and the accessed names must still be checked.
        if c.is_ascii_digit() {
            i = consume_number(bytes, i);
            prev_significant = Some(b'0');
            continue;
        }

        if !c.is_ascii_whitespace() {
            prev_significant = Some(c);
        }
        i += 1;
    }
    tokens
}

/// Consumes one numeric literal starting at a digit: integer part, an
/// optional fraction introduced by `.` only when a digit follows, and an
/// optional exponent. Stops before any `.` that starts attribute access.
fn consume_number(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'_') {
        i += 1;
    }
    if i < bytes.len()
        && bytes[i] == b'.'
        && bytes.get(i + 1).is_some_and(|b| b.is_ascii_digit())
    {
        i += 1;
        while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'_') {
            i += 1;
        }
    }
    if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
        let mut j = i + 1;
        if matches!(bytes.get(j), Some(&b'+') | Some(&b'-')) {
            j += 1;
        }
        if bytes.get(j).is_some_and(|b| b.is_ascii_digit()) {
            i = j;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
        }
    }
    i
}

fn next_significant(bytes: &[u8], mut i: usize) -> Option<u8> {
    while i < bytes.len() {
        if !bytes[i].is_ascii_whitespace() {
            return Some(bytes[i]);
        }
        i += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snippet(code: &str) -> CodeSnippet {
        CodeSnippet::new(code).unwrap()
    }

    fn validator(tokens: &[&str]) -> KeywordValidator {
        KeywordValidator::new(AllowList::new(tokens.iter().copied()))
    }

    #[test]
    fn aggregate_and_plot_chain_passes() {
        let v = validator(&["df", "groupby", "mean", "plot"]);
        let code = "df['sale price'].groupby(df['country']).mean().plot(kind='bar')";
        assert!(v.validate(&snippet(code)).is_ok());
    }

    #[test]
    fn os_system_is_rejected() {
        let v = validator(&["df", "groupby", "mean", "plot"]);
        let code = "import os; os.system('rm -rf /')";
        match v.validate(&snippet(code)) {
            Err(PlotError::ValidationRejected(tokens)) => {
                assert_eq!(tokens, vec!["os".to_string(), "system".to_string()]);
            }
            other => panic!("expected rejection, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn no_prefix_matching() {
        let v = validator(&["plot"]);
        assert_eq!(v.disallowed_tokens("plotter(df)"), vec!["plotter"]);
        assert_eq!(v.disallowed_tokens("plo.t()"), vec!["plo", "t"]);
    }

    #[test]
    fn string_contents_are_not_tokens() {
        let v = validator(&["df", "plot"]);
        // 'country' and "bar" are data, not functionality.
        assert!(v.validate(&snippet("df['country'].plot(kind=\"bar\")")).is_ok());
    }

    #[test]
    fn bare_names_and_keywords_pass() {
        let v = validator(&["df", "mean"]);
        // `result`, `kind`, `for`, `in` are syntax/bindings, not calls.
        let code = "result = df.mean()\nfor kind in [result]:\n    pass";
        // `[result]` subscripts nothing; result appears after '[' not before.
        assert!(v.validate(&snippet(code)).is_ok());
    }

    #[test]
    fn attribute_base_requires_permission() {
        let v = validator(&["plot"]);
        assert_eq!(v.disallowed_tokens("plt.plot(x)"), vec!["plt"]);
    }

    #[test]
    fn comments_are_skipped() {
        let v = validator(&["df", "mean"]);
        assert!(v
            .validate(&snippet("df.mean()  # os.system would be bad"))
            .is_ok());
    }

    #[test]
    fn duplicates_reported_once_in_order() {
        let v = validator(&[]);
        let tokens = v.disallowed_tokens("a.b()\nc.a()\na.c()");
        assert_eq!(tokens, vec!["a", "b", "c"]);
    }

    #[test]
    fn float_rooted_attribute_chain_is_checked() {
        // `1..__class__` roots an attribute chain on a float literal; the
        // accessed names must not ride through as part of the number.
        let v = KeywordValidator::new(AllowList::dataframe_plotting());
        let code = "x = 1..__class__.__base__.__subclasses__()";
        assert_eq!(
            v.disallowed_tokens(code),
            vec!["__class__", "__base__", "__subclasses__"]
        );
        assert!(v.validate(&snippet(code)).is_err());
    }

    #[test]
    fn plain_numeric_literals_stay_numeric() {
        let v = validator(&[]);
        assert!(v.disallowed_tokens("y = 1.5e3 + 2_000.25 - 4E-2").is_empty());
    }

    #[test]
    fn validation_is_idempotent() {
        let v = validator(&["df"]);
        let code = snippet("df.describe()");
        let first = v.validate(&code).is_ok();
        let second = v.validate(&code).is_ok();
        assert_eq!(first, second);
        assert!(!first);
    }

    #[test]
    fn default_allow_list_covers_namespace_handles() {
        let list = AllowList::dataframe_plotting();
        for token in ["df", "pd", "plt", "groupby", "mean", "plot", "unique"] {
            assert!(list.contains(token), "missing {token}");
        }
        assert!(!list.contains("system"));
    }
}
