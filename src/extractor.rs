//! Pulls a single executable code block out of a free-text model response.
//!
//! Model output mixes prose, markdown fences, and (hopefully) one code block.
//! Extraction is a pure text transformation: the first fenced region wins;
//! without a fence we fall back to collecting lines that look like statements.

/// A snippet of source text extracted from a model response.
///
/// Not yet trusted. It must pass the [`crate::validator::KeywordValidator`]
/// before it may reach the executor. Guaranteed non-empty and trimmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeSnippet(String);

impl CodeSnippet {
    /// Wrap already-extracted source text. Returns `None` for blank input.
    pub fn new(source: impl Into<String>) -> Option<Self> {
        let source = source.into();
        let trimmed = source.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CodeSnippet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Extracts the first code block from a model response.
///
/// Looks for a fenced region first (``` with an optional language tag). If no
/// fence is present, falls back to scanning for lines that look like code and
/// joining them. Returns `None` when no plausible code is found; callers map
/// that to [`crate::PlotError::ExtractionEmpty`].
pub fn extract_snippet(response: &str) -> Option<CodeSnippet> {
    if let Some(block) = fenced_block(response) {
        return CodeSnippet::new(block);
    }

    let code_lines: Vec<&str> = response
        .lines()
        .map(str::trim_end)
        .filter(|line| looks_like_code(line))
        .collect();
    if code_lines.is_empty() {
        return None;
    }
    CodeSnippet::new(code_lines.join("\n"))
}

/// Contents of the first ``` fenced region, language tag stripped.
fn fenced_block(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after_fence = &text[start + 3..];
    // The fence may carry a language tag on the opening line.
    let body_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after_fence[body_start..];
    let end = body.find("```")?;
    Some(&body[..end])
}

/// Heuristic for the no-fence fallback: assignment or call syntax.
fn looks_like_code(line: &str) -> bool {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return false;
    }
    if trimmed.contains(" = ") || trimmed.ends_with('=') {
        return true;
    }
    // An identifier immediately followed by '(' or '.' or '[' reads as code,
    // not prose ("plt.show()", "df['x'].plot(...)").
    let mut chars = trimmed.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c.is_ascii_alphanumeric() || c == '_' {
            if let Some(&(_, next)) = chars.peek() {
                if (next == '(' || next == '[') && i > 0 {
                    return true;
                }
                if next == '.' {
                    // "df.plot" yes, "e.g." and trailing periods no.
                    if let Some(follow) = trimmed[i + 2..].chars().next() {
                        if follow.is_ascii_alphabetic() || follow == '_' {
                            return trimmed[i + 2..].contains('(');
                        }
                    }
                }
            }
        }
    }
    false
}
