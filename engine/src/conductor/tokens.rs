//! Token estimates
//!
//! No tokenizer is bundled, so tokens are estimated from character counts.
//! Dense text (code, markup, structured data) packs fewer characters into
//! a token than prose, so the ratio depends on what kind of file it is.

use std::path::Path;

/// Broad kind of file content, chosen by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Code,
    Documentation,
    Data,
    Markup,
    Other,
}

impl ContentKind {
    pub fn from_path(path: &Path) -> Self {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return Self::Other;
        };
        match ext.to_lowercase().as_str() {
            "py" | "js" | "ts" | "java" | "cpp" | "c" | "h" | "cs" | "go" | "rs" | "rb"
            | "php" | "swift" | "kt" => Self::Code,
            "md" | "txt" | "rst" | "tex" => Self::Documentation,
            "json" | "yaml" | "yml" | "toml" | "ini" => Self::Data,
            "xml" | "html" | "htm" | "svg" => Self::Markup,
            _ => Self::Other,
        }
    }

    /// Average characters per token for this kind.
    pub fn chars_per_token(self) -> f64 {
        match self {
            Self::Code => 3.5,
            Self::Documentation => 4.0,
            Self::Data => 3.0,
            Self::Markup => 2.5,
            Self::Other => 4.0,
        }
    }
}

/// Estimate for mixed text such as a whole prepared context.
pub fn estimate_tokens(text: &str) -> usize {
    estimate_tokens_as(text, ContentKind::Other)
}

/// Estimate for text of a known kind. Rounds down and adds one, so any
/// non-empty text costs at least one token.
pub fn estimate_tokens_as(text: &str, kind: ContentKind) -> usize {
    if text.is_empty() {
        return 0;
    }
    let chars = text.chars().count() as f64;
    (chars / kind.chars_per_token()) as usize + 1
}
