//! Role-definition document parser.
//!
//! ```text
//! ---
//! name: debugger
//! description: Tracks down defects
//! max_context_files: 10
//! ---
//! # Capabilities
//! - debugging, root cause analysis
//! # Prompt Template
//! You are a debugger...
//! # Examples
//! Input: the build fails
//! Output: bisect the last commits
//! ```
//!
//! The `---` fences are optional; without them the metadata block ends at the
//! first blank line or heading.

use super::{RoleDefinition, RoleExample};
use sdk::errors::EngineError;
use std::collections::BTreeMap;
use std::path::Path;

pub const DEFAULT_MAX_CONTEXT_TOKENS: usize = 8000;
pub const DEFAULT_MAX_CONTEXT_FILES: usize = 20;

/// Sections that are parsed into fields instead of the prompt body
const STRUCTURED_SECTIONS: [&str; 4] = ["capabilities", "requirements", "examples", "prompt_template"];

struct Section {
    heading: String,
    key: String,
    body: String,
}

/// Parse one document. `path` is only used for error reporting.
pub fn parse_definition(path: &Path, text: &str) -> Result<RoleDefinition, EngineError> {
    let fail = |reason: &str| EngineError::DefinitionParse {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };

    let text = text.trim_start_matches('\u{feff}');
    let (metadata, body) = split_metadata(text).ok_or_else(|| fail("missing metadata header"))?;

    let name = metadata
        .get("name")
        .map(|n| n.trim())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| fail("metadata has no name"))?
        .to_string();

    let sections = split_sections(body);
    if sections.is_empty() {
        return Err(fail("document has no sections"));
    }

    let max_context_tokens = parse_limit(&metadata, "max_context_tokens", DEFAULT_MAX_CONTEXT_TOKENS)
        .map_err(|reason| fail(&reason))?;
    let max_context_files = parse_limit(&metadata, "max_context_files", DEFAULT_MAX_CONTEXT_FILES)
        .map_err(|reason| fail(&reason))?;

    let section = |key: &str| sections.iter().find(|s| s.key == key).map(|s| s.body.as_str());

    let prompt_template = match section("prompt_template") {
        Some(template) => template.trim().to_string(),
        None => remaining_body(&sections),
    };
    if prompt_template.is_empty() {
        return Err(fail("prompt template is empty"));
    }

    let mut extra = metadata.clone();
    for known in ["name", "description", "max_context_tokens", "max_context_files"] {
        extra.remove(known);
    }

    Ok(RoleDefinition {
        name,
        description: metadata.get("description").cloned().unwrap_or_default(),
        capabilities: section("capabilities").map(parse_tags).unwrap_or_default(),
        requirements: section("requirements").map(parse_tags).unwrap_or_default(),
        max_context_tokens,
        max_context_files,
        prompt_template,
        examples: section("examples").map(parse_examples).unwrap_or_default(),
        sections: sections
            .iter()
            .map(|s| (s.key.clone(), s.body.trim().to_string()))
            .collect(),
        metadata: extra,
        source: path.to_path_buf(),
    })
}

/// Lowercase, trim, collapse whitespace runs to `_`.
pub fn normalize_section_key(title: &str) -> String {
    title
        .trim()
        .trim_end_matches(':')
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .to_lowercase()
}

fn split_metadata(text: &str) -> Option<(BTreeMap<String, String>, &str)> {
    let mut metadata = BTreeMap::new();
    let mut offset = 0;
    let mut lines = text.split_inclusive('\n').peekable();

    let fenced = lines.peek().map(|l| l.trim() == "---").unwrap_or(false);
    if fenced {
        offset += lines.next().map(str::len).unwrap_or(0);
    }

    let mut closed = !fenced;
    for line in lines {
        let trimmed = line.trim();
        if fenced && trimmed == "---" {
            offset += line.len();
            closed = true;
            break;
        }
        if !fenced && (trimmed.is_empty() || trimmed.starts_with('#')) {
            break;
        }
        offset += line.len();
        if trimmed.is_empty() {
            continue;
        }
        let (key, value) = parse_metadata_line(trimmed)?;
        metadata.insert(key, value);
    }

    if !closed || metadata.is_empty() {
        return None;
    }
    Some((metadata, &text[offset..]))
}

fn parse_metadata_line(line: &str) -> Option<(String, String)> {
    let (key, value) = line.split_once(':')?;
    let key = key.trim();
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !valid {
        return None;
    }
    let value = value.trim().trim_matches('"').trim_matches('\'');
    Some((key.to_lowercase(), value.to_string()))
}

fn split_sections(body: &str) -> Vec<Section> {
    let mut sections: Vec<Section> = Vec::new();
    let mut in_fence = false;

    for line in body.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
        }
        if !in_fence {
            if let Some(title) = heading_title(line) {
                sections.push(Section {
                    heading: line.trim().to_string(),
                    key: normalize_section_key(title),
                    body: String::new(),
                });
                continue;
            }
        }
        // Text before the first heading is not part of any section
        if let Some(current) = sections.last_mut() {
            current.body.push_str(line);
            current.body.push('\n');
        }
    }
    sections
}

fn heading_title(line: &str) -> Option<&str> {
    let hashes = line.chars().take_while(|c| *c == '#').count();
    if !(1..=6).contains(&hashes) {
        return None;
    }
    let rest = &line[hashes..];
    if !rest.starts_with(' ') {
        return None;
    }
    let title = rest.trim();
    (!title.is_empty()).then_some(title)
}

fn remaining_body(sections: &[Section]) -> String {
    sections
        .iter()
        .filter(|s| !STRUCTURED_SECTIONS.contains(&s.key.as_str()))
        .map(|s| format!("{}\n{}", s.heading, s.body.trim_end()))
        .collect::<Vec<_>>()
        .join("\n\n")
        .trim()
        .to_string()
}

fn parse_limit(
    metadata: &BTreeMap<String, String>,
    key: &str,
    default: usize,
) -> Result<usize, String> {
    match metadata.get(key) {
        None => Ok(default),
        Some(raw) => match raw.parse::<usize>() {
            Ok(0) => Err(format!("{} must be greater than zero", key)),
            Ok(value) => Ok(value),
            Err(_) => Err(format!("{} is not a number: {}", key, raw)),
        },
    }
}

/// Bullet items or comma-separated lists, lowercased and de-duplicated.
fn parse_tags(body: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for line in body.lines() {
        let line = line
            .trim()
            .trim_start_matches(['-', '*', '+'])
            .trim();
        for tag in line.split(',') {
            let tag = tag.trim().to_lowercase();
            if !tag.is_empty() && !tags.contains(&tag) {
                tags.push(tag);
            }
        }
    }
    tags
}

fn parse_examples(body: &str) -> Vec<RoleExample> {
    let mut examples = Vec::new();
    let mut rest = body;

    while let Some(start) = rest.find("Input:") {
        let after_input = &rest[start + "Input:".len()..];
        let Some(output_at) = after_input.find("Output:") else {
            break;
        };
        let input = after_input[..output_at].trim();
        let after_output = &after_input[output_at + "Output:".len()..];
        let end = after_output.find("Input:").unwrap_or(after_output.len());
        let output = after_output[..end].trim();

        if !input.is_empty() {
            examples.push(RoleExample {
                input: input.to_string(),
                output: output.to_string(),
            });
        }
        rest = &after_output[end..];
    }
    examples
}
