//! Pull a single runnable script out of free-form model output.

use std::sync::OnceLock;

use regex::Regex;

/// Fence tags accepted as the target scripting language.
const LANGUAGE_TAGS: &[&str] = &["python", "python3", "py"];

/// Fence tags that mark a block as generic code.
const GENERIC_TAGS: &[&str] = &["code", "script"];

fn fenced_block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)```[ \t]*([A-Za-z0-9_+#.\-]*)[^\n]*\n(.*?)```")
            .expect("fenced block pattern is valid")
    })
}

fn fence_marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"```[A-Za-z0-9_+#.\-]*").expect("fence marker pattern is valid"))
}

/// Script text with fencing and surrounding prose removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedCode {
    pub source: String,
}

impl ExtractedCode {
    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }
}

/// Return the best candidate script in `raw`.
///
/// Priority: a block tagged with the target language, then a block tagged as
/// generic code, then any fenced block. The first non-empty body wins. When no
/// fenced block has content, stray fence markers are stripped from the whole
/// input. An empty result means there is no usable code, which is not an error.
pub fn extract_code(raw: &str) -> ExtractedCode {
    let blocks: Vec<(String, &str)> = fenced_block_re()
        .captures_iter(raw)
        .filter_map(|cap| {
            let tag = cap.get(1)?.as_str().to_lowercase();
            let body = cap.get(2)?.as_str().trim();
            (!body.is_empty()).then_some((tag, body))
        })
        .collect();

    let by_tag = |tags: &[&str]| {
        blocks
            .iter()
            .find(|(tag, _)| tags.contains(&tag.as_str()))
            .map(|(_, body)| *body)
    };

    let chosen = by_tag(LANGUAGE_TAGS)
        .or_else(|| by_tag(GENERIC_TAGS))
        .or_else(|| blocks.first().map(|(_, body)| *body));

    let source = match chosen {
        Some(body) => body.to_string(),
        None => fence_marker_re().replace_all(raw, "").trim().to_string(),
    };
    ExtractedCode { source }
}
