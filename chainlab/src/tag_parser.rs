// chainlab/src/tag_parser.rs
use regex::RegexBuilder;

/// Shown when a tag parser run finds nothing.
pub const NO_DATA_EXTRACTED: &str = "No data extracted.";

/// Returns the body of the first `<tag>...</tag>` pair in `text`.
///
/// Matching is case-insensitive and spans newlines; the shortest body wins.
/// The tag name is matched literally, nested tags are not handled.
pub fn extract_tag(text: &str, tag: &str) -> Option<String> {
    if tag.is_empty() {
        return None;
    }

    let escaped = regex::escape(tag);
    let pattern = format!("<{escaped}>(.*?)</{escaped}>");
    let regex = RegexBuilder::new(&pattern)
        .case_insensitive(true)
        .dot_matches_new_line(true)
        .build()
        .ok()?;

    regex
        .captures(text)
        .and_then(|captures| captures.get(1))
        .map(|body| body.as_str().to_string())
}
