use serde::{Deserialize, Serialize};

/// Coordinate box injected when a fragment declares none.
pub const DEFAULT_VIEW_BOX: &str = "0 0 100 100";

const OPEN_TOKEN: &str = "<svg";
const CLOSE_TOKEN: &str = "</svg>";

/// An embeddable SVG fragment. Either structurally valid (starts with the
/// opening tag, ends with the matching closing tag, declares a viewBox and
/// 100%-relative dimensions) or the empty sentinel meaning "no usable output".
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SvgMarkup(String);

impl SvgMarkup {
    pub fn empty() -> Self {
        Self(String::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Extracts and repairs an SVG fragment from arbitrary provider output.
    ///
    /// Total over all inputs: the result is either a valid fragment or the
    /// empty sentinel, never an error. Applied to an already-normalized
    /// fragment the repairs are no-ops and the fragment comes back unchanged.
    pub fn normalize(raw: &str) -> Self {
        let working = fenced_body(raw).unwrap_or(raw);
        let Some(fragment) = extract_fragment(working) else {
            return Self::empty();
        };
        let repaired = repair_opening_tag(fragment);
        if repaired.starts_with(OPEN_TOKEN) && repaired.ends_with(CLOSE_TOKEN) {
            Self(repaired)
        } else {
            Self::empty()
        }
    }
}

/// Returns the content strictly between triple-backtick fence markers, if the
/// text carries a fenced block. The language tag line ("```svg", "```xml",
/// ...) is not part of the body.
fn fenced_body(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after_marker = &text[start + 3..];
    let body_start = after_marker.find('\n')? + 1;
    let body = &after_marker[body_start..];
    let end = body.rfind("```")?;
    Some(&body[..end])
}

/// First opening tag through the nearest following closing tag.
fn extract_fragment(text: &str) -> Option<&str> {
    let start = find_open_tag(text)?;
    let rest = &text[start..];
    let end = rest.find(CLOSE_TOKEN)?;
    Some(&rest[..end + CLOSE_TOKEN.len()])
}

fn find_open_tag(text: &str) -> Option<usize> {
    let mut from = 0;
    while let Some(pos) = text[from..].find(OPEN_TOKEN) {
        let at = from + pos;
        // Guard against prefixes such as "<svgdefs": the token must be
        // followed by whitespace or the tag terminator.
        match text[at + OPEN_TOKEN.len()..].chars().next() {
            Some(next) if next == '>' || next == '/' || next.is_whitespace() => return Some(at),
            Some(_) => from = at + OPEN_TOKEN.len(),
            None => return None,
        }
    }
    None
}

fn repair_opening_tag(fragment: &str) -> String {
    let Some(tag_end) = fragment.find('>') else {
        return String::new();
    };
    let mut opening = fragment[..tag_end].to_string();
    let rest = &fragment[tag_end..];

    if !has_attribute(&opening, "viewBox") {
        opening.insert_str(OPEN_TOKEN.len(), &format!(" viewBox=\"{DEFAULT_VIEW_BOX}\""));
    }
    if !has_attribute(&opening, "width") {
        append_attribute(&mut opening, " width=\"100%\"");
    }
    if !has_attribute(&opening, "height") {
        append_attribute(&mut opening, " height=\"100%\"");
    }

    format!("{opening}{rest}")
}

fn append_attribute(opening: &mut String, attribute: &str) {
    let at = if opening.ends_with('/') {
        opening.len() - 1
    } else {
        opening.len()
    };
    opening.insert_str(at, attribute);
}

/// Attribute lookup over the opening tag only. Requires a whitespace boundary
/// before the name so "stroke-width" never counts as "width".
fn has_attribute(opening_tag: &str, name: &str) -> bool {
    let mut from = 0;
    while let Some(pos) = opening_tag[from..].find(name) {
        let at = from + pos;
        let bounded_before = opening_tag[..at]
            .chars()
            .next_back()
            .is_some_and(char::is_whitespace);
        let bounded_after = opening_tag[at + name.len()..]
            .chars()
            .next()
            .is_none_or(|next| next == '=' || next.is_whitespace());
        if bounded_before && bounded_after {
            return true;
        }
        from = at + name.len();
    }
    false
}
