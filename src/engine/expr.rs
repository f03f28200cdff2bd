//! Template expression parsing.
//!
//! ```text
//! "events"               -> Literal      (no brace at all)
//! "{data:jid}"           -> Reference    (raw value, type preserved)
//! "{fun}@{id}"           -> Format       (always renders to a string)
//! "{{literal}} {jid}"    -> Format       (doubled braces are escapes)
//! ```
//!
//! References are colon paths. `opts[id]` index syntax is accepted as a
//! synonym for `opts:id`. Format specs and conversions are not supported.

use crate::error::RenderError;
use crate::value::PATH_SEPARATOR;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Expr<'a> {
    Literal(&'a str),
    Reference(String),
    Format(Vec<Segment>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Segment {
    Text(String),
    Reference(String),
}

/// Parse one template expression.
pub(crate) fn parse(template: &str) -> Result<Expr<'_>, RenderError> {
    if !template.contains('{') {
        return Ok(Expr::Literal(template));
    }

    if regex!(r"\A\{[^{}]+\}\z").is_match(template) {
        return Ok(Expr::Reference(normalize_reference(&template[1..template.len() - 1])));
    }

    let malformed =
        |reason: &str| RenderError::Malformed { template: template.to_string(), reason: reason.to_string() };

    let mut segments = Vec::new();
    let mut text = String::new();
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                text.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                text.push('}');
            }
            '{' => {
                let mut reference = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some('{') => return Err(malformed("nested '{' inside reference")),
                        Some(ch) => reference.push(ch),
                        None => return Err(malformed("unterminated '{'")),
                    }
                }
                if reference.trim().is_empty() {
                    return Err(malformed("empty reference"));
                }
                if !text.is_empty() {
                    segments.push(Segment::Text(std::mem::take(&mut text)));
                }
                segments.push(Segment::Reference(normalize_reference(&reference)));
            }
            '}' => return Err(malformed("single '}' encountered")),
            ch => text.push(ch),
        }
    }

    if !text.is_empty() {
        segments.push(Segment::Text(text));
    }
    Ok(Expr::Format(segments))
}

/// Rewrite `a[b][0]` into the colon path `a:b:0`.
fn normalize_reference(reference: &str) -> String {
    if !reference.contains('[') {
        return reference.to_string();
    }
    let sep = PATH_SEPARATOR.to_string();
    reference.replace("][", &sep).replace('[', &sep).trim_end_matches(']').to_string()
}
