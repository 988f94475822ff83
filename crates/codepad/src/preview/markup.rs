//! Minimal HTML tag scanning
//!
//! Just enough of HTML to find opening tags and their attribute names. Quoted
//! attribute values may contain `>` and are skipped as a whole.

/// An opening tag found in a document
#[derive(Debug)]
struct OpenTag<'a> {
    /// Lowercased tag name
    name: String,
    /// Raw text between the tag name and the closing `>`
    attributes: &'a str,
    /// Byte offset just past the closing `>`
    end: usize,
}

impl OpenTag<'_> {
    fn has_attribute(&self, wanted: &str) -> bool {
        attribute_names(self.attributes)
            .iter()
            .any(|name| name.eq_ignore_ascii_case(wanted))
    }
}

/// Remove every tag that makes the document load something from elsewhere:
/// `<script src>` elements including their body, `<link href>` and `<base>`.
pub fn strip_external_references(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut copied = 0;
    let mut pos = 0;

    while let Some(offset) = html[pos..].find('<') {
        let start = pos + offset;
        let Some(tag) = parse_open_tag(html, start) else {
            pos = start + 1;
            continue;
        };

        let remove_to = match tag.name.as_str() {
            "script" if tag.has_attribute("src") => {
                Some(closing_tag_end(html, tag.end, "script").unwrap_or(tag.end))
            }
            "link" if tag.has_attribute("href") => Some(tag.end),
            "base" => Some(tag.end),
            _ => None,
        };

        match remove_to {
            Some(end) => {
                out.push_str(&html[copied..start]);
                copied = end;
                pos = end;
            }
            None => pos = tag.end,
        }
    }

    out.push_str(&html[copied..]);
    out
}

/// Whether the markup is a whole document rather than a body fragment
pub fn is_full_document(html: &str) -> bool {
    if html.to_ascii_lowercase().contains("<!doctype") {
        return true;
    }

    let mut pos = 0;
    while let Some(offset) = html[pos..].find('<') {
        let start = pos + offset;
        match parse_open_tag(html, start) {
            Some(tag) if matches!(tag.name.as_str(), "html" | "head" | "body") => return true,
            Some(tag) => pos = tag.end,
            None => pos = start + 1,
        }
    }
    false
}

/// Insert `insertion` before the last occurrence of `marker`, matched without
/// regard to ASCII case. Returns false when the marker is missing.
pub fn insert_before(html: &mut String, marker: &str, insertion: &str) -> bool {
    let lower = html.to_ascii_lowercase();
    match lower.rfind(&marker.to_ascii_lowercase()) {
        Some(idx) => {
            html.insert_str(idx, insertion);
            true
        }
        None => false,
    }
}

/// Escape `</tag` so inlined text cannot close the element it sits in
pub fn escape_closing_tag(text: &str, tag: &str) -> String {
    let needle = format!("</{}", tag.to_ascii_lowercase());
    let lower = text.to_ascii_lowercase();
    let mut out = String::with_capacity(text.len());
    let mut last = 0;

    for (idx, _) in lower.match_indices(&needle) {
        out.push_str(&text[last..idx]);
        out.push_str("<\\/");
        last = idx + 2;
    }

    out.push_str(&text[last..]);
    out
}

fn parse_open_tag(html: &str, start: usize) -> Option<OpenTag<'_>> {
    let bytes = html.as_bytes();
    let name_start = start + 1;
    let name_len = bytes
        .get(name_start..)?
        .iter()
        .take_while(|b| b.is_ascii_alphanumeric())
        .count();
    if name_len == 0 || !bytes[name_start].is_ascii_alphabetic() {
        return None;
    }
    let name_end = name_start + name_len;

    let mut quote = None;
    for (idx, &b) in bytes.iter().enumerate().skip(name_end) {
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'"' || b == b'\'' => quote = Some(b),
            None if b == b'>' => {
                return Some(OpenTag {
                    name: html[name_start..name_end].to_ascii_lowercase(),
                    attributes: &html[name_end..idx],
                    end: idx + 1,
                });
            }
            None => {}
        }
    }

    None
}

/// Offset just past `</tag ...>` at or after `from`
fn closing_tag_end(html: &str, from: usize, tag: &str) -> Option<usize> {
    let lower = html[from..].to_ascii_lowercase();
    let close = lower.find(&format!("</{tag}"))?;
    let after = from + close;
    Some(html[after..].find('>').map_or(html.len(), |gt| after + gt + 1))
}

fn attribute_names(attributes: &str) -> Vec<&str> {
    let bytes = attributes.as_bytes();
    let mut names = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i].is_ascii_whitespace() || bytes[i] == b'/' {
            i += 1;
            continue;
        }

        let start = i;
        while i < bytes.len() && !bytes[i].is_ascii_whitespace() && !matches!(bytes[i], b'=' | b'/')
        {
            i += 1;
        }
        if i > start {
            names.push(&attributes[start..i]);
        }

        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if bytes.get(i) != Some(&b'=') {
            continue;
        }

        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        match bytes.get(i) {
            Some(&q) if q == b'"' || q == b'\'' => {
                i += 1;
                while i < bytes.len() && bytes[i] != q {
                    i += 1;
                }
                i += 1;
            }
            _ => {
                while i < bytes.len() && !bytes[i].is_ascii_whitespace() {
                    i += 1;
                }
            }
        }
    }

    names
}
