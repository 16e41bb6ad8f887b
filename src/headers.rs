//! Decompressed name/value header blocks.
//!
//! The plaintext produced by the header inflater is a length-prefixed
//! pair list:
//!
//! ```text
//! num_pairs : uint32 BE
//! pair{num_pairs} : { name_len:uint32, name:bytes[name_len],
//!                     value_len:uint32, value:bytes[value_len] }
//! ```

/// A decoded SPDY header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Reads the leading pair count, or `None` if the plaintext cannot
/// even hold it.
pub fn pair_count(plain: &[u8]) -> Option<u32> {
    if plain.len() < 4 {
        return None;
    }
    Some(u32::from_be_bytes([plain[0], plain[1], plain[2], plain[3]]))
}

/// Parses up to `count` pairs following the count field. Returns the
/// pairs plus a flag set when the plaintext ran out mid-list.
pub fn parse_pairs(plain: &[u8], count: u32) -> (Vec<Header>, bool) {
    let mut pairs = Vec::new();
    let mut offset = 4usize;
    for _ in 0..count {
        if offset >= plain.len() {
            // Pair list exhausted early; the count lied.
            return (pairs, true);
        }
        let Some((name, next)) = read_string(plain, offset) else {
            return (pairs, true);
        };
        let Some((value, next)) = read_string(plain, next) else {
            return (pairs, true);
        };
        offset = next;
        pairs.push(Header { name, value });
    }
    (pairs, false)
}

fn read_string(plain: &[u8], offset: usize) -> Option<(String, usize)> {
    let len_end = offset.checked_add(4)?;
    if len_end > plain.len() {
        return None;
    }
    let len = u32::from_be_bytes([
        plain[offset],
        plain[offset + 1],
        plain[offset + 2],
        plain[offset + 3],
    ]) as usize;
    let end = len_end.checked_add(len)?;
    if end > plain.len() {
        return None;
    }
    let s = String::from_utf8_lossy(&plain[len_end..end]).into_owned();
    Some((s, end))
}

/// The handful of header names the analyzer itself acts on. `method`
/// (requests) and `status` (responses) share the verb slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecognizedHeaders {
    pub verb: Option<String>,
    pub url: Option<String>,
    pub version: Option<String>,
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
}

/// Scans a pair list for the recognized names, ASCII case-insensitive.
/// Later occurrences win, matching a linear rescan of the block.
pub fn recognize(pairs: &[Header]) -> RecognizedHeaders {
    let mut out = RecognizedHeaders::default();
    for header in pairs {
        let name = header.name.as_str();
        if name.eq_ignore_ascii_case("method") || name.eq_ignore_ascii_case("status") {
            out.verb = Some(header.value.clone());
        } else if name.eq_ignore_ascii_case("url") {
            out.url = Some(header.value.clone());
        } else if name.eq_ignore_ascii_case("version") {
            out.version = Some(header.value.clone());
        } else if name.eq_ignore_ascii_case("content-type") {
            out.content_type = Some(header.value.clone());
        } else if name.eq_ignore_ascii_case("content-encoding") {
            out.content_encoding = Some(header.value.clone());
        }
    }
    out
}

/// Splits a content-type value into the lowercased media type and the
/// parameter string after it, if any.
///
/// `"Text/HTML; charset=utf-8"` becomes `("text/html",
/// Some("charset=utf-8"))`; a bare media type yields `None` parameters.
pub fn split_content_type(raw: &str) -> (String, Option<String>) {
    let cut = raw
        .find(|c: char| c == ';' || c.is_ascii_whitespace())
        .unwrap_or(raw.len());
    let media = raw[..cut].to_ascii_lowercase();
    let params = raw[cut..]
        .trim_start_matches(|c: char| c == ';' || c.is_ascii_whitespace());
    if params.is_empty() {
        (media, None)
    } else {
        (media, Some(params.to_string()))
    }
}
