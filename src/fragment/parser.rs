//! Key/value extraction from the page's address fragment
//!
//! `a=1&b=two` becomes an ordered list of pairs with lower-cased,
//! percent-decoded keys and percent-decoded values. The result is "absent"
//! (`None`) rather than an error when there is nothing usable: an empty
//! fragment, no decodable pairs, a malformed percent escape, or a duplicate
//! key. Duplicates reject the whole fragment so the engine never has to
//! silently pick one of two conflicting values.

use tracing::{debug, warn};

/// Ordered key/value pairs extracted from one fragment.
pub type FragmentPairs = Vec<(String, String)>;

/// Parse a raw fragment string (leading `#` tolerated but not required).
pub fn parse_fragment(fragment: &str) -> Option<FragmentPairs> {
    let fragment = fragment.strip_prefix('#').unwrap_or(fragment);
    if fragment.is_empty() {
        return None;
    }

    let mut pairs: FragmentPairs = Vec::new();
    for segment in fragment.split('&') {
        let (raw_key, raw_value) = match segment.split_once('=') {
            Some((key, value)) => (key, value),
            // A key with no `=` carries an empty value.
            None => (segment, ""),
        };
        if raw_key.is_empty() {
            continue;
        }

        let Some(key) = percent_decode(raw_key) else {
            debug!(segment, "undecodable key, fragment treated as absent");
            return None;
        };
        let key = key.to_lowercase();
        let Some(value) = percent_decode(raw_value) else {
            debug!(segment, "undecodable value, fragment treated as absent");
            return None;
        };

        if pairs.iter().any(|(existing, _)| *existing == key) {
            warn!(%key, "duplicate key, fragment treated as absent");
            return None;
        }
        pairs.push((key, value));
    }

    if pairs.is_empty() { None } else { Some(pairs) }
}

/// Look up a key in parsed pairs.
pub fn value<'a>(pairs: &'a FragmentPairs, key: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(existing, _)| existing == key)
        .map(|(_, value)| value.as_str())
}

/// Decode `%XX` escapes. `None` on a truncated or non-hex escape, or when
/// the decoded bytes are not UTF-8. `+` is literal inside a fragment.
fn percent_decode(input: &str) -> Option<String> {
    let mut bytes = Vec::with_capacity(input.len());
    let mut rest = input.as_bytes();
    while let Some((&byte, tail)) = rest.split_first() {
        if byte == b'%' {
            let (escape, tail) = tail.split_at_checked(2)?;
            let high = (escape[0] as char).to_digit(16)?;
            let low = (escape[1] as char).to_digit(16)?;
            bytes.push((high * 16 + low) as u8);
            rest = tail;
        } else {
            bytes.push(byte);
            rest = tail;
        }
    }
    String::from_utf8(bytes).ok()
}
