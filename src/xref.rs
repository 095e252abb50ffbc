//! Cross-reference rewriting.
//!
//! A cross-reference (`xlink:href`) is free text that may embed any number
//! of UUID-shaped substrings. There is no structure to parse: the value is
//! scanned for the `8-4-4-4-12` hex shape and every hit that is a key of the
//! identifier map is replaced. Before that, the gml:id exception map repairs
//! references that point at non-conventional `gml:id` values.

use std::borrow::Cow;

use memchr::memmem;

use crate::FastIndexMap;

/// Prefix of conventional `gml:id` values.
pub const GML_ID_PREFIX: &str = "uuid.";

/// Length of the canonical textual UUID form.
pub const UUID_LEN: usize = 36;

/// Laengen der fuenf Hex-Gruppen.
const GROUPS: [usize; 5] = [8, 4, 4, 4, 12];

/// True if `bytes` starts with a UUID shape (`8-4-4-4-12` hex digits).
fn is_uuid_at(bytes: &[u8]) -> bool {
    if bytes.len() < UUID_LEN {
        return false;
    }
    let mut pos = 0;
    for (i, len) in GROUPS.iter().enumerate() {
        if i > 0 {
            if bytes[pos] != b'-' {
                return false;
            }
            pos += 1;
        }
        if !bytes[pos..pos + len].iter().all(u8::is_ascii_hexdigit) {
            return false;
        }
        pos += len;
    }
    true
}

/// True if the whole of `s` is one UUID shape.
pub fn is_uuid(s: &str) -> bool {
    s.len() == UUID_LEN && is_uuid_at(s.as_bytes())
}

/// Byte ranges of all UUID-shaped substrings, left to right, non-overlapping.
pub fn uuid_spans(s: &str) -> Vec<(usize, usize)> {
    let bytes = s.as_bytes();
    let mut spans = Vec::new();
    let mut pos = 0;
    while pos + UUID_LEN <= bytes.len() {
        if is_uuid_at(&bytes[pos..]) {
            spans.push((pos, pos + UUID_LEN));
            pos += UUID_LEN;
        } else {
            pos += 1;
        }
    }
    spans
}

/// Replaces every UUID-shaped substring found as a key in `identifiers`.
///
/// Unknown UUIDs stay untouched. Returns `Cow::Borrowed` if nothing changed.
pub fn replace_mapped_uuids<'a>(
    value: &'a str,
    identifiers: &FastIndexMap<String, String>,
) -> Cow<'a, str> {
    if identifiers.is_empty() {
        return Cow::Borrowed(value);
    }
    let mut out: Option<String> = None;
    let mut last = 0;
    for (start, end) in uuid_spans(value) {
        let Some(new) = identifiers.get(&value[start..end]) else {
            continue;
        };
        let buf = out.get_or_insert_with(|| String::with_capacity(value.len()));
        buf.push_str(&value[last..start]);
        buf.push_str(new);
        last = end;
    }
    match out {
        Some(mut buf) => {
            buf.push_str(&value[last..]);
            Cow::Owned(buf)
        }
        None => Cow::Borrowed(value),
    }
}

/// Applies the gml:id exception map in one left-to-right pass.
///
/// At each position the longest matching key wins, so `UNIT_1` never
/// shadows `UNIT_10`. The result does not depend on the map order.
/// Replacement text is not scanned again.
pub fn apply_exceptions<'a>(
    value: &'a str,
    exceptions: &FastIndexMap<String, String>,
) -> Cow<'a, str> {
    let bytes = value.as_bytes();
    // Nur Schluessel, die im Wert ueberhaupt vorkommen.
    let present: Vec<(memmem::Finder<'_>, &str)> = exceptions
        .iter()
        .filter(|(old, _)| !old.is_empty() && memmem::find(bytes, old.as_bytes()).is_some())
        .map(|(old, new)| (memmem::Finder::new(old.as_bytes()), new.as_str()))
        .collect();
    if present.is_empty() {
        return Cow::Borrowed(value);
    }

    let mut out = String::with_capacity(value.len());
    let mut pos = 0;
    while let Some((start, len, new)) = leftmost_longest(&bytes[pos..], &present) {
        out.push_str(&value[pos..pos + start]);
        out.push_str(new);
        pos += start + len;
    }
    out.push_str(&value[pos..]);
    Cow::Owned(out)
}

/// Fruehester Treffer; bei gleichem Start der laengste Schluessel.
fn leftmost_longest<'k>(
    haystack: &[u8],
    keys: &[(memmem::Finder<'_>, &'k str)],
) -> Option<(usize, usize, &'k str)> {
    let mut best: Option<(usize, usize, &'k str)> = None;
    for (finder, new) in keys {
        let Some(at) = finder.find(haystack) else {
            continue;
        };
        let len = finder.needle().len();
        let better = match best {
            None => true,
            Some((b_at, b_len, _)) => at < b_at || (at == b_at && len > b_len),
        };
        if better {
            best = Some((at, len, *new));
        }
    }
    best
}

/// Full cross-reference repair: exceptions first, then the UUID scan.
pub fn rewrite_reference<'a>(
    value: &'a str,
    identifiers: &FastIndexMap<String, String>,
    exceptions: &FastIndexMap<String, String>,
) -> Cow<'a, str> {
    match apply_exceptions(value, exceptions) {
        Cow::Borrowed(v) => replace_mapped_uuids(v, identifiers),
        Cow::Owned(v) => {
            if let Cow::Owned(rewritten) = replace_mapped_uuids(&v, identifiers) {
                return Cow::Owned(rewritten);
            }
            Cow::Owned(v)
        }
    }
}

/// UUID captured by a conventional `uuid.<uuid>` gml:id, `None` otherwise.
pub fn conventional_uuid(gml_id: &str) -> Option<&str> {
    gml_id.strip_prefix(GML_ID_PREFIX).filter(|rest| is_uuid(rest))
}

/// `uuid.` + `uuid`.
pub fn gml_id_for(uuid: &str) -> String {
    format!("{GML_ID_PREFIX}{uuid}")
}
