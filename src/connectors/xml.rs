//! Small helpers over quick-xml events shared by the arXiv and PubMed parsers.

use quick_xml::events::BytesStart;

/// Tag name of a start/empty element, including any namespace prefix.
pub(crate) fn tag_name(e: &BytesStart) -> String {
    String::from_utf8_lossy(e.name().as_ref()).to_string()
}

/// Raw value of attribute `key`, if present.
pub(crate) fn attr(e: &BytesStart, key: &str) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key.as_bytes())
        .map(|a| String::from_utf8_lossy(&a.value).to_string())
}

/// Expand an entity or character reference name (the part between `&` and `;`).
pub(crate) fn expand_reference(name: &[u8]) -> String {
    let name = String::from_utf8_lossy(name);
    match name.as_ref() {
        "amp" => "&".to_string(),
        "lt" => "<".to_string(),
        "gt" => ">".to_string(),
        "quot" => "\"".to_string(),
        "apos" => "'".to_string(),
        other => {
            let code = if let Some(hex) = other.strip_prefix("#x").or_else(|| other.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok()
            } else if let Some(dec) = other.strip_prefix('#') {
                dec.parse::<u32>().ok()
            } else {
                None
            };
            code.and_then(char::from_u32)
                .map(|c| c.to_string())
                .unwrap_or_else(|| format!("&{};", other))
        }
    }
}

/// Collapse runs of whitespace (titles in feeds wrap across lines).
pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
