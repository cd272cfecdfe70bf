//! Parsing of `key=value,key=value` label selectors

use std::collections::BTreeMap;

/// Parses comma-separated `key=value` pairs into label map.
///
/// Never fails: fragments that do not consist of exactly two `=`-separated
/// parts are skipped. Keys and values are trimmed. Later duplicates win.
pub fn parse_label_selector(selector: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    for pair in selector.split(',') {
        let mut parts = pair.split('=');
        let (key, value) = match (parts.next(), parts.next(), parts.next()) {
            (Some(key), Some(value), None) => (key, value),
            _ => continue,
        };
        labels.insert(key.trim().to_string(), value.trim().to_string());
    }
    labels
}

/// Renders labels back into selector form
pub fn format_label_selector(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}
