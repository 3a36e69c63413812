//! Splitting query matches into the JSON metadata block and `label: value`
//! spec pairs.

use std::sync::LazyLock;

use regex::Regex;

static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s{2,}").expect("valid regex"));

/// Query matches sorted by shape.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fragments {
    /// Fragments containing a brace, in page order.
    pub json: Vec<String>,
    /// `(label, value)` pairs from every other fragment, in page order.
    pub specs: Vec<(String, String)>,
}

/// Sorts `texts` into JSON blocks and spec pairs.
///
/// Fragments without a `:` are noise and dropped. Spec fragments have
/// whitespace runs collapsed to `", "` and are split at the first `:`; a
/// leading comma left by the collapse is removed from the value.
#[must_use]
pub fn split_fragments<S: AsRef<str>>(texts: &[S]) -> Fragments {
    let mut fragments = Fragments::default();

    for text in texts {
        let text = text.as_ref().trim();
        if !text.contains(':') {
            continue;
        }

        if text.contains(['{', '}']) {
            fragments.json.push(text.to_owned());
            continue;
        }

        let collapsed = WHITESPACE_RUN.replace_all(text, ", ");
        if let Some((label, value)) = collapsed.split_once(':') {
            let value = value.strip_prefix(',').unwrap_or(value).trim();
            fragments
                .specs
                .push((label.trim().to_owned(), value.to_owned()));
        }
    }

    fragments
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(label: &str, value: &str) -> (String, String) {
        (label.to_owned(), value.to_owned())
    }

    #[test]
    fn sorts_json_and_pairs() {
        let texts = [
            r#"{"sku": "1", "name": "X"}"#,
            "RAM:\n      8 GB",
            "Ổ cứng: 256GB SSD",
            "no colon here",
        ];
        let fragments = split_fragments(&texts);

        assert_eq!(fragments.json, vec![r#"{"sku": "1", "name": "X"}"#.to_owned()]);
        assert_eq!(
            fragments.specs,
            vec![pair("RAM", "8 GB"), pair("Ổ cứng", "256GB SSD")]
        );
    }

    #[test]
    fn multi_value_items_are_joined_with_commas() {
        let fragments = split_fragments(&["Kết nối:\n   Wi-Fi 6\n   Bluetooth 5.3"]);
        assert_eq!(fragments.specs, vec![pair("Kết nối", "Wi-Fi 6, Bluetooth 5.3")]);
    }

    #[test]
    fn value_keeps_later_colons() {
        let fragments = split_fragments(&["Tỉ lệ: 16:9"]);
        assert_eq!(fragments.specs, vec![pair("Tỉ lệ", "16:9")]);
    }

    #[test]
    fn empty_input_is_empty() {
        let texts: [&str; 0] = [];
        assert_eq!(split_fragments(&texts), Fragments::default());
    }
}
