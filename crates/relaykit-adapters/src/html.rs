//! Plain-text rendering of HTML fragments.

use std::sync::LazyLock;

use regex::Regex;

static HTML_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").expect("valid HTML tag pattern"));
static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace pattern"));

/// Common entities left behind once the tags are gone.
const ENTITIES: [(&str, &str); 6] = [
    ("&nbsp;", " "),
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&quot;", "\""),
    ("&#x27;", "'"),
    ("&amp;", "&"),
];

/// Replace tags with spaces, decode common entities, collapse whitespace.
pub(crate) fn strip_html(html: &str) -> String {
    let mut text = HTML_TAG.replace_all(html, " ").into_owned();
    for (entity, plain) in ENTITIES {
        text = text.replace(entity, plain);
    }
    WHITESPACE.replace_all(&text, " ").trim().to_string()
}
