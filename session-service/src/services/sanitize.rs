//! Message body sanitization.
//!
//! Everything angle-bracketed is stripped except a small allow-list of
//! inline formatting: b, i, em, strong, plain href-only anchors, and line
//! breaks. Attributes other than a double-quoted href are not allowed, so a
//! tag carrying an event handler is removed wholesale rather than trimmed.

use once_cell::sync::Lazy;
use regex::Regex;

static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^<>]*>").expect("tag pattern"));

static ALLOWED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)^(</?(b|i|em|strong)>|<br\s*/?>|</a>|<a\s+href="[^"<>]*"\s*>)$"#)
        .expect("allow-list pattern")
});

/// Strip disallowed markup from a message body.
///
/// Idempotent: the output contains only allow-listed tags, which survive a
/// second pass unchanged.
pub fn sanitize_markup(input: &str) -> String {
    TAG.replace_all(input, |caps: &regex::Captures<'_>| {
        let tag = caps.get(0).map(|m| m.as_str()).unwrap_or("");
        if ALLOWED.is_match(tag) {
            tag.to_string()
        } else {
            String::new()
        }
    })
    .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_allowed_formatting() {
        let input = r#"<b>bold</b> <i>it</i> <em>em</em> <strong>s</strong><br><br/><a href="https://example.com">link</a></a>"#;
        assert_eq!(sanitize_markup(input), input);
    }

    #[test]
    fn strips_disallowed_tags_but_keeps_text() {
        assert_eq!(
            sanitize_markup("<script>alert(1)</script>hello <div>there</div>"),
            "alert(1)hello there"
        );
    }

    #[test]
    fn strips_anchor_with_extra_attributes() {
        assert_eq!(
            sanitize_markup(r#"<a href="x" onclick="steal()">click</a>"#),
            "click</a>"
        );
    }

    #[test]
    fn sanitization_is_idempotent() {
        let inputs = [
            "plain text, no markup",
            "<b>kept</b><img src=x onerror=alert(1)>",
            "unbalanced < angle > brackets <em>ok</em>",
            "<<b>nested</b>>",
        ];
        for input in inputs {
            let once = sanitize_markup(input);
            assert_eq!(sanitize_markup(&once), once, "input: {input}");
        }
    }
}
