use std::sync::LazyLock;

use regex::Regex;

struct Rule {
    pattern: Regex,
    replacement: &'static str,
}

impl Rule {
    fn new(pattern: &str, replacement: &'static str) -> Self {
        Self {
            pattern: Regex::new(pattern).expect("markdown rule pattern is valid"),
            replacement,
        }
    }
}

// Order matters: bold before italic, fenced before inline code, newlines last.
static RULES: LazyLock<[Rule; 5]> = LazyLock::new(|| {
    [
        Rule::new(r"\*\*(.*?)\*\*", "<strong>${1}</strong>"),
        Rule::new(r"\*(.*?)\*", "<em>${1}</em>"),
        Rule::new(r"(?s)```(.*?)```", "<pre><code>${1}</code></pre>"),
        Rule::new(r"`([^`]+)`", "<code>${1}</code>"),
        Rule::new(r"\n", "<br />"),
    ]
});

/// Renders the supported markdown subset to an HTML fragment.
///
/// Raw text is HTML-escaped first, so the only markup in the output is what the
/// rules insert. Never fails; text matching no rule passes through unchanged.
pub fn render_markdown(text: &str) -> String {
    let mut html = escape_html(text);
    for rule in RULES.iter() {
        if let std::borrow::Cow::Owned(replaced) =
            rule.pattern.replace_all(&html, rule.replacement)
        {
            html = replaced;
        }
    }
    html
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
