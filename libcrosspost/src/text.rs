//! Text helpers shared by platform adapters
//!
//! Descriptions arrive as light HTML. Platforms without rich text get a
//! plain-text rendering; length checks use the same rendering.

use once_cell::sync::Lazy;
use regex::Regex;

static LINE_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<br\s*/?>|</p>|</div>|</li>").expect("line break pattern"));
static HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("tag pattern"));
static LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://\S+").expect("link pattern"));
static EXTRA_NEWLINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("newline pattern"));

/// Render HTML as plain text
///
/// With `link_length`, every URL is counted as that many characters, the
/// way platforms with link shorteners measure posts.
pub fn plaintext(html: &str, link_length: Option<usize>) -> String {
    let text = LINE_BREAK.replace_all(html, "\n");
    let text = HTML_TAG.replace_all(&text, "");
    let text = decode_entities(&text);
    let text = EXTRA_NEWLINES.replace_all(&text, "\n\n");
    let text = text.trim();

    match link_length {
        Some(len) => LINK
            .replace_all(text, "x".repeat(len).as_str())
            .into_owned(),
        None => text.to_string(),
    }
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// Rewrite `{key:name}` shortcuts using `template` (`$1` is the name)
pub fn replace_username_shortcut(text: &str, key: &str, template: &str) -> String {
    let pattern = format!(r"\{{{}:([^}}\s]+)\}}", regex::escape(key));
    match Regex::new(&pattern) {
        Ok(re) => re.replace_all(text, template).into_owned(),
        Err(_) => text.to_string(),
    }
}

/// Sanitize raw tags into `#hashtag` form
///
/// Anything that is not an ASCII letter or digit is dropped, so
/// "neat stuff" becomes `#neatstuff`. Tags left empty are skipped.
pub fn format_hashtags(tags: &[String]) -> Vec<String> {
    tags.iter()
        .map(|tag| {
            tag.chars()
                .map(|c| if c.is_ascii_alphanumeric() { c } else { ' ' })
                .collect::<String>()
                .split_whitespace()
                .collect::<String>()
        })
        .filter(|tag| !tag.is_empty())
        .map(|tag| format!("#{}", tag))
        .collect()
}

/// Append tags after a blank line while the whole body fits `max_chars`
///
/// Tags are taken in order; the first one that does not fit ends the list.
pub fn append_tags(tags: &[String], body: &str, max_chars: usize) -> String {
    let body_len = char_len(body);
    let mut suffix = String::new();

    for tag in tags {
        let candidate = if suffix.is_empty() {
            format!("\n\n{}", tag)
        } else {
            format!("{} {}", suffix, tag)
        };
        if body_len + char_len(&candidate) > max_chars {
            break;
        }
        suffix = candidate;
    }

    format!("{}{}", body, suffix)
}

/// Cut `text` to at most `max_chars` characters
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

pub fn char_len(text: &str) -> usize {
    text.chars().count()
}
