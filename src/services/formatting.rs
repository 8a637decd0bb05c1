//! Text formatting helpers for rendered snippet content.

/// Escape the five HTML-significant characters.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(c),
        }
    }
    out
}

const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "details", "div", "dl", "fieldset",
    "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "ol",
    "p", "pre", "section", "table", "ul", "script", "style",
];

fn is_standalone_shortcode(chunk: &str) -> bool {
    chunk.starts_with('[') && chunk.ends_with(']') && !chunk.contains('\n')
}

fn starts_with_block_tag(chunk: &str) -> bool {
    let Some(rest) = chunk.strip_prefix('<') else {
        return false;
    };
    let name: String = rest
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase();
    BLOCK_TAGS.contains(&name.as_str())
}

/// Wrap blank-line separated chunks in paragraphs and turn remaining single
/// newlines into line breaks. Chunks that already open with a block-level
/// element, and chunks holding a single shortcode, are left alone.
pub fn autop(text: &str) -> String {
    let text = text.replace("\r\n", "\n");
    let mut blocks = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.split('\n') {
        if line.trim().is_empty() {
            if !current.is_empty() {
                blocks.push(current.join("\n"));
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        blocks.push(current.join("\n"));
    }

    blocks
        .iter()
        .map(|block| {
            let block = block.trim();
            if starts_with_block_tag(block) || is_standalone_shortcode(block) {
                block.to_string()
            } else {
                format!("<p>{}</p>", block.replace('\n', "<br />\n"))
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup() {
        assert_eq!(
            escape_html(r#"<a href="x">Tom & 'Jerry'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; &#039;Jerry&#039;&lt;/a&gt;"
        );
    }

    #[test]
    fn autop_wraps_paragraphs() {
        let text = "First line\nsecond line\n\n\nNext paragraph";
        assert_eq!(
            autop(text),
            "<p>First line<br />\nsecond line</p>\n<p>Next paragraph</p>"
        );
    }

    #[test]
    fn autop_leaves_block_elements() {
        let text = "<div>box</div>\n\ntext\r\n\r\n<UL><li>a</li></UL>";
        assert_eq!(autop(text), "<div>box</div>\n<p>text</p>\n<UL><li>a</li></UL>");
    }

    #[test]
    fn autop_leaves_standalone_shortcodes() {
        let text = "Intro\n\n[code_snippet id=4]\n\n[b] and text";
        assert_eq!(autop(text), "<p>Intro</p>\n[code_snippet id=4]\n<p>[b] and text</p>");
    }

    #[test]
    fn autop_of_blank_text_is_empty() {
        assert_eq!(autop(" \n\n "), "");
    }
}
