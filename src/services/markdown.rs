use ammonia::Builder;
use pulldown_cmark::{html, Options, Parser};

/// Renders story bodies written in Markdown into sanitised HTML.
pub struct MarkdownRenderer {
    sanitizer: Builder<'static>,
}

impl Default for MarkdownRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkdownRenderer {
    pub fn new() -> Self {
        let mut tags = ammonia::Builder::default().clone_tags();
        tags.insert("del");
        tags.insert("hr");
        tags.remove("img");

        let mut sanitizer = Builder::default();
        sanitizer
            .tags(tags)
            .link_rel(Some("noopener noreferrer nofollow"))
            .url_schemes(["http", "https", "mailto"].into_iter().collect());

        Self { sanitizer }
    }

    pub fn render(&self, markdown: &str) -> String {
        let options = Options::ENABLE_STRIKETHROUGH | Options::ENABLE_SMART_PUNCTUATION;
        let parser = Parser::new_ext(markdown, options);

        let mut html_output = String::new();
        html::push_html(&mut html_output, parser);

        self.sanitizer.clean(&html_output).to_string()
    }

    /// Plain-text preview of at most `max_len` characters, cut on a word
    /// boundary when possible.
    pub fn generate_excerpt(&self, markdown: &str, max_len: usize) -> String {
        let text = strip_markdown(
            &markdown
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with("```"))
                .map(|line| line.trim_start_matches('#').trim_start_matches('>').trim())
                .collect::<Vec<_>>()
                .join(" "),
        );

        if text.chars().count() <= max_len {
            return text;
        }

        let truncated: String = text.chars().take(max_len).collect();
        match truncated.rfind(' ') {
            Some(pos) if pos > 0 => format!("{}...", &truncated[..pos]),
            _ => format!("{}...", truncated),
        }
    }

    /// Estimated reading time in minutes at 200 words per minute, minimum 1.
    pub fn calculate_reading_time(&self, markdown: &str) -> u32 {
        let word_count = markdown.split_whitespace().count();
        ((word_count as f64 / 200.0).ceil() as u32).max(1)
    }
}

fn strip_markdown(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '*' | '`' | '~' => {}
            '_' if chars.peek().map_or(true, |n| !n.is_alphanumeric()) => {}
            '!' if chars.peek() == Some(&'[') => {}
            '[' => {}
            ']' => {
                // drop the link target of `[text](url)`
                if chars.peek() == Some(&'(') {
                    for n in chars.by_ref() {
                        if n == ')' {
                            break;
                        }
                    }
                }
            }
            _ => result.push(c),
        }
    }

    result.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_paragraphs_and_emphasis() {
        let renderer = MarkdownRenderer::new();
        let html = renderer.render("I waited.\n\nHe **never** came.");
        assert!(html.contains("<p>I waited.</p>"));
        assert!(html.contains("<strong>never</strong>"));
    }

    #[test]
    fn test_render_strips_scripts() {
        let renderer = MarkdownRenderer::new();
        let html = renderer.render("hello <script>alert(1)</script>");
        assert!(!html.contains("<script>"));
    }

    #[test]
    fn test_render_drops_images() {
        let renderer = MarkdownRenderer::new();
        let html = renderer.render("![x](https://example.com/x.png)");
        assert!(!html.contains("<img"));
    }

    #[test]
    fn test_excerpt_short_text_unchanged() {
        let renderer = MarkdownRenderer::new();
        assert_eq!(renderer.generate_excerpt("# Title\n\nShort *story*.", 200), "Title Short story.");
    }

    #[test]
    fn test_excerpt_cuts_on_word_boundary() {
        let renderer = MarkdownRenderer::new();
        let excerpt = renderer.generate_excerpt("one two three four five", 12);
        assert_eq!(excerpt, "one two...");
    }

    #[test]
    fn test_excerpt_keeps_link_text() {
        let renderer = MarkdownRenderer::new();
        let excerpt = renderer.generate_excerpt("Read [my letter](https://example.com) now", 200);
        assert_eq!(excerpt, "Read my letter now");
    }

    #[test]
    fn test_reading_time_minimum_one_minute() {
        let renderer = MarkdownRenderer::new();
        assert_eq!(renderer.calculate_reading_time("tiny"), 1);
        assert_eq!(renderer.calculate_reading_time(&"word ".repeat(450)), 3);
    }
}
