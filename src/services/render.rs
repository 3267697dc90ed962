//! Content rendering
//!
//! Turns a content item into the HTML fragment shown to students: Markdown
//! for text (with syntect highlighting in fenced code blocks), an embed for
//! known video hosts, and media links for images and files.
//!
//! Instructor Markdown is untrusted: raw HTML is escaped and only http(s),
//! mailto and relative link targets survive.

use once_cell::sync::Lazy;
use pulldown_cmark::{html, CodeBlockKind, CowStr, Event, Options, Parser, Tag, TagEnd};
use regex::Regex;
use std::sync::Arc;
use syntect::highlighting::ThemeSet;
use syntect::html::highlighted_html_for_string;
use syntect::parsing::SyntaxSet;


/// URL prefix under which uploaded media is served
pub const MEDIA_URL: &str = "/media/";

const DEFAULT_THEME: &str = "base16-ocean.dark";

static RENDERER: Lazy<MarkdownRenderer> = Lazy::new(MarkdownRenderer::new);

static YOUTUBE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^https?://(?:www\.|m\.)?(?:youtube\.com/(?:watch\?(?:[^#]*&)?v=|embed/)|youtu\.be/)([A-Za-z0-9_-]{11})",
    )
    .expect("valid youtube pattern")
});

static VIMEO: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https?://(?:www\.|player\.)?vimeo\.com/(?:video/)?(\d+)")
        .expect("valid vimeo pattern")
});

/// Markdown renderer with syntax highlighting for fenced code blocks.
#[derive(Clone)]
pub struct MarkdownRenderer {
    syntax_set: SyntaxSet,
    theme_set: Arc<ThemeSet>,
    theme_name: String,
}

impl Default for MarkdownRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkdownRenderer {
    pub fn new() -> Self {
        Self::with_theme(DEFAULT_THEME)
    }

    /// Use a named syntect theme, falling back to the default when unknown.
    pub fn with_theme(theme_name: &str) -> Self {
        let theme_set = ThemeSet::load_defaults();
        let theme_name = if theme_set.themes.contains_key(theme_name) {
            theme_name
        } else {
            DEFAULT_THEME
        };

        Self {
            syntax_set: SyntaxSet::load_defaults_newlines(),
            theme_set: Arc::new(theme_set),
            theme_name: theme_name.to_string(),
        }
    }

    pub fn render(&self, markdown: &str) -> String {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TASKLISTS);

        let events = self.highlight_code_blocks(Parser::new_ext(markdown, options));

        let mut output = String::new();
        html::push_html(&mut output, events.into_iter());
        output
    }

    fn highlight_code_blocks<'a>(&self, parser: Parser<'a>) -> Vec<Event<'a>> {
        let mut events = Vec::new();
        let mut code: Option<(Option<String>, String)> = None;

        for event in parser {
            match event {
                Event::Start(Tag::CodeBlock(kind)) => {
                    let lang = match kind {
                        CodeBlockKind::Fenced(lang) if !lang.is_empty() => Some(lang.to_string()),
                        _ => None,
                    };
                    code = Some((lang, String::new()));
                }
                Event::End(TagEnd::CodeBlock) => {
                    if let Some((lang, body)) = code.take() {
                        let block = match lang {
                            Some(lang) => self.highlight(&body, &lang),
                            None => format!("<pre><code>{}</code></pre>", html_escape(&body)),
                        };
                        events.push(Event::Html(block.into()));
                    }
                }
                Event::Text(text) if code.is_some() => {
                    if let Some((_, body)) = code.as_mut() {
                        body.push_str(&text);
                    }
                }
                Event::Html(raw) | Event::InlineHtml(raw) => events.push(Event::Text(raw)),
                Event::Start(Tag::Link {
                    link_type,
                    dest_url,
                    title,
                    id,
                }) => events.push(Event::Start(Tag::Link {
                    link_type,
                    dest_url: safe_destination(dest_url),
                    title,
                    id,
                })),
                Event::Start(Tag::Image {
                    link_type,
                    dest_url,
                    title,
                    id,
                }) => events.push(Event::Start(Tag::Image {
                    link_type,
                    dest_url: safe_destination(dest_url),
                    title,
                    id,
                })),
                other => events.push(other),
            }
        }

        events
    }

    fn highlight(&self, code: &str, lang: &str) -> String {
        let syntax = self
            .syntax_set
            .find_syntax_by_token(lang)
            .or_else(|| self.syntax_set.find_syntax_by_extension(lang));

        let highlighted = syntax.and_then(|syntax| {
            let theme = self.theme_set.themes.get(&self.theme_name)?;
            highlighted_html_for_string(code, &self.syntax_set, syntax, theme).ok()
        });

        highlighted.unwrap_or_else(|| {
            format!(
                "<pre><code class=\"language-{}\">{}</code></pre>",
                html_escape(lang),
                html_escape(code)
            )
        })
    }
}

fn safe_destination(url: CowStr<'_>) -> CowStr<'_> {
    if is_safe_destination(&url) {
        url
    } else {
        CowStr::Borrowed("")
    }
}

/// Relative targets, or absolute ones with an http(s) or mailto scheme.
/// Whitespace and control characters are ignored, as browsers do.
fn is_safe_destination(url: &str) -> bool {
    let compact: String = url
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .collect::<String>()
        .to_ascii_lowercase();

    match compact.find([':', '/', '?', '#']) {
        Some(at) if compact[at..].starts_with(':') => {
            matches!(&compact[..at], "http" | "https" | "mailto")
        }
        _ => true,
    }
}

pub fn render_text(content: &str) -> String {
    RENDERER.render(content)
}

/// YouTube and Vimeo links become an `<iframe>`, anything else a plain link.
pub fn render_video(url: &str) -> String {
    let embed = if let Some(caps) = YOUTUBE.captures(url) {
        Some(format!("https://www.youtube.com/embed/{}", &caps[1]))
    } else {
        VIMEO
            .captures(url)
            .map(|caps| format!("https://player.vimeo.com/video/{}", &caps[1]))
    };

    match embed {
        Some(src) => format!(
            "<iframe width=\"560\" height=\"315\" src=\"{}\" frameborder=\"0\" allowfullscreen></iframe>",
            src
        ),
        None => {
            let url = html_escape(url);
            format!("<a href=\"{}\">{}</a>", url, url)
        }
    }
}

pub fn render_image(title: &str, file: &str) -> String {
    format!(
        "<img src=\"{}\" alt=\"{}\">",
        html_escape(&media_url(file)),
        html_escape(title)
    )
}

pub fn render_file(title: &str, file: &str) -> String {
    format!(
        "<a href=\"{}\" download>{}</a>",
        html_escape(&media_url(file)),
        html_escape(title)
    )
}

fn media_url(file: &str) -> String {
    format!("{}{}", MEDIA_URL, file.trim_start_matches('/'))
}

pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markdown_basics() {
        let html = render_text("# Ownership\n\nMoves are **explicit**.\n\n- one\n- two");
        assert!(html.contains("<h1>Ownership</h1>"));
        assert!(html.contains("<strong>explicit</strong>"));
        assert!(html.contains("<li>one</li>"));
    }

    #[test]
    fn test_code_blocks() {
        let renderer = MarkdownRenderer::new();

        let highlighted = renderer.render("```rust\nfn main() {}\n```");
        assert!(highlighted.contains("<pre"));
        assert!(highlighted.contains("style="));

        let plain = renderer.render("    let x = 1 < 2;");
        assert!(plain.contains("<pre><code>let x = 1 &lt; 2;"));

        let unknown = renderer.render("```nosuchlang\na < b\n```");
        assert!(unknown.contains("class=\"language-nosuchlang\""));
        assert!(unknown.contains("a &lt; b"));
    }

    #[test]
    fn test_unknown_theme_falls_back() {
        let renderer = MarkdownRenderer::with_theme("missing-theme");
        assert_eq!(renderer.theme_name, DEFAULT_THEME);
    }

    #[test]
    fn test_video_embeds() {
        let youtube = render_video("https://www.youtube.com/watch?v=dQw4w9WgXcQ");
        assert!(youtube.contains("<iframe"));
        assert!(youtube.contains("https://www.youtube.com/embed/dQw4w9WgXcQ"));

        let short = render_video("https://youtu.be/dQw4w9WgXcQ");
        assert!(short.contains("/embed/dQw4w9WgXcQ"));

        let vimeo = render_video("https://vimeo.com/76979871");
        assert!(vimeo.contains("https://player.vimeo.com/video/76979871"));

        let other = render_video("https://example.com/talk?a=1&b=<2>");
        assert!(!other.contains("<iframe"));
        assert!(other.contains("&amp;b=&lt;2&gt;"));
    }

    #[test]
    fn test_media_fragments() {
        let image = render_image("Diagram \"A\"", "images/a.png");
        assert_eq!(image, "<img src=\"/media/images/a.png\" alt=\"Diagram &quot;A&quot;\">");

        let file = render_file("Slides", "/files/s.pdf");
        assert_eq!(file, "<a href=\"/media/files/s.pdf\" download>Slides</a>");
    }

    #[test]
    fn test_raw_html_is_escaped() {
        let html = render_text("hi <script>alert(1)</script>\n\n<div onclick=\"steal()\">x</div>");
        assert!(!html.contains("<script"));
        assert!(!html.contains("<div"));
        assert!(html.contains("&lt;script&gt;alert(1)&lt;/script&gt;"));
        assert!(html.contains("&lt;div onclick="));
    }

    #[test]
    fn test_unsafe_link_targets_are_dropped() {
        let html = render_text(
            "[x](javascript:alert(2)) [y](JaVa%0AScript:x) ![i](data:image/svg+xml;base64,AA)",
        );
        assert!(!html.to_lowercase().contains("javascript"));
        assert!(!html.contains("data:"));
        assert!(html.contains("<a href=\"\">x</a>"));

        let kept = render_text("[docs](https://doc.rust-lang.org) [up](../intro) [m](mailto:a@b.io)");
        assert!(kept.contains("href=\"https://doc.rust-lang.org\""));
        assert!(kept.contains("href=\"../intro\""));
        assert!(kept.contains("href=\"mailto:a@b.io\""));
    }

    #[test]
    fn test_destination_check_ignores_embedded_whitespace() {
        assert!(!is_safe_destination(" java\tscript:alert(1)"));
        assert!(!is_safe_destination("vbscript:x"));
        assert!(is_safe_destination("/media/files/a.pdf"));
        assert!(is_safe_destination("#section"));
        assert!(is_safe_destination("notes?at=10:30"));
    }

    #[test]
    fn test_html_escape() {
        assert_eq!(html_escape("<a href='x'>&</a>"), "&lt;a href=&#x27;x&#x27;&gt;&amp;&lt;/a&gt;");
    }
}
