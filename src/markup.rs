use once_cell::sync::Lazy;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use regex::Regex;

static HTML_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<(/?)([a-zA-Z][a-zA-Z0-9]*)[^>]*>").expect("valid html tag regex"));

/// Renders a one-line description carrying the simple HTML tags posts tend to
/// use into styled text. Anything that is not a tag or an entity is shown as
/// written.
#[derive(Default)]
pub struct Renderer;

impl Renderer {
    pub fn new() -> Self {
        Self
    }

    pub fn render(&self, input: &str) -> Text<'static> {
        let mut writer = MarkupWriter::default();
        writer.html(input);
        writer.into_text()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Bold,
    Italic,
    Underline,
    Strike,
    Link,
}

impl Mark {
    fn from_html(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "b" | "strong" => Some(Mark::Bold),
            "i" | "em" | "cite" => Some(Mark::Italic),
            "u" | "ins" => Some(Mark::Underline),
            "s" | "strike" | "del" => Some(Mark::Strike),
            "a" => Some(Mark::Link),
            _ => None,
        }
    }

    fn apply(self, style: Style) -> Style {
        match self {
            Mark::Bold => style.add_modifier(Modifier::BOLD),
            Mark::Italic => style.add_modifier(Modifier::ITALIC),
            Mark::Underline => style.add_modifier(Modifier::UNDERLINED),
            Mark::Strike => style.add_modifier(Modifier::CROSSED_OUT),
            Mark::Link => style.fg(Color::Blue).add_modifier(Modifier::UNDERLINED),
        }
    }
}

#[derive(Default)]
struct MarkupWriter {
    spans: Vec<Span<'static>>,
    marks: Vec<Mark>,
}

impl MarkupWriter {
    fn html(&mut self, html: &str) {
        let mut last = 0;
        for caps in HTML_TAG_RE.captures_iter(html) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            self.html_text(&html[last..whole.start()]);
            last = whole.end();

            let closing = !caps[1].is_empty();
            if let Some(mark) = Mark::from_html(&caps[2]) {
                if closing {
                    self.pop_mark(mark);
                } else {
                    self.marks.push(mark);
                }
            }
        }
        self.html_text(&html[last..]);
    }

    fn html_text(&mut self, raw: &str) {
        if raw.is_empty() {
            return;
        }
        let style = self.style();
        self.push(decode_entities(raw), style);
    }

    fn pop_mark(&mut self, mark: Mark) {
        if let Some(pos) = self.marks.iter().rposition(|m| *m == mark) {
            self.marks.remove(pos);
        }
    }

    fn style(&self) -> Style {
        self.marks
            .iter()
            .fold(Style::default(), |style, mark| mark.apply(style))
    }

    fn push(&mut self, content: String, style: Style) {
        if content.is_empty() {
            return;
        }
        if let Some(last) = self.spans.last_mut() {
            if last.style == style {
                last.content.to_mut().push_str(&content);
                return;
            }
        }
        self.spans.push(Span::styled(content, style));
    }

    fn into_text(self) -> Text<'static> {
        Text::from(Line::from(self.spans))
    }
}

fn decode_entities(raw: &str) -> String {
    raw.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(text: &Text<'_>) -> String {
        text.lines
            .iter()
            .flat_map(|line| line.spans.iter())
            .map(|span| span.content.as_ref())
            .collect()
    }

    #[test]
    fn plain_text_passes_through() {
        let text = Renderer::new().render("just a short post");
        assert_eq!(plain(&text), "just a short post");
        assert_eq!(text.lines.len(), 1);
    }

    #[test]
    fn empty_input_renders_empty_line() {
        let text = Renderer::new().render("");
        assert_eq!(plain(&text), "");
    }

    #[test]
    fn html_bold_is_styled() {
        let text = Renderer::new().render("a <b>bold</b> move");
        assert_eq!(plain(&text), "a bold move");
        let bold = text.lines[0]
            .spans
            .iter()
            .find(|span| span.content == "bold")
            .expect("bold span");
        assert!(bold.style.add_modifier.contains(Modifier::BOLD));
    }

    #[test]
    fn markdown_lookalikes_keep_every_character() {
        let renderer = Renderer::new();
        for input in [
            "1. Buy milk",
            "# tag",
            "---",
            "- dash start",
            "> quoted",
            "a*b*c",
            "`code` and _under_",
        ] {
            assert_eq!(plain(&renderer.render(input)), input);
        }
    }

    #[test]
    fn nested_tags_stack_styles() {
        let text = Renderer::new().render("<i>soft <b>loud</b></i> done");
        assert_eq!(plain(&text), "soft loud done");
        let loud = text.lines[0]
            .spans
            .iter()
            .find(|span| span.content == "loud")
            .expect("loud span");
        assert!(loud.style.add_modifier.contains(Modifier::BOLD));
        assert!(loud.style.add_modifier.contains(Modifier::ITALIC));
    }

    #[test]
    fn unknown_tags_are_dropped_and_entities_decoded() {
        let text = Renderer::new().render("<span>fish &amp; chips</span>");
        assert_eq!(plain(&text), "fish & chips");
    }
}
