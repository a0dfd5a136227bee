//! Syntax highlighting for fenced code blocks using syntect.

use std::sync::OnceLock;

use syntect::easy::HighlightLines;
use syntect::highlighting::{FontStyle, Style, Theme, ThemeSet};
use syntect::parsing::{SyntaxReference, SyntaxSet};
use syntect::util::LinesWithEndings;
use tracing::debug;

use super::{HighlightedSpan, Rgb};

const THEME: &str = "base16-ocean.dark";

struct SyntaxHighlighter {
    syntax_set: SyntaxSet,
    theme: Option<Theme>,
}

impl SyntaxHighlighter {
    fn new() -> Self {
        let syntax_set = SyntaxSet::load_defaults_newlines();
        let mut theme_set = ThemeSet::load_defaults();
        let theme = theme_set.themes.remove(THEME).or_else(|| {
            theme_set
                .themes
                .into_iter()
                .next()
                .map(|(_, theme)| theme)
        });

        Self { syntax_set, theme }
    }

    fn get_syntax(&self, language: &str) -> Option<&SyntaxReference> {
        let lang_lower = language.to_lowercase();
        let lang = match lang_lower.as_str() {
            "js" | "jsx" => "javascript",
            "ts" | "tsx" => "typescript",
            "py" => "python",
            "rb" => "ruby",
            "rs" => "rust",
            "sh" | "zsh" | "shell" | "console" => "bash",
            "yml" => "yaml",
            "md" => "markdown",
            "c++" => "cpp",
            _ => lang_lower.as_str(),
        };

        self.syntax_set
            .find_syntax_by_token(lang)
            .or_else(|| self.syntax_set.find_syntax_by_extension(lang))
    }

    fn highlight(&self, code: &str, language: &str) -> Option<Vec<Vec<HighlightedSpan>>> {
        let syntax = self.get_syntax(language)?;
        let theme = self.theme.as_ref()?;
        let mut highlighter = HighlightLines::new(syntax, theme);

        let mut lines = Vec::new();
        for line in LinesWithEndings::from(code) {
            let ranges = match highlighter.highlight_line(line, &self.syntax_set) {
                Ok(ranges) => ranges,
                Err(e) => {
                    debug!(language, error = %e, "highlighting failed, using plain text");
                    return None;
                }
            };
            lines.push(
                ranges
                    .into_iter()
                    .filter_map(|(style, text)| to_span(style, text))
                    .collect(),
            );
        }

        // A trailing newline (or empty code) still shows one line.
        if code.is_empty() || code.ends_with('\n') {
            lines.push(Vec::new());
        }
        Some(lines)
    }
}

fn highlighter() -> &'static SyntaxHighlighter {
    static HIGHLIGHTER: OnceLock<SyntaxHighlighter> = OnceLock::new();
    HIGHLIGHTER.get_or_init(SyntaxHighlighter::new)
}

fn to_span(style: Style, text: &str) -> Option<HighlightedSpan> {
    let text = text.trim_end_matches(['\n', '\r']);
    if text.is_empty() {
        return None;
    }
    let fg = style.foreground;
    Some(HighlightedSpan {
        text: text.to_string(),
        color: Some(Rgb(fg.r, fg.g, fg.b)),
        bold: style.font_style.contains(FontStyle::BOLD),
        italic: style.font_style.contains(FontStyle::ITALIC),
    })
}

fn plain_lines(code: &str) -> Vec<Vec<HighlightedSpan>> {
    code.split('\n')
        .map(|line| {
            if line.is_empty() {
                Vec::new()
            } else {
                vec![HighlightedSpan {
                    text: line.to_string(),
                    color: None,
                    bold: false,
                    italic: false,
                }]
            }
        })
        .collect()
}

/// Split `code` into lines of highlighted spans.
///
/// Unknown or missing languages fall back to uncolored text. The result
/// depends only on the arguments, so it is safe to recompute on every
/// streamed fragment.
pub fn highlight_code(code: &str, language: Option<&str>) -> Vec<Vec<HighlightedSpan>> {
    language
        .and_then(|lang| highlighter().highlight(code, lang))
        .unwrap_or_else(|| plain_lines(code))
}
