use crossterm::style::{style, Stylize};
use regex::{Captures, Regex};
use termimad::{FmtText, MadSkin};

fn style_heading(level: usize, text: &str) -> String {
    match level {
        1..=3 => style(text).bold().to_string(),
        4 => style(text).dim().to_string(),
        5 => style(text).italic().to_string(),
        _ => style(text).italic().dim().to_string(),
    }
}

/// Style heading text per level, keeping the `#` marker.
///
/// Levels 1-3 are bold, 4 dim, 5 italic and 6 italic dim. Every other line is left
/// byte-for-byte as it was.
pub fn format_markdown_headers(markdown: &str) -> String {
    let mut out = markdown.to_string();
    for level in 1..=6 {
        let pattern = format!(r"(?m)^({} )([^\r\n]*)", "#".repeat(level));
        let re = Regex::new(&pattern).expect("valid regex");
        out = re
            .replace_all(&out, |caps: &Captures| {
                format!("{} {}", caps[1].trim(), style_heading(level, &caps[2]))
            })
            .into_owned();
    }
    out
}

/// Pretty-print markdown for a terminal of `width` columns (terminal width when `None`).
pub fn render_markdown(markdown: &str, width: Option<usize>) -> String {
    let skin = MadSkin::default();
    FmtText::from(&skin, markdown, width).to_string()
}

/// Header restyling followed by full terminal rendering.
pub fn render_recommendations(markdown: &str, width: Option<usize>) -> String {
    render_markdown(&format_markdown_headers(markdown), width)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heading_marker_is_preserved() {
        assert_eq!(
            format_markdown_headers("### Title"),
            format!("### {}", style("Title").bold())
        );
        assert_eq!(
            format_markdown_headers("#### Sub"),
            format!("#### {}", style("Sub").dim())
        );
        assert_eq!(
            format_markdown_headers("###### Tiny"),
            format!("###### {}", style("Tiny").italic().dim())
        );
    }

    #[test]
    fn each_level_matches_only_itself() {
        let styled = format_markdown_headers("# One\n## Two\n##### Five");
        let lines: Vec<&str> = styled.lines().collect();
        assert_eq!(lines[0], format!("# {}", style("One").bold()));
        assert_eq!(lines[1], format!("## {}", style("Two").bold()));
        assert_eq!(lines[2], format!("##### {}", style("Five").italic()));
    }

    #[test]
    fn non_heading_lines_are_untouched() {
        let md = "Intro text\n\n- item with # hash\n    # indented code\n#NoSpace\n```\ncode\n```\n";
        assert_eq!(format_markdown_headers(md), md);
    }

    #[test]
    fn crlf_line_endings_stay_outside_the_style() {
        let styled = format_markdown_headers("### Title\r\nnext\r\n");
        assert_eq!(styled, format!("### {}\r\nnext\r\n", style("Title").bold()));
    }

    #[test]
    fn mixed_document_only_changes_headings() {
        let md = "## Fix\nUse `loading=\"lazy\"`.\n";
        let styled = format_markdown_headers(md);
        assert!(styled.starts_with(&format!("## {}", style("Fix").bold())));
        assert!(styled.ends_with("\nUse `loading=\"lazy\"`.\n"));
    }

    #[test]
    fn rendered_output_keeps_text() {
        let rendered = render_recommendations("## Solution 1\n\nCompress **images**.\n", Some(80));
        assert!(rendered.contains("Solution"));
        assert!(rendered.contains("images"));
    }
}
