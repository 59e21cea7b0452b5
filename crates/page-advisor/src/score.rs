use crossterm::style::{style, Stylize};

/// Category lines printed after an audit, in display order.
pub const CATEGORY_LINES: &[(&str, &str)] = &[
    ("performance", "Lighthouse performance score:"),
    ("accessibility", "Lighthouse accessibility score:"),
    ("best-practices", "Lighthouse best-practice score:"),
    ("seo", "Lighthouse seo score:"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Bad,
    Warn,
    Good,
}

impl Severity {
    /// Classify a 0–100 score.
    pub fn of(score: f64) -> Self {
        if score < 50.0 {
            Severity::Bad
        } else if score < 90.0 {
            Severity::Warn
        } else {
            Severity::Good
        }
    }
}

/// Convert a [0, 1] fraction to a whole 0–100 score.
pub fn to_percent(fraction: f64) -> f64 {
    (fraction * 100.0).round()
}

/// Bold score colored red, yellow or green by severity.
pub fn render_score(score: f64) -> String {
    let text = style(format!("{score:.0}")).bold();
    match Severity::of(score) {
        Severity::Bad => text.red().to_string(),
        Severity::Warn => text.yellow().to_string(),
        Severity::Good => text.green().to_string(),
    }
}

/// `"<label> <score>"` for a category, or `"<label> n/a"` when it has no score.
pub fn category_line(label: &str, fraction: Option<f64>) -> String {
    match fraction {
        Some(f) => format!("{label} {}", render_score(to_percent(f))),
        None => format!("{label} {}", style("n/a").dim()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_boundaries() {
        assert_eq!(Severity::of(0.0), Severity::Bad);
        assert_eq!(Severity::of(49.0), Severity::Bad);
        assert_eq!(Severity::of(49.9), Severity::Bad);
        assert_eq!(Severity::of(50.0), Severity::Warn);
        assert_eq!(Severity::of(89.0), Severity::Warn);
        assert_eq!(Severity::of(90.0), Severity::Good);
        assert_eq!(Severity::of(100.0), Severity::Good);
    }

    #[test]
    fn render_uses_severity_color() {
        assert_eq!(render_score(42.0), style("42").bold().red().to_string());
        assert_eq!(render_score(50.0), style("50").bold().yellow().to_string());
        assert_eq!(render_score(90.0), style("90").bold().green().to_string());
    }

    #[test]
    fn percent_rounds() {
        assert_eq!(to_percent(0.42), 42.0);
        assert_eq!(to_percent(0.886), 89.0);
        assert_eq!(to_percent(1.0), 100.0);
    }

    #[test]
    fn category_line_without_score() {
        let line = category_line("Lighthouse seo score:", None);
        assert!(line.starts_with("Lighthouse seo score: "));
        assert!(line.contains("n/a"));
    }
}
