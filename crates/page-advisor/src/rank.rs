use crate::model::{AuditReport, AuditResult};
use crate::score::{render_score, to_percent};

/// Number of issues offered for investigation.
pub const MAX_RANKED_ISSUES: usize = 5;

/// An audit below the perfect score, ranked worst first.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedIssue {
    pub id: String,
    pub title: String,
    pub score: f64,
    pub description: String,
}

impl RankedIssue {
    /// Chooser label: `"<id> - <colored 0-100 score>"`.
    pub fn label(&self) -> String {
        format!("{} - {}", self.id, render_score(to_percent(self.score)))
    }
}

/// Pick the worst-scoring audits of a report.
pub fn rank_issues(report: &AuditReport) -> Vec<RankedIssue> {
    rank_audits(&report.audits, MAX_RANKED_ISSUES)
}

/// Drop audits without a score or with a perfect one, sort ascending by score and keep at
/// most `limit`. The sort is stable, so equal scores keep report order.
pub fn rank_audits(audits: &[AuditResult], limit: usize) -> Vec<RankedIssue> {
    let mut issues: Vec<RankedIssue> = audits
        .iter()
        .filter_map(|audit| {
            let score = audit.score.filter(|s| *s < 1.0)?;
            Some(RankedIssue {
                id: audit.id.clone(),
                title: audit.title.clone(),
                score,
                description: audit.description.clone(),
            })
        })
        .collect();

    issues.sort_by(|a, b| a.score.total_cmp(&b.score));
    issues.truncate(limit);
    issues
}
