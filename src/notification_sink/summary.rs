//! End-of-run keyword summary
//!
//! Flags records whose analysis mentions misconduct keywords and builds
//! one summary message listing them.

use super::format::escape_html;
use crate::models::AnalysisRecord;
use chrono::{DateTime, Local};

/// Keywords that mark a record as suspicious (matched case-insensitively)
pub const SUSPICIOUS_KEYWORDS: [&str; 7] = [
    "suspicious",
    "looking",
    "phone",
    "talking",
    "communication",
    "device",
    "cheating",
];

/// Whether the analysis text mentions any keyword
pub fn is_suspicious(record: &AnalysisRecord) -> bool {
    if !record.status().is_ok() {
        return false;
    }
    let text = record.analysis().to_lowercase();
    SUSPICIOUS_KEYWORDS.iter().any(|k| text.contains(k))
}

/// Build the summary message for a finished run
pub fn build_summary(records: &[AnalysisRecord], completed_at: DateTime<Local>) -> String {
    let mut lines = vec!["📊 <b>Surveillance Analysis Summary</b>\n".to_string()];

    let flagged: Vec<&AnalysisRecord> = records.iter().filter(|r| is_suspicious(r)).collect();

    if flagged.is_empty() {
        lines.push("✅ No suspicious activities detected in this session.\n".to_string());
    } else {
        lines.push("<b>🚨 Suspicious Activities Detected:</b>\n".to_string());
        for record in flagged {
            lines.push(format!(
                "⚠️ At {}:\n{}\n",
                record.timestamp(),
                escape_html(record.analysis())
            ));
        }
    }

    let errors = records.iter().filter(|r| !r.status().is_ok()).count();
    if errors > 0 {
        lines.push(format!("{} of {} frame(s) could not be analyzed.", errors, records.len()));
    }

    lines.push(format!(
        "\n📅 Analysis completed at: {}",
        completed_at.format("%Y-%m-%d %H:%M:%S")
    ));

    lines.join("\n")
}
