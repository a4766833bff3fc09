//! Message formatting
//!
//! Messages use Telegram's HTML parse mode. Analysis text comes from a
//! remote model and is escaped before it is embedded.

use crate::models::AnalysisRecord;

/// Telegram's per-message text limit (characters)
pub const MAX_MESSAGE_CHARS: usize = 4096;

/// Escape text for HTML parse mode
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Live notification for one record
pub fn format_record(record: &AnalysisRecord) -> String {
    let status = if record.status().is_ok() { "OK" } else { "ERROR" };
    format!(
        "🔍 <b>Surveillance Analysis</b>\n\n\
         ⏱️ <b>Timestamp:</b> {}\n\
         <b>Status:</b> {}\n\n\
         📝 <b>Analysis:</b>\n{}",
        record.timestamp(),
        status,
        escape_html(record.analysis())
    )
}

/// Batch notification for one record of an offline scan
pub fn format_batch_entry(record: &AnalysisRecord) -> String {
    let status = if record.status().is_ok() { "OK" } else { "ERROR" };
    format!(
        "<b>Frame Analysis</b>\n\
         <b>Timestamp:</b> {}\n\
         <b>Status:</b> {}\n\
         <b>Analysis:</b>\n{}",
        record.timestamp(),
        status,
        escape_html(record.analysis())
    )
}

/// Caption for the frame photo
pub fn photo_caption(record: &AnalysisRecord) -> String {
    format!("Surveillance image captured at {}", record.timestamp())
}

/// Split text into chunks of at most `limit` characters
///
/// Breaks at line boundaries where possible. A line longer than the limit
/// is cut at a character boundary, never inside an HTML entity.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(16);
    if text.chars().count() <= limit {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.split_inclusive('\n') {
        let line_len = line.chars().count();

        if current_len + line_len <= limit {
            current.push_str(line);
            current_len += line_len;
            continue;
        }

        if !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }

        let mut rest = line;
        while rest.chars().count() > limit {
            let cut = entity_safe_cut(rest, limit);
            chunks.push(rest[..cut].to_string());
            rest = &rest[cut..];
        }
        current.push_str(rest);
        current_len = rest.chars().count();
    }

    if !current.trim().is_empty() {
        chunks.push(current);
    }

    chunks
        .into_iter()
        .map(|c| c.trim_end_matches('\n').to_string())
        .filter(|c| !c.is_empty())
        .collect()
}

/// Byte index of a cut at most `limit` characters in, moved back before
/// an unterminated `&...;` entity
fn entity_safe_cut(s: &str, limit: usize) -> usize {
    let mut cut = s
        .char_indices()
        .nth(limit)
        .map(|(i, _)| i)
        .unwrap_or(s.len());

    let head = &s[..cut];
    if let Some(amp) = head.rfind('&') {
        if !head[amp..].contains(';') && cut - amp <= 8 && amp > 0 {
            cut = amp;
        }
    }
    cut
}
