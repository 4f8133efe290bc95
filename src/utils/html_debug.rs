// src/utils/html_debug.rs
use crate::discovery::links::{ANNUAL_PATTERN, EXCLUDE_PATTERN, NAVIGATION_PATTERN};
use crate::utils::error::{AppError, ConfigError};
use regex::Regex;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

/// Writes an HTML page with highlighted spans to a file
pub fn save_debug_html(html: &str, path: &Path, highlights: &[(usize, usize, &str)]) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = File::create(path)?;

    let mut debug_html = String::from("<!DOCTYPE html>\n<html>\n<head>\n<style>\n");
    debug_html.push_str(".highlight-report { background-color: #90EE90; }\n");
    debug_html.push_str(".highlight-excluded { background-color: #FFA500; }\n");
    debug_html.push_str(".highlight-navigation { background-color: #ADD8E6; }\n");
    debug_html.push_str(".highlight-custom { background-color: #FFC0CB; }\n");
    debug_html.push_str("</style>\n</head>\n<body>\n");

    // Overlapping matches are dropped; the earliest one wins
    let mut sorted_highlights = highlights.to_vec();
    sorted_highlights.sort_by_key(|h| (h.0, std::cmp::Reverse(h.1)));

    let mut last_pos = 0;
    for (start, end, highlight_type) in sorted_highlights {
        if start < last_pos || end > html.len() || !html.is_char_boundary(start) || !html.is_char_boundary(end) {
            continue;
        }
        debug_html.push_str(&escape(&html[last_pos..start]));

        let css_class = match highlight_type {
            "report" => "highlight-report",
            "excluded" => "highlight-excluded",
            "navigation" => "highlight-navigation",
            _ => "highlight-custom",
        };
        debug_html.push_str(&format!(
            "<span class=\"{}\" title=\"Position: {}-{}, Type: {}\">",
            css_class, start, end, highlight_type
        ));
        debug_html.push_str(&escape(&html[start..end]));
        debug_html.push_str("</span>");

        last_pos = end;
    }
    debug_html.push_str(&escape(&html[last_pos..]));
    debug_html.push_str("\n</body>\n</html>");

    file.write_all(debug_html.as_bytes())?;

    tracing::info!("Saved debug HTML to {}", path.display());
    Ok(())
}

/// Shows page source as text so the highlights line up with the raw markup.
fn escape(text: &str) -> String {
    let escaped = text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;");
    format!("<pre style=\"display:inline;white-space:pre-wrap\">{}</pre>", escaped)
}

/// Highlights every match of the given `(regex, type)` patterns
pub fn create_debug_html(html: &str, path: &Path, patterns: &[(&str, &str)]) -> Result<(), AppError> {
    let mut highlights = Vec::new();

    for (pattern, highlight_type) in patterns {
        let re = Regex::new(pattern).map_err(|e| {
            ConfigError::Invalid(format!("Invalid regex pattern '{}': {}", pattern, e))
        })?;

        for mat in re.find_iter(html) {
            highlights.push((mat.start(), mat.end(), *highlight_type));
        }
    }

    save_debug_html(html, path, &highlights)
}

/// Saves a crawled page with report, excluded and navigation matches marked.
pub fn save_link_snapshot(html: &str, path: &Path) -> Result<(), AppError> {
    let patterns = [
        (EXCLUDE_PATTERN, "excluded"),
        (ANNUAL_PATTERN, "report"),
        (NAVIGATION_PATTERN, "navigation"),
    ];
    create_debug_html(html, path, &patterns)
}

/// File name for a page snapshot, derived from its URL.
pub fn snapshot_file_name(url: &str) -> String {
    let stripped = url
        .trim_start_matches("https://")
        .trim_start_matches("http://");
    let mut name: String = stripped
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect();
    name.truncate(120);
    format!("{}.html", name.trim_end_matches('_'))
}
