use std::sync::LazyLock;

use regex::Regex;

static ILLEGAL_FILENAME_CHARS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"[/\\*?"<>|:]"#).unwrap_or_else(|e| panic!("invalid filename pattern: {e}"))
});

/// Replace characters that are illegal in file names with `_`.
///
/// The title is trimmed first; nothing else is touched.
pub fn sanitize_title(title: &str) -> String {
    ILLEGAL_FILENAME_CHARS
        .replace_all(title.trim(), "_")
        .into_owned()
}

/// Human readable byte count for the summary lines
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.2} {}", size, UNITS[unit])
    }
}
