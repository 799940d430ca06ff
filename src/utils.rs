use std::path::{Path, PathBuf};

const SIZE_UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// Formats a byte count for humans, e.g. `1536` -> `"1.50 KB"`.
pub fn format_file_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 B".to_owned();
    }

    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }

    format!("{size:.2} {}", SIZE_UNITS.get(unit).unwrap_or(&"B"))
}

/// Cuts `text` to at most `max_chars` characters, marking the cut with `...`.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return text.to_owned();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{cut}...")
}

/// Shortens long paths for display, keeping the first two and last two components.
pub fn truncate_path(path: &Path) -> String {
    let parts: Vec<_> = path.components().collect();
    if parts.len() <= 4 {
        return path.display().to_string();
    }

    let mut short = PathBuf::new();
    for part in parts.iter().take(2) {
        short.push(part);
    }
    short.push("...");
    for part in parts.iter().skip(parts.len() - 2) {
        short.push(part);
    }
    short.display().to_string()
}

/// Converts a gigabyte figure from configuration into bytes.
pub fn gb_to_bytes(gb: f64) -> u64 {
    (gb * 1024.0 * 1024.0 * 1024.0).max(0.0) as u64
}

/// Converts a megabyte figure from configuration into bytes.
pub fn mb_to_bytes(mb: u64) -> u64 {
    mb.saturating_mul(1024 * 1024)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(0), "0 B");
        assert_eq!(format_file_size(512), "512.00 B");
        assert_eq!(format_file_size(1536), "1.50 KB");
        assert_eq!(format_file_size(3 * 1024 * 1024), "3.00 MB");
    }

    #[test]
    fn test_excerpt() {
        assert_eq!(excerpt("short", 60), "short");
        let long = "x".repeat(80);
        let cut = excerpt(&long, 60);
        assert_eq!(cut.chars().count(), 63);
        assert!(cut.ends_with("..."));
    }

    #[test]
    fn test_truncate_path() {
        let short = Path::new("data/file.csv");
        assert_eq!(truncate_path(short), "data/file.csv");

        let long = Path::new("/home/user/projects/data/2024/file.csv");
        let shown = truncate_path(long);
        assert!(shown.contains("..."));
        assert!(shown.ends_with("2024/file.csv"));
    }

    #[test]
    fn test_unit_conversions() {
        assert_eq!(mb_to_bytes(1), 1_048_576);
        assert_eq!(gb_to_bytes(1.0), 1_073_741_824);
        assert_eq!(gb_to_bytes(-1.0), 0);
    }
}
