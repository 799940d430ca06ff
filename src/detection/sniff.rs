//! Dialect sniff restricted to a single character.
//!
//! Independent of the structural scan: it counts the character on every line
//! of a short prefix, including lines where it is absent, takes the most
//! common count and subtracts the support of every competing count. The
//! character is confirmed when that adjusted support covers nearly all lines.

/// Share of lines the adjusted support must reach.
const SNIFF_THRESHOLD: f64 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SniffOutcome {
    /// Most common per-line count
    pub mode: usize,
    /// Lines at the mode minus lines at any other count
    pub adjusted_support: i64,
    pub lines: usize,
}

impl SniffOutcome {
    pub fn ratio(&self) -> f64 {
        if self.lines == 0 {
            return 0.0;
        }
        self.adjusted_support as f64 / self.lines as f64
    }

    pub fn is_confirmed(&self) -> bool {
        self.mode > 0 && self.adjusted_support > 0 && self.ratio() >= SNIFF_THRESHOLD
    }
}

/// Measures `delimiter` over the first `max_chars` characters of `text`.
///
/// Returns `None` if the prefix has no non-blank lines or the character never occurs.
pub fn sniff(text: &str, delimiter: char, max_chars: usize) -> Option<SniffOutcome> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let window: String = text.chars().take(max_chars).collect();
    let cut = window.len() < text.len();

    let mut lines: Vec<&str> = window
        .split('\n')
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.trim().is_empty())
        .collect();
    if cut && lines.len() > 1 {
        lines.pop();
    }
    if lines.is_empty() {
        return None;
    }

    let mut frequencies: Vec<(usize, i64)> = Vec::new();
    for line in &lines {
        let count = line.matches(delimiter).count();
        match frequencies.iter_mut().find(|(value, _)| *value == count) {
            Some((_, support)) => *support += 1,
            None => frequencies.push((count, 1)),
        }
    }

    if let [(0, _)] = frequencies.as_slice() {
        return None;
    }

    let mut mode = (0, 0);
    for &entry in &frequencies {
        if entry.1 > mode.1 {
            mode = entry;
        }
    }
    let others: i64 = frequencies
        .iter()
        .filter(|(value, _)| *value != mode.0)
        .map(|(_, support)| support)
        .sum();

    Some(SniffOutcome {
        mode: mode.0,
        adjusted_support: mode.1 - others,
        lines: lines.len(),
    })
}

/// True if the sniff confirms `delimiter` as the field separator.
pub fn confirms(text: &str, delimiter: char, max_chars: usize) -> bool {
    sniff(text, delimiter, max_chars).is_some_and(|outcome| outcome.is_confirmed())
}
