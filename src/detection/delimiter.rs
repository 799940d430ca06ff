//! Structural delimiter scan.
//!
//! Every non-alphanumeric character in the sample is a candidate. A candidate
//! wins by appearing the same number of times on most lines that contain it,
//! and on many lines overall. The winner is cross-checked with [`super::sniff`]
//! and, failing everything, a strict reader is asked how many columns it sees.

use super::DetectionStrategy;
use super::sniff;
use crate::config::DelimiterSettings;
use crate::error::{DetectionError, Result};
use encoding_rs::Encoding;
use std::path::Path;

/// Winning delimiter plus how it was reached.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DelimiterGuess {
    pub delimiter: char,
    /// Heuristic score of the winner. Zero for the reader fallback.
    pub score: f64,
    pub strategy: DetectionStrategy,
}

impl DelimiterGuess {
    /// Maps strategy and score onto an informal `[0, 1]` confidence.
    pub fn confidence(&self) -> f64 {
        let saturation = self.score / (self.score + 1.0);
        let value = match self.strategy {
            DetectionStrategy::UserOverride => 1.0,
            DetectionStrategy::Structural => 0.6 + 0.4 * saturation,
            DetectionStrategy::Heuristic => 0.4 + 0.3 * saturation,
            DetectionStrategy::ReaderFallback => 0.3,
        };
        value.clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Copy)]
struct CandidateScore {
    delimiter: char,
    mode: usize,
    consistency: f64,
    coverage: f64,
    score: f64,
}

/// Detects the field delimiter of a delimited text file.
///
/// # Errors
///
/// [`DetectionError::Empty`] when fewer than two non-blank lines are found and
/// [`DetectionError::NoConsistentPattern`] when no candidate qualifies.
pub fn detect_delimiter(
    path: &Path,
    encoding: &'static Encoding,
    settings: &DelimiterSettings,
    sample_size: usize,
) -> Result<DelimiterGuess> {
    let (bytes, truncated) = super::read_sample(path, sample_size)?;
    let (text, _, _) = encoding.decode(&bytes);

    let mut lines = sample_lines(&text);
    if truncated && lines.len() > 2 {
        // last line was cut by the sample boundary
        lines.pop();
    }
    if lines.len() < 2 {
        return Err(DetectionError::Empty {
            path: path.to_path_buf(),
        }
        .into());
    }

    detect_in_lines(&lines, &text, settings).ok_or_else(|| {
        DetectionError::NoConsistentPattern {
            path: path.to_path_buf(),
        }
        .into()
    })
}

/// Runs the scan over already decoded lines. `raw` is the decoded sample the
/// sniff reads from.
pub(crate) fn detect_in_lines(
    lines: &[&str],
    raw: &str,
    settings: &DelimiterSettings,
) -> Option<DelimiterGuess> {
    let candidates = candidate_chars(lines);
    let window = lines.get(..settings.sample_lines.min(lines.len()))?;

    let mut best: Option<CandidateScore> = None;
    for &candidate in &candidates {
        let Some(scored) = score_candidate(candidate, window, settings) else {
            continue;
        };
        tracing::trace!(
            "Candidate {:?}: mode {} consistency {:.2} coverage {:.2} score {:.2}",
            scored.delimiter,
            scored.mode,
            scored.consistency,
            scored.coverage,
            scored.score
        );
        if best.is_none_or(|b| scored.score > b.score) {
            best = Some(scored);
        }
    }

    if let Some(winner) = best {
        if sniff::confirms(raw, winner.delimiter, settings.sniff_sample_chars) {
            return Some(DelimiterGuess {
                delimiter: winner.delimiter,
                score: winner.score,
                strategy: DetectionStrategy::Structural,
            });
        }
        if winner.score > settings.confidence_threshold {
            tracing::debug!(
                "Sniff did not confirm {:?}, keeping it on score {:.2}",
                winner.delimiter,
                winner.score
            );
            return Some(DelimiterGuess {
                delimiter: winner.delimiter,
                score: winner.score,
                strategy: DetectionStrategy::Heuristic,
            });
        }
    }

    reader_fallback(lines, &candidates, settings).map(|delimiter| DelimiterGuess {
        delimiter,
        score: 0.0,
        strategy: DetectionStrategy::ReaderFallback,
    })
}

/// Non-blank lines with line endings removed. A leading BOM is dropped.
pub(crate) fn sample_lines(text: &str) -> Vec<&str> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    text.split('\n')
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.trim().is_empty())
        .collect()
}

fn is_candidate(c: char) -> bool {
    !c.is_alphanumeric()
        && !matches!(c, '"' | '\'' | '`' | '\n' | '\r')
        && (c == '\t' || !c.is_control())
}

/// Candidate characters in order of first appearance.
fn candidate_chars(lines: &[&str]) -> Vec<char> {
    let mut seen = Vec::new();
    for c in lines.iter().flat_map(|line| line.chars()) {
        if is_candidate(c) && !seen.contains(&c) {
            seen.push(c);
        }
    }
    seen
}

/// Most frequent value; ties go to the value seen first.
fn modal_count(counts: &[usize]) -> Option<(usize, usize)> {
    let mut tally: Vec<(usize, usize)> = Vec::new();
    for &count in counts {
        match tally.iter_mut().find(|(value, _)| *value == count) {
            Some((_, freq)) => *freq += 1,
            None => tally.push((count, 1)),
        }
    }

    let mut best: Option<(usize, usize)> = None;
    for entry in tally {
        if best.is_none_or(|(_, freq)| entry.1 > freq) {
            best = Some(entry);
        }
    }
    best
}

fn score_candidate(
    candidate: char,
    lines: &[&str],
    settings: &DelimiterSettings,
) -> Option<CandidateScore> {
    let counts: Vec<usize> = lines
        .iter()
        .map(|line| line.matches(candidate).count())
        .filter(|&n| n > 0)
        .collect();
    if counts.len() < 2 {
        return None;
    }

    let (mode, at_mode) = modal_count(&counts)?;
    let consistency = at_mode as f64 / counts.len() as f64;
    let coverage = counts.len() as f64 / lines.len() as f64;
    if mode == 0 || consistency < settings.min_consistency {
        return None;
    }

    let mut score = consistency * mode as f64 * coverage;
    let mut buf = [0_u8; 4];
    let as_str: &str = candidate.encode_utf8(&mut buf);
    if settings.canonical_delimiters.iter().any(|d| d == as_str) {
        score *= settings.canonical_weight;
    }

    Some(CandidateScore {
        delimiter: candidate,
        mode,
        consistency,
        coverage,
        score,
    })
}

/// Strict parse of the first rows with each common delimiter. The first
/// delimiter that yields a uniform width above one sets the column count, and
/// the candidate occurring `columns - 1` times on the first line is returned.
fn reader_fallback(lines: &[&str], candidates: &[char], settings: &DelimiterSettings) -> Option<char> {
    let rows: Vec<&str> = lines.iter().take(settings.fallback_rows).copied().collect();
    let first = rows.first()?;
    let block = rows.join("\n");

    for delimiter in &settings.common_delimiters {
        let &[byte] = delimiter.as_bytes() else {
            continue;
        };
        let Some(columns) = uniform_width(&block, byte).filter(|&width| width > 1) else {
            continue;
        };

        tracing::debug!("Reader fallback sees {columns} columns with {delimiter:?}");
        return candidates
            .iter()
            .copied()
            .find(|&c| first.matches(c).count() == columns - 1);
    }
    None
}

fn uniform_width(block: &str, delimiter: u8) -> Option<usize> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(false)
        .delimiter(delimiter)
        .from_reader(block.as_bytes());

    let mut width = None;
    for record in reader.records() {
        let record = record.ok()?;
        match width {
            None => width = Some(record.len()),
            Some(w) if w != record.len() => return None,
            Some(_) => {}
        }
    }
    width
}
