use crate::config::EncodingSettings;
use crate::error::{DetectionError, Result};
use chardetng::EncodingDetector;
use encoding_rs::{DecoderResult, Encoding, UTF_8};
use std::path::Path;

/// Maps a configured label to an `encoding_rs` encoding.
///
/// Accepts WHATWG labels (`latin1`, `cp1252`, `utf-8`, ...). A `-sig` suffix
/// names the BOM-prefixed form of the same encoding.
pub fn resolve_encoding(label: &str) -> Option<&'static Encoding> {
    let label = label.trim();
    let base = label
        .strip_suffix("-sig")
        .or_else(|| label.strip_suffix("_sig"))
        .unwrap_or(label);
    Encoding::for_label(base.as_bytes())
}

/// True if `bytes` decode under `encoding` without malformed sequences.
///
/// With `complete == false` a multi-byte sequence cut off at the end of the
/// buffer is not treated as malformed.
pub fn decodes_cleanly(encoding: &'static Encoding, bytes: &[u8], complete: bool) -> bool {
    let mut decoder = encoding.new_decoder_without_bom_handling();
    let Some(capacity) = decoder.max_utf8_buffer_length_without_replacement(bytes.len()) else {
        return false;
    };
    let mut out = String::with_capacity(capacity);
    let (result, _) = decoder.decode_to_string_without_replacement(bytes, &mut out, complete);
    matches!(result, DecoderResult::InputEmpty)
}

/// Detects the text encoding from a prefix of the file.
///
/// Order: ASCII shortcut, byte-order mark, statistical guesser, then the
/// configured fallback chain. Pure ASCII (and an empty file) is reported as UTF-8.
///
/// # Errors
///
/// [`DetectionError::Io`] if the sample cannot be read and
/// [`DetectionError::Encoding`] if nothing decodes it.
pub fn detect_encoding(
    path: &Path,
    settings: &EncodingSettings,
    sample_size: usize,
) -> Result<&'static Encoding> {
    let (sample, truncated) = super::read_sample(path, sample_size)?;
    let complete = !truncated;

    if sample.is_ascii() {
        return Ok(UTF_8);
    }

    if let Some((encoding, _)) = Encoding::for_bom(&sample) {
        tracing::debug!("Byte-order mark selects {}", encoding.name());
        return Ok(encoding);
    }

    if settings.use_statistical_guesser {
        let mut detector = EncodingDetector::new();
        detector.feed(&sample, complete);
        let guess = detector.guess(None, true);
        if decodes_cleanly(guess, &sample, complete) {
            tracing::debug!("Encoding guesser selected {}", guess.name());
            return Ok(guess);
        }
        tracing::debug!(
            "Encoding guess {} does not decode the sample, trying fallbacks",
            guess.name()
        );
    }

    for label in &settings.fallback_encodings {
        let Some(encoding) = resolve_encoding(label) else {
            tracing::warn!("Ignoring unknown fallback encoding {label:?}");
            continue;
        };
        if decodes_cleanly(encoding, &sample, complete) {
            tracing::debug!("Fallback encoding {label} decodes the sample");
            return Ok(encoding);
        }
    }

    Err(DetectionError::Encoding {
        path: path.to_path_buf(),
    }
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use encoding_rs::WINDOWS_1252;

    fn write_tmp(bytes: &[u8]) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("sample.csv");
        std::fs::write(&path, bytes).expect("Failed to write sample");
        (dir, path)
    }

    #[test]
    fn test_resolve_labels() {
        assert_eq!(resolve_encoding("utf-8"), Some(UTF_8));
        assert_eq!(resolve_encoding("utf-8-sig"), Some(UTF_8));
        assert_eq!(resolve_encoding("latin1"), Some(WINDOWS_1252));
        assert_eq!(resolve_encoding("cp1252"), Some(WINDOWS_1252));
        assert_eq!(resolve_encoding("klingon"), None);
    }

    #[test]
    fn test_ascii_and_empty_are_utf8() -> Result<()> {
        let settings = EncodingSettings::default();
        let (_dir, path) = write_tmp(b"a,b\n1,2\n");
        assert_eq!(detect_encoding(&path, &settings, 8192)?, UTF_8);

        let (_dir, path) = write_tmp(b"");
        assert_eq!(detect_encoding(&path, &settings, 8192)?, UTF_8);
        Ok(())
    }

    #[test]
    fn test_non_ascii_round_trip() -> Result<()> {
        let text = "name;city\nJosé;São Paulo\nZoë;Köln\nÅsa;Malmö\n";
        let (bytes, _, _) = WINDOWS_1252.encode(text);
        let (_dir, path) = write_tmp(&bytes);

        let encoding = detect_encoding(&path, &EncodingSettings::default(), 8192)?;
        assert!(
            decodes_cleanly(encoding, &bytes, true),
            "{} must decode the original bytes",
            encoding.name()
        );
        Ok(())
    }

    #[test]
    fn test_utf8_sample_cut_mid_character() -> Result<()> {
        let text = "é".repeat(10);
        let (_dir, path) = write_tmp(text.as_bytes());

        // 5 bytes ends half way through the third character
        let encoding = detect_encoding(&path, &EncodingSettings::default(), 5)?;
        assert!(decodes_cleanly(encoding, text.as_bytes(), true), "whole file decodes");
        Ok(())
    }

    #[test]
    fn test_fallback_chain_without_guesser() -> Result<()> {
        let settings = EncodingSettings {
            use_statistical_guesser: false,
            ..EncodingSettings::default()
        };
        let (_dir, path) = write_tmp(b"caf\xe9,price\ncr\xe8me,3\n");
        assert_eq!(detect_encoding(&path, &settings, 8192)?, WINDOWS_1252);
        Ok(())
    }

    #[test]
    fn test_bom_wins() -> Result<()> {
        let (_dir, path) = write_tmp(b"\xef\xbb\xbfa,b\n1,2\n");
        assert_eq!(
            detect_encoding(&path, &EncodingSettings::default(), 8192)?,
            UTF_8
        );
        Ok(())
    }
}
