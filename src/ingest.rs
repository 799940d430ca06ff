//! Bounded ingestion of delimited files into a polars [`DataFrame`].
//!
//! Small files are read in one pass by the polars CSV reader. Anything at or
//! above `small_file_threshold_mb` is streamed in row batches; process memory
//! is sampled after each batch and the load is abandoned as soon as it crosses
//! the ceiling. A load either returns the whole table or an error, never a
//! partial table.
//!
//! Both readers produce the same frame: every column is text, repeated
//! header names get a `_duplicated_<n>` suffix, and empty or missing fields
//! are null.
//!
//! The ceiling is best effort: memory is only checked after a full batch has
//! been buffered, so a single oversized batch can overshoot it.

pub mod decode;
pub mod memory;

pub use decode::DecodingReader;
pub use memory::{FixedMemory, MemoryProbe, ProcessMemory};

use crate::config::PerformanceSettings;
use crate::detection::resolve_encoding;
use crate::error::{IngestionError, Result};
use crate::pipeline::AnalysisRequest;
use encoding_rs::Encoding;
use polars::prelude::*;
use serde::Serialize;
use std::io::Cursor;
use std::path::Path;
use std::time::Instant;

/// Which reader produced the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStrategy {
    Direct,
    Chunked,
}

#[derive(Debug, Clone)]
pub struct IngestedTable {
    pub frame: DataFrame,
    pub rows: usize,
    pub columns: usize,
    /// Batches appended. Always 1 for a direct read.
    pub chunks: usize,
    pub strategy: IngestStrategy,
}

/// Memory-aware loader.
pub struct BoundedIngestor {
    small_file_threshold: u64,
    probe: Box<dyn MemoryProbe>,
}

impl std::fmt::Debug for BoundedIngestor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedIngestor")
            .field("small_file_threshold", &self.small_file_threshold)
            .finish_non_exhaustive()
    }
}

impl BoundedIngestor {
    pub fn new(settings: &PerformanceSettings) -> Self {
        Self {
            small_file_threshold: crate::utils::mb_to_bytes(settings.small_file_threshold_mb),
            probe: Box::new(ProcessMemory),
        }
    }

    /// Replaces the memory probe.
    #[must_use]
    pub fn with_probe(mut self, probe: impl MemoryProbe + 'static) -> Self {
        self.probe = Box::new(probe);
        self
    }

    /// Overrides the direct-read threshold in bytes.
    #[must_use]
    pub fn with_small_file_threshold(mut self, bytes: u64) -> Self {
        self.small_file_threshold = bytes;
        self
    }

    /// Loads the request's source with its dialect and limits.
    ///
    /// # Errors
    ///
    /// See [`BoundedIngestor::load_path`].
    pub fn load(&self, request: &AnalysisRequest) -> Result<IngestedTable> {
        self.load_path(
            request.source(),
            request.delimiter(),
            request.encoding(),
            request.chunk_size(),
            request.memory_ceiling(),
        )
    }

    /// Loads `path` in full.
    ///
    /// # Errors
    ///
    /// Returns [`IngestionError`] (wrapped) when the file is missing, the
    /// delimiter is not a single byte, the encoding is unknown, parsing fails,
    /// memory crosses `memory_ceiling`, or no rows were read.
    pub fn load_path(
        &self,
        path: &Path,
        delimiter: &str,
        encoding: &str,
        chunk_size: usize,
        memory_ceiling: u64,
    ) -> Result<IngestedTable> {
        if !path.is_file() {
            return Err(IngestionError::Missing {
                path: path.to_path_buf(),
            }
            .into());
        }
        let &[separator] = delimiter.as_bytes() else {
            return Err(IngestionError::UnsupportedDelimiter(delimiter.to_owned()).into());
        };
        let codec = resolve_encoding(encoding)
            .ok_or_else(|| IngestionError::UnknownEncoding(encoding.to_owned()))?;

        let started = Instant::now();
        let size = std::fs::metadata(path)?.len();
        let dialect = Dialect {
            path,
            delimiter,
            separator,
            codec,
        };

        let table = if size < self.small_file_threshold {
            tracing::debug!(
                "Reading {} directly ({})",
                path.display(),
                crate::utils::format_file_size(size)
            );
            read_direct(&dialect)?
        } else {
            tracing::debug!(
                "Reading {} in batches of {chunk_size} rows ({})",
                path.display(),
                crate::utils::format_file_size(size)
            );
            self.read_chunked(&dialect, chunk_size.max(1), memory_ceiling)?
        };

        tracing::info!(
            "Loaded {} rows x {} columns from {} in {:.2}s ({} batches)",
            table.rows,
            table.columns,
            path.display(),
            started.elapsed().as_secs_f64(),
            table.chunks
        );
        Ok(table)
    }

    fn read_chunked(
        &self,
        dialect: &Dialect<'_>,
        chunk_size: usize,
        memory_ceiling: u64,
    ) -> Result<IngestedTable> {
        let file = std::fs::File::open(dialect.path)?;
        // Short rows are padded below; long rows are still an error.
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .delimiter(dialect.separator)
            .from_reader(DecodingReader::new(file, dialect.codec));

        let headers = unique_headers(reader.headers().map_err(|e| dialect.parse_error(e))?);

        let mut frame: Option<DataFrame> = None;
        let mut chunks = 0;
        let mut batch: Vec<Vec<Option<String>>> =
            vec![Vec::with_capacity(chunk_size); headers.len()];
        let mut buffered = 0;
        let mut warned_unavailable = false;

        let mut records = reader.records();
        loop {
            let next = records.next().transpose().map_err(|e| dialect.parse_error(e))?;
            let exhausted = next.is_none();

            if let Some(record) = next {
                if record.len() > headers.len() {
                    let line = record.position().map_or(0, csv::Position::line);
                    return Err(dialect
                        .parse_error(format!(
                            "record on line {line} has {} fields, the header has {}",
                            record.len(),
                            headers.len()
                        ))
                        .into());
                }
                let mut fields = record.iter();
                for column in &mut batch {
                    // empty and missing fields are null, as in the direct read
                    column.push(fields.next().filter(|f| !f.is_empty()).map(str::to_owned));
                }
                buffered += 1;
            }

            if buffered == chunk_size || (exhausted && buffered > 0) {
                let chunk = batch_frame(&headers, &mut batch).map_err(|e| dialect.parse_error(e))?;
                match frame.as_mut() {
                    Some(acc) => {
                        acc.vstack_mut(&chunk).map_err(|e| dialect.parse_error(e))?;
                    }
                    None => frame = Some(chunk),
                }
                chunks += 1;
                buffered = 0;

                match self.probe.resident_bytes() {
                    Some(used) if used > memory_ceiling => {
                        tracing::warn!(
                            "Memory {} exceeded ceiling {} after batch {chunks}, abandoning load",
                            crate::utils::format_file_size(used),
                            crate::utils::format_file_size(memory_ceiling)
                        );
                        return Err(IngestionError::MemoryCeiling {
                            used,
                            ceiling: memory_ceiling,
                        }
                        .into());
                    }
                    Some(_) => {}
                    None if !warned_unavailable => {
                        tracing::warn!("Process memory is not available, ceiling not enforced");
                        warned_unavailable = true;
                    }
                    None => {}
                }
            }

            if exhausted {
                break;
            }
        }

        let Some(frame) = frame else {
            return Err(IngestionError::NoData {
                path: dialect.path.to_path_buf(),
            }
            .into());
        };

        Ok(IngestedTable {
            rows: frame.height(),
            columns: frame.width(),
            frame,
            chunks,
            strategy: IngestStrategy::Chunked,
        })
    }
}

struct Dialect<'a> {
    path: &'a Path,
    delimiter: &'a str,
    separator: u8,
    codec: &'static Encoding,
}

impl Dialect<'_> {
    fn parse_error(&self, err: impl std::fmt::Display) -> IngestionError {
        IngestionError::Parse {
            delimiter: self.delimiter.to_owned(),
            encoding: self.codec.name().to_owned(),
            message: err.to_string(),
        }
    }
}

fn read_direct(dialect: &Dialect<'_>) -> Result<IngestedTable> {
    let options = CsvReadOptions::default()
        .with_has_header(true)
        // every column as text, like the chunked path
        .with_infer_schema_length(Some(0))
        .with_parse_options(CsvParseOptions::default().with_separator(dialect.separator));

    let bytes = std::fs::read(dialect.path)?;
    let (text, _, _) = dialect.codec.decode(&bytes);
    let frame = options
        .into_reader_with_file_handle(Cursor::new(text.into_owned().into_bytes()))
        .finish()
        .map_err(|e| dialect.parse_error(e))?;

    if frame.height() == 0 {
        return Err(IngestionError::NoData {
            path: dialect.path.to_path_buf(),
        }
        .into());
    }

    Ok(IngestedTable {
        rows: frame.height(),
        columns: frame.width(),
        frame,
        chunks: 1,
        strategy: IngestStrategy::Direct,
    })
}

/// Header names made unique the way the polars reader does it: a repeated
/// name `x` becomes `x_duplicated_0`, `x_duplicated_1`, ...
fn unique_headers(record: &csv::StringRecord) -> Vec<String> {
    let mut seen: Vec<(&str, usize)> = Vec::with_capacity(record.len());
    let mut headers = Vec::with_capacity(record.len());
    for name in record {
        match seen.iter_mut().find(|(n, _)| *n == name) {
            Some((_, count)) => {
                headers.push(format!("{name}_duplicated_{count}"));
                *count += 1;
            }
            None => {
                headers.push(name.to_owned());
                seen.push((name, 0));
            }
        }
    }
    headers
}

/// Drains the buffered columns into a string-typed frame.
fn batch_frame(headers: &[String], batch: &mut [Vec<Option<String>>]) -> PolarsResult<DataFrame> {
    let columns = headers
        .iter()
        .zip(batch.iter_mut())
        .map(|(name, values)| Column::new(name.as_str().into(), std::mem::take(values)))
        .collect();
    DataFrame::new(columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProfilerError;
    use std::path::PathBuf;

    const GIB: u64 = 1024 * 1024 * 1024;

    fn write_csv(dir: &Path, name: &str, rows: usize) -> PathBuf {
        let mut text = String::from("id,name,score\n");
        for i in 0..rows {
            text.push_str(&format!("{i},user{i},{}\n", i * 3));
        }
        let path = dir.join(name);
        std::fs::write(&path, text).expect("Failed to write fixture");
        path
    }

    fn chunked() -> BoundedIngestor {
        BoundedIngestor::new(&PerformanceSettings::default())
            .with_small_file_threshold(0)
            .with_probe(FixedMemory(0))
    }

    #[test]
    fn test_direct_read() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let path = tmp.path().join("people.csv");
        std::fs::write(&path, "id,name,age\n1,Alice,25\n2,Bob,30\n")?;

        let table = BoundedIngestor::new(&PerformanceSettings::default())
            .load_path(&path, ",", "UTF-8", 10_000, GIB)?;
        assert_eq!(table.rows, 2);
        assert_eq!(table.columns, 3);
        assert_eq!(table.strategy, IngestStrategy::Direct);
        Ok(())
    }

    #[test]
    fn test_chunked_matches_direct() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let path = write_csv(tmp.path(), "data.csv", 95);

        let direct = BoundedIngestor::new(&PerformanceSettings::default())
            .load_path(&path, ",", "UTF-8", 10, GIB)?;
        let batched = chunked().load_path(&path, ",", "UTF-8", 10, GIB)?;

        assert_eq!(batched.strategy, IngestStrategy::Chunked);
        assert_eq!(batched.chunks, 10);
        assert_eq!(batched.rows, direct.rows);
        assert_eq!(batched.columns, direct.columns);
        assert_eq!(
            batched.frame.get_column_names(),
            direct.frame.get_column_names()
        );
        Ok(())
    }

    #[test]
    fn test_chunked_preserves_row_order() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let path = write_csv(tmp.path(), "data.csv", 25);

        let table = chunked().load_path(&path, ",", "UTF-8", 7, GIB)?;
        let ids = table.frame.column("id")?.str()?;
        assert_eq!(ids.get(0), Some("0"));
        assert_eq!(ids.get(7), Some("7"));
        assert_eq!(ids.get(24), Some("24"));
        Ok(())
    }

    #[test]
    fn test_memory_ceiling_aborts() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let path = write_csv(tmp.path(), "data.csv", 50);

        let ingestor = chunked().with_probe(FixedMemory(2 * GIB));
        let result = ingestor.load_path(&path, ",", "UTF-8", 10, GIB);
        assert!(matches!(
            result,
            Err(ProfilerError::Ingestion(IngestionError::MemoryCeiling { .. }))
        ));
        Ok(())
    }

    #[test]
    fn test_header_only_is_no_data() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let path = tmp.path().join("empty.csv");
        std::fs::write(&path, "id,name\n")?;

        let result = chunked().load_path(&path, ",", "UTF-8", 10, GIB);
        assert!(matches!(
            result,
            Err(ProfilerError::Ingestion(IngestionError::NoData { .. }))
        ));
        Ok(())
    }

    #[test]
    fn test_ragged_rows_report_dialect() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let path = tmp.path().join("ragged.csv");
        std::fs::write(&path, "a;b\n1;2\n3;4;5\n")?;

        let err = chunked()
            .load_path(&path, ";", "UTF-8", 10, GIB)
            .expect_err("ragged row must fail");
        let text = err.to_string();
        assert!(text.contains("\";\""), "delimiter named in {text}");
        assert!(text.contains("UTF-8"), "encoding named in {text}");
        Ok(())
    }

    #[test]
    fn test_unique_headers() {
        let record = csv::StringRecord::from(vec!["a", "a", "", "b", "a", ""]);
        assert_eq!(
            unique_headers(&record),
            ["a", "a_duplicated_0", "", "b", "a_duplicated_1", "_duplicated_0"]
        );
    }

    #[test]
    fn test_short_rows_are_padded_with_null() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let path = tmp.path().join("short.csv");
        std::fs::write(&path, "a,b,c\n1,,3\n4,5\n")?;

        let table = chunked().load_path(&path, ",", "UTF-8", 10, GIB)?;
        assert_eq!((table.rows, table.columns), (2, 3));
        let b = table.frame.column("b")?.str()?;
        assert_eq!(b.get(0), None, "empty field");
        assert_eq!(b.get(1), Some("5"));
        assert_eq!(table.frame.column("c")?.str()?.get(1), None, "missing field");
        Ok(())
    }

    #[test]
    fn test_rejects_multibyte_delimiter_and_unknown_encoding() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let path = write_csv(tmp.path(), "data.csv", 3);
        let ingestor = chunked();

        assert!(matches!(
            ingestor.load_path(&path, "||", "UTF-8", 10, GIB),
            Err(ProfilerError::Ingestion(IngestionError::UnsupportedDelimiter(_)))
        ));
        assert!(matches!(
            ingestor.load_path(&path, ",", "klingon", 10, GIB),
            Err(ProfilerError::Ingestion(IngestionError::UnknownEncoding(_)))
        ));
        assert!(matches!(
            ingestor.load_path(&tmp.path().join("missing.csv"), ",", "UTF-8", 10, GIB),
            Err(ProfilerError::Ingestion(IngestionError::Missing { .. }))
        ));
        Ok(())
    }

    #[test]
    fn test_windows_1252_chunked() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let path = tmp.path().join("latin.csv");
        let (bytes, _, _) = encoding_rs::WINDOWS_1252.encode("name;city\nJosé;Köln\nZoë;Malmö\n");
        std::fs::write(&path, &bytes)?;

        let table = chunked().load_path(&path, ";", "windows-1252", 10, GIB)?;
        assert_eq!(table.rows, 2);
        let cities = table.frame.column("city")?.str()?;
        assert_eq!(cities.get(0), Some("Köln"));
        Ok(())
    }
}
