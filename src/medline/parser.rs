use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use regex::Regex;
use thiserror::Error;

use super::derive::FieldDeriver;
use super::pool::RecordPool;
use super::record::Record;
use super::tags::IGNORED_TAGS;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("failed to open {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to read line {line_number}: {source}")]
    Io {
        line_number: usize,
        #[source]
        source: io::Error,
    },

    #[error("malformed record at line {line_number}: expected a tag line, found {line:?}")]
    Malformed { line_number: usize, line: String },
}

/// Streams MEDLINE flat files into derived [`Record`]s.
///
/// One parser is shared by every worker; per-stream scanning state lives in
/// the [`Records`] iterator it hands out.
#[derive(Debug)]
pub struct RecordParser {
    tag_line: Regex,
    ignored: HashSet<String>,
    deriver: FieldDeriver,
    pool: Arc<RecordPool>,
}

impl RecordParser {
    pub fn new(pool: Arc<RecordPool>) -> Result<Self> {
        Ok(Self {
            tag_line: Regex::new(r"^(?P<tag>[A-Za-z0-9]+)\s*- (?P<value>.+)$")
                .context("failed to compile tag line regex")?,
            ignored: IGNORED_TAGS.iter().map(|tag| tag.to_string()).collect(),
            deriver: FieldDeriver::new()?,
            pool,
        })
    }

    pub fn with_ignored_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignored = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn open(&self, path: &Path) -> Result<RecordFile<'_>, ParseError> {
        let file = File::open(path).map_err(|source| ParseError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(RecordFile {
            records: self.records(BufReader::new(file)),
        })
    }

    pub fn records<R: BufRead>(&self, reader: R) -> Records<'_, R> {
        Records {
            parser: self,
            reader,
            buf: Vec::new(),
            line_number: 0,
            done: false,
        }
    }

    fn scan_line(
        &self,
        state: &mut ScanState,
        line: &str,
        line_number: usize,
    ) -> Result<(), ParseError> {
        if let Some(captures) = self.tag_line.captures(line) {
            self.flush(state);
            let tag = captures.name("tag").map(|m| m.as_str()).unwrap_or_default();
            let value = captures
                .name("value")
                .map(|m| m.as_str())
                .unwrap_or_default();
            state.open = Some(OpenField {
                tag: tag.to_string(),
                value: collapse_whitespace(value),
            });
            return Ok(());
        }

        let Some(field) = state.open.as_mut() else {
            return Err(ParseError::Malformed {
                line_number,
                line: line.to_string(),
            });
        };

        let fragment = collapse_whitespace(line);
        if !fragment.is_empty() {
            if !field.value.is_empty() {
                field.value.push(' ');
            }
            field.value.push_str(&fragment);
        }
        Ok(())
    }

    fn flush(&self, state: &mut ScanState) {
        let Some(field) = state.open.take() else {
            return;
        };
        if field.value.is_empty() || self.ignored.contains(&field.tag) {
            return;
        }
        if let Some(record) = state.record.as_mut() {
            record.add(field.tag.as_str(), field.value);
        }
    }

    fn finish(&self, mut state: ScanState) -> Option<Record> {
        self.flush(&mut state);
        let mut record = state.record?;
        self.deriver.derive(&mut record);
        Some(record)
    }
}

#[derive(Debug)]
struct OpenField {
    tag: String,
    value: String,
}

/// Scanning state for the record currently being assembled.
///
/// `record` is allocated on the first non-blank line, so a stretch of blank
/// lines never produces a record.
#[derive(Debug, Default)]
struct ScanState {
    record: Option<Record>,
    open: Option<OpenField>,
}

/// Lazy, single-pass sequence of records read from one stream.
///
/// After an error the iterator yields `None`; records returned before the
/// error remain valid.
pub struct Records<'p, R> {
    parser: &'p RecordParser,
    reader: R,
    buf: Vec<u8>,
    line_number: usize,
    done: bool,
}

impl<R: BufRead> Records<'_, R> {
    fn read_line(&mut self) -> Result<Option<String>, ParseError> {
        self.buf.clear();
        let read = self
            .reader
            .read_until(b'\n', &mut self.buf)
            .map_err(|source| ParseError::Io {
                line_number: self.line_number + 1,
                source,
            })?;
        if read == 0 {
            return Ok(None);
        }

        self.line_number += 1;
        let line = String::from_utf8_lossy(&self.buf);
        Ok(Some(line.trim_end_matches(['\n', '\r']).to_string()))
    }

    fn scan_record(&mut self) -> Result<Option<Record>, ParseError> {
        let mut state = ScanState::default();

        while let Some(line) = self.read_line()? {
            if line.trim().is_empty() {
                if state.record.is_some() {
                    break;
                }
                continue;
            }

            if state.record.is_none() {
                state.record = Some(self.parser.pool.acquire());
            }
            self.parser.scan_line(&mut state, &line, self.line_number)?;
        }

        Ok(self.parser.finish(state))
    }
}

impl<R: BufRead> Iterator for Records<'_, R> {
    type Item = Result<Record, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match self.scan_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

/// An open corpus file. The handle is released when this value is dropped
/// or [`RecordFile::close`]d, whichever path the caller leaves by.
pub struct RecordFile<'p> {
    records: Records<'p, BufReader<File>>,
}

impl RecordFile<'_> {
    pub fn close(self) {}
}

impl Iterator for RecordFile<'_> {
    type Item = Result<Record, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.records.next()
    }
}

fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<&str>>().join(" ")
}
