//! Lockstep log reader.
//!
//! A lockstep log pins the number of deaths and births at each timestep so a
//! run can be reproduced against another. Lines read
//! `<timestep> <numDeaths> <numBirths>`; `%` and `#` lines are comments.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockstepRecord {
    pub step: u64,
    pub deaths: usize,
    pub births: usize,
}

#[derive(Debug, Error)]
pub enum LockstepError {
    #[error("cannot open lockstep log {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("lockstep log read failed: {0}")]
    Io(#[from] io::Error),
    #[error("malformed lockstep line {line}: {content:?}")]
    Malformed { line: usize, content: String },
    #[error("lockstep line {line} goes back in time: step {step} after {previous}")]
    OutOfOrder { line: usize, previous: u64, step: u64 },
}

/// Lazy reader with one record of lookahead.
pub struct LockstepCursor {
    lines: Box<dyn Iterator<Item = io::Result<String>>>,
    line: usize,
    /// Next aggregated record.
    lookahead: Option<LockstepRecord>,
    /// First line of the record after the lookahead.
    raw: Option<LockstepRecord>,
    last_step: Option<u64>,
    exhausted: bool,
}

impl LockstepCursor {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LockstepError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| LockstepError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_reader(BufReader::new(file)))
    }

    pub fn from_reader(reader: impl BufRead + 'static) -> Self {
        LockstepCursor {
            lines: Box::new(reader.lines()),
            line: 0,
            lookahead: None,
            raw: None,
            last_step: None,
            exhausted: false,
        }
    }

    fn parse_line(&self, content: &str) -> Result<Option<LockstepRecord>, LockstepError> {
        let trimmed = content.trim();
        if trimmed.is_empty() || trimmed.starts_with('%') || trimmed.starts_with('#') {
            return Ok(None);
        }
        let malformed = || LockstepError::Malformed {
            line: self.line,
            content: content.to_string(),
        };
        let mut fields = trimmed.split_whitespace();
        let mut next = || fields.next().ok_or_else(malformed);
        let step = next()?.parse::<u64>().map_err(|_| malformed())?;
        let deaths = next()?.parse::<usize>().map_err(|_| malformed())?;
        let births = next()?.parse::<usize>().map_err(|_| malformed())?;
        Ok(Some(LockstepRecord {
            step,
            deaths,
            births,
        }))
    }

    /// Next line's record, with ordering checked.
    fn read_record(&mut self) -> Result<Option<LockstepRecord>, LockstepError> {
        if self.exhausted {
            return Ok(None);
        }
        while let Some(content) = self.lines.next() {
            let content = content?;
            self.line += 1;
            let Some(record) = self.parse_line(&content)? else {
                continue;
            };
            if let Some(previous) = self.last_step {
                if record.step < previous {
                    return Err(LockstepError::OutOfOrder {
                        line: self.line,
                        previous,
                        step: record.step,
                    });
                }
            }
            self.last_step = Some(record.step);
            return Ok(Some(record));
        }
        self.exhausted = true;
        Ok(None)
    }

    /// The next record, with consecutive lines for the same step summed.
    pub fn peek(&mut self) -> Result<Option<LockstepRecord>, LockstepError> {
        if self.lookahead.is_some() {
            return Ok(self.lookahead);
        }
        let mut record = match self.raw.take() {
            Some(record) => record,
            None => match self.read_record()? {
                Some(record) => record,
                None => return Ok(None),
            },
        };
        while let Some(next) = self.read_record()? {
            if next.step != record.step {
                self.raw = Some(next);
                break;
            }
            record.deaths += next.deaths;
            record.births += next.births;
        }
        self.lookahead = Some(record);
        Ok(self.lookahead)
    }

    /// Consumes the record for `step`. Records for earlier steps are dropped.
    ///
    /// Returns `Ok(None)` when the next record lies in the future or the log
    /// is exhausted; `is_exhausted` tells the two apart.
    pub fn take(&mut self, step: u64) -> Result<Option<LockstepRecord>, LockstepError> {
        loop {
            let Some(record) = self.peek()? else {
                return Ok(None);
            };
            if record.step > step {
                return Ok(None);
            }
            self.lookahead = None;
            if record.step == step {
                return Ok(Some(record));
            }
            debug!(
                record_step = record.step,
                step, "skipping stale lockstep record"
            );
        }
    }

    /// True once every record has been consumed.
    pub fn is_exhausted(&mut self) -> Result<bool, LockstepError> {
        Ok(self.peek()?.is_none())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn cursor(text: &'static str) -> LockstepCursor {
        LockstepCursor::from_reader(Cursor::new(text))
    }

    #[test]
    fn comments_and_blank_lines_are_skipped() {
        let mut cursor = cursor("% header\n# note\n\n5 1 2\n");
        assert_eq!(
            cursor.take(5).unwrap(),
            Some(LockstepRecord {
                step: 5,
                deaths: 1,
                births: 2
            })
        );
        assert!(cursor.is_exhausted().unwrap());
    }

    #[test]
    fn same_step_lines_are_summed() {
        let mut cursor = cursor("3 1 0\n3 0 2\n3 1 1\n8 0 1\n");
        assert_eq!(cursor.take(2).unwrap(), None);
        let record = cursor.take(3).unwrap().unwrap();
        assert_eq!((record.deaths, record.births), (2, 3));
        assert_eq!(cursor.take(4).unwrap(), None);
        assert!(!cursor.is_exhausted().unwrap());
        assert_eq!(cursor.take(8).unwrap().map(|r| r.births), Some(1));
        assert!(cursor.is_exhausted().unwrap());
    }

    #[test]
    fn stale_records_are_dropped() {
        let mut cursor = cursor("0 0 30\n1 1 0\n4 0 1\n");
        assert_eq!(cursor.take(4).unwrap().map(|r| r.births), Some(1));
    }

    #[test]
    fn decreasing_steps_are_rejected() {
        let mut cursor = cursor("5 0 0\n4 1 1\n");
        assert!(matches!(
            cursor.take(5),
            Err(LockstepError::OutOfOrder {
                line: 2,
                previous: 5,
                step: 4
            })
        ));
    }

    #[test]
    fn malformed_lines_are_rejected() {
        let mut cursor = cursor("% ok\n7 x 1\n");
        assert!(matches!(
            cursor.take(7),
            Err(LockstepError::Malformed { line: 2, .. })
        ));
    }
}
