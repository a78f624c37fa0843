// Recorded vision frontend output
// One JSON object per line, one line per camera frame:
//
//   {"kind": "point", "x": 312.0, "y": 188.5}
//   {"kind": "occluded"}
//   {"kind": "missing"}
//   {"kind": "lines", "segments": [[88, 100, 88, 400], [540, 60, 541, 420]]}
//
// Blank lines and lines starting with '#' are ignored.

use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::boundary::LineSegment;
use crate::error::{TrackerError, TrackerResult};
use crate::kalman::Measurement;
use crate::tracker::Observation;

/// One frame of vision output as recorded on disk
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FrameRecord {
    Point { x: f64, y: f64 },
    Occluded,
    Missing,
    Lines { segments: Vec<[f64; 4]> },
}

impl From<FrameRecord> for Observation {
    fn from(record: FrameRecord) -> Self {
        match record {
            FrameRecord::Point { x, y } => Observation::Point(Measurement::new(x, y)),
            FrameRecord::Occluded => Observation::Occluded,
            FrameRecord::Missing => Observation::Missing,
            FrameRecord::Lines { segments } => {
                Observation::Lines(segments.into_iter().map(LineSegment::from).collect())
            }
        }
    }
}

/// Parse one record; `line` is only used for error reporting
pub fn parse_frame(text: &str, line: usize) -> TrackerResult<Observation> {
    let record: FrameRecord =
        serde_json::from_str(text).map_err(|source| TrackerError::Parse { line, source })?;
    Ok(record.into())
}

/// Iterator over the frames of a replay stream
pub struct FrameReader<R> {
    lines: Lines<R>,
    line: usize,
}

impl FrameReader<BufReader<File>> {
    pub fn open<P: AsRef<Path>>(path: P) -> TrackerResult<Self> {
        let file = File::open(path)?;
        Ok(FrameReader::new(BufReader::new(file)))
    }
}

impl<R: BufRead> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        FrameReader {
            lines: reader.lines(),
            line: 0,
        }
    }
}

impl<R: BufRead> Iterator for FrameReader<R> {
    type Item = TrackerResult<Observation>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let text = match self.lines.next()? {
                Ok(t) => t,
                Err(e) => return Some(Err(e.into())),
            };
            self.line += 1;

            let trimmed = text.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            return Some(parse_frame(trimmed, self.line));
        }
    }
}
