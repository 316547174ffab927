//! Telemetry records and the CSV loader for a run's primary artifact.
//!
//! The artifact is a comma-delimited file with a header row. Only the four
//! required columns are read; extra columns and any column order are accepted.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::TelemetryError;

/// Columns every telemetry artifact must carry.
pub const REQUIRED_COLUMNS: [&str; 4] = ["iteration", "liveAgents", "frameTime", "tickTime"];

/// One recorded simulation tick. Times are in seconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TimeSeriesRecord {
    pub iteration: u64,
    pub live_agents: u64,
    /// `None` when the frame-time cell was left empty.
    pub frame_time: Option<f64>,
    pub tick_time: f64,
}

impl TimeSeriesRecord {
    pub fn new(iteration: u64, live_agents: u64, frame_time: f64, tick_time: f64) -> Self {
        Self {
            iteration,
            live_agents,
            frame_time: Some(frame_time),
            tick_time,
        }
    }
}

/// Column positions of the required fields within a header.
struct ColumnIndex {
    iteration: usize,
    live_agents: usize,
    frame_time: usize,
    tick_time: usize,
}

impl ColumnIndex {
    fn from_header(header: &str, path: &Path) -> Result<Self, TelemetryError> {
        let names: Vec<&str> = header.split(',').map(str::trim).collect();
        let position = |col: &str| names.iter().position(|n| *n == col);

        let missing: Vec<String> = REQUIRED_COLUMNS
            .into_iter()
            .filter(|&col| position(col).is_none())
            .map(|col| col.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(TelemetryError::MissingColumns {
                path: path.to_path_buf(),
                missing,
            });
        }

        // All four are present at this point.
        let at = |col: &str| position(col).unwrap_or_default();
        Ok(Self {
            iteration: at("iteration"),
            live_agents: at("liveAgents"),
            frame_time: at("frameTime"),
            tick_time: at("tickTime"),
        })
    }
}

/// Load every record from the telemetry artifact at `path`.
pub fn load(path: &Path) -> Result<Vec<TimeSeriesRecord>, TelemetryError> {
    let file = File::open(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            TelemetryError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            TelemetryError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;
    parse(BufReader::new(file), path)
}

/// Parse telemetry from any buffered reader. `path` is used for error messages only.
pub fn parse<R: BufRead>(reader: R, path: &Path) -> Result<Vec<TimeSeriesRecord>, TelemetryError> {
    let io_err = |source| TelemetryError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut lines = reader.lines();

    let header = match lines.next() {
        Some(line) => line.map_err(io_err)?,
        None => {
            return Err(TelemetryError::MissingColumns {
                path: path.to_path_buf(),
                missing: REQUIRED_COLUMNS.iter().map(|c| c.to_string()).collect(),
            })
        }
    };
    let columns = ColumnIndex::from_header(header.trim_start_matches('\u{feff}'), path)?;

    let mut records = Vec::new();
    for (idx, line) in lines.enumerate() {
        let line = line.map_err(io_err)?;
        let line_no = idx + 2;
        if line.trim().is_empty() {
            continue;
        }
        let cells: Vec<&str> = line.split(',').map(str::trim).collect();
        let malformed = |reason: String| TelemetryError::Malformed {
            path: path.to_path_buf(),
            line: line_no,
            reason,
        };
        let cell = |pos: usize, name: &str| {
            cells
                .get(pos)
                .copied()
                .ok_or_else(|| malformed(format!("missing value for {name}")))
        };

        let frame_raw = cell(columns.frame_time, "frameTime")?;
        records.push(TimeSeriesRecord {
            iteration: parse_count(cell(columns.iteration, "iteration")?)
                .ok_or_else(|| malformed("iteration is not a non-negative integer".into()))?,
            live_agents: parse_count(cell(columns.live_agents, "liveAgents")?)
                .ok_or_else(|| malformed("liveAgents is not a non-negative integer".into()))?,
            frame_time: if frame_raw.is_empty() {
                None
            } else {
                Some(
                    frame_raw
                        .parse::<f64>()
                        .map_err(|e| malformed(format!("frameTime: {e}")))?,
                )
            },
            tick_time: cell(columns.tick_time, "tickTime")?
                .parse::<f64>()
                .map_err(|e| malformed(format!("tickTime: {e}")))?,
        });
    }

    Ok(records)
}

/// Integers may be written as `42` or, by float-minded writers, as `42.0`.
fn parse_count(raw: &str) -> Option<u64> {
    if let Ok(n) = raw.parse::<u64>() {
        return Some(n);
    }
    let f = raw.parse::<f64>().ok()?;
    (f.is_finite() && f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64).then(|| f as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_str(data: &str) -> Result<Vec<TimeSeriesRecord>, TelemetryError> {
        parse(data.as_bytes(), Path::new("performanceData.csv"))
    }

    #[test]
    fn test_parses_required_columns() {
        let records = parse_str(
            "iteration,liveAgents,frameTime,tickTime\n1,10,0.016,0.002\n2,11,0.017,0.003\n",
        )
        .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1], TimeSeriesRecord::new(2, 11, 0.017, 0.003));
    }

    #[test]
    fn test_accepts_extra_columns_in_any_order() {
        let records =
            parse_str("tickTime,extra,liveAgents,iteration,frameTime\n0.5,x,7,3,0.25\n").unwrap();
        assert_eq!(records, vec![TimeSeriesRecord::new(3, 7, 0.25, 0.5)]);
    }

    #[test]
    fn test_missing_columns_are_all_named() {
        match parse_str("iteration,liveAgents\n1,2\n") {
            Err(TelemetryError::MissingColumns { missing, .. }) => {
                assert_eq!(missing, vec!["frameTime".to_string(), "tickTime".to_string()]);
            }
            other => panic!("expected MissingColumns, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_file_is_schema_violation() {
        match parse_str("") {
            Err(TelemetryError::MissingColumns { missing, .. }) => assert_eq!(missing.len(), 4),
            other => panic!("expected MissingColumns, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_cell_reports_line() {
        match parse_str("iteration,liveAgents,frameTime,tickTime\n1,10,0.1,0.1\n2,ten,0.1,0.1\n") {
            Err(TelemetryError::Malformed { line, reason, .. }) => {
                assert_eq!(line, 3);
                assert!(reason.contains("liveAgents"));
            }
            other => panic!("expected Malformed, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_frame_time_is_absent() {
        let records = parse_str("iteration,liveAgents,frameTime,tickTime\r\n4,2,,0.5\r\n").unwrap();
        assert_eq!(records[0].frame_time, None);
        assert_eq!(records[0].tick_time, 0.5);
    }

    #[test]
    fn test_float_formatted_counts() {
        let records = parse_str("iteration,liveAgents,frameTime,tickTime\n5.0,12.0,0.1,0.1\n").unwrap();
        assert_eq!(records[0].iteration, 5);
        assert_eq!(records[0].live_agents, 12);
        assert!(parse_count("1.5").is_none());
        assert!(parse_count("-1").is_none());
    }

    #[test]
    fn test_load_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        match load(&dir.path().join("performanceData.csv")) {
            Err(TelemetryError::NotFound { .. }) => {}
            other => panic!("expected NotFound, got {other:?}"),
        }
    }
}
