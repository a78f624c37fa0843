use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};

use serde::Serialize;
use tracing::error;

use crate::kalman::TickIndex;
use crate::tracker::TickReport;

/// Trait for output handlers
pub trait OutputHandler: Send {
    /// Handle the result of one tracking tick
    fn handle_tick(&mut self, report: &TickReport);

    /// Handle a calibration pass made while the estimator was at `tick`
    fn handle_calibration(&mut self, tick: TickIndex, boundaries: &[f64]);

    fn flush(&mut self) {}
}

fn open_append(path: &str) -> std::io::Result<BufWriter<File>> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(BufWriter::new(file))
}

/// CSV format output
///
/// command,tick,position,raw_position,marker_y
/// calibration,tick,boundary...
pub struct CsvOutput<W: Write + Send> {
    writer: W,
}

impl CsvOutput<BufWriter<File>> {
    pub fn new(path: &str) -> std::io::Result<Self> {
        Ok(CsvOutput { writer: open_append(path)? })
    }
}

impl<W: Write + Send> CsvOutput<W> {
    pub fn from_writer(writer: W) -> Self {
        CsvOutput { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    pub fn format_command(report: &TickReport) -> Option<String> {
        report.command.map(|cmd| {
            format!(
                "command,{},{:.2},{:.2},{:.2}",
                cmd.tick, cmd.position, cmd.raw_position, cmd.marker_y
            )
        })
    }

    pub fn format_calibration(tick: TickIndex, boundaries: &[f64]) -> String {
        let mut line = format!("calibration,{}", tick);
        for b in boundaries {
            line.push_str(&format!(",{:.2}", b));
        }
        line
    }
}

impl<W: Write + Send> OutputHandler for CsvOutput<W> {
    fn handle_tick(&mut self, report: &TickReport) {
        if let Some(line) = Self::format_command(report) {
            if let Err(e) = writeln!(self.writer, "{}", line) {
                error!("Failed to write CSV: {}", e);
            }
        }
    }

    fn handle_calibration(&mut self, tick: TickIndex, boundaries: &[f64]) {
        let line = Self::format_calibration(tick, boundaries);
        if let Err(e) = writeln!(self.writer, "{}", line) {
            error!("Failed to write CSV: {}", e);
        }
    }

    fn flush(&mut self) {
        if let Err(e) = self.writer.flush() {
            error!("Failed to flush CSV output: {}", e);
        }
    }
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum JsonRecord<'a> {
    Tick(&'a TickReport),
    Calibration { tick: TickIndex, boundaries: &'a [f64] },
}

/// JSON lines output, one object per tick or calibration pass
pub struct JsonOutput<W: Write + Send> {
    writer: W,
}

impl JsonOutput<BufWriter<File>> {
    pub fn new(path: &str) -> std::io::Result<Self> {
        Ok(JsonOutput { writer: open_append(path)? })
    }
}

impl<W: Write + Send> JsonOutput<W> {
    pub fn from_writer(writer: W) -> Self {
        JsonOutput { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_record(&mut self, record: &JsonRecord<'_>) {
        let result = serde_json::to_string(record)
            .map_err(std::io::Error::from)
            .and_then(|json| writeln!(self.writer, "{}", json));
        if let Err(e) = result {
            error!("Failed to write JSON: {}", e);
        }
    }
}

impl<W: Write + Send> OutputHandler for JsonOutput<W> {
    fn handle_tick(&mut self, report: &TickReport) {
        self.write_record(&JsonRecord::Tick(report));
    }

    fn handle_calibration(&mut self, tick: TickIndex, boundaries: &[f64]) {
        self.write_record(&JsonRecord::Calibration { tick, boundaries });
    }

    fn flush(&mut self) {
        if let Err(e) = self.writer.flush() {
            error!("Failed to flush JSON output: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crossing::ActuatorCommand;
    use crate::kalman::{KinematicState, Measurement};
    use crate::tracker::TickAction;

    fn report_with_command() -> TickReport {
        TickReport {
            action: TickAction::Update(Measurement::new(310.0, 140.0)),
            tick: 12,
            estimate: Some(KinematicState::new(310.0, 140.0, -20.0, 3.0)),
            corrected: true,
            command: Some(ActuatorCommand {
                tick: 19,
                position: 540.0,
                raw_position: 612.3,
                marker_y: 49.5,
            }),
        }
    }

    #[test]
    fn test_csv_command_row() {
        let mut out = CsvOutput::from_writer(Vec::new());
        out.handle_tick(&report_with_command());
        out.handle_calibration(12, &[90.0, 540.25]);

        let text = String::from_utf8(out.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec!["command,19,540.00,612.30,49.50", "calibration,12,90.00,540.25"]);
    }

    #[test]
    fn test_csv_skips_ticks_without_command() {
        let mut out = CsvOutput::from_writer(Vec::new());
        let report = TickReport { command: None, ..report_with_command() };
        out.handle_tick(&report);
        assert!(out.into_inner().is_empty());
    }

    #[test]
    fn test_json_records() {
        let mut out = JsonOutput::from_writer(Vec::new());
        out.handle_tick(&report_with_command());
        out.handle_calibration(12, &[90.0]);

        let text = String::from_utf8(out.into_inner()).unwrap();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["type"], "tick");
        assert_eq!(lines[0]["action"], "update");
        assert_eq!(lines[0]["command"]["tick"], 19);
        assert_eq!(lines[0]["estimate"]["vy"], -20.0);
        assert_eq!(lines[1]["type"], "calibration");
        assert_eq!(lines[1]["boundaries"][0], 90.0);
    }
}
