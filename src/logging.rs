use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use csv::Writer;
use log::warn;
use serde::Serialize;

/// Appends metric records to `metrics.jsonl` and `metrics.csv` in a run
/// directory.
pub struct Logger {
    json: File,
    csv: Writer<File>,
}

#[derive(Clone, Debug, Serialize)]
pub struct MetricRecord {
    pub step: u64,
    pub loss: f32,
    pub accuracy: f32,
    pub lr: f32,
    pub kind: &'static str,
}

impl Logger {
    pub fn new(dir: &Path) -> io::Result<Self> {
        std::fs::create_dir_all(dir)?;
        let json = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join("metrics.jsonl"))?;
        let csv_file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join("metrics.csv"))?;
        let csv = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(csv_file);
        Ok(Logger { json, csv })
    }

    /// Write one record to both sinks. Sink failures are logged, not fatal.
    pub fn log<T: Serialize>(&mut self, metrics: &T) {
        match serde_json::to_string(metrics) {
            Ok(line) => {
                if let Err(e) = writeln!(self.json, "{}", line) {
                    warn!("failed to write metrics.jsonl: {e}");
                }
            }
            Err(e) => warn!("failed to encode metrics: {e}"),
        }
        let res = self
            .csv
            .serialize(metrics)
            .and_then(|()| self.csv.flush().map_err(csv::Error::from));
        if let Err(e) = res {
            warn!("failed to write metrics.csv: {e}");
        }
    }
}
