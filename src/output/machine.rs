//! CSV and JSON formatters
//!
//! Machine-readable output always reports canonical units: bit/s for rates,
//! bytes for transfer totals and milliseconds for latency.

use crate::{
    engine::RunOutcome,
    error::{AppError, Result},
    models::SpeedTestResult,
    servers::ServerCandidate,
};
use serde::Serialize;

use super::formatter::OutputFormatter;

/// Column names of a result row
pub const CSV_COLUMNS: [&str; 9] = [
    "Timestamp",
    "Server Name",
    "Address",
    "Ping",
    "Jitter",
    "Download",
    "Upload",
    "Share",
    "IP Address",
];

/// CSV formatter with a custom delimiter and optional header row
pub struct CsvFormatter {
    delimiter: u8,
    header: bool,
}

impl CsvFormatter {
    pub fn new(delimiter: char, header: bool) -> Result<Self> {
        if !delimiter.is_ascii() {
            return Err(AppError::config(format!(
                "CSV delimiter must be a single ASCII character, got '{}'",
                delimiter
            )));
        }
        Ok(Self {
            delimiter: delimiter as u8,
            header,
        })
    }

    fn write_records<I, R>(&self, header: Option<&[&str]>, rows: I) -> Result<String>
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator,
        R::Item: AsRef<[u8]>,
    {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(self.delimiter)
            .from_writer(Vec::new());

        if let Some(header) = header {
            writer.write_record(header)?;
        }
        for row in rows {
            writer.write_record(row)?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| AppError::io(format!("Failed to flush CSV output: {}", e)))?;
        String::from_utf8(bytes).map_err(|e| AppError::internal(format!("CSV output is not UTF-8: {}", e)))
    }

    /// The header row alone, for `--csv-header` without a run
    pub fn header_line(&self) -> Result<String> {
        self.write_records(Some(&CSV_COLUMNS), Vec::<Vec<String>>::new())
    }

    fn result_row(result: &SpeedTestResult) -> Vec<String> {
        vec![
            result.timestamp.to_rfc3339(),
            result.server.name.clone(),
            result.server.url.clone(),
            result.ping.map(|v| format!("{:.2}", v)).unwrap_or_default(),
            result.jitter.map(|v| format!("{:.2}", v)).unwrap_or_default(),
            format!("{:.0}", result.download),
            format!("{:.0}", result.upload),
            result.share.clone(),
            result.client.ip.clone(),
        ]
    }
}

impl OutputFormatter for CsvFormatter {
    fn format_outcome(&self, outcome: &RunOutcome) -> Result<String> {
        let header = self.header.then_some(&CSV_COLUMNS[..]);
        self.write_records(header, vec![Self::result_row(&outcome.result)])
    }

    fn format_server_list(&self, servers: &[ServerCandidate], secure: bool) -> Result<String> {
        let header = self.header.then_some(&["ID", "Name", "Address", "Sponsor"][..]);
        let rows = servers.iter().map(|server| {
            vec![
                server.id.to_string(),
                server.name.clone(),
                server.display_url(secure),
                server.sponsor_name.clone(),
            ]
        });
        self.write_records(header, rows)
    }
}

/// JSON formatter; a run is reported as a one-element array of results
pub struct JsonFormatter {
    pretty: bool,
}

impl JsonFormatter {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    fn render<T: Serialize + ?Sized>(&self, value: &T) -> Result<String> {
        let mut text = if self.pretty {
            serde_json::to_string_pretty(value)?
        } else {
            serde_json::to_string(value)?
        };
        text.push('\n');
        Ok(text)
    }
}

impl OutputFormatter for JsonFormatter {
    fn format_outcome(&self, outcome: &RunOutcome) -> Result<String> {
        self.render(&[&outcome.result])
    }

    fn format_server_list(&self, servers: &[ServerCandidate], _secure: bool) -> Result<String> {
        self.render(servers)
    }

    fn format_error(&self, error: &str) -> Result<String> {
        self.render(&serde_json::json!({ "error": error }))
    }

    fn format_warning(&self, warning: &str) -> Result<String> {
        self.render(&serde_json::json!({ "warning": warning }))
    }
}

#[cfg(test)]
mod tests {
    use super::super::formatter::test_support::{candidate, outcome};
    use super::*;

    #[test]
    fn test_csv_row_uses_canonical_units() {
        let text = CsvFormatter::new(',', false).unwrap().format_outcome(&outcome()).unwrap();
        assert_eq!(
            text,
            "2024-05-01T12:00:00+00:00,\"Amsterdam, Netherlands\",http://ams.example.com/,20.00,1.50,80000000,40000000,,203.0.113.7\n"
        );
    }

    #[test]
    fn test_csv_custom_delimiter_and_header() {
        let text = CsvFormatter::new(';', true).unwrap().format_outcome(&outcome()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "Timestamp;Server Name;Address;Ping;Jitter;Download;Upload;Share;IP Address");
        assert!(lines[1].contains(";Amsterdam, Netherlands;"));
    }

    #[test]
    fn test_csv_header_line() {
        let header = CsvFormatter::new('\t', false).unwrap().header_line().unwrap();
        assert_eq!(header, "Timestamp\tServer Name\tAddress\tPing\tJitter\tDownload\tUpload\tShare\tIP Address\n");
    }

    #[test]
    fn test_csv_unavailable_ping_is_empty() {
        let mut run = outcome();
        run.result.apply_latency(None);
        let text = CsvFormatter::new(',', false).unwrap().format_outcome(&run).unwrap();
        assert!(text.contains("/,,,80000000"));
    }

    #[test]
    fn test_csv_rejects_non_ascii_delimiter() {
        assert!(CsvFormatter::new('§', false).is_err());
    }

    #[test]
    fn test_csv_server_list() {
        let text = CsvFormatter::new(',', true)
            .unwrap()
            .format_server_list(&[candidate()], false)
            .unwrap();
        assert_eq!(
            text,
            "ID,Name,Address,Sponsor\n7,\"Amsterdam, Netherlands\",http://ams.example.com/,Example Hosting\n"
        );
    }

    #[test]
    fn test_json_report_keys() {
        let text = JsonFormatter::new(false).format_outcome(&outcome()).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        let report = &parsed[0];

        assert_eq!(report["server"]["name"], "Amsterdam, Netherlands");
        assert_eq!(report["client"]["ip"], "203.0.113.7");
        assert_eq!(report["bytes_received"], 140_000_000u64);
        assert_eq!(report["bytes_sent"], 70_000_000u64);
        assert_eq!(report["download"], 80_000_000.0);
        assert_eq!(report["ping"], 20.0);
        assert_eq!(report["share"], "");
        assert!(report["timestamp"].as_str().unwrap().starts_with("2024-05-01T12:00:00"));
    }

    #[test]
    fn test_json_unavailable_ping_is_null() {
        let mut run = outcome();
        run.result.apply_latency(None);
        let text = JsonFormatter::new(false).format_outcome(&run).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert!(parsed[0]["ping"].is_null());
        assert!(parsed[0]["jitter"].is_null());
    }

    #[test]
    fn test_json_server_list_round_trips_field_names() {
        let text = JsonFormatter::new(true).format_server_list(&[candidate()], false).unwrap();
        assert!(text.contains("\"dlURL\""));
        assert!(text.contains("\"sponsorName\""));
    }
}
