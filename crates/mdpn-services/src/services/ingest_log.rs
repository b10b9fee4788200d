//! Dual-log sink: CSV ingest log, HTML digest and the central format-report log.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use mdpn_core::{IngestStatus, LogRecord, LogSinkError};
use mdpn_processing::archive::escape_html;
use mdpn_processing::IngestLog;

const FORMAT_LOG_PREFIX: [&str; 4] = [
    "Package Name",
    "Source-Organization",
    "External-Identifier",
    "Date",
];

const DIGEST_TITLE: &str = "MDPN Ingest Log";

const DIGEST_STYLE: &str = "body { font-family: sans-serif; margin: 2em; }
table { border-collapse: collapse; width: 100%; }
th, td { border: 1px solid #ccc; padding: 4px 8px; text-align: left; }
th { background: #2c3e50; color: #fff; }
tr:nth-child(even) { background: #f4f6f8; }
td.status-staged { color: #1e7e34; }
td.status-error { color: #b02a37; font-weight: bold; }";

fn csv_err(e: csv::Error) -> LogSinkError {
    LogSinkError::Csv(e.to_string())
}

async fn blocking<T, F>(f: F) -> Result<T, LogSinkError>
where
    F: FnOnce() -> Result<T, LogSinkError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| LogSinkError::Io(std::io::Error::other(e.to_string())))?
}

/// Append-mode handle that reports whether the file was empty before opening.
fn open_append(path: &Path) -> Result<(File, bool), LogSinkError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let fresh = fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok((file, fresh))
}

pub struct CsvIngestLog {
    csv_path: PathBuf,
    html_path: PathBuf,
    format_log_path: PathBuf,
}

impl CsvIngestLog {
    pub fn new(
        csv_path: impl Into<PathBuf>,
        html_path: impl Into<PathBuf>,
        format_log_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            csv_path: csv_path.into(),
            html_path: html_path.into(),
            format_log_path: format_log_path.into(),
        }
    }
}

fn append_row(path: &Path, record: &LogRecord) -> Result<(), LogSinkError> {
    let (file, fresh) = open_append(path)?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(file);
    if fresh {
        writer.write_record(LogRecord::HEADER).map_err(csv_err)?;
    }
    writer.write_record(record.to_row()).map_err(csv_err)?;
    writer.flush()?;
    Ok(())
}

/// Render the full CSV log as one HTML table.
pub fn render_digest(csv_path: &Path) -> Result<String, LogSinkError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(csv_path)
        .map_err(csv_err)?;
    let headers = reader.headers().map_err(csv_err)?.clone();
    let status_col = headers.iter().position(|h| h == "Status");

    let mut html = String::new();
    html.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
    html.push_str(&format!("<title>{DIGEST_TITLE}</title>\n<style>\n{DIGEST_STYLE}\n</style>\n"));
    html.push_str(&format!("</head>\n<body>\n<h1>{DIGEST_TITLE}</h1>\n<table>\n<tr>"));
    for h in headers.iter() {
        html.push_str(&format!("<th>{}</th>", escape_html(h)));
    }
    html.push_str("</tr>\n");

    let mut rows = 0usize;
    for record in reader.records() {
        let record = record.map_err(csv_err)?;
        html.push_str("<tr>");
        for (i, cell) in record.iter().enumerate() {
            if Some(i) == status_col {
                let class = if cell == IngestStatus::Staged.as_str() {
                    "status-staged"
                } else {
                    "status-error"
                };
                html.push_str(&format!("<td class=\"{class}\">{}</td>", escape_html(cell)));
            } else {
                html.push_str(&format!("<td>{}</td>", escape_html(cell)));
            }
        }
        html.push_str("</tr>\n");
        rows += 1;
    }
    html.push_str(&format!(
        "</table>\n<p>{rows} package(s)</p>\n</body>\n</html>\n"
    ));
    Ok(html)
}

fn merge_format_rows(
    format_log: &Path,
    record: &LogRecord,
    report: &Path,
) -> Result<usize, LogSinkError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(report)
        .map_err(csv_err)?;
    let report_headers = reader.headers().map_err(csv_err)?.clone();

    let (file, fresh) = open_append(format_log)?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_writer(file);
    if fresh {
        let header = FORMAT_LOG_PREFIX
            .iter()
            .copied()
            .chain(report_headers.iter());
        writer.write_record(header).map_err(csv_err)?;
    }

    let date = record.timestamp.format(LogRecord::TIMESTAMP_FORMAT).to_string();
    let prefix = [
        record.package_name.as_str(),
        record.organization.as_str(),
        record.external_identifier.as_str(),
        date.as_str(),
    ];
    let mut merged = 0;
    for row in reader.records() {
        let row = row.map_err(csv_err)?;
        writer
            .write_record(prefix.iter().copied().chain(row.iter()))
            .map_err(csv_err)?;
        merged += 1;
    }
    writer.flush()?;
    Ok(merged)
}

#[async_trait]
impl IngestLog for CsvIngestLog {
    async fn append(&self, record: &LogRecord) -> Result<(), LogSinkError> {
        let path = self.csv_path.clone();
        let record = record.clone();
        blocking(move || append_row(&path, &record)).await?;
        tracing::debug!(log = %self.csv_path.display(), "Ingest log row appended");
        Ok(())
    }

    async fn rebuild_digest(&self) -> Result<(), LogSinkError> {
        let csv_path = self.csv_path.clone();
        let html_path = self.html_path.clone();
        blocking(move || {
            let html = render_digest(&csv_path)?;
            if let Some(parent) = html_path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&html_path, html)?;
            Ok(())
        })
        .await?;
        tracing::debug!(digest = %self.html_path.display(), "Ingest digest rebuilt");
        Ok(())
    }

    async fn merge_format_report(
        &self,
        record: &LogRecord,
        report_path: &Path,
    ) -> Result<(), LogSinkError> {
        let format_log = self.format_log_path.clone();
        let record = record.clone();
        let report = report_path.to_path_buf();
        let rows = blocking(move || merge_format_rows(&format_log, &record, &report)).await?;
        tracing::debug!(rows, log = %self.format_log_path.display(), "Format report merged");
        Ok(())
    }
}
