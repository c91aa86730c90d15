//! Report writers
//!
//! Both formats write `<output_dir>/<category name>_analysis_<unix ts>.<ext>`.
//! The xlsx workbook holds one `data` sheet with a bold, frozen header row.
//! The CSV file starts with a UTF-8 byte order mark so spreadsheet tools pick
//! the right encoding for Cyrillic names.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use rust_xlsxwriter::{Format, Workbook};
use tracing::info;

use crate::domain::{ExportError, Report, ReportExporter};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

const SHEET_NAME: &str = "data";

/// Widths for rank, product id, name, query, frequency, product count, status
const COLUMN_WIDTHS: [f64; 7] = [8.0, 14.0, 50.0, 50.0, 14.0, 16.0, 12.0];

/// Excel workbook, the format handed to end users
#[derive(Debug, Clone)]
pub struct XlsxReportExporter {
    output_dir: PathBuf,
}

impl XlsxReportExporter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    fn render(report: &Report) -> Result<Vec<u8>, ExportError> {
        let mut workbook = Workbook::new();
        let header = Format::new().set_bold();

        let sheet = workbook.add_worksheet();
        sheet.set_name(SHEET_NAME)?;
        for (col, (title, width)) in (0u16..).zip(Report::HEADERS.iter().zip(COLUMN_WIDTHS)) {
            sheet.write_string_with_format(0, col, *title, &header)?;
            sheet.set_column_width(col, width)?;
        }
        sheet.set_freeze_panes(1, 0)?;

        for (row, line) in (1u32..).zip(&report.rows) {
            sheet.write_number(row, 0, line.rank)?;
            sheet.write_number(row, 1, line.product_id as f64)?;
            sheet.write_string(row, 2, &line.name)?;
            sheet.write_string(row, 3, &line.primary_query)?;
            sheet.write_number(row, 4, line.frequency_count as f64)?;
            sheet.write_number(row, 5, line.product_count as f64)?;
            sheet.write_string(row, 6, line.status.to_string())?;
        }

        Ok(workbook.save_to_buffer()?)
    }
}

impl ReportExporter for XlsxReportExporter {
    fn export(&self, report: &Report) -> Result<PathBuf, ExportError> {
        let bytes = Self::render(report)?;
        let (path, mut file) = create_report_file(&self.output_dir, report, "xlsx")?;
        file.write_all(&bytes)?;
        file.flush()?;

        info!("💾 Report saved: {} ({} rows)", path.display(), report.rows.len());
        Ok(path)
    }
}

/// Plain CSV, for piping into other tools
#[derive(Debug, Clone)]
pub struct CsvReportExporter {
    output_dir: PathBuf,
}

impl CsvReportExporter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }
}

impl ReportExporter for CsvReportExporter {
    fn export(&self, report: &Report) -> Result<PathBuf, ExportError> {
        let (path, mut file) = create_report_file(&self.output_dir, report, "csv")?;
        file.write_all(UTF8_BOM)?;

        let mut writer = csv::Writer::from_writer(file);
        writer.write_record(Report::HEADERS)?;
        for row in &report.rows {
            writer.write_record([
                row.rank.to_string(),
                row.product_id.to_string(),
                row.name.clone(),
                row.primary_query.clone(),
                row.frequency_count.to_string(),
                row.product_count.to_string(),
                row.status.to_string(),
            ])?;
        }
        writer.flush()?;

        info!("💾 Report saved: {} ({} rows)", path.display(), report.rows.len());
        Ok(path)
    }
}

/// Create the first free `<stem>[_N].<extension>` in `output_dir`.
/// Files are opened with `create_new`, so concurrent exports of the same
/// category in the same second never share or truncate a file.
fn create_report_file(
    output_dir: &Path,
    report: &Report,
    extension: &str,
) -> Result<(PathBuf, File), ExportError> {
    fs::create_dir_all(output_dir).map_err(|source| ExportError::OutputDirectory {
        path: output_dir.display().to_string(),
        source,
    })?;

    let stem = format!(
        "{}_analysis_{}",
        sanitise_file_stem(&report.metadata.category_name, &report.metadata.category_id),
        report.metadata.generated_at.timestamp()
    );

    let mut suffix = 0u32;
    loop {
        let name = if suffix == 0 {
            format!("{stem}.{extension}")
        } else {
            format!("{stem}_{suffix}.{extension}")
        };
        let path = output_dir.join(name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => suffix += 1,
            Err(e) => return Err(e.into()),
        }
    }
}

/// Keeps letters (any script), digits, `-` and `_`; everything else becomes `_`.
/// Falls back to the category id when the name has nothing usable.
fn sanitise_file_stem(name: &str, fallback: &str) -> String {
    let clean = |raw: &str| {
        let mapped: String = raw
            .trim()
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        mapped.trim_matches('_').to_string()
    };

    let stem = clean(name);
    if !stem.is_empty() {
        return stem;
    }
    let stem = clean(fallback);
    if stem.is_empty() { "category".to_string() } else { stem }
}
