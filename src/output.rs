use std::fs;
use std::io::{self, Write};

use camino::{Utf8Path, Utf8PathBuf};
use clap::ValueEnum;
use rust_xlsxwriter::{Format, Worksheet, XlsxError};
use serde::Serialize;
use serde_json::Value;

use crate::aggregator::{AggregationResult, SourceReport, SourceStatus};
use crate::error::MinerError;
use crate::report::{CollectionSummary, OrganizeBy, Sheet, Workbook};

pub const DEFAULT_OUTPUT_STEM: &str = "spatial_transcriptomics_catalog";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    /// Excel workbook, one worksheet per sheet.
    #[default]
    Xlsx,
    /// The same layout as a JSON document.
    Json,
}

impl ReportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ReportFormat::Xlsx => "xlsx",
            ReportFormat::Json => "json",
        }
    }

    pub fn default_output(self) -> Utf8PathBuf {
        Utf8PathBuf::from(format!("{DEFAULT_OUTPUT_STEM}.{}", self.extension()))
    }
}

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

/// What one run produced, as printed at the end.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub output: String,
    pub format: ReportFormat,
    pub organize_by: OrganizeBy,
    pub sheets: Vec<String>,
    pub collection: CollectionSummary,
    pub sources: Vec<SourceReport>,
}

impl RunSummary {
    pub fn new(
        output: &Utf8Path,
        format: ReportFormat,
        result: &AggregationResult,
        workbook: &Workbook,
    ) -> Self {
        Self {
            output: output.to_string(),
            format,
            organize_by: workbook.organize_by,
            sheets: workbook
                .sheet_names()
                .into_iter()
                .map(str::to_string)
                .collect(),
            collection: CollectionSummary::from_records(&result.records),
            sources: result.sources.clone(),
        }
    }
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_summary(summary: &RunSummary) -> io::Result<()> {
        Self::print_json(summary)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

pub fn print_run_summary(summary: &RunSummary) {
    let green = "\x1b[32m";
    let yellow = "\x1b[33m";
    let cyan = "\x1b[36m";
    let red = "\x1b[31m";
    let reset = "\x1b[0m";

    println!("{cyan}ST-MINER summary{reset}");
    for report in &summary.sources {
        let (label, color) = match &report.status {
            SourceStatus::Live => ("live".to_string(), green),
            SourceStatus::Curated => ("curated".to_string(), green),
            SourceStatus::Fallback { reason } => (format!("curated fallback ({reason})"), yellow),
            SourceStatus::Failed { reason } => (format!("failed ({reason})"), red),
        };
        println!(
            "{color}  {}: {} records, {label}{reset}",
            report.source, report.records
        );
        if report.skipped_entries > 0 {
            println!("{yellow}    skipped entries: {}{reset}", report.skipped_entries);
        }
    }

    let collection = &summary.collection;
    println!("{green}Total datasets: {}{reset}", collection.total);
    println!("  Human: {}", collection.human);
    println!("  Other organisms: {}", collection.other);
    if !collection.top_organisms.is_empty() {
        println!("Top organisms:");
        for (organism, count) in &collection.top_organisms {
            println!("  {organism}: {count}");
        }
    }
    println!("{cyan}Report: {} ({} sheets){reset}", summary.output, summary.sheets.len());
}

/// Renders the workbook next to `dest` first, then renames it into place.
pub fn write_workbook(
    dest: &Utf8Path,
    workbook: &Workbook,
    format: ReportFormat,
) -> Result<(), MinerError> {
    let bytes = match format {
        ReportFormat::Xlsx => render_xlsx(workbook)?,
        ReportFormat::Json => render_json(workbook)?,
    };

    let parent = match dest.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    };
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| MinerError::Filesystem(format!("create {parent}: {err}")))?;
    let mut temp = tempfile::Builder::new()
        .prefix("st-miner-report")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| MinerError::Filesystem(err.to_string()))?;
    temp.write_all(&bytes).map_err(|err| MinerError::Filesystem(err.to_string()))?;
    temp.persist(dest.as_std_path())
        .map_err(|err| MinerError::Filesystem(format!("write {dest}: {err}")))?;
    Ok(())
}

pub fn render_xlsx(workbook: &Workbook) -> Result<Vec<u8>, MinerError> {
    let mut book = rust_xlsxwriter::Workbook::new();
    let header = Format::new().set_bold();
    for sheet in &workbook.sheets {
        let worksheet = book.add_worksheet();
        fill_worksheet(worksheet, sheet, &header)
            .map_err(|err| MinerError::Report(format!("sheet {:?}: {err}", sheet.name)))?;
    }
    book.save_to_buffer().map_err(|err| MinerError::Report(err.to_string()))
}

fn render_json(workbook: &Workbook) -> Result<Vec<u8>, MinerError> {
    let mut bytes =
        serde_json::to_vec_pretty(workbook).map_err(|err| MinerError::Report(err.to_string()))?;
    bytes.push(b'\n');
    Ok(bytes)
}

fn fill_worksheet(
    worksheet: &mut Worksheet,
    sheet: &Sheet,
    header: &Format,
) -> Result<(), XlsxError> {
    worksheet.set_name(&sheet.name)?;
    for (col, title) in sheet.columns.iter().enumerate() {
        worksheet.write_string_with_format(0, column_index(col)?, title, header)?;
    }
    for (index, row) in sheet.rows.iter().enumerate() {
        let row_index = u32::try_from(index + 1).map_err(|_| XlsxError::RowColumnLimitError)?;
        for (col, cell) in row.iter().enumerate() {
            let col = column_index(col)?;
            match cell {
                // Unknown values stay blank cells.
                Value::Null => {}
                Value::Bool(flag) => {
                    worksheet.write_boolean(row_index, col, *flag)?;
                }
                Value::Number(number) => match number.as_f64() {
                    Some(value) => {
                        worksheet.write_number(row_index, col, value)?;
                    }
                    None => {
                        worksheet.write_string(row_index, col, number.to_string())?;
                    }
                },
                Value::String(text) => {
                    worksheet.write_string(row_index, col, text)?;
                }
                other => {
                    worksheet.write_string(row_index, col, other.to_string())?;
                }
            }
        }
    }
    Ok(())
}

fn column_index(col: usize) -> Result<u16, XlsxError> {
    u16::try_from(col).map_err(|_| XlsxError::RowColumnLimitError)
}
