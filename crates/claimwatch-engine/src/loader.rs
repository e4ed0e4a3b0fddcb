//! CSV loading and preprocessing.
//!
//! The loader reads the `provider_month_summary` table under either its own
//! column names or the raw public dataset's HHS names. Rows sharing
//! (provider, month, procedure) are collapsed on load. Before collapsing, the
//! loader counts how many source rows carried each paid amount; `preprocess`
//! writes those counts next to the summary as `<stem>_paid_counts.csv` so a
//! raw file and its preprocessed summary produce the same store.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use claimwatch_core::constants::CENTS_PER_DOLLAR;
use claimwatch_core::types::parse_cents;
use claimwatch_core::{DataLoadError, MemoryStore, ProviderId, ProviderMonthRecord, YearMonth};
use serde::Serialize;
use tracing::{debug, info};

/// Accepted header names per logical column, summary name first.
const PROVIDER_ID: &[&str] = &["provider_id", "npi", "BILLING_PROVIDER_NPI_NUM"];
const MONTH: &[&str] = &["month", "service_month", "CLAIM_FROM_MONTH"];
const CLAIM_COUNT: &[&str] = &["claim_count", "total_claims", "TOTAL_CLAIMS"];
const BENEFICIARY_COUNT: &[&str] = &["beneficiary_count", "beneficiaries", "TOTAL_UNIQUE_BENEFICIARIES"];
const PAID_AMOUNT: &[&str] = &["paid_amount", "total_paid", "TOTAL_PAID"];
const PROCEDURE_CODE: &[&str] = &["procedure_code", "HCPCS_CODE"];
const PER_CLAIM_REVENUE: &[&str] = &["per_claim_revenue", "revenue_per_claim"];
const ROW_COUNT: &[&str] = &["row_count"];

fn io_err(e: std::io::Error) -> DataLoadError {
    DataLoadError::Io(e.to_string())
}

fn csv_err(e: csv::Error) -> DataLoadError {
    let line = e.position().map_or(0, csv::Position::line);
    let message = e.to_string();
    match e.into_kind() {
        csv::ErrorKind::Io(io) => io_err(io),
        _ => DataLoadError::Csv { line, message },
    }
}

/// Attach the CSV line to a field-level parse failure.
fn at_line(line: u64, e: DataLoadError) -> DataLoadError {
    DataLoadError::Csv {
        line,
        message: e.to_string(),
    }
}

/// Resolved column positions for one file.
struct Columns {
    provider_id: usize,
    month: usize,
    claim_count: usize,
    beneficiary_count: Option<usize>,
    paid_amount: usize,
    procedure_code: Option<usize>,
}

fn find(headers: &csv::StringRecord, aliases: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|h| aliases.iter().any(|a| h.trim().eq_ignore_ascii_case(a)))
}

fn require(headers: &csv::StringRecord, aliases: &[&str]) -> Result<usize, DataLoadError> {
    find(headers, aliases).ok_or_else(|| DataLoadError::MissingColumn(aliases[0].to_string()))
}

impl Columns {
    fn resolve(headers: &csv::StringRecord) -> Result<Self, DataLoadError> {
        Ok(Self {
            provider_id: require(headers, PROVIDER_ID)?,
            month: require(headers, MONTH)?,
            claim_count: require(headers, CLAIM_COUNT)?,
            beneficiary_count: find(headers, BENEFICIARY_COUNT),
            paid_amount: require(headers, PAID_AMOUNT)?,
            procedure_code: find(headers, PROCEDURE_CODE),
        })
    }
}

/// Parse a non-negative integer count. Integral float text such as `12.0` is accepted.
pub fn parse_count(raw: &str) -> Result<u64, DataLoadError> {
    let s = raw.trim();
    if let Ok(n) = s.parse::<u64>() {
        return Ok(n);
    }
    match s.parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 && v.fract() == 0.0 && v <= u64::MAX as f64 => Ok(v as u64),
        _ => Err(DataLoadError::InvalidCount(raw.to_string())),
    }
}

fn field<'r>(record: &'r csv::StringRecord, idx: usize) -> &'r str {
    record.get(idx).unwrap_or("")
}

fn parse_row(record: &csv::StringRecord, cols: &Columns) -> Result<ProviderMonthRecord, DataLoadError> {
    let beneficiary_count = match cols.beneficiary_count.map(|i| field(record, i).trim()) {
        None | Some("") => 0,
        Some(raw) => parse_count(raw)?,
    };
    let procedure_code = cols
        .procedure_code
        .map(|i| field(record, i).trim())
        .filter(|c| !c.is_empty())
        .map(str::to_string);

    Ok(ProviderMonthRecord {
        provider_id: ProviderId::parse(field(record, cols.provider_id))?,
        month: YearMonth::parse(field(record, cols.month))?,
        claim_count: parse_count(field(record, cols.claim_count))?,
        beneficiary_count,
        paid_cents: parse_cents(field(record, cols.paid_amount))?,
        procedure_code,
    })
}

/// Read billing rows from CSV text, without collapsing.
///
/// # Errors
///
/// - [`DataLoadError::MissingColumn`] if a required column has no recognised header
/// - [`DataLoadError::Csv`] for malformed records or unparseable fields, with the line number
/// - [`DataLoadError::Empty`] if there are no data rows
pub fn read_records<R: Read>(reader: R) -> Result<Vec<ProviderMonthRecord>, DataLoadError> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);
    let headers = rdr.headers().map_err(csv_err)?.clone();
    let cols = Columns::resolve(&headers)?;

    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result.map_err(csv_err)?;
        let line = record.position().map_or(0, csv::Position::line);
        if record.iter().all(str::is_empty) {
            continue;
        }
        rows.push(parse_row(&record, &cols).map_err(|e| at_line(line, e))?);
    }

    if rows.is_empty() {
        return Err(DataLoadError::Empty);
    }
    Ok(rows)
}

/// Sum rows sharing (provider, month, procedure). Output is ordered by that key.
pub fn collapse(records: Vec<ProviderMonthRecord>) -> Vec<ProviderMonthRecord> {
    type Key = (ProviderId, YearMonth, Option<String>);
    let mut merged: BTreeMap<Key, (u64, u64, u64)> = BTreeMap::new();
    for r in records {
        let totals = merged
            .entry((r.provider_id, r.month, r.procedure_code))
            .or_default();
        totals.0 = totals.0.saturating_add(r.claim_count);
        totals.1 = totals.1.saturating_add(r.beneficiary_count);
        totals.2 = totals.2.saturating_add(r.paid_cents);
    }
    merged
        .into_iter()
        .map(|((provider_id, month, procedure_code), (claims, benes, paid))| ProviderMonthRecord {
            provider_id,
            month,
            claim_count: claims,
            beneficiary_count: benes,
            paid_cents: paid,
            procedure_code,
        })
        .collect()
}

/// Count source rows per (provider, paid amount). Output is ordered by that key.
pub fn count_paid_amounts(records: &[ProviderMonthRecord]) -> Vec<(ProviderId, u64, u64)> {
    let mut counts: BTreeMap<(&ProviderId, u64), u64> = BTreeMap::new();
    for r in records {
        *counts.entry((&r.provider_id, r.paid_cents)).or_default() += 1;
    }
    counts
        .into_iter()
        .map(|((id, amount), rows)| (id.clone(), amount, rows))
        .collect()
}

/// Companion paid amount counts file for a summary: `<dir>/<stem>_paid_counts.csv`.
pub fn paid_counts_path(summary: &Path) -> PathBuf {
    let stem = summary
        .file_stem()
        .map_or_else(|| "provider_month_summary".to_string(), |s| s.to_string_lossy().into_owned());
    summary.with_file_name(format!("{stem}_paid_counts.csv"))
}

/// Read a paid amount counts table: `provider_id, paid_amount, row_count`.
pub fn read_paid_counts<R: Read>(reader: R) -> Result<Vec<(ProviderId, u64, u64)>, DataLoadError> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let headers = rdr.headers().map_err(csv_err)?.clone();
    let id_col = require(&headers, PROVIDER_ID)?;
    let amount_col = require(&headers, PAID_AMOUNT)?;
    let rows_col = require(&headers, ROW_COUNT)?;

    let mut out = Vec::new();
    for result in rdr.records() {
        let record = result.map_err(csv_err)?;
        let line = record.position().map_or(0, csv::Position::line);
        let id = ProviderId::parse(field(&record, id_col)).map_err(|e| at_line(line, e))?;
        let amount = parse_cents(field(&record, amount_col)).map_err(|e| at_line(line, e))?;
        let rows = parse_count(field(&record, rows_col)).map_err(|e| at_line(line, e))?;
        out.push((id, amount, rows));
    }
    Ok(out)
}

#[derive(Debug, Serialize)]
struct PaidCountRow<'a> {
    provider_id: &'a str,
    paid_amount: String,
    row_count: u64,
}

/// Write a paid amount counts table.
pub fn write_paid_counts<W: Write>(counts: &[(ProviderId, u64, u64)], writer: W) -> Result<(), DataLoadError> {
    let mut wtr = csv::Writer::from_writer(writer);
    for (id, amount, rows) in counts {
        wtr.serialize(PaidCountRow {
            provider_id: id.as_str(),
            paid_amount: dollars_text(*amount),
            row_count: *rows,
        })
        .map_err(csv_err)?;
    }
    wtr.flush().map_err(io_err)
}

/// Load a summary or raw CSV file into an in-memory store.
///
/// When a companion counts file from [`paid_counts_path`] exists, its paid
/// amount counts replace the ones taken from the loaded rows.
pub fn load_store(path: &Path) -> Result<MemoryStore, DataLoadError> {
    let file = fs::File::open(path).map_err(io_err)?;
    let raw = read_records(file)?;
    let raw_rows = raw.len();

    let companion = paid_counts_path(path);
    let counts = if companion.is_file() {
        let counts = read_paid_counts(fs::File::open(&companion).map_err(io_err)?)?;
        debug!(path = %companion.display(), entries = counts.len(), "loaded paid amount counts");
        counts
    } else {
        count_paid_amounts(&raw)
    };

    let store = MemoryStore::new(collapse(raw)).with_paid_amount_counts(counts);
    info!(
        path = %path.display(),
        raw_rows,
        rows = store.record_count(),
        providers = store.provider_count(),
        "loaded billing aggregates"
    );
    Ok(store)
}

/// Read a `peer_revenue_distribution` table: `provider_id, per_claim_revenue`.
pub fn read_peer_revenue<R: Read>(reader: R) -> Result<Vec<(ProviderId, f64)>, DataLoadError> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let headers = rdr.headers().map_err(csv_err)?.clone();
    let id_col = require(&headers, PROVIDER_ID)?;
    let rev_col = require(&headers, PER_CLAIM_REVENUE)?;

    let mut out = Vec::new();
    for result in rdr.records() {
        let record = result.map_err(csv_err)?;
        let line = record.position().map_or(0, csv::Position::line);
        let id = ProviderId::parse(field(&record, id_col)).map_err(|e| at_line(line, e))?;
        let raw = field(&record, rev_col);
        let revenue = match raw.parse::<f64>() {
            Ok(v) if v.is_finite() && v >= 0.0 => v,
            _ => return Err(at_line(line, DataLoadError::InvalidAmount(raw.to_string()))),
        };
        out.push((id, revenue));
    }

    if out.is_empty() {
        return Err(DataLoadError::Empty);
    }
    Ok(out)
}

pub fn load_peer_revenue(path: &Path) -> Result<Vec<(ProviderId, f64)>, DataLoadError> {
    let file = fs::File::open(path).map_err(io_err)?;
    let peers = read_peer_revenue(file)?;
    debug!(path = %path.display(), samples = peers.len(), "loaded peer revenue table");
    Ok(peers)
}

fn dollars_text(cents: u64) -> String {
    format!("{}.{:02}", cents / CENTS_PER_DOLLAR, cents % CENTS_PER_DOLLAR)
}

/// One row of the `provider_month_summary` CSV.
#[derive(Debug, Serialize)]
struct SummaryRow<'a> {
    provider_id: &'a str,
    month: String,
    claim_count: u64,
    beneficiary_count: u64,
    paid_amount: String,
    procedure_code: &'a str,
}

/// Write collapsed rows as a `provider_month_summary` CSV.
pub fn write_summary<W: Write>(records: &[ProviderMonthRecord], writer: W) -> Result<(), DataLoadError> {
    let mut wtr = csv::Writer::from_writer(writer);
    for r in records {
        wtr.serialize(SummaryRow {
            provider_id: r.provider_id.as_str(),
            month: r.month.to_string(),
            claim_count: r.claim_count,
            beneficiary_count: r.beneficiary_count,
            paid_amount: dollars_text(r.paid_cents),
            procedure_code: r.procedure_code.as_deref().unwrap_or(""),
        })
        .map_err(csv_err)?;
    }
    wtr.flush().map_err(io_err)
}

/// Counts reported by [`preprocess`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreprocessSummary {
    pub input_rows: usize,
    pub output_rows: usize,
    pub providers: usize,
    /// Entries written to the paid amount counts file.
    pub paid_amounts: usize,
}

/// Aggregate a raw dataset into a `provider_month_summary` CSV at `output`,
/// plus its paid amount counts at [`paid_counts_path`]`(output)`.
pub fn preprocess(input: &Path, output: &Path) -> Result<PreprocessSummary, DataLoadError> {
    info!(input = %input.display(), "reading raw dataset");
    let file = fs::File::open(input).map_err(io_err)?;
    let raw = read_records(file)?;
    let input_rows = raw.len();
    let counts = count_paid_amounts(&raw);
    let rows = collapse(raw);
    let providers = rows.iter().map(|r| &r.provider_id).collect::<BTreeSet<_>>().len();

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let out = fs::File::create(output).map_err(io_err)?;
    write_summary(&rows, std::io::BufWriter::new(out))?;
    let counts_out = fs::File::create(paid_counts_path(output)).map_err(io_err)?;
    write_paid_counts(&counts, std::io::BufWriter::new(counts_out))?;

    let summary = PreprocessSummary {
        input_rows,
        output_rows: rows.len(),
        providers,
        paid_amounts: counts.len(),
    };
    info!(output = %output.display(), ?summary, "wrote provider month summary");
    Ok(summary)
}
