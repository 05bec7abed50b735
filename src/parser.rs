use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

use crate::domain::RawRecord;
use crate::error::MinerError;

pub const DEFAULT_EXPERIMENT_TYPE: &str = "Spatial Transcriptomics";
pub const GEO_ACCESSION_URL: &str = "https://www.ncbi.nlm.nih.gov/geo/query/acc.cgi?acc=";

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static BARE_PMID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b(\d{7,9})\b").unwrap());

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParseOutcome {
    pub records: Vec<RawRecord>,
    pub skipped: usize,
}

/// Turns one `esummary` JSON document into raw records.
///
/// A document that is not JSON or has no `result` object is rejected as a
/// whole; a bad entry inside a good document is skipped and counted.
#[derive(Debug, Clone, Default)]
pub struct RecordParser;

impl RecordParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(&self, document: &str) -> Result<ParseOutcome, MinerError> {
        let root: Value = serde_json::from_str(document)
            .map_err(|err| MinerError::MalformedResponse(format!("esummary: {err}")))?;
        if let Some(error) = root.get("error").and_then(Value::as_str) {
            return Err(MinerError::MalformedResponse(format!("esummary: {error}")));
        }
        let result = root
            .get("result")
            .and_then(Value::as_object)
            .ok_or_else(|| {
                MinerError::MalformedResponse("esummary: missing result object".to_string())
            })?;

        let mut outcome = ParseOutcome::default();
        for (uid, entry) in entries(result) {
            match entry.ok_or_else(|| "uid listed but absent".to_string()).and_then(parse_entry) {
                Ok(record) => outcome.records.push(record),
                Err(reason) => {
                    debug!(uid = %uid, reason = %reason, "skipping summary entry");
                    outcome.skipped += 1;
                }
            }
        }
        Ok(outcome)
    }
}

/// Entries in `uids` order when present, otherwise every non-`uids` key.
fn entries(result: &Map<String, Value>) -> Vec<(String, Option<&Value>)> {
    match result.get("uids").and_then(Value::as_array) {
        Some(uids) => uids
            .iter()
            .map(|uid| {
                let key = scalar_text(uid).unwrap_or_default();
                let entry = result.get(&key);
                (key, entry)
            })
            .collect(),
        None => result
            .iter()
            .filter(|(key, _)| key.as_str() != "uids")
            .map(|(key, value)| (key.clone(), Some(value)))
            .collect(),
    }
}

fn parse_entry(entry: &Value) -> Result<RawRecord, String> {
    let object = entry
        .as_object()
        .ok_or_else(|| "entry is not an object".to_string())?;
    if let Some(error) = object.get("error").and_then(Value::as_str) {
        return Err(error.to_string());
    }

    let accession = field_text(object, "accession").ok_or_else(|| "missing accession".to_string())?;
    let title = field_text(object, "title")
        .map(|title| clean_text(&title))
        .ok_or_else(|| "missing title".to_string())?;

    let mut record = RawRecord::new(accession.clone(), title);
    record.organism_raw = field_text(object, "taxon").unwrap_or_default();
    record.platform_id = field_text(object, "gpl");
    // `pdat` keeps GEO's own `YYYY/MM/DD` shape.
    record.public_date = field_text(object, "pdat");
    record.tissue_summary = field_text(object, "summary")
        .map(|summary| clean_text(&summary))
        .filter(|summary| !summary.is_empty());
    record.sample_count = object.get("n_samples").and_then(parse_count);
    record.experiment_type = Some(experiment_type(object));
    record.publication_id = publication(object);
    record.download_link = Some(format!("{GEO_ACCESSION_URL}{accession}"));
    Ok(record)
}

fn experiment_type(object: &Map<String, Value>) -> String {
    let mut types: Vec<String> = Vec::new();
    let mut push = |value: String| {
        if !types.contains(&value) {
            types.push(value);
        }
    };

    if let Some(gds_type) = field_text(object, "gdstype").filter(|value| value != "Other") {
        push(gds_type);
    }
    if let Some(ptech_type) = field_text(object, "ptechtype") {
        push(ptech_type);
    }
    if let Some(entry_type) =
        field_text(object, "entrytype").filter(|value| value != "GSE" && value != "GDS")
    {
        push(entry_type);
    }
    // Older records carry `exptype` either as a scalar or a list.
    match object.get("exptype") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(scalar_text)
            .for_each(&mut push),
        Some(value) => {
            if let Some(text) = scalar_text(value) {
                push(text);
            }
        }
        None => {}
    }

    if types.is_empty() {
        DEFAULT_EXPERIMENT_TYPE.to_string()
    } else {
        types.join(", ")
    }
}

/// First non-empty of: `pubmedids`, pubmed `relations`, `extrelations`.
fn publication(object: &Map<String, Value>) -> Option<String> {
    let from_pubmed_ids = || {
        list_items(object.get("pubmedids")?)
            .into_iter()
            .filter_map(scalar_text)
            .find(|id| !id.is_empty() && id.chars().all(|ch| ch.is_ascii_digit()))
    };
    let from_relations = || {
        list_items(object.get("relations")?)
            .into_iter()
            .filter_map(flatten_text)
            .filter(|text| text.to_lowercase().contains("pubmed"))
            .find_map(|text| extract_pmid(&text))
    };
    let from_ext_relations = || {
        list_items(object.get("extrelations")?)
            .into_iter()
            .filter_map(flatten_text)
            .find_map(|text| extract_pmid(&text))
    };

    from_pubmed_ids()
        .or_else(from_relations)
        .or_else(from_ext_relations)
}

pub fn extract_pmid(text: &str) -> Option<String> {
    if let Some((_, rest)) = text.split_once("PMID:") {
        let digits: String = rest
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .chars()
            .filter(|ch| ch.is_ascii_digit())
            .collect();
        if !digits.is_empty() {
            return Some(digits);
        }
    }
    BARE_PMID
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

pub fn clean_text(text: &str) -> String {
    WHITESPACE.replace_all(text, " ").trim().to_string()
}

fn parse_count(value: &Value) -> Option<u32> {
    match value {
        Value::Number(number) => number.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(text) => text.trim().parse::<u32>().ok(),
        _ => None,
    }
}

fn field_text(object: &Map<String, Value>, key: &str) -> Option<String> {
    object
        .get(key)
        .and_then(scalar_text)
        .filter(|text| !text.is_empty())
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn flatten_text(value: &Value) -> Option<String> {
    match value {
        Value::Object(fields) => {
            let parts: Vec<String> = fields.values().filter_map(scalar_text).collect();
            (!parts.is_empty()).then(|| parts.join(" "))
        }
        other => scalar_text(other),
    }
}

fn list_items(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().collect(),
        Value::Null => Vec::new(),
        other => vec![other],
    }
}
