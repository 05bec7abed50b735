use std::collections::{BTreeMap, BTreeSet, HashSet};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::aggregator::AggregationResult;
use crate::domain::{DatasetRecord, OrganismClass, SourceKind};

pub const COLUMNS: [&str; 12] = [
    "S.No.",
    "Platform",
    "Accession",
    "Public Date",
    "Experiment Type",
    "Title",
    "Organism",
    "Summary (for Tissue)",
    "Samples",
    "Publication",
    "Download Link",
    "Source",
];
pub const SUMMARY_SHEET: &str = "Summary";
pub const ALL_DATASETS_SHEET: &str = "All Datasets";
pub const MAX_SHEET_NAME_CHARS: usize = 31;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OrganizeBy {
    #[default]
    Both,
    Platform,
    Organism,
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sheet {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Sheet {
    fn new(name: &str, columns: &[&str]) -> Self {
        Self {
            name: sanitize_sheet_name(name),
            columns: columns.iter().map(|column| column.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    fn datasets<'a>(name: &str, records: impl IntoIterator<Item = &'a DatasetRecord>) -> Self {
        let mut sheet = Self::new(name, &COLUMNS);
        // Serial numbers restart on every sheet.
        sheet.rows = records
            .into_iter()
            .enumerate()
            .map(|(index, record)| dataset_row(index + 1, record))
            .collect();
        sheet
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Workbook {
    pub generated_at: String,
    pub organize_by: OrganizeBy,
    pub sheets: Vec<Sheet>,
}

impl Workbook {
    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|sheet| sheet.name == name)
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|sheet| sheet.name.as_str()).collect()
    }
}

/// Counts shown in the summary sheet and the console summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionSummary {
    pub total: usize,
    pub by_source: BTreeMap<SourceKind, usize>,
    pub human: usize,
    pub other: usize,
    pub unique_organisms: usize,
    pub top_organisms: Vec<(String, usize)>,
}

impl CollectionSummary {
    pub fn from_records(records: &[DatasetRecord]) -> Self {
        let mut by_source = BTreeMap::new();
        let mut organisms: BTreeMap<&str, usize> = BTreeMap::new();
        let mut human = 0;
        for record in records {
            *by_source.entry(record.source).or_insert(0) += 1;
            *organisms.entry(record.organism_raw.as_str()).or_insert(0) += 1;
            if record.organism_class == OrganismClass::Human {
                human += 1;
            }
        }

        let mut top_organisms: Vec<(String, usize)> = organisms
            .iter()
            .filter(|(name, _)| !name.is_empty())
            .map(|(name, count)| (name.to_string(), *count))
            .collect();
        top_organisms.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        top_organisms.truncate(5);

        Self {
            total: records.len(),
            by_source,
            human,
            other: records.len() - human,
            unique_organisms: organisms.keys().filter(|name| !name.is_empty()).count(),
            top_organisms,
        }
    }
}

pub fn build_workbook(
    result: &AggregationResult,
    organize_by: OrganizeBy,
    generated_at: impl Into<String>,
) -> Workbook {
    let records = &result.records;
    let mut sheets = Vec::new();

    if organize_by == OrganizeBy::None {
        sheets.push(Sheet::datasets(ALL_DATASETS_SHEET, records));
    } else {
        sheets.push(summary_sheet(&CollectionSummary::from_records(records)));
        match organize_by {
            OrganizeBy::Platform => {
                for source in sources_present(records) {
                    sheets.push(Sheet::datasets(
                        source.label(),
                        records.iter().filter(|record| record.source == source),
                    ));
                }
            }
            OrganizeBy::Organism => {
                for (class, name) in [
                    (OrganismClass::Human, "Human"),
                    (OrganismClass::Other, "Other Organisms"),
                ] {
                    let group: Vec<&DatasetRecord> = records
                        .iter()
                        .filter(|record| record.organism_class == class)
                        .collect();
                    if !group.is_empty() {
                        sheets.push(Sheet::datasets(name, group));
                    }
                }
            }
            OrganizeBy::Both => {
                let groups = [(OrganismClass::Human, "Human"), (OrganismClass::Other, "Other")];
                for (class, prefix) in groups {
                    for source in sources_present(records) {
                        let group: Vec<&DatasetRecord> = records
                            .iter()
                            .filter(|record| record.organism_class == class)
                            .filter(|record| record.source == source)
                            .collect();
                        if !group.is_empty() {
                            let name = format!("{prefix} - {}", source.label());
                            sheets.push(Sheet::datasets(&name, group));
                        }
                    }
                }
            }
            OrganizeBy::None => {}
        }
    }

    dedupe_sheet_names(&mut sheets);
    Workbook {
        generated_at: generated_at.into(),
        organize_by,
        sheets,
    }
}

/// Strips `[ ] * ?`, turns `/ \ :` into `-`, and caps the length at 31 chars.
pub fn sanitize_sheet_name(name: &str) -> String {
    name.chars()
        .filter(|ch| !matches!(ch, '[' | ']' | '*' | '?'))
        .map(|ch| if matches!(ch, '/' | '\\' | ':') { '-' } else { ch })
        .take(MAX_SHEET_NAME_CHARS)
        .collect()
}

fn dataset_row(serial: usize, record: &DatasetRecord) -> Vec<Value> {
    vec![
        json!(serial),
        json!(record.platform_name),
        json!(record.accession),
        json!(record.public_date),
        json!(record.experiment_type),
        json!(record.title),
        json!(record.organism_raw),
        json!(record.tissue_summary),
        json!(record.sample_count),
        json!(record.publication_id),
        json!(record.download_link),
        json!(record.source.label()),
    ]
}

fn summary_sheet(summary: &CollectionSummary) -> Sheet {
    let mut sheet = Sheet::new(SUMMARY_SHEET, &["Metric", "Value"]);
    let mut push =
        |metric: String, value: usize| sheet.rows.push(vec![json!(metric), json!(value)]);
    push("Total Datasets".to_string(), summary.total);
    for (source, count) in &summary.by_source {
        push(format!("  {}", source.label()), *count);
    }
    push("Human Datasets".to_string(), summary.human);
    push("Other Organisms".to_string(), summary.other);
    push("Unique Organisms".to_string(), summary.unique_organisms);
    sheet
}

fn sources_present(records: &[DatasetRecord]) -> BTreeSet<SourceKind> {
    records.iter().map(|record| record.source).collect()
}

/// Truncation can collide two names; later ones get a numeric suffix.
fn dedupe_sheet_names(sheets: &mut [Sheet]) {
    let mut seen = HashSet::new();
    for sheet in sheets.iter_mut() {
        if seen.insert(sheet.name.clone()) {
            continue;
        }
        let mut counter = 2;
        loop {
            let suffix = format!(" ({counter})");
            let keep = MAX_SHEET_NAME_CHARS - suffix.chars().count();
            let base: String = sheet.name.chars().take(keep).collect();
            let candidate = format!("{base}{suffix}");
            if seen.insert(candidate.clone()) {
                sheet.name = candidate;
                break;
            }
            counter += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_and_replaces() {
        assert_eq!(sanitize_sheet_name("Human - [A]/B:C*?"), "Human - A-B-C");
        assert_eq!(sanitize_sheet_name(r"a\b"), "a-b");
    }

    #[test]
    fn sanitize_truncates_to_sheet_limit() {
        let long = "Other - An Extremely Long Source Label Name";
        let name = sanitize_sheet_name(long);
        assert_eq!(name.chars().count(), MAX_SHEET_NAME_CHARS);
        assert!(long.starts_with(&name));
    }

    #[test]
    fn colliding_names_get_suffixes() {
        let mut sheets = vec![
            Sheet::new("Human", &["x"]),
            Sheet::new("Human", &["x"]),
            Sheet::new("Human", &["x"]),
        ];
        dedupe_sheet_names(&mut sheets);
        let names: Vec<&str> = sheets.iter().map(|sheet| sheet.name.as_str()).collect();
        assert_eq!(names, vec!["Human", "Human (2)", "Human (3)"]);
    }

    #[test]
    fn summary_of_empty_collection() {
        let summary = CollectionSummary::from_records(&[]);
        assert_eq!(summary.total, 0);
        assert_eq!(summary.unique_organisms, 0);
        assert!(summary.top_organisms.is_empty());
    }
}
