use serde_json::json;

use st_data_miner::aggregator::{AggregationResult, Aggregator, FallbackPolicy, SourcePlan};
use st_data_miner::curated::CuratedSourceLoader;
use st_data_miner::domain::SourceKind;
use st_data_miner::error::MinerError;
use st_data_miner::eutils::RegistryClient;
use st_data_miner::platform::PlatformMapper;
use st_data_miner::report::{COLUMNS, OrganizeBy, SUMMARY_SHEET, build_workbook};

struct NoRegistry;

impl RegistryClient for NoRegistry {
    fn query(&self, _expression: &str, _max_results: usize) -> Result<Vec<String>, MinerError> {
        Ok(Vec::new())
    }
}

fn curated_result() -> AggregationResult {
    Aggregator::new(
        PlatformMapper::builtin(SourceKind::NcbiGeo.label()).unwrap(),
        CuratedSourceLoader::new(),
        FallbackPolicy::default(),
        "q",
        10,
    )
    .run(vec![
        SourcePlan::<NoRegistry>::Curated {
            source: SourceKind::NcbiGeo,
        },
        SourcePlan::Curated {
            source: SourceKind::TenX,
        },
        SourcePlan::Curated {
            source: SourceKind::Htan,
        },
    ])
    .unwrap()
}

#[test]
fn single_sheet_layout() {
    let result = curated_result();
    let workbook = build_workbook(&result, OrganizeBy::None, "2024-05-01T00:00:00Z");
    assert_eq!(workbook.sheet_names(), vec!["All Datasets"]);

    let sheet = &workbook.sheets[0];
    assert_eq!(sheet.columns, COLUMNS.to_vec());
    assert_eq!(sheet.rows.len(), result.records.len());
    assert_eq!(sheet.rows[0][0], json!(1));
    assert_eq!(sheet.rows.last().unwrap()[0], json!(result.records.len()));
}

#[test]
fn both_layout_splits_by_organism_then_source() {
    let result = curated_result();
    let workbook = build_workbook(&result, OrganizeBy::Both, "2024-05-01T00:00:00Z");
    assert_eq!(
        workbook.sheet_names(),
        vec![
            SUMMARY_SHEET,
            "Human - NCBI GEO",
            "Human - 10x Genomics",
            "Human - HTAN",
            "Other - NCBI GEO",
            "Other - 10x Genomics",
        ]
    );

    let total_rows: usize = workbook.sheets[1..].iter().map(|sheet| sheet.rows.len()).sum();
    assert_eq!(total_rows, result.records.len());
    for sheet in &workbook.sheets[1..] {
        assert_eq!(sheet.rows[0][0], json!(1), "{}", sheet.name);
    }
}

#[test]
fn organism_layout() {
    let result = curated_result();
    let workbook = build_workbook(&result, OrganizeBy::Organism, "t");
    assert_eq!(
        workbook.sheet_names(),
        vec![SUMMARY_SHEET, "Human", "Other Organisms"]
    );
    let other = workbook.sheet("Other Organisms").unwrap();
    assert!(other.rows.iter().all(|row| row[6] != json!("Homo sapiens")));
}

#[test]
fn platform_layout_has_one_sheet_per_source() {
    let result = curated_result();
    let workbook = build_workbook(&result, OrganizeBy::Platform, "t");
    assert_eq!(
        workbook.sheet_names(),
        vec![SUMMARY_SHEET, "NCBI GEO", "10x Genomics", "HTAN"]
    );
    let htan = workbook.sheet("HTAN").unwrap();
    assert_eq!(htan.rows.len(), 12);
    assert!(htan.rows.iter().all(|row| row[11] == json!("HTAN")));
    // Unknown sample counts render as null.
    assert!(htan.rows.iter().all(|row| row[8].is_null()));
}

#[test]
fn summary_sheet_counts() {
    let result = curated_result();
    let workbook = build_workbook(&result, OrganizeBy::Both, "t");
    let summary = workbook.sheet(SUMMARY_SHEET).unwrap();
    assert_eq!(summary.columns, vec!["Metric", "Value"]);
    assert_eq!(summary.rows[0], vec![json!("Total Datasets"), json!(result.records.len())]);

    let metric = |name: &str| {
        summary
            .rows
            .iter()
            .find(|row| row[0] == json!(name))
            .map(|row| row[1].clone())
    };
    assert_eq!(metric("  HTAN"), Some(json!(12)));
    assert_eq!(metric("  10x Genomics"), Some(json!(16)));
    assert_eq!(metric("Unique Organisms"), Some(json!(2)));
}

#[test]
fn empty_collection_still_has_a_summary() {
    let result = AggregationResult {
        records: Vec::new(),
        sources: Vec::new(),
    };
    let workbook = build_workbook(&result, OrganizeBy::Both, "t");
    assert_eq!(workbook.sheet_names(), vec![SUMMARY_SHEET]);
}
