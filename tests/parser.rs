use assert_matches::assert_matches;

use st_data_miner::error::MinerError;
use st_data_miner::parser::{DEFAULT_EXPERIMENT_TYPE, RecordParser};

const FIVE_ENTRIES_THIRD_BROKEN: &str = r#"{
  "header": {"type": "esummary", "version": "0.3"},
  "result": {
    "uids": ["200001", "200002", "200003", "200004", "200005"],
    "200001": {
      "uid": "200001",
      "accession": "GSE200001",
      "title": "Visium of human   dorsolateral prefrontal cortex",
      "summary": "Spatial gene expression\n in human DLPFC.",
      "gpl": "24676",
      "taxon": "Homo sapiens",
      "gdstype": "Expression profiling by high throughput sequencing",
      "entrytype": "GSE",
      "pdat": "2021/02/08",
      "n_samples": 12,
      "pubmedids": ["33558695"]
    },
    "200002": {
      "uid": "200002",
      "accession": "GSE200002",
      "title": "Slide-seq of mouse hippocampus",
      "gpl": "24247;21263",
      "taxon": "Mus musculus",
      "pdat": "2019/03/28",
      "n_samples": "4",
      "pubmedids": [],
      "relations": [{"relationtype": "PubMed", "targetobject": "PMID: 30923225"}]
    },
    "200003": {
      "uid": "200003",
      "title": "Entry without an accession"
    },
    "200004": {
      "uid": "200004",
      "accession": "GSE200004",
      "title": "Multi-species reference",
      "taxon": "Homo sapiens; Mus musculus",
      "n_samples": "n/a",
      "extrelations": [{"relationtype": "SRA", "targetobject": "SRP123456"}]
    },
    "200005": {
      "uid": "200005",
      "accession": "GSE200005",
      "title": "Undated series"
    }
  }
}"#;

#[test]
fn partial_batch_keeps_good_entries() {
    let outcome = RecordParser::new().parse(FIVE_ENTRIES_THIRD_BROKEN).unwrap();
    assert_eq!(outcome.records.len(), 4);
    assert_eq!(outcome.skipped, 1);

    let accessions: Vec<&str> = outcome
        .records
        .iter()
        .map(|record| record.accession.as_str())
        .collect();
    assert_eq!(accessions, vec!["GSE200001", "GSE200002", "GSE200004", "GSE200005"]);
}

#[test]
fn fields_are_extracted_and_cleaned() {
    let outcome = RecordParser::new().parse(FIVE_ENTRIES_THIRD_BROKEN).unwrap();
    let first = &outcome.records[0];
    assert_eq!(first.title, "Visium of human dorsolateral prefrontal cortex");
    assert_eq!(first.organism_raw, "Homo sapiens");
    assert_eq!(first.platform_id.as_deref(), Some("24676"));
    assert_eq!(first.public_date.as_deref(), Some("2021/02/08"));
    assert_eq!(first.sample_count, Some(12));
    assert_eq!(first.publication_id.as_deref(), Some("33558695"));
    assert_eq!(
        first.tissue_summary.as_deref(),
        Some("Spatial gene expression in human DLPFC.")
    );
    assert_eq!(
        first.experiment_type.as_deref(),
        Some("Expression profiling by high throughput sequencing")
    );
    assert_eq!(
        first.download_link.as_deref(),
        Some("https://www.ncbi.nlm.nih.gov/geo/query/acc.cgi?acc=GSE200001")
    );

    let second = &outcome.records[1];
    assert_eq!(second.sample_count, Some(4));
    assert_eq!(second.publication_id.as_deref(), Some("30923225"));
}

#[test]
fn unknown_values_stay_absent() {
    let outcome = RecordParser::new().parse(FIVE_ENTRIES_THIRD_BROKEN).unwrap();
    let multi = &outcome.records[2];
    assert_eq!(multi.sample_count, None);
    assert_eq!(multi.publication_id, None);

    let bare = &outcome.records[3];
    assert_eq!(bare.organism_raw, "");
    assert_eq!(bare.platform_id, None);
    assert_eq!(bare.public_date, None);
    assert_eq!(bare.experiment_type.as_deref(), Some(DEFAULT_EXPERIMENT_TYPE));
}

#[test]
fn per_entry_errors_are_skipped() {
    let document = r#"{"result":{"uids":["1","2","3"],
        "1":{"accession":"GSE1","title":"ok"},
        "2":{"error":"cannot get document summary"}}}"#;
    let outcome = RecordParser::new().parse(document).unwrap();
    assert_eq!(outcome.records.len(), 1);
    assert_eq!(outcome.skipped, 2);
}

#[test]
fn unreadable_documents_are_rejected_whole() {
    let parser = RecordParser::new();
    assert_matches!(
        parser.parse("<eSummaryResult>"),
        Err(MinerError::MalformedResponse(_))
    );
    assert_matches!(
        parser.parse(r#"{"error":"API rate limit exceeded"}"#),
        Err(MinerError::MalformedResponse(_))
    );
    assert_matches!(
        parser.parse(r#"{"header":{}}"#),
        Err(MinerError::MalformedResponse(_))
    );
}

#[test]
fn empty_result_is_not_an_error() {
    let outcome = RecordParser::new()
        .parse(r#"{"result":{"uids":[]}}"#)
        .unwrap();
    assert!(outcome.records.is_empty());
    assert_eq!(outcome.skipped, 0);
}
