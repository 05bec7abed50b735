use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde_json::Value;
use tracing::{debug, warn};

use crate::domain::{RawRecord, SourceKind};
use crate::error::MinerError;
use crate::parser::ParseOutcome;

const GEO_CATALOG: &str = include_str!("../data/curated/geo.json");
const TENX_CATALOG: &str = include_str!("../data/curated/tenx.json");
const HTAN_CATALOG: &str = include_str!("../data/curated/htan.json");

/// Fixed per-source catalogs, embedded at build time.
///
/// An override directory may hold `<slug>.json` replacements (`ncbi.json`,
/// `10x.json`, `htan.json`); it is only ever read. Entries are taken as they
/// are: repeated accessions are left for the merge to collapse.
#[derive(Debug, Clone, Default)]
pub struct CuratedSourceLoader {
    override_dir: Option<Utf8PathBuf>,
}

impl CuratedSourceLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_override_dir(dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            override_dir: Some(dir.into()),
        }
    }

    pub fn override_path(&self, source: SourceKind) -> Option<Utf8PathBuf> {
        self.override_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.json", source.slug())))
    }

    pub fn load(&self, source: SourceKind) -> Result<ParseOutcome, MinerError> {
        match self.override_path(source) {
            Some(path) if path.as_std_path().exists() => {
                let content = read_catalog(&path)?;
                parse_catalog(source, &content)
            }
            _ => parse_catalog(source, bundled_catalog(source)),
        }
    }
}

pub fn bundled_catalog(source: SourceKind) -> &'static str {
    match source {
        SourceKind::NcbiGeo => GEO_CATALOG,
        SourceKind::TenX => TENX_CATALOG,
        SourceKind::Htan => HTAN_CATALOG,
    }
}

/// Only a file that is not a JSON array fails; an unusable entry is skipped
/// and counted.
pub fn parse_catalog(source: SourceKind, content: &str) -> Result<ParseOutcome, MinerError> {
    let entries: Vec<Value> =
        serde_json::from_str(content).map_err(|err| MinerError::CuratedData {
            origin: source,
            message: err.to_string(),
        })?;

    let mut outcome = ParseOutcome::default();
    for (index, entry) in entries.into_iter().enumerate() {
        match serde_json::from_value::<RawRecord>(entry) {
            Ok(record) if is_usable(&record) => outcome.records.push(record),
            Ok(_) => {
                debug!(%source, index, "skipping curated entry without accession or title");
                outcome.skipped += 1;
            }
            Err(err) => {
                debug!(%source, index, error = %err, "skipping curated entry");
                outcome.skipped += 1;
            }
        }
    }
    if outcome.skipped > 0 {
        warn!(%source, skipped = outcome.skipped, "skipped unusable curated entries");
    }
    Ok(outcome)
}

fn is_usable(record: &RawRecord) -> bool {
    !record.accession.trim().is_empty() && !record.title.trim().is_empty()
}

fn read_catalog(path: &Utf8Path) -> Result<String, MinerError> {
    fs::read_to_string(path.as_std_path())
        .map_err(|err| MinerError::Filesystem(format!("read {path}: {err}")))
}
