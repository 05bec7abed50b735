use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::MinerError;
use crate::organism::OrganismClassifier;
use crate::platform::PlatformMapper;

/// Origin of a record. Tags provenance and is never rewritten after parsing.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ValueEnum,
)]
pub enum SourceKind {
    #[serde(rename = "ncbi")]
    #[value(name = "ncbi")]
    NcbiGeo,
    #[serde(rename = "10x")]
    #[value(name = "10x")]
    TenX,
    #[serde(rename = "htan")]
    #[value(name = "htan")]
    Htan,
}

impl SourceKind {
    pub const ALL: [SourceKind; 3] = [SourceKind::NcbiGeo, SourceKind::TenX, SourceKind::Htan];

    pub fn label(&self) -> &'static str {
        match self {
            SourceKind::NcbiGeo => "NCBI GEO",
            SourceKind::TenX => "10x Genomics",
            SourceKind::Htan => "HTAN",
        }
    }

    pub fn slug(&self) -> &'static str {
        match self {
            SourceKind::NcbiGeo => "ncbi",
            SourceKind::TenX => "10x",
            SourceKind::Htan => "htan",
        }
    }

    /// Only GEO exposes a queryable API; the others are catalog-only.
    pub fn is_live_capable(&self) -> bool {
        matches!(self, SourceKind::NcbiGeo)
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for SourceKind {
    type Err = MinerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ncbi" | "geo" | "ncbi-geo" => Ok(SourceKind::NcbiGeo),
            "10x" | "tenx" | "10x-genomics" => Ok(SourceKind::TenX),
            "htan" => Ok(SourceKind::Htan),
            _ => Err(MinerError::Configuration(format!("unknown source: {value}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrganismClass {
    Human,
    Other,
}

impl fmt::Display for OrganismClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrganismClass::Human => write!(f, "Human"),
            OrganismClass::Other => write!(f, "Other"),
        }
    }
}

/// Record as produced by the parser or a curated catalog, before normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub accession: String,
    pub title: String,
    #[serde(default, rename = "organism")]
    pub organism_raw: String,
    #[serde(default)]
    pub platform_id: Option<String>,
    #[serde(default)]
    pub platform_name: Option<String>,
    #[serde(default)]
    pub experiment_type: Option<String>,
    #[serde(default)]
    pub publication_id: Option<String>,
    #[serde(default)]
    pub tissue_summary: Option<String>,
    #[serde(default)]
    pub sample_count: Option<u32>,
    #[serde(default)]
    pub public_date: Option<String>,
    #[serde(default)]
    pub download_link: Option<String>,
}

impl RawRecord {
    pub fn new(accession: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            accession: accession.into(),
            title: title.into(),
            organism_raw: String::new(),
            platform_id: None,
            platform_name: None,
            experiment_type: None,
            publication_id: None,
            tissue_summary: None,
            sample_count: None,
            public_date: None,
            download_link: None,
        }
    }
}

/// Normalized dataset record handed to the reporting layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetRecord {
    pub source: SourceKind,
    pub accession: String,
    pub platform_id: Option<String>,
    pub platform_name: String,
    pub title: String,
    pub organism_raw: String,
    pub organism_class: OrganismClass,
    pub experiment_type: Option<String>,
    pub publication_id: Option<String>,
    pub tissue_summary: Option<String>,
    pub sample_count: Option<u32>,
    pub public_date: Option<String>,
    pub download_link: Option<String>,
}

impl DatasetRecord {
    /// Applies platform mapping and organism classification exactly once.
    ///
    /// A directly assigned `platform_name` (curated entries) wins over the
    /// mapper; a blank one is treated as absent.
    pub fn normalize(
        source: SourceKind,
        raw: RawRecord,
        mapper: &PlatformMapper,
        classifier: &OrganismClassifier,
    ) -> Self {
        let platform_name = raw
            .platform_name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| mapper.resolve(raw.platform_id.as_deref()));
        let organism_class = classifier.classify(Some(raw.organism_raw.as_str()));
        Self {
            source,
            accession: raw.accession,
            platform_id: raw.platform_id,
            platform_name,
            title: raw.title,
            organism_raw: raw.organism_raw,
            organism_class,
            experiment_type: raw.experiment_type,
            publication_id: raw.publication_id,
            tissue_summary: raw.tissue_summary,
            sample_count: raw.sample_count,
            public_date: raw.public_date,
            download_link: raw.download_link,
        }
    }

    pub fn key(&self) -> (SourceKind, &str) {
        (self.source, self.accession.as_str())
    }
}
