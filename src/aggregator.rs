use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::ResolvedConfig;
use crate::curated::CuratedSourceLoader;
use crate::domain::{DatasetRecord, OrganismClass, RawRecord, SourceKind};
use crate::error::MinerError;
use crate::eutils::{HttpTransport, RegistryClient, RemoteQueryClient};
use crate::limiter::{RateLimiter, SystemClock};
use crate::organism::OrganismClassifier;
use crate::parser::RecordParser;
use crate::platform::PlatformMapper;

/// When a live result should be distrusted in favour of the curated list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FallbackPolicy {
    /// Zero live records while the curated list is non-empty counts as a
    /// failed acquisition. Off means an empty live result is accepted as is.
    pub empty_result_triggers_fallback: bool,
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        Self {
            empty_result_triggers_fallback: true,
        }
    }
}

/// How one configured source is acquired.
pub enum SourcePlan<L> {
    Live { source: SourceKind, client: L },
    Curated { source: SourceKind },
    /// A live source whose client could not be built; it goes straight to
    /// its curated catalog.
    Unavailable { source: SourceKind, reason: String },
}

impl<L> SourcePlan<L> {
    pub fn source(&self) -> SourceKind {
        match self {
            SourcePlan::Live { source, .. }
            | SourcePlan::Curated { source }
            | SourcePlan::Unavailable { source, .. } => *source,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionState {
    Pending,
    LiveAttempted,
    Succeeded,
    FellBack,
    /// Neither the live path nor the curated catalog produced a collection.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SourceStatus {
    /// Succeeded through the live registry.
    Live,
    /// Succeeded through the curated catalog, the only path for this source.
    Curated,
    /// Succeeded through the curated catalog after the live path failed.
    Fallback { reason: String },
    Failed { reason: String },
}

impl SourceStatus {
    pub fn is_failed(&self) -> bool {
        matches!(self, SourceStatus::Failed { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceReport {
    pub source: SourceKind,
    pub state: AcquisitionState,
    pub status: SourceStatus,
    pub records: usize,
    pub skipped_entries: usize,
    pub replaced: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub inserted: usize,
    pub replaced: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct AggregationResult {
    pub records: Vec<DatasetRecord>,
    pub sources: Vec<SourceReport>,
}

impl AggregationResult {
    pub fn count_by_source(&self, source: SourceKind) -> usize {
        self.records
            .iter()
            .filter(|record| record.source == source)
            .count()
    }

    pub fn count_by_class(&self, class: OrganismClass) -> usize {
        self.records
            .iter()
            .filter(|record| record.organism_class == class)
            .count()
    }

    pub fn report_for(&self, source: SourceKind) -> Option<&SourceReport> {
        self.sources.iter().find(|report| report.source == source)
    }
}

/// Owns one run's collection. Nothing outlives `finish`.
pub struct Aggregator {
    mapper: PlatformMapper,
    classifier: OrganismClassifier,
    parser: RecordParser,
    loader: CuratedSourceLoader,
    policy: FallbackPolicy,
    query: String,
    max_results: usize,
    collection: BTreeMap<(SourceKind, String), DatasetRecord>,
    reports: Vec<SourceReport>,
}

impl Aggregator {
    pub fn new(
        mapper: PlatformMapper,
        loader: CuratedSourceLoader,
        policy: FallbackPolicy,
        query: impl Into<String>,
        max_results: usize,
    ) -> Self {
        Self {
            mapper,
            classifier: OrganismClassifier::default(),
            parser: RecordParser::new(),
            loader,
            policy,
            query: query.into(),
            max_results,
            collection: BTreeMap::new(),
            reports: Vec::new(),
        }
    }

    pub fn from_config(config: &ResolvedConfig) -> Result<Self, MinerError> {
        let loader = match &config.curated_dir {
            Some(dir) => CuratedSourceLoader::with_override_dir(dir.clone()),
            None => CuratedSourceLoader::new(),
        };
        Ok(Self::new(
            PlatformMapper::builtin(SourceKind::NcbiGeo.label())?,
            loader,
            config.fallback,
            config.query.clone(),
            config.max_results,
        ))
    }

    pub fn len(&self) -> usize {
        self.collection.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collection.is_empty()
    }

    pub fn run<L: RegistryClient>(
        mut self,
        plans: Vec<SourcePlan<L>>,
    ) -> Result<AggregationResult, MinerError> {
        if plans.is_empty() {
            return Err(MinerError::Configuration("no sources enabled".to_string()));
        }
        for plan in plans {
            self.acquire(plan);
        }
        self.finish()
    }

    /// Drives one source from `Pending` to a terminal state and merges
    /// whatever it produced. Never fails: problems become the source status.
    pub fn acquire<L: RegistryClient>(&mut self, plan: SourcePlan<L>) -> &SourceReport {
        let source = plan.source();
        debug!(%source, state = ?AcquisitionState::Pending, "acquiring source");

        let report = match plan {
            SourcePlan::Curated { source } => match self.loader.load(source) {
                Ok(catalog) => {
                    info!(%source, records = catalog.records.len(), "loaded curated catalog");
                    self.settle(
                        source,
                        AcquisitionState::Succeeded,
                        SourceStatus::Curated,
                        catalog.records,
                        catalog.skipped,
                    )
                }
                Err(err) => self.fail(source, err),
            },
            SourcePlan::Unavailable { source, reason } => {
                let err = MinerError::SourceUnavailable {
                    origin: source,
                    reason,
                };
                self.fall_back(source, err.to_string(), 0)
            }
            SourcePlan::Live { source, client } => {
                info!(%source, state = ?AcquisitionState::LiveAttempted, "querying live registry");
                match self.live_records(source, &client) {
                    Ok((records, skipped)) => self.accept_live(source, records, skipped),
                    Err(err) => self.fall_back(source, err.to_string(), 0),
                }
            }
        };
        self.reports.push(report);
        &self.reports[self.reports.len() - 1]
    }

    /// Normalizes `records` and merges them under `(source, accession)`;
    /// a key seen before is overwritten by the newer record.
    pub fn merge(&mut self, source: SourceKind, records: Vec<RawRecord>) -> MergeStats {
        let mapper = self.mapper.with_label(source.label());
        let mut stats = MergeStats::default();
        for raw in records {
            let record = DatasetRecord::normalize(source, raw, &mapper, &self.classifier);
            let key = (source, record.accession.clone());
            if self.collection.insert(key, record).is_some() {
                stats.replaced += 1;
            } else {
                stats.inserted += 1;
            }
        }
        if stats.replaced > 0 {
            debug!(%source, replaced = stats.replaced, "merged over existing accessions");
        }
        stats
    }

    pub fn finish(self) -> Result<AggregationResult, MinerError> {
        if !self.reports.is_empty() && self.reports.iter().all(|report| report.status.is_failed()) {
            return Err(MinerError::AllSourcesFailed);
        }
        Ok(AggregationResult {
            records: self.collection.into_values().collect(),
            sources: self.reports,
        })
    }

    fn live_records<L: RegistryClient>(
        &self,
        source: SourceKind,
        client: &L,
    ) -> Result<(Vec<RawRecord>, usize), MinerError> {
        let documents = client
            .query(&self.query, self.max_results)
            .map_err(|err| MinerError::unavailable(source, err))?;

        let mut records = Vec::new();
        let mut skipped = 0usize;
        let mut malformed = 0usize;
        for document in &documents {
            match self.parser.parse(document) {
                Ok(outcome) => {
                    records.extend(outcome.records);
                    skipped += outcome.skipped;
                }
                Err(err) => {
                    warn!(%source, error = %err, "discarding summary document");
                    malformed += 1;
                }
            }
        }

        if !documents.is_empty() && malformed == documents.len() {
            return Err(MinerError::SourceUnavailable {
                origin: source,
                reason: format!("all {malformed} summary documents were malformed"),
            });
        }
        if skipped > 0 {
            warn!(%source, skipped, "skipped malformed summary entries");
        }
        Ok((records, skipped))
    }

    fn accept_live(
        &mut self,
        source: SourceKind,
        records: Vec<RawRecord>,
        skipped: usize,
    ) -> SourceReport {
        if records.is_empty() && self.policy.empty_result_triggers_fallback {
            match self.loader.load(source) {
                Ok(catalog) if !catalog.records.is_empty() => {
                    return self.fall_back_with(
                        source,
                        "live query returned no records".to_string(),
                        catalog.records,
                        skipped + catalog.skipped,
                    );
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(
                        %source,
                        error = %err,
                        "curated catalog unavailable; keeping empty live result"
                    );
                }
            }
        }
        info!(%source, records = records.len(), skipped, "live acquisition succeeded");
        self.settle(source, AcquisitionState::Succeeded, SourceStatus::Live, records, skipped)
    }

    fn fall_back(&mut self, source: SourceKind, reason: String, skipped: usize) -> SourceReport {
        match self.loader.load(source) {
            Ok(catalog) => {
                self.fall_back_with(source, reason, catalog.records, skipped + catalog.skipped)
            }
            Err(err) => self.fail(
                source,
                MinerError::CuratedData {
                    origin: source,
                    message: format!("{reason}; curated fallback failed: {err}"),
                },
            ),
        }
    }

    fn fall_back_with(
        &mut self,
        source: SourceKind,
        reason: String,
        curated: Vec<RawRecord>,
        skipped: usize,
    ) -> SourceReport {
        warn!(%source, %reason, records = curated.len(), "falling back to curated catalog");
        self.settle(
            source,
            AcquisitionState::FellBack,
            SourceStatus::Fallback { reason },
            curated,
            skipped,
        )
    }

    fn settle(
        &mut self,
        source: SourceKind,
        state: AcquisitionState,
        status: SourceStatus,
        records: Vec<RawRecord>,
        skipped: usize,
    ) -> SourceReport {
        let count = records.len();
        let stats = self.merge(source, records);
        SourceReport {
            source,
            state,
            status,
            records: count,
            skipped_entries: skipped,
            replaced: stats.replaced,
        }
    }

    fn fail(&self, source: SourceKind, err: MinerError) -> SourceReport {
        warn!(%source, error = %err, "source produced no records");
        SourceReport {
            source,
            state: AcquisitionState::Failed,
            status: SourceStatus::Failed {
                reason: err.to_string(),
            },
            records: 0,
            skipped_entries: 0,
            replaced: 0,
        }
    }
}

pub type LiveClient = RemoteQueryClient<HttpTransport, SystemClock>;

/// One plan per configured source, each live client with its own limiter.
pub fn build_plans(config: &ResolvedConfig) -> Vec<SourcePlan<LiveClient>> {
    config
        .sources
        .iter()
        .map(|&source| {
            if !source.is_live_capable() || config.offline {
                return SourcePlan::Curated { source };
            }
            match HttpTransport::new() {
                Ok(transport) => {
                    let limiter = RateLimiter::per_second(config.requests_per_second);
                    let client = RemoteQueryClient::new(transport, limiter)
                        .with_retry(config.retry)
                        .with_contact(config.contact.clone())
                        .with_batch_size(config.batch_size)
                        .with_page_size(config.page_size);
                    SourcePlan::Live { source, client }
                }
                Err(err) => {
                    warn!(%source, error = %err, "live client unavailable");
                    SourcePlan::Unavailable {
                        source,
                        reason: err.to_string(),
                    }
                }
            }
        })
        .collect()
}
