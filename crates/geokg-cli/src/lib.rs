//! GeoKG CLI - Pipeline wiring
//!
//! Builds the parse → align → hydrate → serialize pipeline from an
//! [`AppConfig`] so the binary and integration tests share one code path.

use geokg_align::{
    align_graph, create_embedding_client, default_artifact_dir, AlignmentHandler, AlignmentReport,
    EmbeddingClient,
};
use geokg_core::{AppConfig, EntityKind, GeoKgError, GraphOutput, Provenance, Result};
use geokg_extractor::{parse_with_report, DroppedTriplet, PromptHandler};
use geokg_graph::{FeatureFailure, OntologySerializer};
use geokg_hydrate::{GraphHydrator, HydrationReport, MacrostratHydrator, RateLimitedClient};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Config file when `path` is given (environment still wins), environment otherwise
pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::from_file(path)?.with_env_override()?,
        None => AppConfig::from_env()?,
    };
    Ok(config)
}

/// Embedding client for the configured provider
pub fn embedding_client(config: &AppConfig) -> Result<Arc<dyn EmbeddingClient>> {
    Ok(Arc::from(create_embedding_client(&config.embedding)?))
}

/// Artifact directory for `kind` and the embedder's model under the configured root
pub fn alignment_dir(config: &AppConfig, kind: EntityKind, embedder: &dyn EmbeddingClient) -> PathBuf {
    default_artifact_dir(&config.alignment.artifact_dir, kind, embedder.model_name())
}

/// Load a saved alignment vocabulary for `kind`
pub fn load_alignment(config: &AppConfig, kind: EntityKind) -> Result<AlignmentHandler> {
    let embedder = embedding_client(config)?;
    let dir = alignment_dir(config, kind, embedder.as_ref());
    AlignmentHandler::load(&dir, kind, embedder)
}

fn authority(config: &AppConfig) -> Result<MacrostratHydrator> {
    let client = Arc::new(RateLimitedClient::new(
        config.authority.source_name.clone(),
        &config.authority.rate_limit,
    )?);
    Ok(MacrostratHydrator::new(client, &config.authority))
}

/// Known names for `kind`, from a newline-delimited file or the authority
pub async fn vocabulary_names(
    config: &AppConfig,
    kind: EntityKind,
    names_file: Option<&Path>,
) -> Result<Vec<String>> {
    if let Some(path) = names_file {
        let content = std::fs::read_to_string(path)?;
        return Ok(content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect());
    }

    match kind {
        EntityKind::StratName => authority(config)?.fetch_strat_names(true).await,
        EntityKind::Mineral => authority(config)?.fetch_mineral_names().await,
        EntityKind::Location => Err(GeoKgError::ConfigError(
            "location vocabularies must be supplied with a names file".to_string(),
        )),
    }
}

/// Embed a vocabulary and persist it under the configured artifact root
pub async fn build_vocabulary(
    config: &AppConfig,
    kind: EntityKind,
    names_file: Option<&Path>,
) -> Result<(AlignmentHandler, PathBuf)> {
    let names = vocabulary_names(config, kind, names_file).await?;
    let embedder = embedding_client(config)?;
    let dir = alignment_dir(config, kind, embedder.as_ref());
    let handler = AlignmentHandler::build(kind, names, embedder).await?;
    handler.save(&dir)?;
    tracing::info!(kind = %kind, names = handler.len(), dir = %dir.display(), "Saved alignment vocabulary");
    Ok((handler, dir))
}

/// Geologic time intervals from the authority
pub async fn fetch_intervals(config: &AppConfig) -> Result<Vec<geokg_core::GeologicInterval>> {
    authority(config)?.fetch_intervals().await
}

/// Everything one pipeline run produced
#[derive(Debug, Serialize)]
pub struct PipelineOutput {
    pub graph: GraphOutput,
    #[serde(skip)]
    pub turtle: String,
    pub dropped: Vec<DroppedTriplet>,
    pub alignment: Option<AlignmentSummary>,
    pub hydration: HydrationReport,
    #[serde(skip)]
    pub feature_failures: Vec<FeatureFailure>,
}

/// Serializable form of [`AlignmentReport`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AlignmentSummary {
    pub aligned: usize,
    pub unchanged: usize,
    pub failed: usize,
}

impl From<AlignmentReport> for AlignmentSummary {
    fn from(report: AlignmentReport) -> Self {
        Self {
            aligned: report.aligned,
            unchanged: report.unchanged,
            failed: report.failed,
        }
    }
}

/// Configured extraction pipeline
pub struct Pipeline {
    config: AppConfig,
    prompt: PromptHandler,
    aligner: Option<AlignmentHandler>,
    hydrator: GraphHydrator,
    serializer: OntologySerializer,
}

impl Pipeline {
    /// Pipeline for `prompt`. The aligner is loaded only when alignment is enabled.
    pub fn new(config: AppConfig, prompt: PromptHandler) -> Result<Self> {
        let aligner = if config.alignment.enabled {
            Some(load_alignment(&config, prompt.object_kind)?)
        } else {
            None
        };
        let hydrator = GraphHydrator::from_config(&config)?;
        let serializer = OntologySerializer::from_config(&config.serializer)?;

        Ok(Self {
            config,
            prompt,
            aligner,
            hydrator,
            serializer,
        })
    }

    pub fn with_aligner(mut self, aligner: AlignmentHandler) -> Self {
        self.aligner = Some(aligner);
        self
    }

    pub fn with_hydrator(mut self, hydrator: GraphHydrator) -> Self {
        self.hydrator = hydrator;
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn prompt(&self) -> &PromptHandler {
        &self.prompt
    }

    pub fn parse(
        &self,
        raw: &str,
        provenance: Option<Provenance>,
    ) -> Result<(GraphOutput, Vec<DroppedTriplet>)> {
        parse_with_report(raw, &self.prompt, provenance)
    }

    /// Snap names onto the loaded vocabulary; `None` without an aligner
    pub async fn align(&self, graph: &mut GraphOutput) -> Option<AlignmentReport> {
        let aligner = self.aligner.as_ref()?;
        Some(align_graph(graph, aligner, self.config.alignment.threshold).await)
    }

    pub async fn hydrate(&self, graph: &mut GraphOutput) -> HydrationReport {
        self.hydrator.hydrate(graph).await
    }

    pub fn serialize(&self, graph: &GraphOutput) -> Result<(String, Vec<FeatureFailure>)> {
        let result = self.serializer.to_graph(graph);
        Ok((result.to_turtle()?, result.failures))
    }

    /// Parse, align, hydrate and serialize one model response
    pub async fn run(&self, raw: &str, provenance: Option<Provenance>) -> Result<PipelineOutput> {
        let (mut graph, dropped) = self.parse(raw, provenance)?;
        let alignment = self.align(&mut graph).await.map(AlignmentSummary::from);
        let hydration = self.hydrate(&mut graph).await;
        let (turtle, feature_failures) = self.serialize(&graph)?;

        tracing::info!(
            triplets = graph.triplets.len(),
            dropped = dropped.len(),
            subjects_hydrated = hydration.subjects.hydrated,
            objects_hydrated = hydration.objects.hydrated,
            feature_failures = feature_failures.len(),
            "Pipeline run complete"
        );

        Ok(PipelineOutput {
            graph,
            turtle,
            dropped,
            alignment,
            hydration,
            feature_failures,
        })
    }
}
