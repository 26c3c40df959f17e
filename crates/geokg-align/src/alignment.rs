//! Entity alignment
//!
//! An [`AlignmentHandler`] holds a vocabulary of known entity names and their
//! embeddings. Free-text names are snapped onto the closest known name when
//! the cosine similarity clears a threshold, and returned unchanged otherwise.
//!
//! Handlers are persisted as three co-located files:
//! - `model.txt`: embedding model identifier
//! - `known_entity_names.txt`: newline-delimited names
//! - `known_entity_embeddings.bin`: little-endian `f32` matrix with a small header

use crate::embedding::EmbeddingClient;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use geokg_core::{EntityKind, GeoKgError, GraphOutput, Result};
use ndarray::{Array2, ArrayView1};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const MODEL_FILE: &str = "model.txt";
pub const NAMES_FILE: &str = "known_entity_names.txt";
pub const EMBEDDINGS_FILE: &str = "known_entity_embeddings.bin";

/// Similarity a match must reach unless the caller says otherwise
pub const DEFAULT_THRESHOLD: f32 = 0.95;

const MAGIC: &[u8; 4] = b"GKEM";
const FORMAT_VERSION: u32 = 1;
const BUILD_BATCH: usize = 128;

/// `root/<kind>/<model>`
pub fn default_artifact_dir(root: &Path, kind: EntityKind, model_name: &str) -> PathBuf {
    root.join(kind.as_str()).join(model_name)
}

/// Best vocabulary match for a query
#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentMatch {
    pub index: usize,
    pub name: String,
    pub similarity: f64,
}

/// Known-entity vocabulary with precomputed embeddings
pub struct AlignmentHandler {
    kind: EntityKind,
    model_name: String,
    names: Vec<String>,
    embeddings: Array2<f32>,
    norms: Vec<f64>,
    embedder: Arc<dyn EmbeddingClient>,
}

impl std::fmt::Debug for AlignmentHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlignmentHandler")
            .field("kind", &self.kind)
            .field("model_name", &self.model_name)
            .field("names", &self.names.len())
            .field("dimension", &self.embeddings.ncols())
            .finish()
    }
}

impl AlignmentHandler {
    /// Embed `names` and build a handler. Duplicate names keep their first position.
    pub async fn build(
        kind: EntityKind,
        names: Vec<String>,
        embedder: Arc<dyn EmbeddingClient>,
    ) -> Result<Self> {
        let mut seen = HashSet::new();
        let names: Vec<String> = names
            .into_iter()
            .filter(|n| seen.insert(n.clone()))
            .collect();
        validate_names(&names)?;

        let mut rows: Vec<Vec<f32>> = Vec::with_capacity(names.len());
        for batch in names.chunks(BUILD_BATCH) {
            let vectors = embedder.embed_batch(batch).await?;
            if vectors.len() != batch.len() {
                return Err(GeoKgError::AlignmentError(format!(
                    "embedder returned {} vectors for {} names",
                    vectors.len(),
                    batch.len()
                )));
            }
            rows.extend(vectors);
        }

        let cols = rows.first().map(Vec::len).unwrap_or(embedder.dimension());
        if rows.iter().any(|r| r.len() != cols) {
            return Err(GeoKgError::AlignmentError(
                "embedder returned vectors of differing width".to_string(),
            ));
        }
        let flat: Vec<f32> = rows.into_iter().flatten().collect();
        let embeddings = Array2::from_shape_vec((names.len(), cols), flat)
            .map_err(|e| GeoKgError::AlignmentError(e.to_string()))?;

        tracing::info!(
            kind = %kind,
            model = embedder.model_name(),
            names = names.len(),
            "Built alignment vocabulary"
        );

        let model_name = embedder.model_name().to_string();
        Self::from_parts(kind, model_name, names, embeddings, embedder)
    }

    /// Assemble a handler from already computed parts.
    ///
    /// Fails when the name count differs from the embedding row count, or
    /// when `embedder` is not the model the embeddings were produced with.
    pub fn from_parts(
        kind: EntityKind,
        model_name: String,
        names: Vec<String>,
        embeddings: Array2<f32>,
        embedder: Arc<dyn EmbeddingClient>,
    ) -> Result<Self> {
        validate_names(&names)?;
        if names.len() != embeddings.nrows() {
            return Err(GeoKgError::AlignmentError(format!(
                "{} known names but {} embedding rows",
                names.len(),
                embeddings.nrows()
            )));
        }
        if embedder.model_name() != model_name {
            return Err(GeoKgError::AlignmentError(format!(
                "embeddings were built with model '{model_name}' but embedder is '{}'",
                embedder.model_name()
            )));
        }

        let norms = embeddings.rows().into_iter().map(norm).collect();
        Ok(Self {
            kind,
            model_name,
            names,
            embeddings,
            norms,
            embedder,
        })
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn known_entity_names(&self) -> &[String] {
        &self.names
    }

    pub fn known_entity_embeddings(&self) -> &Array2<f32> {
        &self.embeddings
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Highest-similarity known entity for an embedded query; ties go to the lowest index
    pub fn closest_to_vector(&self, query: &[f32]) -> Result<Option<AlignmentMatch>> {
        if query.len() != self.embeddings.ncols() {
            return Err(GeoKgError::AlignmentError(format!(
                "query has {} dimensions, vocabulary has {}",
                query.len(),
                self.embeddings.ncols()
            )));
        }

        let query = ArrayView1::from(query);
        let query_norm = norm(query);
        let mut best: Option<(usize, f64)> = None;
        for (index, row) in self.embeddings.rows().into_iter().enumerate() {
            let denom = query_norm * self.norms[index];
            let similarity = if denom == 0.0 {
                0.0
            } else {
                (f64::from(row.dot(&query)) / denom).clamp(-1.0, 1.0)
            };
            if best.map_or(true, |(_, s)| similarity > s) {
                best = Some((index, similarity));
            }
        }

        Ok(best.map(|(index, similarity)| AlignmentMatch {
            index,
            name: self.names[index].clone(),
            similarity,
        }))
    }

    /// Best vocabulary match for `name`, regardless of threshold
    pub async fn closest(&self, name: &str) -> Result<Option<AlignmentMatch>> {
        let query = self.embedder.embed(name).await?;
        self.closest_to_vector(&query)
    }

    /// Canonical known name when similarity ≥ `threshold`, otherwise `name` unchanged
    pub async fn get_closest_known_entity(&self, name: &str, threshold: f32) -> Result<String> {
        match self.closest(name).await? {
            Some(m) if m.similarity >= f64::from(threshold) => {
                tracing::debug!(
                    input = name,
                    matched = %m.name,
                    similarity = m.similarity,
                    "Aligned entity"
                );
                Ok(m.name)
            }
            _ => Ok(name.to_string()),
        }
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Write the three artifact files into `dir`, creating it if needed
    pub fn save(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;

        std::fs::write(dir.join(MODEL_FILE), format!("{}\n", self.model_name))?;

        let mut names = String::new();
        for name in &self.names {
            names.push_str(name);
            names.push('\n');
        }
        std::fs::write(dir.join(NAMES_FILE), names)?;

        let mut writer = BufWriter::new(File::create(dir.join(EMBEDDINGS_FILE))?);
        writer.write_all(MAGIC)?;
        writer.write_u32::<LittleEndian>(FORMAT_VERSION)?;
        writer.write_u64::<LittleEndian>(self.embeddings.nrows() as u64)?;
        writer.write_u64::<LittleEndian>(self.embeddings.ncols() as u64)?;
        for value in self.embeddings.iter() {
            writer.write_f32::<LittleEndian>(*value)?;
        }
        writer.flush()?;

        tracing::info!(dir = %dir.display(), names = self.names.len(), "Saved alignment artifacts");
        Ok(())
    }

    /// Load artifacts written by [`AlignmentHandler::save`].
    ///
    /// Any missing file, corrupt matrix, count mismatch, or model mismatch is an error.
    pub fn load(dir: &Path, kind: EntityKind, embedder: Arc<dyn EmbeddingClient>) -> Result<Self> {
        let model_name = read_artifact(dir, MODEL_FILE)?.trim().to_string();
        let names: Vec<String> = read_artifact(dir, NAMES_FILE)?
            .lines()
            .map(str::to_string)
            .collect();
        let embeddings = read_matrix(&dir.join(EMBEDDINGS_FILE))?;

        let handler = Self::from_parts(kind, model_name, names, embeddings, embedder)?;
        tracing::info!(
            dir = %dir.display(),
            kind = %kind,
            names = handler.len(),
            "Loaded alignment artifacts"
        );
        Ok(handler)
    }
}

fn norm(row: ArrayView1<'_, f32>) -> f64 {
    row.iter()
        .map(|x| f64::from(*x) * f64::from(*x))
        .sum::<f64>()
        .sqrt()
}

fn validate_names(names: &[String]) -> Result<()> {
    if names.is_empty() {
        return Err(GeoKgError::AlignmentError(
            "vocabulary has no names".to_string(),
        ));
    }
    if let Some(bad) = names
        .iter()
        .find(|n| n.trim().is_empty() || n.contains('\n') || n.contains('\r'))
    {
        return Err(GeoKgError::AlignmentError(format!(
            "invalid vocabulary name {bad:?}"
        )));
    }
    Ok(())
}

fn read_artifact(dir: &Path, file: &str) -> Result<String> {
    let path = dir.join(file);
    std::fs::read_to_string(&path).map_err(|e| {
        GeoKgError::AlignmentError(format!("cannot read {}: {e}", path.display()))
    })
}

fn read_matrix(path: &Path) -> Result<Array2<f32>> {
    let corrupt =
        |e: std::io::Error| GeoKgError::AlignmentError(format!("corrupt {}: {e}", path.display()));

    let file = File::open(path).map_err(|e| {
        GeoKgError::AlignmentError(format!("cannot read {}: {e}", path.display()))
    })?;
    let mut reader = BufReader::new(file);

    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic).map_err(corrupt)?;
    if &magic != MAGIC {
        return Err(GeoKgError::AlignmentError(format!(
            "{} is not an embedding matrix",
            path.display()
        )));
    }
    let version = reader.read_u32::<LittleEndian>().map_err(corrupt)?;
    if version != FORMAT_VERSION {
        return Err(GeoKgError::AlignmentError(format!(
            "unsupported embedding matrix version {version}"
        )));
    }
    let rows = reader.read_u64::<LittleEndian>().map_err(corrupt)? as usize;
    let cols = reader.read_u64::<LittleEndian>().map_err(corrupt)? as usize;

    let len = rows.checked_mul(cols).ok_or_else(|| {
        GeoKgError::AlignmentError(format!("matrix shape {rows}x{cols} overflows"))
    })?;
    let mut data = Vec::with_capacity(len.min(1 << 24));
    for _ in 0..len {
        data.push(reader.read_f32::<LittleEndian>().map_err(corrupt)?);
    }
    let mut trailing = [0u8; 1];
    if reader.read(&mut trailing).map_err(corrupt)? != 0 {
        return Err(GeoKgError::AlignmentError(format!(
            "trailing bytes in {}",
            path.display()
        )));
    }

    Array2::from_shape_vec((rows, cols), data)
        .map_err(|e| GeoKgError::AlignmentError(e.to_string()))
}

// ============================================================================
// Graph alignment
// ============================================================================

/// Snap a single name onto the handler's vocabulary
pub async fn align(name: &str, handler: &AlignmentHandler, threshold: f32) -> Result<String> {
    handler.get_closest_known_entity(name, threshold).await
}

/// Outcome counts for [`align_graph`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlignmentReport {
    pub aligned: usize,
    pub unchanged: usize,
    pub failed: usize,
}

/// Align every entity in `graph` whose kind matches the handler.
///
/// Embedding failures leave the name as it was and are counted, not returned.
pub async fn align_graph(
    graph: &mut GraphOutput,
    handler: &AlignmentHandler,
    threshold: f32,
) -> AlignmentReport {
    let mut report = AlignmentReport::default();

    for triplet in graph.triplets.iter_mut() {
        let current = match handler.kind() {
            EntityKind::Location => triplet.subject.name.clone(),
            kind if triplet.object.kind() == kind => triplet.object.name().to_string(),
            _ => continue,
        };

        match handler.get_closest_known_entity(&current, threshold).await {
            Ok(aligned) if aligned != current => {
                match handler.kind() {
                    EntityKind::Location => triplet.subject.name = aligned,
                    _ => triplet.object.set_name(aligned),
                }
                report.aligned += 1;
            }
            Ok(_) => report.unchanged += 1,
            Err(e) => {
                tracing::warn!(name = %current, error = %e, "Alignment failed, keeping name");
                report.failed += 1;
            }
        }
    }

    report
}
