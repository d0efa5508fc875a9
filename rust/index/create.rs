use anyhow::{bail, Context, Result};
use chrono::Utc;
use itertools::Itertools;
use ndarray::{Array2, ArrayView2, Axis};
use rand::prelude::SliceRandom;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use tracing::info;

use super::storage::{write_f32_file, write_u32_file};
use super::{
    IndexMetadata, CENTROIDS_FILE, DOCLENS_FILE, EMBEDDINGS_FILE, INDEX_VERSION, IVF_FILE,
    IVF_LENGTHS_FILE, METADATA_FILE,
};
use crate::config::Configuration;
use crate::utils::types::CentroidId;

/// Writes a new index from per-passage embedding matrices.
///
/// Passage ids are the positions in `documents`. Each embedding is assigned
/// to its highest-scoring centroid; `config` is embedded in the metadata
/// with `dim` filled in.
pub fn create_index(
    index_path: &Path,
    documents: &[Array2<f32>],
    centroids: ArrayView2<'_, f32>,
    config: &Configuration,
) -> Result<IndexMetadata> {
    if documents.is_empty() {
        bail!("No embeddings provided");
    }
    let num_centroids = centroids.nrows();
    let dim = centroids.ncols();
    if num_centroids == 0 {
        bail!("At least one centroid is required");
    }
    if let Some((pid, doc)) = documents.iter().find_position(|doc| doc.ncols() != dim) {
        bail!(
            "Passage {} has embedding dim {} but centroids have dim {}",
            pid,
            doc.ncols(),
            dim
        );
    }

    std::fs::create_dir_all(index_path)
        .with_context(|| format!("Failed to create index directory {:?}", index_path))?;

    let doclens: Vec<usize> = documents.iter().map(|doc| doc.nrows()).collect();
    let num_embeddings: usize = doclens.iter().sum();
    if num_embeddings > u32::MAX as usize {
        bail!("Index holds {} embeddings, more than a u32 id can address", num_embeddings);
    }

    let codes: Vec<CentroidId> = documents
        .iter()
        .flat_map(|doc| assign_codes(doc.view(), centroids))
        .collect();

    let ivf: Vec<u32> = (0..num_embeddings as u32)
        .sorted_by_key(|&emb| codes[emb as usize])
        .collect();
    let mut ivf_lengths = vec![0usize; num_centroids];
    for &code in &codes {
        ivf_lengths[code as usize] += 1;
    }

    write_f32_file(&index_path.join(CENTROIDS_FILE), centroids.iter().copied())?;
    write_f32_file(
        &index_path.join(EMBEDDINGS_FILE),
        documents.iter().flat_map(|doc| doc.iter().copied()),
    )?;
    write_u32_file(&index_path.join(IVF_FILE), &ivf)?;
    write_json(&index_path.join(DOCLENS_FILE), &doclens)?;
    write_json(&index_path.join(IVF_LENGTHS_FILE), &ivf_lengths)?;

    let mut embedded = config.clone();
    embedded.dim = Some(dim);

    let metadata = IndexMetadata {
        num_passages: documents.len(),
        num_embeddings,
        num_centroids,
        dim,
        created_at: Utc::now().to_rfc3339(),
        index_version: INDEX_VERSION.to_string(),
        config: embedded,
    };
    write_json(&index_path.join(METADATA_FILE), &metadata)?;

    info!(
        index = %index_path.display(),
        passages = metadata.num_passages,
        embeddings = num_embeddings,
        centroids = num_centroids,
        "Index written"
    );

    Ok(metadata)
}

/// Draws `num_centroids` distinct embedding rows (fewer when the corpus is
/// smaller) to serve as centroids.
pub fn sample_centroids(
    documents: &[Array2<f32>],
    num_centroids: usize,
    seed: u64,
) -> Result<Array2<f32>> {
    let rows: Vec<_> = documents
        .iter()
        .flat_map(|doc| doc.axis_iter(Axis(0)))
        .collect();
    let Some(first) = rows.first() else {
        bail!("No embeddings provided");
    };
    let dim = first.len();

    let mut rng = StdRng::seed_from_u64(seed);
    let mut order: Vec<usize> = (0..rows.len()).collect();
    order.shuffle(&mut rng);
    order.truncate(num_centroids.max(1));

    let mut centroids = Array2::<f32>::zeros((order.len(), dim));
    for (target, &source) in order.iter().enumerate() {
        centroids.row_mut(target).assign(&rows[source]);
    }
    Ok(centroids)
}

/// Index of the highest-scoring centroid for each row of `embeddings`.
fn assign_codes(embeddings: ArrayView2<'_, f32>, centroids: ArrayView2<'_, f32>) -> Vec<CentroidId> {
    let scores = embeddings.dot(&centroids.t());
    scores
        .axis_iter(Axis(0))
        .map(|row| {
            row.iter()
                .enumerate()
                .fold((0usize, f32::NEG_INFINITY), |best, (idx, &score)| {
                    if score > best.1 {
                        (idx, score)
                    } else {
                        best
                    }
                })
                .0 as CentroidId
        })
        .collect()
}

fn write_json<T: serde::Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {:?}", path))?;
    serde_json::to_writer_pretty(BufWriter::new(file), value)
        .with_context(|| format!("Failed to write {:?}", path))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn assigns_embeddings_to_nearest_centroid() {
        let centroids = array![[1.0f32, 0.0], [0.0, 1.0]];
        let doc = array![[0.9f32, 0.1], [0.2, 0.8], [0.0, 1.0]];
        assert_eq!(assign_codes(doc.view(), centroids.view()), vec![0, 1, 1]);
    }

    #[test]
    fn writes_every_index_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("toy");
        let documents = vec![array![[1.0f32, 0.0]], array![[0.0f32, 1.0], [0.6, 0.8]]];
        let centroids = array![[1.0f32, 0.0], [0.0, 1.0]];

        let metadata = create_index(
            &path,
            &documents,
            centroids.view(),
            &Configuration::default().with_query_maxlen(8),
        )
        .unwrap();

        assert_eq!(metadata.num_passages, 2);
        assert_eq!(metadata.num_embeddings, 3);
        assert_eq!(metadata.config.dim, Some(2));
        for file in [
            METADATA_FILE,
            CENTROIDS_FILE,
            EMBEDDINGS_FILE,
            DOCLENS_FILE,
            IVF_FILE,
            IVF_LENGTHS_FILE,
        ] {
            assert!(path.join(file).exists(), "{file} missing");
        }

        let lengths: Vec<usize> =
            serde_json::from_reader(File::open(path.join(IVF_LENGTHS_FILE)).unwrap()).unwrap();
        assert_eq!(lengths, vec![1, 2]);
    }

    #[test]
    fn rejects_mismatched_dims() {
        let dir = tempfile::tempdir().unwrap();
        let documents = vec![array![[1.0f32, 0.0, 0.0]]];
        let centroids = array![[1.0f32, 0.0]];
        assert!(create_index(dir.path(), &documents, centroids.view(), &Configuration::default())
            .is_err());
    }

    #[test]
    fn samples_at_most_the_available_rows() {
        let documents = vec![array![[1.0f32, 0.0], [0.0, 1.0]]];
        let centroids = sample_centroids(&documents, 8, 7).unwrap();
        assert_eq!(centroids.dim(), (2, 2));
        assert!(sample_centroids(&[], 4, 7).is_err());
    }
}
