use anyhow::{anyhow, ensure, Context, Result};
use ndarray::ArrayView2;
use serde::de::DeserializeOwned;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::index::storage::{read_u32_file, F32Buffer};
use crate::index::{
    IndexMetadata, CENTROIDS_FILE, DOCLENS_FILE, EMBEDDINGS_FILE, IVF_FILE, IVF_LENGTHS_FILE,
    METADATA_FILE,
};
use crate::utils::types::{CentroidId, EmbeddingId, PassageId};

/// Components of a loaded index. Never mutated after load, so a single
/// instance is shared by reference across ranking workers.
#[derive(Debug)]
pub struct LoadedIndex {
    /// Centroids `[num_centroids, dim]`
    pub centroids: F32Buffer,

    /// Uncompressed embeddings `[num_embeddings, dim]`, in passage order
    pub embeddings: F32Buffer,

    /// Embedding ids grouped by centroid
    pub ivf: Vec<EmbeddingId>,

    /// Offsets of each centroid's run inside `ivf` (`num_centroids + 1`)
    pub ivf_offsets: Vec<usize>,

    /// Centroid of every embedding
    pub codes: Vec<CentroidId>,

    /// Passage of every embedding
    pub emb_to_pid: Vec<PassageId>,

    /// Offsets of each passage's embeddings (`num_passages + 1`)
    pub doc_offsets: Vec<usize>,

    pub metadata: IndexMetadata,
}

impl LoadedIndex {
    pub fn dim(&self) -> usize {
        self.metadata.dim
    }

    pub fn num_centroids(&self) -> usize {
        self.metadata.num_centroids
    }

    pub fn num_embeddings(&self) -> usize {
        self.metadata.num_embeddings
    }

    pub fn num_passages(&self) -> usize {
        self.metadata.num_passages
    }

    pub fn centroids(&self) -> ArrayView2<'_, f32> {
        // Shape is validated at load time.
        ArrayView2::from_shape((self.num_centroids(), self.dim()), self.centroids.as_slice())
            .unwrap_or_else(|_| unreachable!("centroid buffer length is validated at load"))
    }

    pub fn embedding(&self, emb: EmbeddingId) -> &[f32] {
        let dim = self.dim();
        let start = emb as usize * dim;
        &self.embeddings.as_slice()[start..start + dim]
    }

    /// Embeddings of passage `pid` as a `[doclen, dim]` view.
    pub fn passage_embeddings(&self, pid: PassageId) -> ArrayView2<'_, f32> {
        let pid = pid as usize;
        let (begin, end) = (self.doc_offsets[pid], self.doc_offsets[pid + 1]);
        let dim = self.dim();
        let rows = &self.embeddings.as_slice()[begin * dim..end * dim];
        ArrayView2::from_shape((end - begin, dim), rows)
            .unwrap_or_else(|_| unreachable!("row slice length is a multiple of dim"))
    }

    /// Embedding range `[begin, end)` of passage `pid`.
    pub fn passage_range(&self, pid: PassageId) -> std::ops::Range<usize> {
        let pid = pid as usize;
        self.doc_offsets[pid]..self.doc_offsets[pid + 1]
    }

    /// Embedding ids assigned to centroid `centroid`.
    pub fn cell(&self, centroid: CentroidId) -> &[EmbeddingId] {
        let c = centroid as usize;
        &self.ivf[self.ivf_offsets[c]..self.ivf_offsets[c + 1]]
    }

    pub fn cell_size(&self, centroid: CentroidId) -> usize {
        let c = centroid as usize;
        self.ivf_offsets[c + 1] - self.ivf_offsets[c]
    }
}

/// Index loader responsible for loading index components from disk
pub struct IndexLoader {
    index_path: PathBuf,
    load_with_mmap: bool,
}

impl IndexLoader {
    /// Create a new index loader
    pub fn new(index_path: impl AsRef<Path>, load_with_mmap: bool) -> Result<Self> {
        let path = index_path.as_ref();

        if !path.exists() {
            return Err(anyhow!("Index path {:?} does not exist", path));
        }

        if !path.is_dir() {
            return Err(anyhow!("Index path {:?} is not a directory", path));
        }

        Ok(Self {
            index_path: path.to_path_buf(),
            load_with_mmap,
        })
    }

    /// Load the complete index from disk
    pub fn load(&self) -> Result<LoadedIndex> {
        let index_path = self.index_path.as_path();

        let metadata: IndexMetadata = read_json(&index_path.join(METADATA_FILE))?;
        let dim = metadata.dim;
        ensure!(dim > 0, "Index dim must be positive");

        let centroids = F32Buffer::load(&index_path.join(CENTROIDS_FILE), self.load_with_mmap)?;
        let embeddings = F32Buffer::load(&index_path.join(EMBEDDINGS_FILE), self.load_with_mmap)?;
        let doclens: Vec<usize> = read_json(&index_path.join(DOCLENS_FILE))?;
        let ivf = read_u32_file(&index_path.join(IVF_FILE))?;
        let ivf_lengths: Vec<usize> = read_json(&index_path.join(IVF_LENGTHS_FILE))?;

        // Validate dimensions
        let num_centroids = metadata.num_centroids;
        let num_embeddings = metadata.num_embeddings;
        ensure!(
            centroids.len() == num_centroids * dim,
            "Centroids file holds {} values, expected {} x {}",
            centroids.len(),
            num_centroids,
            dim
        );
        ensure!(
            embeddings.len() == num_embeddings * dim,
            "Embeddings file holds {} values, expected {} x {}",
            embeddings.len(),
            num_embeddings,
            dim
        );
        ensure!(
            doclens.len() == metadata.num_passages,
            "doclens has {} entries but the index has {} passages",
            doclens.len(),
            metadata.num_passages
        );
        ensure!(
            doclens.iter().sum::<usize>() == num_embeddings,
            "Sum of doclens must equal number of embeddings"
        );
        ensure!(
            ivf_lengths.len() == num_centroids,
            "ivf_lengths must have one entry per centroid"
        );
        ensure!(
            ivf_lengths.iter().sum::<usize>() == num_embeddings && ivf.len() == num_embeddings,
            "IVF must reference every embedding exactly once"
        );

        let ivf_offsets = Self::compute_offsets(&ivf_lengths);
        let codes = Self::compute_codes(&ivf, &ivf_offsets, num_embeddings)?;
        let doc_offsets = Self::compute_offsets(&doclens);
        let emb_to_pid = Self::compute_emb_to_pid(&doclens);

        info!(
            index = %index_path.display(),
            centroids = num_centroids,
            embeddings = num_embeddings,
            passages = metadata.num_passages,
            mmap = self.load_with_mmap,
            "Index loaded"
        );

        Ok(LoadedIndex {
            centroids,
            embeddings,
            ivf,
            ivf_offsets,
            codes,
            emb_to_pid,
            doc_offsets,
            metadata,
        })
    }

    /// Compute offsets from sizes: `[0, s0, s0 + s1, ...]`
    fn compute_offsets(sizes: &[usize]) -> Vec<usize> {
        let mut offsets = Vec::with_capacity(sizes.len() + 1);
        offsets.push(0);
        let mut total = 0;
        for &size in sizes {
            total += size;
            offsets.push(total);
        }
        offsets
    }

    /// Invert the IVF into a centroid id per embedding
    fn compute_codes(
        ivf: &[EmbeddingId],
        ivf_offsets: &[usize],
        num_embeddings: usize,
    ) -> Result<Vec<CentroidId>> {
        let mut codes = vec![CentroidId::MAX; num_embeddings];
        for (centroid, window) in ivf_offsets.windows(2).enumerate() {
            for &emb in &ivf[window[0]..window[1]] {
                let slot = codes
                    .get_mut(emb as usize)
                    .ok_or_else(|| anyhow!("IVF references embedding {} out of range", emb))?;
                ensure!(
                    *slot == CentroidId::MAX,
                    "Embedding {} appears in more than one centroid",
                    emb
                );
                *slot = centroid as CentroidId;
            }
        }
        Ok(codes)
    }

    fn compute_emb_to_pid(doclens: &[usize]) -> Vec<PassageId> {
        doclens
            .iter()
            .enumerate()
            .flat_map(|(pid, &len)| std::iter::repeat(pid as PassageId).take(len))
            .collect()
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    serde_json::from_reader(BufReader::new(file)).with_context(|| format!("Failed to parse {:?}", path))
}
