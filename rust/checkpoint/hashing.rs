use anyhow::{ensure, Result};
use ndarray::{Array1, Array2, Array3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use regex::Regex;

use super::{EncodeOptions, QueryEncoder};
use crate::utils::types::QueryEmbeddings;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, &byte| {
        (hash ^ byte as u64).wrapping_mul(FNV_PRIME)
    })
}

/// Deterministic bag-of-tokens encoder.
///
/// Each lowercase `\w+` token maps to a fixed unit vector derived from its
/// hash and the checkpoint seed, so identical tokens in queries and
/// documents score 1.0 against each other.
#[derive(Debug, Clone)]
pub struct HashingEncoder {
    dim: usize,
    seed: u64,
    token_pattern: Regex,
}

impl HashingEncoder {
    pub fn new(dim: usize, seed: u64) -> Result<Self> {
        ensure!(dim > 0, "Encoder dim must be positive");
        Ok(Self {
            dim,
            seed,
            token_pattern: Regex::new(r"\w+")?,
        })
    }

    pub fn tokenize(&self, text: &str) -> Vec<String> {
        self.token_pattern
            .find_iter(text)
            .map(|m| m.as_str().to_lowercase())
            .collect()
    }

    pub fn token_vector(&self, token: &str) -> Array1<f32> {
        let mut rng = StdRng::seed_from_u64(fnv1a(token.as_bytes()) ^ self.seed);
        let mut vector = Array1::from_shape_fn(self.dim, |_| rng.gen_range(-1.0f32..1.0));
        let norm = vector.dot(&vector).sqrt();
        if norm > 0.0 {
            vector.mapv_inplace(|v| v / norm);
        } else {
            vector[0] = 1.0;
        }
        vector
    }

    /// One row per token of `text`, without padding or truncation.
    pub fn encode_document(&self, text: &str) -> Array2<f32> {
        let tokens = self.tokenize(text);
        let mut embeddings = Array2::zeros((tokens.len(), self.dim));
        for (row, token) in tokens.iter().enumerate() {
            embeddings.row_mut(row).assign(&self.token_vector(token));
        }
        embeddings
    }
}

impl QueryEncoder for HashingEncoder {
    fn dim(&self) -> usize {
        self.dim
    }

    fn encode(&self, queries: &[String], options: &EncodeOptions) -> Result<QueryEmbeddings> {
        let mut tokenized: Vec<Vec<String>> = queries.iter().map(|q| self.tokenize(q)).collect();

        let width = if options.full_length_search {
            tokenized
                .iter()
                .map(Vec::len)
                .max()
                .unwrap_or(0)
                .max(options.query_maxlen)
        } else {
            for tokens in &mut tokenized {
                tokens.truncate(options.query_maxlen);
            }
            options.query_maxlen
        };

        let mut embeddings = Array3::zeros((queries.len(), width, self.dim));
        for (q, tokens) in tokenized.iter().enumerate() {
            for (t, token) in tokens.iter().enumerate() {
                embeddings
                    .slice_mut(ndarray::s![q, t, ..])
                    .assign(&self.token_vector(token));
            }
        }
        Ok(embeddings)
    }
}
