//! Raw byte codec for embedding vectors: little-endian `f32`, no header.

use anyhow::{bail, Result};

pub fn encode_vector(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for value in vector {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Decodes a blob written by [`encode_vector`], checking it against the stored dimension.
pub fn decode_vector(bytes: &[u8], dim: usize) -> Result<Vec<f32>> {
    if bytes.len() != dim * 4 {
        bail!(
            "Embedding blob has {} bytes, expected {} for dimension {}",
            bytes.len(),
            dim * 4,
            dim
        );
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

pub fn vector_norm(vector: &[f32]) -> f32 {
    vector.iter().map(|v| v * v).sum::<f32>().sqrt()
}

/// Scales to unit length. A zero vector stays zero.
pub fn normalize_vector(vector: &[f32]) -> Vec<f32> {
    let norm = vector_norm(vector);
    if norm == 0.0 {
        return vec![0.0; vector.len()];
    }
    vector.iter().map(|v| v / norm).collect()
}
