//! Embedding blob codec
//!
//! Vectors are stored as a flat run of little-endian `f32` components,
//! 4 bytes each, with the component count kept in a separate column.

use docvec_core::{DocvecError, Result};

/// Bytes per stored component
pub const COMPONENT_WIDTH: usize = std::mem::size_of::<f32>();

/// Pack a vector into its storage representation
pub fn encode(vector: &[f32]) -> Result<Vec<u8>> {
    if vector.is_empty() {
        return Err(DocvecError::InvalidVector(
            "cannot encode an empty vector".to_string(),
        ));
    }

    Ok(vector.iter().flat_map(|v| v.to_le_bytes()).collect())
}

/// Unpack a stored vector of `dim` components
pub fn decode(bytes: &[u8], dim: usize) -> Result<Vec<f32>> {
    if dim == 0 {
        return Err(DocvecError::InvalidVector(
            "stored dimension is zero".to_string(),
        ));
    }
    if bytes.len() != dim * COMPONENT_WIDTH {
        return Err(DocvecError::InvalidVector(format!(
            "expected {} bytes for {dim} components, found {}",
            dim * COMPONENT_WIDTH,
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(COMPONENT_WIDTH)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}
