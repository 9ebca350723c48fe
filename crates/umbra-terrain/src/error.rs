//! Terrain error types.

/// Errors raised while building or editing a landscape.
#[derive(Debug, thiserror::Error)]
pub enum TerrainError {
    /// Sample buffer length does not match the declared dimensions.
    #[error("heightmap has {actual} samples, expected {width}x{depth}")]
    SampleCount {
        /// Declared width in samples.
        width: u32,
        /// Declared depth in samples.
        depth: u32,
        /// Length of the buffer that was supplied.
        actual: usize,
    },

    /// The heightmap cannot be split into a square power-of-two chunk grid.
    #[error(
        "a {width}x{depth} heightmap does not form a square power-of-two grid of {chunk_size}-cell chunks"
    )]
    InvalidDimensions {
        /// Width in samples.
        width: u32,
        /// Depth in samples.
        depth: u32,
        /// Cells per chunk edge.
        chunk_size: u32,
    },

    /// A landscape scale that is zero, negative or not finite.
    #[error("landscape {field} must be finite and positive, got {value}")]
    InvalidScale {
        /// `cell_size` or `vertical_scale`.
        field: &'static str,
        value: f32,
    },

    /// The LOD tree needs a power-of-two number of chunks per side.
    #[error("chunk grid side {0} is not a non-zero power of two")]
    ChunkGrid(u32),

    /// A ground type outside `0..GROUND_TYPES` was requested.
    #[error("ground type {0} does not exist")]
    GroundType(usize),

    /// A heightmap image could not be decoded.
    #[error("failed to decode heightmap image: {0}")]
    Image(#[from] image::ImageError),
}
