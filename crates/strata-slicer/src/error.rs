//! Error types for the slicer.

use thiserror::Error;

/// Errors that can occur while slicing and planning toolpaths.
///
/// Every variant is a misuse of the pipeline or an unusable input; geometric
/// degeneracies (empty intersections, slivers, regions too small to fill)
/// are filtered silently and never surface here.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SlicerError {
    /// No mesh with triangles was supplied.
    #[error("mesh is empty")]
    EmptyMesh,

    /// Invalid print settings.
    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    /// Embedded open paths were supplied but no path width is configured.
    #[error("slice at z={0} has embedded open paths but no path width is set")]
    MissingPathWidth(f64),

    /// A slice was resolved a second time.
    #[error("slice {0} has already been resolved")]
    SliceAlreadyResolved(usize),

    /// A scheduler group was opened while another one was still open.
    #[error("scheduler groups cannot nest")]
    NestedGroup,

    /// A scheduler group was closed without being opened.
    #[error("end_group called without a matching begin_group")]
    UnbalancedGroup,

    /// A stage needed resolved slices but received an unresolved one.
    #[error("slice {0} has not been resolved")]
    SliceNotResolved(usize),
}

/// Result type for slicer operations.
pub type Result<T> = std::result::Result<T, SlicerError>;
