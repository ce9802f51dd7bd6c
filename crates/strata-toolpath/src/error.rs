//! Error types for toolpath assembly.

use thiserror::Error;

/// Misuse of the [`ToolpathAssembler`](crate::ToolpathAssembler) protocol.
///
/// All variants are raised immediately and abort the job.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ToolpathError {
    /// `begin_travel` while a travel bracket is open.
    #[error("travel brackets cannot nest")]
    NestedTravel,

    /// A travel move or `end_travel` outside a travel bracket.
    #[error("not inside a travel bracket")]
    NotInTravel,

    /// `begin_retract` while already retracted.
    #[error("already retracted")]
    NestedRetract,

    /// `end_retract` without a matching `begin_retract`.
    #[error("not retracted")]
    NotRetracted,

    /// Deposition requested while the filament is retracted.
    #[error("cannot extrude while retracted")]
    ExtrudeWhileRetracted,

    /// Deposition requested inside a travel bracket.
    #[error("cannot extrude during travel")]
    ExtrudeDuringTravel,

    /// A move target lies outside the build volume.
    #[error("move to ({x:.3}, {y:.3}, {z:.3}) leaves the build volume")]
    OutOfBounds {
        /// Target X.
        x: f64,
        /// Target Y.
        y: f64,
        /// Target Z.
        z: f64,
    },

    /// The job ended with a travel bracket still open.
    #[error("job finished inside a travel bracket")]
    UnbalancedBracket,
}

/// Result type for toolpath assembly.
pub type Result<T> = std::result::Result<T, ToolpathError>;
