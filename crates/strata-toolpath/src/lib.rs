#![warn(missing_docs)]

//! Machine instruction assembly for the strata toolpath pipeline.
//!
//! This crate lowers the per-layer tool paths produced by `strata-slicer`
//! into a firmware-neutral instruction stream, checks it against a printer
//! profile, and estimates print time.
//!
//! # Example
//!
//! ```ignore
//! use strata_slicer::{PrintMesh, PrintPipeline, PrintSettings};
//! use strata_toolpath::{estimate, JobAssembler, JobSettings, PrinterProfile};
//!
//! let settings = PrintSettings::default();
//! let layers = PrintPipeline::new(settings.clone(), vec![PrintMesh::solid(mesh)]).run()?;
//!
//! let job = JobAssembler::new(PrinterProfile::prusa_mk4(), JobSettings::default(), &settings);
//! let program = job.assemble(&layers)?;
//! println!("{}", estimate(&program));
//! ```

pub mod assembler;
pub mod error;
pub mod estimate;
pub mod instruction;
pub mod job;
pub mod printer;

pub use assembler::{AssemblerOptions, AssemblerState, ToolpathAssembler};
pub use error::{Result, ToolpathError};
pub use estimate::{estimate, PrintEstimate};
pub use instruction::{Heater, Instruction};
pub use job::{JobAssembler, JobSettings};
pub use printer::{BuildVolume, PrinterProfile, Retraction};
