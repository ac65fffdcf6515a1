//! spliceprep reconciles per-replicate transcript expression (TPM) matrices, percent spliced-in
//! (PSI) matrices and splicing event annotations (events.ioe) ahead of a differential splicing
//! analysis. Tables are loaded into [Polars](https://pola.rs/) data frames and carried through
//! as text, so that every value written out is exactly the value that was read.
//!
//! The crate provides three independent steps:
//!
//! * a consistency filter ([filter_events]) keeping the events whose transcripts are quantified
//!   in every replicate,
//! * a replicate merger ([merge_replicates]) turning replicate-grouped matrices into one table
//!   per timepoint,
//! * a validator ([validate::validate_dir]) for raw two-column TPM files.

pub mod events;
pub mod matrix;
pub mod options;
pub mod reader;
pub mod reshape;
pub mod spliceprep_utils;
pub mod universe;
pub mod validate;

pub use events::{filter_events, is_valid, EventTable, EventTypeCounts, FilterSummary};
pub use matrix::ReplicateMatrix;
pub use reshape::{align_replicates, merge_replicates, reshape_one, TimepointTable};
pub use spliceprep_utils::MatrixKind;
pub use universe::{common_universe, TranscriptUniverse};
