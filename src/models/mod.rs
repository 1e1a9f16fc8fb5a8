//! Core data models for the bucket-as-table blob store.
//!
//! Buckets and files are not held in memory; these types validate the
//! identifiers that address catalog objects and map the rows read back.

pub mod bucket;
pub mod file;
