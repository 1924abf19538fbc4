//! Upgrade impact audit.
//!
//! Compares an old and a new schema snapshot, classifies every structural
//! delta into one of nine change categories, and cross-references each change
//! against the custom SQL, program, query and script corpora. Matches go to a
//! persistent ledger that is folded into per-category totals and rendered as a
//! run log.

pub mod config;
pub mod diff;
pub mod errors;
pub mod models;
pub mod pipeline;
pub mod report;
pub mod search;
pub mod store;

#[cfg(test)]
mod fixtures;
