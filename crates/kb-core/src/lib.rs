//! Dependency-graph reconciliation core.
//!
//! Provides the DAG store with validation and ordered walks ([`dag::Dag`]),
//! typed action plans executed over it ([`plan::Plan`]), and shared
//! configuration ([`config::KbConfig`]).

pub mod config;
pub mod dag;
pub mod plan;
