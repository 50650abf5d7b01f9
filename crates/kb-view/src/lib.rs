//! Ownership-rule driven reconstruction of live resource sets.
//!
//! Given declarative [`rules::OwnershipRule`]s, a [`scheme::TypeResolver`] and a
//! read-only [`query::ObjectQuery`], rebuilds either the nested ownership tree
//! of a primary object ([`tree::TreeBuilder`]) or the flat set of everything it
//! transitively owns ([`reach::ReachabilitySetCollector`]).

pub mod error;
pub mod object;
pub mod query;
pub mod reach;
pub mod rules;
pub mod scheme;
pub mod snapshot;
pub mod tree;

pub use error::{LookupError, Result};
