// Canonicalization, hierarchy inference and query-time resolution over
// extracted skill mentions.

pub mod canonicalize;
pub mod dbscan;
pub mod handlers;
pub mod hierarchy;
pub mod index;
pub mod normalize;
pub mod requirements;
pub mod resolution;
pub mod rules;
pub mod snapshot;
