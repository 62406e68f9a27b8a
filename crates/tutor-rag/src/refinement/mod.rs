//! Query refinement

pub mod abbreviations;
pub mod refiner;

pub use abbreviations::expand_abbreviations;
pub use refiner::{sanitize_rewrite, QueryRefiner, RefineRequest, RefinedQuery};
