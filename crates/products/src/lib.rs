//! Products domain module.
//!
//! Sellable variants and their running purchase-cost aggregates. Catalog
//! management (categories, attributes, media) lives outside this workspace;
//! only what costing and allocation need is modelled here.

pub mod variant;

pub use variant::{CostUpdate, ProductVariant};
