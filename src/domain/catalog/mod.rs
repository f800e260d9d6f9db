// ============================================================================
// Catalog Domain - Products and Stock
// ============================================================================
//
// The catalog is a collaborator of the order engine: it owns product rows
// and their stock counters. Stock only moves through the transactional
// store handle (see `crate::store::CatalogTx`).
//
// ============================================================================

pub mod value_objects;

pub use value_objects::*;
