// ============================================================================
// Review Domain
// ============================================================================
//
// Reviews are gated on purchase: only buyers whose order containing the
// product reached `delivered` may write one.
//
// ============================================================================

pub mod value_objects;
pub mod errors;
pub mod gate;
pub mod service;

pub use value_objects::*;
pub use errors::*;
pub use gate::*;
pub use service::*;
