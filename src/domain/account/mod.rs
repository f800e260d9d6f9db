// ============================================================================
// Account Domain - Users, Addresses, Payment Methods
// ============================================================================
//
// Read model of the marketplace's user accounts as seen by the order core:
// - Value objects (User, Role, Address, PaymentMethod)
// - Errors (AccountError)
// - Payment method service (explicit default switching)
//
// ============================================================================

pub mod value_objects;
pub mod errors;
pub mod service;

pub use value_objects::*;
pub use errors::*;
pub use service::*;
