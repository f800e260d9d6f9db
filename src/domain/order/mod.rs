// ============================================================================
// Order Domain - Order Lifecycle and Inventory Consistency
// ============================================================================
//
// Everything the order lifecycle needs:
// - Value objects (OrderLine, OrderStatus)
// - Status history (OrderStatusChanged)
// - Commands (PlaceOrder, ChangeStatus)
// - Errors (OrderError enum)
// - Aggregate (Order with pricing and transition rules)
// - Engine (OrderEngine: stock reservation + transitions)
// - Queries (OrderQueryService)
//
// ============================================================================

pub mod value_objects;
pub mod events;
pub mod commands;
pub mod errors;
pub mod aggregate;
pub mod command_handler;
pub mod query;

// Re-export for convenience
pub use value_objects::*;
pub use events::*;
pub use commands::*;
pub use errors::*;
pub use aggregate::*;
pub use command_handler::*;
pub use query::*;
