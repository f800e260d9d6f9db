// ============================================================================
// Domain Layer - Business Logic
// ============================================================================
//
// Each area has its own subdirectory. The order domain holds the invariants
// (stock reservation, price snapshots, status transitions); catalog and
// account are read models it validates against; review sits behind the
// delivered-order gate.
//
// Persistence is reached only through `crate::store`.
//
// ============================================================================

pub mod account;
pub mod catalog;
pub mod order;
pub mod review;
