//! Core business logic - framework-agnostic fleet operations.
//!
//! Repositories own one collection each; statistics and reports are pure
//! reductions over what the repositories return.

/// Cab Repository
pub mod cab;
mod document;
/// Expense Repository
pub mod expense;
/// Search and status filters for list screens
pub mod filter;
/// Live View Coordinator
pub mod live;
/// Fleet report and dashboard summary
pub mod report;
/// Aggregation engine
pub mod stats;
/// Trip Repository
pub mod trip;
