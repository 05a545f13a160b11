//! Store adapters.
//!
//! Only in-memory adapters live in this crate; database-backed stores
//! implement the same capability traits downstream.

mod memory;

pub use memory::{InMemoryOperationStore, InMemoryTransactionStore, InMemoryUnresolvableStore};
