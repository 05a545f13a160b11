//! Ledger access: the anchor-event reader, range paginator, and the
//! `ChainClient` adapter the observer binds to.

mod client;
mod paginator;
mod reader;

pub use client::EvmChainClient;
pub use paginator::{Paginator, PaginatorConfig};
pub use reader::{ChainReader, decode_anchor_log};
