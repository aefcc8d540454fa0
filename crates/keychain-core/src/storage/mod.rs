//! Durable key-value stores backing keychain namespaces
//!
//! This module provides two store backends:
//! 1. In-memory (tests, ephemeral processes)
//! 2. JSON file per namespace (persistent)

mod traits;
mod memory;
mod file;

pub use traits::{BatchOp, DurableStore, StoreBatch, StoreProvider, StoredValue};
pub use memory::{MemoryStore, MemoryStoreProvider};
pub use file::{FileStore, FileStoreProvider, KEYCHAINS_DIR};
