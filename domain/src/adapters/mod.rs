//! Adapters that live inside the domain crate for convenience.
//!
//! Intended for unit tests, dry runs and local demos. Durable storage lives in
//! the `sqlite-adapter` crate.

pub mod memory_store;
