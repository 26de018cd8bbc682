//! Per-replica storage for catalog items and orders.
//!
//! Every record exists twice: once in the relational replica and once in
//! the document replica. This crate only knows how to talk to one replica
//! at a time; keeping the two in step is the fulfillment engine's job.

pub mod document;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod replica;
pub mod store;

pub use document::PgDocumentReplica;
pub use error::{Result, StoreError};
pub use memory::InMemoryReplica;
pub use postgres::PostgresReplica;
pub use replica::Replica;
pub use store::{ReplicaStore, ReplicaStoreExt};
