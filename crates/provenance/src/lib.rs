//! Arc aggregation engine for provenance records.
//!
//! Everything here is a pure function of its arguments: records go in,
//! arcs, aggregates and counts come out. Callers own any caching.

pub mod aggregate;
pub mod cluster;
pub mod error;
pub mod export;
pub mod ingest;
pub mod record;
pub mod select;
pub mod summary;
pub mod validate;

pub use aggregate::*;
pub use cluster::*;
pub use error::*;
pub use ingest::*;
pub use record::*;
pub use select::*;
pub use summary::*;
pub use validate::*;
