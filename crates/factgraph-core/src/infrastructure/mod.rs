//! Infrastructure layer
//!
//! Contains implementations for external systems: the SQLite graph store and
//! the optional Neo4j replica.

pub mod graph;
