//! Vellum Protocol Types
//!
//! This crate provides the protocol definitions shared by the Vellum
//! document-database driver: command descriptions, the cluster topology
//! model, wire header names, and the error taxonomy.
//!
//! # Overview
//!
//! Vellum clients talk to a multi-node cluster over plain HTTP(S). The
//! higher driver layers (sessions, queries, bulk insert, subscriptions)
//! describe each logical operation as a [`Command`](protocol::Command) and
//! hand it to the request executor in `vellum-client`, which routes it to a
//! cluster node, retries it, and caches read responses.
//!
//! # Components
//!
//! - [`protocol::commands`] - Command descriptions and write-id generation
//! - [`protocol::topology`] - Cluster nodes and topology snapshots
//! - [`protocol::headers`] - Wire header names and well-known endpoints
//! - [`protocol::error`] - The `VellumError` taxonomy surfaced to callers

pub mod protocol;

pub use protocol::*;
