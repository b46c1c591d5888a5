//! A single-authority, append-only ledger whose blocks are chained by
//! SHA-256 and sealed with proof of work.

pub mod api;
pub mod blockchain;
pub mod config;
