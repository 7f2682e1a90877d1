//! Per-neighbor BGP routing tables built from a line-oriented JSON update
//! feed, with longest-prefix-match lookup and origin AS indices.

pub mod config;
pub mod connection;
pub mod error;
pub mod message;
pub mod registry;
pub mod session;
pub mod table;
pub mod trie;

mod proptest;
