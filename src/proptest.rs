//! Property-based tests for the prefix trie and the neighbor RIB.
//!
//! The trie is checked against `prefix_trie::PrefixMap`; the RIB against a
//! plain map of prefix to origin.
