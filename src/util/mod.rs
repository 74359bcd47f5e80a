//! Utility modules for oxdom.
//!
//! Contains `QName` handling and the lexical checks applied to names and
//! namespace URIs before they reach the engine.

pub mod qname;
