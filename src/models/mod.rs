//! Database models and DTOs for scans, findings and directory connections.

pub mod connection;
pub mod scan;
pub mod vulnerability;
