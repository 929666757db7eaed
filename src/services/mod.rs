//! Business logic services.

pub mod classifier;
pub mod dashboard;
pub mod directory;
pub mod export;
pub mod lifecycle;
pub mod prober;
pub mod risk_score;
pub mod scan;
pub mod scan_runner;
