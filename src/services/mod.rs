//! Business logic services.

pub mod dashboard;
pub mod insights;
pub mod proxy;
pub mod query;
pub mod stitcher;
pub mod upstream;
