//! Reconciles per-student enrollment snapshots, course grades, the
//! college/degree/major program crosswalk and admission ratings into a
//! single report row per student.

pub mod error;
pub mod grades;
pub mod loader;
pub mod models;
pub mod reconciler;
pub mod report;

pub use error::LoadError;
pub use loader::SourceLoader;
pub use models::{Config, StudentStore};
pub use reconciler::Reconciler;
pub use report::StudentReport;
