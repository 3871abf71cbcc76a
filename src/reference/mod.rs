//! Slow-changing reference data: the route catalog used by the merge step and the
//! loader that fills the permanent store.

mod catalog;
mod loader;

pub use catalog::{ReferenceCatalog, RouteInfo};
pub use loader::{LoadReport, ReferenceLoader};
