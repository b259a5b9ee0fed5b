pub mod catalog;
pub mod registry;
pub mod resolver;
pub mod store;

pub use catalog::{CatalogQuery, DateWindow, HttpCatalog, SensorFilter, TileCatalog};
pub use registry::{Assignment, HitRegistry};
pub use resolver::{ResolveOptions, download_missing, existing_tiles, resolve_and_download};
pub use store::{BucketStore, ImageryStore};
