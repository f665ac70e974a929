pub mod catalog_loader;

pub use catalog_loader::{load_catalog_file, parse_catalog};
