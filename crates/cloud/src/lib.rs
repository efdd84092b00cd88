//! # wofs-cloud
//!
//! External collaborators of the WOfS batch engine: STAC catalog search,
//! object storage and raster loading.
//!
//! The async STAC client is wrapped by a blocking API ([`sync_api`]) so the
//! synchronous, rayon-parallel task layer can call it directly.

pub mod error;
pub mod loader;
pub mod stac_client;
pub mod stac_models;
pub mod store;
pub mod sync_api;

pub use error::{CloudError, Result};
pub use loader::{AssetSource, BandSpec, DefaultSource, LocalSource, RasterLoader};
pub use stac_client::{ItemSearch, StacCatalog, StacClient, StacClientOptions};
pub use stac_models::{StacItem, StacItemCollection, StacSearchParams};
pub use store::{FsStore, ObjectStore};
pub use sync_api::{HttpFetcher, StacClientBlocking};
