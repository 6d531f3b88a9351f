pub mod asset;
pub mod config;
pub mod error;
pub mod feature;
pub mod legend;
pub mod matcher;
pub mod model;
pub mod provider;
pub mod resolver;
pub mod schema;
pub mod snapshot_db;
pub mod store;
pub mod validation;

pub use config::Config;
pub use error::{MapStyleError, Result};
pub use feature::{Feature, FeatureCollection};
pub use model::{Catalog, LayerId, StyleId};
pub use store::{BatchReport, LayerResolution, ResolutionPass, Store};
