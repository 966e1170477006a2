pub mod client;
pub mod season;

pub use client::{CatalogClient, CatalogDoc, CatalogError, Episode, ItemMetadata};
pub use season::{group_by_season, SeasonGroup};
