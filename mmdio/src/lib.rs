pub mod collection;
pub mod common;
pub mod config;
pub mod csv_model;
pub mod error;
pub mod inflate;
pub mod json;
pub mod model;
pub mod motion;
pub mod repository;
pub mod utils;
pub mod vpd;
pub mod xfile;

pub use self::{
    config::{Config, LoadOptions, SaveOptions},
    error::{MmdError, Result},
    repository::{Asset, AssetKind, Repository},
};
