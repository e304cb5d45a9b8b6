//! `visitlog` - Visitor logging backend
//!
//! This library provides the storage, authentication, camera and face-crop
//! pipeline behind the visitlog HTTP API, along with the API itself.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod api;
pub mod auth;
pub mod camera;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod storage;
pub mod vision;
pub mod visits;

pub use config::Config;
pub use error::{Error, Result};
pub use logging::init_logging;
pub use models::{Camera, Role, User, Visit, Visitor};
pub use storage::{SharedStorage, Storage, StorageStats};
