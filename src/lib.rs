pub mod application;
pub mod archive;
pub mod cleanup;
pub mod commands;
pub mod config;
pub mod error;
pub mod events;
pub mod lock;
pub mod package;
pub mod runtime;
pub mod safety;

pub use application::{InstallationResult, PackageInfo, PackageManager, UpdateResult};
pub use config::EngineConfig;
pub use error::{ErrorKind, PackageError, PackageResult};

#[cfg(test)]
pub(crate) mod test_utils;
