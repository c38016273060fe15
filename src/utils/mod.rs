//! The `utils` module provides shared building blocks used across the
//! `tickcast` application: error types, logging initialisation and the
//! shutdown coordinator that supervises long-running tasks.

pub mod error;
pub mod logging;
pub mod shutdown;

pub use error::{RegistryError, SendError, ServerError};
pub use shutdown::ShutdownCoordinator;
