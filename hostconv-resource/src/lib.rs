//! hostconv-resource: check/apply reconciliation for host resources.
//!
//! Every resource kind implements [`Task`]: `check` reports what would
//! change without changing anything, `apply` converges and reports what did
//! change. Kinds are looked up by name in a [`TypeRegistry`] built once at
//! start-up.

pub mod error;
pub mod lvm;
pub mod registry;
pub mod render;
pub mod status;
pub mod task;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

use std::sync::Arc;

pub use error::{DriverError, TaskError};
pub use registry::{RegistryBuilder, RegistryError, TypeRegistry};
pub use render::{ParamRenderer, RenderError, Renderer};
pub use status::{Difference, Status, StatusLevel, TaskStatus};
pub use task::{Preparer, Task};

/// Registry with every built-in kind, backed by `lvm`.
pub fn default_registry(lvm: Arc<dyn lvm::LvmDriver>) -> Result<TypeRegistry, RegistryError> {
    Ok(TypeRegistry::builder()
        .register(lvm::lv::KIND, Arc::new(lvm::LogicalVolumePreparer::new(lvm)))?
        .build())
}
