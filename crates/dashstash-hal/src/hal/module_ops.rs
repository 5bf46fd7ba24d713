//! Kernel module operations (modprobe).

use crate::HalResult;

pub trait ModuleOps {
    /// Load a kernel module with `key=value` parameters.
    fn load_module(&self, name: &str, params: &[String]) -> HalResult<()>;

    /// Unload a kernel module. Unloading a module that is not loaded succeeds.
    fn unload_module(&self, name: &str) -> HalResult<()>;

    /// Whether the module is listed in `/proc/modules`.
    fn module_loaded(&self, name: &str) -> HalResult<bool>;
}
