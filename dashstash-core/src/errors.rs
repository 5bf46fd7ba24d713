pub use dashstash_error::{HalError, StashError, EXIT_ALREADY_RUNNING, EXIT_CONFIG};

/// Result type alias for dashstash operations
pub type Result<T> = anyhow::Result<T>;

/// Exit code for an error that reached the top of the process.
///
/// Errors that wrap a [`StashError`] keep its code, a failed external command keeps its
/// exit status, and anything else exits with 1.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|cause| {
            if let Some(stash) = cause.downcast_ref::<StashError>() {
                return Some(stash.exit_code());
            }
            cause
                .downcast_ref::<HalError>()
                .and_then(HalError::command_exit_code)
        })
        .unwrap_or(1)
}
