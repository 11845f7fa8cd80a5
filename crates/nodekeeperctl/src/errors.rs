//! Exit codes for nodekeeperctl

use nodekeeper_common::KeeperError;

/// Exit code for success
pub const EXIT_SUCCESS: i32 = 0;

/// Exit code for general errors
pub const EXIT_GENERAL_ERROR: i32 = 1;

/// The pipeline or a maintenance pass was stopped by the operator
pub const EXIT_ABORTED: i32 = 2;

/// Saved state cannot be used (missing context variable, unwritable state file)
pub const EXIT_FATAL_STATE: i32 = 3;

/// Exit code for an error that reached `main`
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    match err.chain().find_map(|e| e.downcast_ref::<KeeperError>()) {
        Some(e) if e.is_fatal() => EXIT_FATAL_STATE,
        _ => EXIT_GENERAL_ERROR,
    }
}
