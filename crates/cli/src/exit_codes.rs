//! CLI Exit Code Registry
//!
//! Exit codes are part of the shell contract; scripts and CI rely on them.
//!
//! | Code | Meaning                                               |
//! |------|-------------------------------------------------------|
//! | 0    | Success                                               |
//! | 1    | Runtime error (script failed during bootstrap, I/O)   |
//! | 2    | Usage error (bad args, missing file, bad input file)  |
//! | 3    | Fatal bootstrap (no entry, entry is not a function)   |

use luma_runtime::RuntimeError;

// =============================================================================
// Universal (0-2)
// =============================================================================

/// Success - the run finished (frame budget used or quit requested).
pub const EXIT_SUCCESS: u8 = 0;

/// Runtime error - script or engine failure the host could not continue from.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, unreadable script or input file.
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Bootstrap (3)
// =============================================================================

/// Bootstrap source missing or did not evaluate to a function.
pub const EXIT_BOOTSTRAP: u8 = 3;

/// Map a runtime error to its exit code.
pub fn runtime_exit_code(err: &RuntimeError) -> u8 {
    if err.is_fatal() {
        EXIT_BOOTSTRAP
    } else {
        EXIT_ERROR
    }
}
