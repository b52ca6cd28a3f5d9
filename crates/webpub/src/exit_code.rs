//! Exit codes for the CLI.
//!
//! Clean aborted by the operator is a success: nothing was asked of the
//! tool that it failed to do.

/// Successful execution (including help, version and an aborted clean)
pub const SUCCESS: u8 = 0;

/// Validation, resource or recovery failure
pub const GENERAL_ERROR: u8 = 1;

/// Command-line usage error or missing privilege
pub const USAGE_ERROR: u8 = 2;
