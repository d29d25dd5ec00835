//! Contracts implemented as [`MockContract`](crate::engine::MockContract)s.

pub mod player;
pub mod reflect;

use cw_ibc_host::VmError;

/// Turn a JSON error into the contract failure it would abort with.
pub(crate) fn json_error(err: impl std::fmt::Display) -> VmError {
    VmError::Execution(err.to_string())
}
