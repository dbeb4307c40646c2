//! Outermost command boundary.
//!
//! Every front-end call goes through [`guarded`], which serializes the
//! operation's report and turns failures (including panics) into a
//! structured error payload. Internal errors are logged in full and shown
//! only as `"command failed"`.

use crate::errors::{CoreError, ErrorKind};
use crate::models::{ExitStatusLike, OperationKind};
use serde::Serialize;
use serde_json::Value;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{debug, error, info};

pub const GENERIC_FAILURE: &str = "command failed";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CommandResponse {
    Ok {
        operation: &'static str,
        data: Value,
    },
    Error {
        operation: &'static str,
        kind: ErrorKind,
        message: String,
    },
}

impl CommandResponse {
    fn failure(operation: OperationKind, err: &CoreError) -> Self {
        let kind = err.kind();
        let message = match kind {
            ErrorKind::Internal => {
                error!(operation = %operation, error = ?err, "command failed");
                GENERIC_FAILURE.to_string()
            }
            _ => {
                debug!(operation = %operation, error = %err, "command rejected");
                err.to_string()
            }
        };
        Self::Error {
            operation: operation.as_str(),
            kind,
            message,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }

    /// Per-entry failures inside an otherwise successful bulk or recover
    /// result.
    pub fn warnings(&self) -> usize {
        let Self::Ok { data, .. } = self else {
            return 0;
        };
        let warns = data.get("warns").and_then(Value::as_array).map_or(0, Vec::len);
        let failed = data.get("failure").and_then(Value::as_u64).unwrap_or(0);
        warns + failed as usize
    }

    /// `PartialFailure` for a successful result that carries warnings.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Error { kind, .. } => Some(*kind),
            Self::Ok { .. } if self.warnings() > 0 => Some(ErrorKind::PartialFailure),
            Self::Ok { .. } => None,
        }
    }

    pub fn exit_status(&self) -> ExitStatusLike {
        match self.error_kind() {
            None => ExitStatusLike::Ok,
            Some(ErrorKind::PartialFailure) => ExitStatusLike::Warning,
            Some(_) => ExitStatusLike::Error,
        }
    }
}

/// Runs `body` and renders its outcome.
pub fn guarded<T, F>(operation: OperationKind, body: F) -> CommandResponse
where
    T: Serialize,
    F: FnOnce() -> crate::Result<T>,
{
    let outcome = match catch_unwind(AssertUnwindSafe(body)) {
        Ok(outcome) => outcome,
        Err(panic) => {
            let detail = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_default();
            error!(operation = %operation, panic = %detail, "command panicked");
            return CommandResponse::Error {
                operation: operation.as_str(),
                kind: ErrorKind::Internal,
                message: GENERIC_FAILURE.to_string(),
            };
        }
    };

    match outcome.and_then(|data| {
        serde_json::to_value(data)
            .map_err(|err| CoreError::precondition(format!("unserializable result: {err}")))
    }) {
        Ok(data) => {
            let response = CommandResponse::Ok {
                operation: operation.as_str(),
                data,
            };
            if operation.is_mutation() {
                info!(operation = %operation, warnings = response.warnings(), "command applied");
            }
            response
        }
        Err(err) => CommandResponse::failure(operation, &err),
    }
}
