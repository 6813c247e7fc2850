use serde::{Deserialize, Serialize};

use crate::Err;

/// Turns a handler error into the report posted to the host.
pub type ErrorHook = fn(&Err) -> ErrorReport;

/// A computer-readable report of an unhandled error.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ErrorReport {
    /// The type of the error passed to the Runtime API.
    #[serde(rename = "errorType")]
    pub name: String,
    /// The [std::fmt::Display] output of the error.
    #[serde(rename = "errorMessage")]
    pub err: String,
}

/// The hook used by [`run`](crate::run): every error is an `UnknownError`.
pub fn default_error_hook(err: &Err) -> ErrorReport {
    ErrorReport {
        name: String::from("UnknownError"),
        err: format!("{}", err),
    }
}
