use thiserror::Error;

/// Status kind shared by every gateway component.
///
/// Leaf ports (persistence, Wi-Fi, Zigbee) translate their native failures
/// into one of these kinds at the boundary; nothing above the port layer
/// deals in platform error codes.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Error)]
pub enum GatewayError {
    #[error("invalid argument")]
    InvalidArg,
    #[error("not found")]
    NotFound,
    #[error("out of memory")]
    NoMem,
    #[error("not supported")]
    NotSupported,
    #[error("invalid state")]
    InvalidState,
    #[error("timed out")]
    Timeout,
    #[error("operation failed")]
    Fail,
}

pub type GatewayResult<T> = Result<T, GatewayError>;

impl GatewayError {
    /// Stable symbolic name, used in job results and factory-reset reports.
    pub fn name(&self) -> &'static str {
        match self {
            GatewayError::InvalidArg => "INVALID_ARG",
            GatewayError::NotFound => "NOT_FOUND",
            GatewayError::NoMem => "NO_MEM",
            GatewayError::NotSupported => "NOT_SUPPORTED",
            GatewayError::InvalidState => "INVALID_STATE",
            GatewayError::Timeout => "TIMEOUT",
            GatewayError::Fail => "FAIL",
        }
    }

    /// Stable string code used in the HTTP error envelope.
    pub fn http_code(&self) -> &'static str {
        match self {
            GatewayError::InvalidArg => "invalid_argument",
            GatewayError::NotFound => "not_found",
            GatewayError::InvalidState => "invalid_state",
            GatewayError::NoMem => "no_memory",
            _ => "internal_error",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            GatewayError::InvalidArg => 400,
            GatewayError::NotFound => 404,
            GatewayError::InvalidState => 409,
            GatewayError::NoMem => 503,
            _ => 500,
        }
    }
}

/// Symbolic name for a unit result, `OK` on success.
pub fn status_name(result: &GatewayResult<()>) -> &'static str {
    match result {
        Ok(()) => "OK",
        Err(e) => e.name(),
    }
}
