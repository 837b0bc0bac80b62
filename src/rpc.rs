//! Transport-agnostic request/response surface.
//!
//! Requests are tagged by `method`; responses are the bare result objects
//! (`{"ok":true}`, `{"code":..}`, `{"valid":..}`) or `{"error":..}`.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{authenticator::Authenticator, store::RecordStore, OtpError, Seed};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Request {
    #[serde(rename_all = "camelCase")]
    Register {
        identifier: String,
        public_key: String,
        /// RFC4648 base32
        seed: String,
    },
    Generate {
        identifier: String,
    },
    Verify {
        identifier: String,
        code: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    AlreadyRegistered,
    UnknownUser,
    InvalidInput,
    StorageUnavailable,
}

impl From<&OtpError> for ErrorKind {
    fn from(error: &OtpError) -> Self {
        match error {
            OtpError::AlreadyRegistered(_) => Self::AlreadyRegistered,
            OtpError::UnknownUser(_) => Self::UnknownUser,
            OtpError::StorageUnavailable(_) => Self::StorageUnavailable,
            _ => Self::InvalidInput,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    #[serde(rename_all = "camelCase")]
    Code { code: String, expires_at: u64 },
    Valid { valid: bool },
    Error { error: ErrorKind, message: String },
    Ok { ok: bool },
}

impl From<OtpError> for Response {
    fn from(error: OtpError) -> Self {
        Self::Error {
            error: ErrorKind::from(&error),
            message: error.to_string(),
        }
    }
}

impl<S: RecordStore> Authenticator<S> {
    pub fn handle(&self, request: Request) -> Response {
        let result = match request {
            Request::Register {
                identifier,
                public_key,
                seed,
            } => Seed::from_base32(&seed)
                .and_then(|seed| {
                    self.registry()
                        .register_seed(&identifier, &public_key, seed)
                })
                .map(|()| Response::Ok { ok: true }),
            Request::Generate { identifier } => {
                self.generate(&identifier).map(|generated| Response::Code {
                    code: generated.code.to_string(),
                    expires_at: generated.expires_at,
                })
            }
            Request::Verify { identifier, code } => self
                .verify(&identifier, &code)
                .map(|valid| Response::Valid { valid }),
        };

        result.unwrap_or_else(Response::from)
    }

    /// Handles one JSON encoded request. Undecodable requests answer `InvalidInput`.
    pub fn handle_json(&self, request: &str) -> serde_json::Result<String> {
        let response = match serde_json::from_str::<Request>(request) {
            Ok(request) => self.handle(request),
            Err(e) => {
                warn!("undecodable request: {e}");
                Response::Error {
                    error: ErrorKind::InvalidInput,
                    message: format!("malformed request: {e}"),
                }
            }
        };

        serde_json::to_string(&response)
    }
}
