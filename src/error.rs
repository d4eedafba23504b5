use reqwest::Error as ReqwestError;
use serde_json::Error as JsonError;
use serde_json::Value;
use std::error::Error as StdError;
use std::fmt::Display;
use std::io::Error as IoError;
use tokio_tungstenite::tungstenite::Error as WsError;

/// Bridge `Result` alias type.
pub type Result<T> = ::std::result::Result<T, Error>;

/// Bridge error type.
#[derive(Debug)]
pub enum Error {
    /// A `reqwest` crate error
    Reqwest(ReqwestError),
    /// A `serde_json` crate error
    Json(JsonError),
    /// A `tokio-tungstenite` crate error
    WebSocket(WsError),
    /// A `std::io` module error
    Io(IoError),
    /// A `sqlx` crate error
    Sqlx(sqlx::Error),
    /// A websocket connection was closed, with an optional close code
    Closed(Option<u16>, String),
    /// A json decoding error, with a description and the offending value
    Decode(&'static str, Value),
    /// A generic non-success response from the REST API
    Status(reqwest::StatusCode, Option<Value>),
    /// A gateway protocol violation, with a description
    Protocol(&'static str),
    /// A miscellaneous error, with a description
    Other(&'static str),
}

impl Error {
    #[doc(hidden)]
    pub async fn from_response(response: reqwest::Response) -> Error {
        let status = response.status();
        let value = response.bytes().await.ok().and_then(|b| serde_json::from_slice(&b).ok());
        Error::Status(status, value)
    }
}

impl From<IoError> for Error {
    fn from(err: IoError) -> Error {
        Error::Io(err)
    }
}

impl From<ReqwestError> for Error {
    fn from(err: ReqwestError) -> Error {
        Error::Reqwest(err)
    }
}

impl From<JsonError> for Error {
    fn from(err: JsonError) -> Error {
        Error::Json(err)
    }
}

impl From<WsError> for Error {
    fn from(err: WsError) -> Error {
        Error::WebSocket(err)
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Error {
        Error::Sqlx(err)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut ::std::fmt::Formatter) -> ::std::fmt::Result {
        match self {
            Error::Reqwest(inner) => inner.fmt(f),
            Error::Json(inner) => inner.fmt(f),
            Error::WebSocket(inner) => inner.fmt(f),
            Error::Io(inner) => inner.fmt(f),
            Error::Sqlx(inner) => inner.fmt(f),
            Error::Closed(code, reason) => write!(f, "gateway closed ({:?}): {}", code, reason),
            Error::Decode(msg, _) | Error::Protocol(msg) | Error::Other(msg) => f.write_str(msg),
            Error::Status(status, _) => write!(f, "http status {}", status),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Reqwest(inner) => Some(inner),
            Error::Json(inner) => Some(inner),
            Error::WebSocket(inner) => Some(inner),
            Error::Io(inner) => Some(inner),
            Error::Sqlx(inner) => Some(inner),
            _ => None,
        }
    }
}

/// Extension trait for checking the status and discarding failed HTTP responses.
pub(crate) trait CheckStatus {
    async fn check_status(self) -> Result<reqwest::Response>;
}

impl CheckStatus for reqwest::Result<reqwest::Response> {
    async fn check_status(self) -> Result<reqwest::Response> {
        let response = self?;
        if !response.status().is_success() {
            return Err(Error::from_response(response).await);
        }
        Ok(response)
    }
}
