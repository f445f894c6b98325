use rocket::http::{ContentType, Status};
use rocket::request::Request;
use rocket::response::{self, Responder, Response};
use std::io::Cursor;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Cloud or device could not be reached
    Connectivity,
    /// Unexpected status or missing field during the login exchange
    Protocol,
    /// Non-2xx answer to a business call
    DeviceRejection,
    Internal,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("cannot connect: {0}")]
    Connection(String),
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("serial number not found in device info")]
    SerialNumberNotFound,
    #[error("login failed: {0}")]
    LoginError(String),
    #[error("authorization code not found in redirect")]
    MissingAuthorizationCode,
    #[error("token exchange failed ({status}): {excerpt}")]
    TokenExchange { status: u16, excerpt: String },
    #[error("no access token in token response")]
    MissingToken,
    #[error("token rejected by device ({status}): {excerpt}")]
    TokenRejected { status: u16, excerpt: String },
    #[error("malformed token: {0}")]
    MalformedToken(String),
    #[error("device responded {status}: {excerpt}")]
    ApiError { status: u16, excerpt: String },
    #[error("invalid response ({1}): {0}")]
    InvalidResponse(String, String),
    #[error("unable to format output")]
    FormatError,
    #[error("internal error: {0}")]
    InternalError(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Connection(_) | Error::Timeout(_) => ErrorKind::Connectivity,
            Error::SerialNumberNotFound
            | Error::LoginError(_)
            | Error::MissingAuthorizationCode
            | Error::TokenExchange { .. }
            | Error::MissingToken
            | Error::TokenRejected { .. }
            | Error::MalformedToken(_)
            | Error::InvalidResponse(_, _) => ErrorKind::Protocol,
            Error::ApiError { .. } => ErrorKind::DeviceRejection,
            Error::FormatError | Error::InternalError(_) => ErrorKind::Internal,
        }
    }

    /// Whether the error happened while obtaining or validating a token.
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            Error::LoginError(_)
                | Error::MissingAuthorizationCode
                | Error::TokenExchange { .. }
                | Error::MissingToken
                | Error::TokenRejected { .. }
        )
    }
}

fn html(status: Status, body: String) -> response::Result<'static> {
    Response::build()
        .status(status)
        .sized_body(body.len(), Cursor::new(body))
        .header(ContentType::new("text", "html"))
        .ok()
}

impl<'r> Responder<'r, 'static> for Error {
    fn respond_to(self, _: &'r Request<'_>) -> response::Result<'static> {
        if self.is_auth_failure() {
            return html(
                Status::Forbidden,
                format!("<html><body><h3>403 Forbidden</h3>Error while authenticating to Envoy: <code>{}</code></body></html>", self),
            );
        }

        match self.kind() {
            ErrorKind::Connectivity => {
                let status = match &self {
                    Error::Timeout(_) => Status::GatewayTimeout,
                    _ => Status::BadGateway,
                };
                html(
                    status,
                    format!("<html><body><h3>{}</h3>Envoy unreachable: <code>{}</code></body></html>", status, self),
                )
            }
            ErrorKind::DeviceRejection => html(
                Status::BadGateway,
                format!("<html><body><h3>502 Bad Gateway</h3>Envoy rejected the request: <code>{}</code></body></html>", self),
            ),
            _ => html(
                Status::InternalServerError,
                format!(
                    "<html><body><h3>Unknown exception</h3><code>{:?}</code></body></html>",
                    self
                ),
            ),
        }
    }
}
