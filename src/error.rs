use std::fmt::Display;

use jsonwebtoken::errors::Error as JwtError;
use log::{error, warn};
use rocket::{
    http::Status,
    request::Outcome,
    response::{self, Responder},
    serde::json::Json,
    Request,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::api::vote::Rejection;
use crate::store::StoreError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Vote rejected: {0}")]
    Rejected(Rejection),
    #[error("Not authenticated: {0}")]
    Unauthenticated(String),
    #[error(transparent)]
    Jwt(#[from] JwtError),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Store unavailable: {0}")]
    Store(#[from] StoreError),
}

impl Error {
    pub fn not_found(what: impl Display) -> Self {
        Self::NotFound(what.to_string())
    }

    /// The HTTP status this error is reported with.
    pub fn status(&self) -> Status {
        match self {
            Self::Rejected(Rejection::VotingDisabled) => Status::Forbidden,
            Self::Rejected(Rejection::Unauthenticated) => Status::Unauthorized,
            Self::Rejected(Rejection::InvalidCandidate) => Status::UnprocessableEntity,
            Self::Rejected(Rejection::AlreadyVoted) => Status::Conflict,
            Self::Unauthenticated(_) | Self::Jwt(_) => Status::Unauthorized,
            Self::Forbidden(_) => Status::Forbidden,
            Self::Validation(_) => Status::BadRequest,
            Self::NotFound(_) => Status::NotFound,
            Self::Store(_) => Status::ServiceUnavailable,
        }
    }

    /// Fail a request guard with this error, keeping its body for the catcher.
    pub fn fail_guard<S>(self, req: &Request<'_>) -> Outcome<S, Error> {
        let status = self.status();
        req.local_cache(|| GuardFailure(Some(ErrorBody::from(&self))));
        Outcome::Failure((status, self))
    }

    /// The machine-readable failure tag reported to clients.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Rejected(Rejection::VotingDisabled) => "VotingDisabled",
            Self::Rejected(Rejection::Unauthenticated) => "Unauthenticated",
            Self::Rejected(Rejection::InvalidCandidate) => "InvalidCandidate",
            Self::Rejected(Rejection::AlreadyVoted) => "AlreadyVoted",
            Self::Unauthenticated(_) | Self::Jwt(_) => "Unauthenticated",
            Self::Forbidden(_) => "Forbidden",
            Self::Validation(_) => "ValidationError",
            Self::NotFound(_) => "NotFound",
            Self::Store(_) => "StoreUnavailable",
        }
    }
}

impl From<Rejection> for Error {
    fn from(rejection: Rejection) -> Self {
        Self::Rejected(rejection)
    }
}

/// The JSON body of every failed response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub reason: String,
    pub message: String,
}

impl ErrorBody {
    pub fn new(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            message: message.into(),
        }
    }
}

impl From<&Error> for ErrorBody {
    fn from(err: &Error) -> Self {
        Self::new(err.reason(), err.to_string())
    }
}

/// The error that failed a request guard, if any. Catchers only see the
/// status, so guards leave the full body here.
#[derive(Debug, Clone, Default)]
pub struct GuardFailure(pub Option<ErrorBody>);

impl<'r> Responder<'r, 'static> for Error {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'static> {
        let status = self.status();
        if status.code >= 500 {
            error!("{} {}: {}", req.method(), req.uri(), self);
        } else {
            warn!("{} {}: {}", req.method(), req.uri(), self);
        }
        let body = ErrorBody::from(&self);
        (status, Json(body)).respond_to(req)
    }
}
