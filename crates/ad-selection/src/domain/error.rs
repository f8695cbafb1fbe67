use {
    crate::{
        domain::scoring,
        infra::{persistence, script},
    },
    strum::{Display, IntoStaticStr},
};

/// Status code of a terminal outcome. Every API call ends with exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Success,
    RateLimited,
    Unauthorized,
    BackgroundCaller,
    CallerNotAllowed,
    NoCandidates,
    NoValidBids,
    NoWinner,
    Timeout,
    InvalidArgument,
    InternalError,
    /// The user revoked consent. The call succeeded without doing anything.
    ConsentRevoked,
}

/// Errors surfaced to the caller of an API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("rate limit reached")]
    RateLimited,
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("caller is not running in the foreground")]
    BackgroundCaller,
    #[error("caller is not allowed to use ad selection")]
    CallerNotAllowed,
    #[error("no candidate groups for the requested buyers")]
    NoCandidates,
    #[error("no candidate group produced a valid bid")]
    NoValidBids,
    #[error("no bid scored above zero")]
    NoWinner,
    #[error("deadline exceeded")]
    Timeout,
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn status(&self) -> Status {
        match self {
            Self::RateLimited => Status::RateLimited,
            Self::Unauthorized(_) => Status::Unauthorized,
            Self::BackgroundCaller => Status::BackgroundCaller,
            Self::CallerNotAllowed => Status::CallerNotAllowed,
            Self::NoCandidates => Status::NoCandidates,
            Self::NoValidBids => Status::NoValidBids,
            Self::NoWinner => Status::NoWinner,
            Self::Timeout => Status::Timeout,
            Self::InvalidArgument(_) => Status::InvalidArgument,
            Self::Internal(_) => Status::InternalError,
        }
    }
}

impl From<persistence::Error> for Error {
    fn from(err: persistence::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<script::Error> for Error {
    fn from(err: script::Error) -> Self {
        let message = match err {
            script::Error::Syntax(message)
            | script::Error::Validation(message)
            | script::Error::Runtime(message) => message,
        };
        Self::Internal(message)
    }
}

impl From<scoring::Error> for Error {
    fn from(err: scoring::Error) -> Self {
        match err {
            scoring::Error::Script(err) => err.into(),
            err => Self::Internal(err.to_string()),
        }
    }
}
