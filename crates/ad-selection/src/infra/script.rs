//! Boundary to the sandbox that executes buyer and seller logic. The sandbox
//! itself lives outside of this crate, it is injected as a [`ScriptEngine`].

use {
    serde::de::DeserializeOwned,
    serde_json::Value,
    strum::{Display, IntoStaticStr},
    thiserror::Error,
};

/// Entry points ad tech logic exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
pub enum Function {
    #[strum(serialize = "generateBid")]
    GenerateBid,
    #[strum(serialize = "scoreAd")]
    ScoreAd,
    #[strum(serialize = "reportResult")]
    ReportResult,
    #[strum(serialize = "reportWin")]
    ReportWin,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("script syntax error: {0}")]
    Syntax(String),
    #[error("script result failed validation: {0}")]
    Validation(String),
    #[error("script runtime error: {0}")]
    Runtime(String),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ScriptEngine: Send + Sync {
    /// Calls `function` defined in `script` with positional JSON arguments
    /// and returns its JSON result.
    async fn evaluate(
        &self,
        script: &str,
        function: Function,
        args: Vec<Value>,
    ) -> Result<Value, Error>;
}

/// Converts the structured result of `function` into `T`. Results of the
/// wrong shape are validation errors.
pub fn decode<T: DeserializeOwned>(function: Function, result: Value) -> Result<T, Error> {
    serde_json::from_value(result)
        .map_err(|err| Error::Validation(format!("malformed {function} result: {err}")))
}
