// Copyright 2017-2021 Lukas Pustina <lukas@pustina.de>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use thiserror::Error;
use tokio::task::JoinError;

#[derive(Debug, Error)]
/// Main Error type of this crate.
///
/// Must be `Send` because it used by async function which might run on different threads.
pub enum Error {
    #[error("HTTP client error: {why}")]
    NetworkError { why: &'static str, source: reqwest::Error },
    #[error("unexpected status code {status} for '{url}'")]
    StatusError { url: String, status: u16 },
    #[error("failed to parse '{what}' because {why}")]
    ParseError { what: String, why: String },
    #[error("failed to probe {addr}: {why}")]
    ProbeError { addr: String, why: String },
    #[error("cannot select from empty candidate set")]
    EmptyInputError,
    #[error("execution has been cancelled")]
    CancelledError,
    #[error("execution panicked")]
    RuntimePanicError,
}

impl Error {
    /// Returns `true` for errors that are a consequence of talking to the lookup site or a probe target.
    pub fn is_domain_scoped(&self) -> bool {
        matches!(
            self,
            Error::NetworkError { .. } | Error::StatusError { .. } | Error::ParseError { .. } | Error::ProbeError { .. }
        )
    }
}

impl From<JoinError> for Error {
    fn from(error: JoinError) -> Self {
        if error.is_cancelled() {
            return Error::CancelledError;
        }
        Error::RuntimePanicError
    }
}
