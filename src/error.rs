// Session-level errors.  The transport below (XDR, RPC, VXI-11) stays on io::Result; faults are folded in
// here once they reach the session.

use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no matching instrument found")]
    NotFound,

    #[error("not connected to the generator")]
    NotConnected,

    #[error("communication error: {0}")]
    Comm(#[from] io::Error),

    // Reconnected after the fault; the failed operation was not replayed
    #[error("communication error, reconnected but the operation was not applied: {0}")]
    Recovered(io::Error),

    #[error("reconnect failed: {0}")]
    ReconnectFailed(Box<Error>),

    #[error("malformed response to {query}: {response:?}")]
    MalformedResponse { query: String, response: String },

    #[error("cannot normalize a signal of {len} samples with no spread")]
    DegenerateSignal { len: usize },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn is_comm(&self) -> bool {
        matches!(self, Error::Comm(_) | Error::Recovered(_) | Error::ReconnectFailed(_))
    }

    pub(crate) fn malformed(query: &str, response: &str) -> Self {
        Error::MalformedResponse { query: query.to_owned(), response: response.to_owned() }
    }
}
