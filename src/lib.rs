
// External data representation, a protocol for serializing data to be sent over the network
pub mod xdr;

// Remote procedure call, a protocol build on top of XDR to provide something like C-style function calls over the network
pub mod rpc;

// A protocol using RPC that's meant to communicate with instruments over a LAN
pub mod vxi11;

// The instrument-link capability (write/read/query/close) and its implementations
pub mod link;

// SCPI command text and the settle class of each command
pub mod scpi;

pub mod error;
pub mod session;

// Module for the devices driven through a session
pub mod devices;

// Range checks for user input
pub mod validate;

pub use error::{Error, Result};
pub use session::{Discovery, Identity, Session, SessionConfig};
