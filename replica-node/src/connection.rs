// Copyright 2020 Joyent, Inc.

use std::error;
use std::fmt;

/// The two ways a request/reply exchange can fail.
///
/// The distinction is about what the server may have seen. A `Stale` failure
/// is detected before any byte of the request is written, so the request can
/// be sent again on a fresh connection. A `Transmission` failure happens while
/// or after the request is written; the server may already have acted on it.
#[derive(Debug)]
pub enum ExchangeError<E> {
    /// The connection was unusable before the request was sent.
    Stale(E),
    /// The connection failed during or after sending the request.
    Transmission(E),
}

impl<E> ExchangeError<E> {
    pub fn into_inner(self) -> E {
        match self {
            ExchangeError::Stale(e) | ExchangeError::Transmission(e) => e,
        }
    }
}

impl<E: fmt::Display> fmt::Display for ExchangeError<E> {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ExchangeError::Stale(e) => write!(fmt, "stale connection: {}", e),
            ExchangeError::Transmission(e) => {
                write!(fmt, "transmission failed: {}", e)
            }
        }
    }
}

/// Raw connection
///
/// The `Connection` trait defines the interface a transport must implement to
/// be owned by a [`Node`](../node/struct.Node.html). A connection owns one
/// socket to one resolved address. It is built by the node's connection
/// function and is replaced, never repaired, when the node reconnects.
pub trait Connection: Send + Sized + 'static {
    /// The error type returned by `connect` and carried by `ExchangeError`.
    /// Each implementation chooses the concrete type that fits its transport;
    /// the node only needs to be able to box it as the source of its own
    /// errors.
    type Error: error::Error + Send + Sync + 'static;
    /// Establish the connection to the address the connection was built for.
    fn connect(&mut self) -> Result<(), Self::Error>;
    /// Close the connection. Closing a connection that is not open does
    /// nothing.
    fn close(&mut self);
    /// Whether the connection is believed to be open. A peer may have closed
    /// the socket without the local side noticing yet, so this is advisory.
    fn is_connected(&self) -> bool;
    /// Write one request and block until one complete reply has been read.
    /// Implementations must report a failure found before writing as
    /// `ExchangeError::Stale`, and any other failure as
    /// `ExchangeError::Transmission`.
    fn execute(
        &mut self,
        request: &[u8],
    ) -> Result<Vec<u8>, ExchangeError<Self::Error>>;
}
