// Copyright 2020 Joyent, Inc.

use std::error::Error as StdError;

use bson::Document;
use thiserror::Error;

use crate::address::{AddressError, NodeAddress};
use crate::protocol::ProtocolError;

/// A boxed error used to carry the underlying cause of a transport failure.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// The errors surfaced by a node.
///
/// `ConnectionFailure` and `SocketError` are the two transport failures.
/// A caller can assume that nothing was sent to the server when it sees a
/// `ConnectionFailure`, and must treat the effect of the command as unknown
/// when it sees a `SocketError`.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid node address {address:?}")]
    InvalidAddress {
        address: String,
        #[source]
        source: AddressError,
    },
    #[error("could not connect to {address}")]
    ConnectionFailure {
        address: NodeAddress,
        #[source]
        source: BoxError,
    },
    #[error("socket error while talking to {address}")]
    SocketError {
        address: NodeAddress,
        #[source]
        source: BoxError,
    },
    #[error("command {command:?} failed on {address}: {message}")]
    CommandFailure {
        address: NodeAddress,
        command: String,
        code: Option<i32>,
        message: String,
        reply: Document,
    },
    #[error("malformed reply from {address}")]
    Protocol {
        address: NodeAddress,
        #[source]
        source: ProtocolError,
    },
}

impl Error {
    pub(crate) fn connection_failure<E>(address: &NodeAddress, err: E) -> Self
    where
        E: Into<BoxError>,
    {
        Error::ConnectionFailure {
            address: address.clone(),
            source: err.into(),
        }
    }

    pub(crate) fn socket_error<E>(address: &NodeAddress, err: E) -> Self
    where
        E: Into<BoxError>,
    {
        Error::SocketError {
            address: address.clone(),
            source: err.into(),
        }
    }

    pub(crate) fn protocol(address: &NodeAddress, err: ProtocolError) -> Self {
        Error::Protocol {
            address: address.clone(),
            source: err,
        }
    }

    /// The connection could not be established, nothing was transmitted.
    pub fn is_connection_failure(&self) -> bool {
        matches!(self, Error::ConnectionFailure { .. })
    }

    /// The connection failed while or after a request was transmitted.
    pub fn is_socket_error(&self) -> bool {
        matches!(self, Error::SocketError { .. })
    }

    /// Either of the transport failures. Only these change node health.
    pub fn is_transport_error(&self) -> bool {
        self.is_connection_failure() || self.is_socket_error()
    }
}
