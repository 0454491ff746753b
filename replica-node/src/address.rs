// Copyright 2020 Joyent, Inc.

use std::fmt;
use std::net::Ipv6Addr;
use std::str::FromStr;

use thiserror::Error;

/// The port a server listens on when the address does not name one.
pub const DEFAULT_PORT: u16 = 27017;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("address is empty")]
    EmptyString,
    #[error("address has no host")]
    MissingHost,
    #[error("invalid port {0:?}")]
    InvalidPort(String),
    #[error("unterminated IPv6 literal")]
    MalformedIpv6,
}

/// The host and port of a replica set member, as given by the user or the
/// replica set monitor. The host may be a name that still needs resolving.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct NodeAddress {
    host: String,
    port: u16,
}

impl NodeAddress {
    pub fn new<S: Into<String>>(host: S, port: u16) -> Self {
        NodeAddress {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        if self.host.contains(':') {
            write!(fmt, "[{}]:{}", self.host, self.port)
        } else {
            write!(fmt, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for NodeAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(AddressError::EmptyString);
        }

        let (host, port) = if let Some(rest) = s.strip_prefix('[') {
            let end = rest.find(']').ok_or(AddressError::MalformedIpv6)?;
            let port = match &rest[end + 1..] {
                "" => None,
                tail => match tail.strip_prefix(':') {
                    Some(port) => Some(port),
                    None => return Err(AddressError::MalformedIpv6),
                },
            };
            (&rest[..end], port)
        } else if s.parse::<Ipv6Addr>().is_ok() {
            (s, None)
        } else {
            match s.split_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (s, None),
            }
        };

        if host.is_empty() {
            return Err(AddressError::MissingHost);
        }

        let port = match port {
            Some(port) => parse_port(port)?,
            None => DEFAULT_PORT,
        };

        Ok(NodeAddress::new(host, port))
    }
}

// Port 0 cannot be connected to, so it is rejected along with anything that
// is not a u16.
fn parse_port(s: &str) -> Result<u16, AddressError> {
    match s.parse::<u16>() {
        Ok(0) | Err(_) => Err(AddressError::InvalidPort(s.to_string())),
        Ok(port) => Ok(port),
    }
}
