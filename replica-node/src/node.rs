// Copyright 2020 Joyent, Inc.

pub mod types;

use std::net::SocketAddr;

use bson::Document;
use chrono::{DateTime, Utc};
use slog::{debug, info, o, warn, Drain, Logger};

use crate::address::NodeAddress;
use crate::command::{self, Execute};
use crate::connection::{Connection, ExchangeError};
use crate::error::{BoxError, Error};
use crate::node::types::{Health, HealthMonitor, NodeOptions};
use crate::resolver::Resolver;

// Number of times a request found a stale connection may be sent again
// within one `ensure_connected` call.
const MAX_STALE_RECONNECTS: u32 = 1;

/// One member of a replica set
///
/// A node owns at most one connection at a time, built by `create_connection`
/// for the node's resolved address. Commands can only be run inside
/// [`ensure_connected`](#method.ensure_connected), which establishes the
/// connection first and keeps the node's health current.
pub struct Node<C, R, F>
where
    C: Connection,
    R: Resolver,
    F: FnMut(&SocketAddr) -> C + Send + 'static,
{
    address: NodeAddress,
    resolved_address: Option<SocketAddr>,
    connection: Option<C>,
    health: HealthMonitor,
    resolver: R,
    create_connection: F,
    log: Logger,
}

impl<C, R, F> Node<C, R, F>
where
    C: Connection,
    R: Resolver,
    F: FnMut(&SocketAddr) -> C + Send + 'static,
{
    /// Create a node for `address` (`host` or `host:port`). A malformed
    /// address is an error. An address that does not resolve is not: the node
    /// is returned marked down.
    pub fn new(
        address: &str,
        options: NodeOptions,
        resolver: R,
        create_connection: F,
    ) -> Result<Self, Error> {
        let address: NodeAddress =
            address.parse().map_err(|source| Error::InvalidAddress {
                address: address.to_string(),
                source,
            })?;

        let log = options
            .log
            .unwrap_or_else(|| Logger::root(slog_stdlog::StdLog.fuse(), o!()))
            .new(o!("node" => address.to_string()));

        let mut node = Node {
            address,
            resolved_address: None,
            connection: None,
            health: HealthMonitor::new(),
            resolver,
            create_connection,
            log,
        };

        if let Err(e) = node.resolve() {
            debug!(node.log, "initial resolution failed: {}", e);
        }

        Ok(node)
    }

    pub fn address(&self) -> &NodeAddress {
        &self.address
    }

    pub fn host(&self) -> &str {
        self.address.host()
    }

    pub fn port(&self) -> u16 {
        self.address.port()
    }

    /// The address from the latest successful resolution, if the latest
    /// resolution succeeded.
    pub fn resolved_address(&self) -> Option<SocketAddr> {
        self.resolved_address
    }

    pub fn health(&self) -> Health {
        self.health.health()
    }

    pub fn down_at(&self) -> Option<DateTime<Utc>> {
        self.health.down_at()
    }

    pub fn is_up(&self) -> bool {
        self.health.is_up()
    }

    pub fn is_down(&self) -> bool {
        self.health.is_down()
    }

    /// A handle for reading this node's health from other threads.
    pub fn health_monitor(&self) -> HealthMonitor {
        self.health.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.connection
            .as_ref()
            .map_or(false, |connection| connection.is_connected())
    }

    /// Close the connection. Health is left alone; closing is not a failure.
    pub fn disconnect(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            debug!(self.log, "disconnecting");
            connection.close();
        }
    }

    /// Force a fresh connection attempt and return the resulting health.
    ///
    /// Any open connection is closed first. A failed attempt is not returned
    /// as an error: it marks the node down and moves `down_at` to now, even
    /// when the node was already down.
    pub fn refresh(&mut self) -> Health {
        self.disconnect();
        if let Err(e) = self.connect() {
            debug!(self.log, "refresh failed: {}", e);
        }
        self.health()
    }

    /// Run `block` against an established connection.
    ///
    /// If the node is not connected it is connected first; a failure to
    /// resolve or connect is returned as `Error::ConnectionFailure` without
    /// running the block. Inside the block a request that finds the
    /// connection stale before it is sent is transparently sent again on a
    /// new connection, once per call. A failure during or after sending is
    /// returned as `Error::SocketError` and never retried.
    ///
    /// Every transport failure marks the node down before the error reaches
    /// the caller. Command failures leave the health alone.
    pub fn ensure_connected<T, B>(&mut self, block: B) -> Result<T, Error>
    where
        B: FnOnce(&mut Connected<'_, C, R, F>) -> Result<T, Error>,
    {
        if !self.is_connected() {
            self.connect()?;
        }

        let mut connected = Connected {
            node: self,
            reconnects_remaining: MAX_STALE_RECONNECTS,
        };
        block(&mut connected)
    }

    /// Run a single command against `database`.
    pub fn command(
        &mut self,
        database: &str,
        command: Document,
    ) -> Result<Document, Error> {
        self.ensure_connected(|conn| conn.command(database, command))
    }

    fn resolve(&mut self) -> Result<SocketAddr, Error> {
        match self.resolver.resolve(&self.address) {
            Ok(addr) => {
                debug!(self.log, "resolved to {}", addr);
                self.resolved_address = Some(addr);
                Ok(addr)
            }
            Err(e) => {
                self.resolved_address = None;
                self.mark_down(&e);
                Err(Error::connection_failure(&self.address, e))
            }
        }
    }

    // Resolve and open a new connection, replacing whatever connection the
    // node held before.
    fn connect(&mut self) -> Result<(), Error> {
        self.disconnect();

        let addr = self.resolve()?;
        debug!(self.log, "connecting to {}", addr);

        let mut connection = (self.create_connection)(&addr);
        match connection.connect() {
            Ok(()) => {
                self.connection = Some(connection);
                if self.health.mark_up() != Health::Up {
                    info!(self.log, "node is up");
                }
                Ok(())
            }
            Err(e) => {
                self.mark_down(&e);
                Err(Error::connection_failure(&self.address, e))
            }
        }
    }

    fn mark_down(&self, cause: &dyn std::fmt::Display) {
        let previous = self.health.mark_down();
        if previous != Health::Down {
            warn!(self.log, "node is down: {}", cause);
        } else {
            debug!(self.log, "node is still down: {}", cause);
        }
    }

    // The connection can no longer be trusted to be in step with the server.
    fn connection_lost(&mut self, cause: &dyn std::fmt::Display) {
        self.disconnect();
        self.mark_down(cause);
    }
}

/// The execution context handed to an `ensure_connected` block. Requests can
/// only be sent through a `Connected`, so they always run under the node's
/// reconnect and health rules.
pub struct Connected<'a, C, R, F>
where
    C: Connection,
    R: Resolver,
    F: FnMut(&SocketAddr) -> C + Send + 'static,
{
    node: &'a mut Node<C, R, F>,
    reconnects_remaining: u32,
}

impl<'a, C, R, F> Connected<'a, C, R, F>
where
    C: Connection,
    R: Resolver,
    F: FnMut(&SocketAddr) -> C + Send + 'static,
{
    pub fn address(&self) -> &NodeAddress {
        &self.node.address
    }

    /// Send one request and return the raw reply.
    pub fn execute(&mut self, request: &[u8]) -> Result<Vec<u8>, Error> {
        loop {
            let stale: BoxError = match self.node.connection.as_mut() {
                Some(connection) => match connection.execute(request) {
                    Ok(reply) => return Ok(reply),
                    Err(ExchangeError::Stale(e)) => e.into(),
                    Err(ExchangeError::Transmission(e)) => {
                        self.node.connection_lost(&e);
                        return Err(Error::socket_error(&self.node.address, e));
                    }
                },
                // An earlier request in this block lost the connection.
                None => "connection is closed".into(),
            };

            if self.reconnects_remaining == 0 {
                self.node.connection_lost(&stale);
                return Err(Error::connection_failure(&self.node.address, stale));
            }
            self.reconnects_remaining -= 1;

            warn!(
                self.node.log,
                "connection found stale before send, reconnecting: {}", stale
            );
            self.node.connect()?;
        }
    }

    /// Run `command` against `database` and return the reply document.
    pub fn command(
        &mut self,
        database: &str,
        command: Document,
    ) -> Result<Document, Error> {
        command::run(self, database, command)
    }
}

impl<'a, C, R, F> Execute for Connected<'a, C, R, F>
where
    C: Connection,
    R: Resolver,
    F: FnMut(&SocketAddr) -> C + Send + 'static,
{
    fn execute(&mut self, request: &[u8]) -> Result<Vec<u8>, Error> {
        Connected::execute(self, request)
    }

    fn address(&self) -> &NodeAddress {
        Connected::address(self)
    }
}
