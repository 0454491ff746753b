// Copyright 2020 Joyent, Inc.

//! Per-member connection management for replica set drivers
//!
//! A replica set driver talks to every member of the set through a *node*. The
//! node owns exactly one logical connection to its server, keeps an up/down
//! health signal for the replica set monitor, and hands callers a connected
//! execution context in which commands may be run. The crate relies on two
//! primary traits, the [`Connection`](connection/trait.Connection.html) trait
//! and the [`Resolver`](resolver/trait.Resolver.html) trait.
//!
//! ## Connections
//!
//! A *connection* owns one socket to one resolved address and knows how to
//! carry a single request/reply exchange. It knows nothing about retries or
//! health. What it must do is report *how* an exchange failed:
//!
//! * [`ExchangeError::Stale`](connection/enum.ExchangeError.html) means the
//!   connection was found unusable before any byte of the request was written.
//!   The node closes it, reconnects and sends the same request once more.
//! * [`ExchangeError::Transmission`](connection/enum.ExchangeError.html) means
//!   the failure happened while or after the request was written. The server
//!   may have applied the command, so the node never retries it and surfaces
//!   [`Error::SocketError`](error/enum.Error.html) instead.
//!
//! Users supply the node with a function that builds a connection for a
//! resolved address:
//! ```rust,ignore
//! FnMut(&SocketAddr) -> C + Send + 'static
//! where C: Connection
//! ```
//! The function is the place to capture application level configuration such
//! as connect and socket timeouts.
//!
//! ## Resolvers
//!
//! A *resolver* turns the `host:port` pair the node was created with into a
//! socket address. A resolution failure is not fatal. It marks the node down,
//! the same as a refused connection.
//!
//! ## Health
//!
//! Every node starts out `Unknown`. A successful connect marks it `Up`; any
//! failure to resolve, connect, or complete an exchange marks it `Down` and
//! records the time in `down_at`. The replica set monitor reads the health
//! through a [`HealthMonitor`](node/types/struct.HealthMonitor.html) and calls
//! [`Node::refresh`](node/struct.Node.html#method.refresh) to re-probe down
//! members.
//!
//! ## Example
//!
//! ```rust,ignore
//! use bson::doc;
//! use replica_node::node::Node;
//! use replica_node::node::types::NodeOptions;
//! use replica_node::resolver::SystemResolver;
//! use replica_node_tcp_stream_connection::{
//!     TcpStreamConnection, TcpStreamConnectionConfig,
//! };
//!
//! let mut node = Node::new(
//!     "db1.example.com:27017",
//!     NodeOptions::default(),
//!     SystemResolver,
//!     TcpStreamConnection::connection_creator(
//!         TcpStreamConnectionConfig::default(),
//!     ),
//! )?;
//!
//! let reply = node.ensure_connected(|conn| {
//!     conn.command("admin", doc! { "ping": 1 })
//! })?;
//! ```

#![allow(missing_docs)]

pub mod address;
pub mod command;
pub mod connection;
pub mod error;
pub mod node;
pub mod protocol;
pub mod resolver;
