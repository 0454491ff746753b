// Copyright 2020 Joyent, Inc.

use std::collections::HashMap;
use std::io;
use std::net::{IpAddr, SocketAddr, ToSocketAddrs};

use crate::address::NodeAddress;

/// Turns the host and port of a node into an address that can be connected
/// to. A failure here marks the node down; it is never fatal to the node.
pub trait Resolver: Send {
    fn resolve(&self, address: &NodeAddress) -> io::Result<SocketAddr>;
}

/// Resolves through the operating system, taking the first address returned.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemResolver;

impl Resolver for SystemResolver {
    fn resolve(&self, address: &NodeAddress) -> io::Result<SocketAddr> {
        (address.host(), address.port())
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| no_address(address))
    }
}

/// Resolves host names from a fixed table. IP literals resolve to
/// themselves.
#[derive(Clone, Debug, Default)]
pub struct StaticResolver {
    hosts: HashMap<String, IpAddr>,
}

impl StaticResolver {
    pub fn new(hosts: Vec<(String, IpAddr)>) -> Self {
        StaticResolver {
            hosts: hosts.into_iter().collect(),
        }
    }

    pub fn insert<S: Into<String>>(&mut self, host: S, ip: IpAddr) {
        self.hosts.insert(host.into(), ip);
    }

    pub fn remove(&mut self, host: &str) -> Option<IpAddr> {
        self.hosts.remove(host)
    }
}

impl Resolver for StaticResolver {
    fn resolve(&self, address: &NodeAddress) -> io::Result<SocketAddr> {
        let ip = match address.host().parse::<IpAddr>() {
            Ok(ip) => ip,
            Err(_) => *self
                .hosts
                .get(address.host())
                .ok_or_else(|| no_address(address))?,
        };
        Ok(SocketAddr::new(ip, address.port()))
    }
}

fn no_address(address: &NodeAddress) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("no address found for {}", address.host()),
    )
}
