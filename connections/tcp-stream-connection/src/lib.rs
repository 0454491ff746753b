// Copyright 2020 Joyent, Inc.

use std::io::{self, Error as IOError, ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Duration;

use replica_node::connection::{Connection, ExchangeError};
use replica_node::protocol;

/// Connect timeout used when the config does not name one.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration shared by every connection a node creates.
#[derive(Clone, Copy, Debug, Default)]
pub struct TcpStreamConnectionConfig {
    /// An optional timeout for establishing the TCP connection. If not
    /// specified the default is 5 seconds.
    pub connect_timeout: Option<Duration>,
    /// An optional timeout for each read and write on the socket. If not
    /// specified reads and writes block until the peer answers or the
    /// connection fails.
    pub socket_timeout: Option<Duration>,
}

#[derive(Debug)]
pub struct TcpStreamConnection {
    pub stream: Option<TcpStream>,
    addr: SocketAddr,
    connected: bool,
    config: TcpStreamConnectionConfig,
}

impl TcpStreamConnection {
    pub fn new(addr: &SocketAddr, config: TcpStreamConnectionConfig) -> Self {
        TcpStreamConnection {
            stream: None,
            addr: *addr,
            connected: false,
            config,
        }
    }

    pub fn connection_creator(
        config: TcpStreamConnectionConfig,
    ) -> impl FnMut(&SocketAddr) -> TcpStreamConnection + Send + 'static {
        move |addr: &SocketAddr| TcpStreamConnection::new(addr, config)
    }

    pub fn addr(&self) -> &SocketAddr {
        &self.addr
    }
}

impl Connection for TcpStreamConnection {
    type Error = IOError;

    fn connect(&mut self) -> Result<(), Self::Error> {
        let timeout =
            self.config.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT);
        let stream = TcpStream::connect_timeout(&self.addr, timeout)?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(self.config.socket_timeout)?;
        stream.set_write_timeout(self.config.socket_timeout)?;
        self.stream = Some(stream);
        self.connected = true;
        Ok(())
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        self.connected = false;
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn execute(
        &mut self,
        request: &[u8],
    ) -> Result<Vec<u8>, ExchangeError<Self::Error>> {
        let stream = match self.stream.as_mut() {
            Some(stream) => stream,
            None => {
                return Err(ExchangeError::Stale(IOError::new(
                    ErrorKind::NotConnected,
                    "socket is not open",
                )))
            }
        };

        check_stream(stream).map_err(ExchangeError::Stale)?;

        stream
            .write_all(request)
            .and_then(|()| stream.flush())
            .map_err(ExchangeError::Transmission)?;

        read_message(stream).map_err(ExchangeError::Transmission)
    }
}

// Look at the socket without blocking before anything is written. A peer
// that closed or reset the connection shows up as EOF or an error here. Bytes
// waiting to be read mean the stream is out of step with the protocol.
fn check_stream(stream: &TcpStream) -> io::Result<()> {
    stream.set_nonblocking(true)?;
    let mut buf = [0u8; 1];
    let peeked = stream.peek(&mut buf);
    stream.set_nonblocking(false)?;

    match peeked {
        Ok(0) => Err(IOError::new(
            ErrorKind::ConnectionAborted,
            "connection closed by peer",
        )),
        Ok(_) => Err(IOError::new(
            ErrorKind::InvalidData,
            "unexpected data waiting on connection",
        )),
        Err(ref e) if e.kind() == ErrorKind::WouldBlock => Ok(()),
        Err(e) => Err(e),
    }
}

fn read_message(stream: &mut TcpStream) -> io::Result<Vec<u8>> {
    let mut prefix = [0u8; 4];
    stream.read_exact(&mut prefix)?;
    let length = protocol::frame_length(prefix)
        .map_err(|e| IOError::new(ErrorKind::InvalidData, e))?;

    let mut message = vec![0u8; length];
    message[..4].copy_from_slice(&prefix);
    stream.read_exact(&mut message[4..])?;
    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::net::TcpListener;
    use std::thread;

    fn listener() -> (TcpListener, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        (listener, addr)
    }

    #[test]
    fn connect_and_close() {
        let (_listener, addr) = listener();
        let mut conn =
            TcpStreamConnection::new(&addr, TcpStreamConnectionConfig::default());
        assert!(!conn.is_connected());

        conn.connect().unwrap();
        assert!(conn.is_connected());
        assert_eq!(conn.addr(), &addr);

        conn.close();
        assert!(!conn.is_connected());
        conn.close();
        assert!(!conn.is_connected());
        assert!(conn.stream.is_none());
    }

    #[test]
    fn refused_connection() {
        let (listener, addr) = listener();
        drop(listener);

        let mut conn =
            TcpStreamConnection::new(&addr, TcpStreamConnectionConfig::default());
        assert!(conn.connect().is_err());
        assert!(!conn.is_connected());
    }

    #[test]
    fn missing_socket_is_stale() {
        let (_listener, addr) = listener();
        let mut conn =
            TcpStreamConnection::new(&addr, TcpStreamConnectionConfig::default());
        conn.connect().unwrap();

        // The flag still claims a connection the socket no longer backs.
        conn.stream = None;
        assert!(conn.is_connected());
        match conn.execute(b"request") {
            Err(ExchangeError::Stale(e)) => {
                assert_eq!(e.kind(), ErrorKind::NotConnected)
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn peer_closed_before_send_is_stale() {
        let (listener, addr) = listener();
        let mut conn =
            TcpStreamConnection::new(&addr, TcpStreamConnectionConfig::default());
        conn.connect().unwrap();

        let (server_side, _) = listener.accept().unwrap();
        drop(server_side);
        thread::sleep(Duration::from_millis(100));

        match conn.execute(b"request") {
            Err(ExchangeError::Stale(_)) => (),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn peer_closed_after_request_is_transmission_failure() {
        let (listener, addr) = listener();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 7];
            stream.read_exact(&mut buf).unwrap();
            // Hang up without answering.
        });

        let mut conn =
            TcpStreamConnection::new(&addr, TcpStreamConnectionConfig::default());
        conn.connect().unwrap();

        let result = conn.execute(b"request");
        server.join().unwrap();
        match result {
            Err(ExchangeError::Transmission(e)) => {
                assert_eq!(e.kind(), ErrorKind::UnexpectedEof)
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn reads_one_framed_reply() {
        let (listener, addr) = listener();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 4];
            stream.read_exact(&mut buf).unwrap();

            let mut reply = 20i32.to_le_bytes().to_vec();
            reply.extend_from_slice(&[7u8; 16]);
            stream.write_all(&reply).unwrap();
        });

        let mut conn =
            TcpStreamConnection::new(&addr, TcpStreamConnectionConfig::default());
        conn.connect().unwrap();

        let reply = conn.execute(b"ping").unwrap();
        server.join().unwrap();
        assert_eq!(reply.len(), 20);
        assert_eq!(&reply[..4], &20i32.to_le_bytes());
        assert!(reply[4..].iter().all(|b| *b == 7));
    }

    #[test]
    fn read_timeout_is_transmission_failure() {
        let (listener, addr) = listener();
        let config = TcpStreamConnectionConfig {
            connect_timeout: None,
            socket_timeout: Some(Duration::from_millis(100)),
        };
        let mut conn = TcpStreamConnection::new(&addr, config);
        conn.connect().unwrap();
        let (_server_side, _) = listener.accept().unwrap();

        match conn.execute(b"ping") {
            Err(ExchangeError::Transmission(_)) => (),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
