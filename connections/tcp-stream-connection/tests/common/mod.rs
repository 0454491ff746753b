// Copyright 2020 Joyent, Inc.

//
// An in-process stand-in for a database server. It answers every OP_MSG
// request with `{ ok: 1.0 }` and can be told to misbehave the way a real
// server does when it restarts or crashes.
//

use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use bson::doc;
use slog::{o, Drain, Logger};

use replica_node::protocol::{self, Message};

// Long enough for a FIN sent by the server to reach the client on loopback.
pub const SETTLE_DELAY: Duration = Duration::from_millis(100);

#[derive(Default)]
struct Shared {
    stopping: AtomicBool,
    hangup_on_next_message: AtomicBool,
    accepted: AtomicUsize,
    messages: AtomicUsize,
    streams: Mutex<Vec<TcpStream>>,
}

pub struct MockServer {
    addr: SocketAddr,
    shared: Arc<Shared>,
    accept_thread: Option<thread::JoinHandle<()>>,
}

impl MockServer {
    pub fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let shared = Arc::new(Shared::default());

        let accept_shared = shared.clone();
        let accept_thread =
            thread::spawn(move || accept_loop(listener, accept_shared));

        MockServer {
            addr,
            shared,
            accept_thread: Some(accept_thread),
        }
    }

    pub fn address(&self) -> String {
        self.addr.to_string()
    }

    pub fn accepted(&self) -> usize {
        self.shared.accepted.load(Ordering::SeqCst)
    }

    pub fn messages(&self) -> usize {
        self.shared.messages.load(Ordering::SeqCst)
    }

    /// Drop every open connection without telling the clients.
    pub fn hiccup(&self) {
        let mut streams = self.shared.streams.lock().unwrap();
        for stream in streams.drain(..) {
            let _ = stream.shutdown(Shutdown::Both);
        }
        drop(streams);
        thread::sleep(SETTLE_DELAY);
    }

    /// Read the next request, then hang up instead of replying.
    pub fn hiccup_on_next_message(&self) {
        self.shared
            .hangup_on_next_message
            .store(true, Ordering::SeqCst);
    }

    /// Stop listening and drop every connection. New connections are
    /// refused afterwards.
    pub fn stop(&mut self) {
        if let Some(handle) = self.accept_thread.take() {
            self.shared.stopping.store(true, Ordering::SeqCst);
            // Wake the accept loop so it notices.
            let _ = TcpStream::connect(self.addr);
            let _ = handle.join();
            self.hiccup();
        }
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn accept_loop(listener: TcpListener, shared: Arc<Shared>) {
    for stream in listener.incoming() {
        if shared.stopping.load(Ordering::SeqCst) {
            break;
        }
        let stream = match stream {
            Ok(stream) => stream,
            Err(_) => continue,
        };
        shared.accepted.fetch_add(1, Ordering::SeqCst);
        if let Ok(clone) = stream.try_clone() {
            shared.streams.lock().unwrap().push(clone);
        }
        let conn_shared = shared.clone();
        thread::spawn(move || serve(stream, conn_shared));
    }
}

fn serve(mut stream: TcpStream, shared: Arc<Shared>) {
    loop {
        let mut prefix = [0u8; 4];
        if stream.read_exact(&mut prefix).is_err() {
            return;
        }
        let length = match protocol::frame_length(prefix) {
            Ok(length) => length,
            Err(_) => return,
        };
        let mut message = vec![0u8; length];
        message[..4].copy_from_slice(&prefix);
        if stream.read_exact(&mut message[4..]).is_err() {
            return;
        }
        shared.messages.fetch_add(1, Ordering::SeqCst);

        if shared.hangup_on_next_message.swap(false, Ordering::SeqCst) {
            let _ = stream.shutdown(Shutdown::Both);
            return;
        }

        let request = match Message::decode(&message) {
            Ok(request) => request,
            Err(_) => return,
        };
        let reply = match request.reply_to(doc! { "ok": 1.0 }).encode() {
            Ok(reply) => reply,
            Err(_) => return,
        };
        if stream.write_all(&reply).is_err() {
            return;
        }
    }
}

pub fn test_log() -> Logger {
    let plain = slog_term::PlainSyncDecorator::new(std::io::stdout());
    Logger::root(
        Mutex::new(slog_term::FullFormat::new(plain).build()).fuse(),
        o!("build-id" => "0.1.0"),
    )
}
