// Copyright 2020 Joyent, Inc.

use bson::{Bson, Document};

use crate::address::NodeAddress;
use crate::error::Error;
use crate::protocol::{Message, ProtocolError};

/// Something that can carry one request/reply exchange for a node.
/// [`Connected`](../node/struct.Connected.html) is the implementation used by
/// the node.
pub trait Execute {
    fn execute(&mut self, request: &[u8]) -> Result<Vec<u8>, Error>;
    fn address(&self) -> &NodeAddress;
}

/// Encode `command` for `database`, run it and interpret the reply.
///
/// A reply whose `ok` field is not 1 is returned as `Error::CommandFailure`.
/// The transport worked in that case, so it says nothing about node health.
pub fn run<E>(
    exec: &mut E,
    database: &str,
    command: Document,
) -> Result<Document, Error>
where
    E: Execute + ?Sized,
{
    let name = command.keys().next().cloned().unwrap_or_default();
    let request = Message::command(database, command);
    let bytes = request
        .encode()
        .map_err(|e| Error::protocol(exec.address(), e))?;

    let reply_bytes = exec.execute(&bytes)?;

    let reply = Message::decode(&reply_bytes)
        .map_err(|e| Error::protocol(exec.address(), e))?;
    if reply.response_to != request.request_id {
        return Err(Error::protocol(
            exec.address(),
            ProtocolError::ResponseMismatch {
                expected: request.request_id,
                actual: reply.response_to,
            },
        ));
    }

    check_reply(exec.address(), name, reply.document)
}

fn check_reply(
    address: &NodeAddress,
    command: String,
    reply: Document,
) -> Result<Document, Error> {
    if reply.get("ok").map_or(false, is_ok) {
        return Ok(reply);
    }

    let code = reply.get("code").and_then(|code| match code {
        Bson::Int32(c) => Some(*c),
        Bson::Int64(c) => Some(*c as i32),
        Bson::Double(c) => Some(*c as i32),
        _ => None,
    });
    let message = reply
        .get_str("errmsg")
        .map(String::from)
        .unwrap_or_else(|_| String::from("command failed"));

    Err(Error::CommandFailure {
        address: address.clone(),
        command,
        code,
        message,
        reply,
    })
}

fn is_ok(value: &Bson) -> bool {
    match value {
        Bson::Double(v) => (*v - 1.0).abs() < f64::EPSILON,
        Bson::Int32(v) => *v == 1,
        Bson::Int64(v) => *v == 1,
        Bson::Boolean(v) => *v,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use bson::doc;

    // Answers every request with a fixed reply document.
    struct CannedServer {
        address: NodeAddress,
        reply: Document,
        requests: Vec<Message>,
        mismatch: bool,
    }

    impl CannedServer {
        fn new(reply: Document) -> Self {
            CannedServer {
                address: NodeAddress::new("db.example.com", 27017),
                reply,
                requests: Vec::new(),
                mismatch: false,
            }
        }
    }

    impl Execute for CannedServer {
        fn execute(&mut self, request: &[u8]) -> Result<Vec<u8>, Error> {
            let request = Message::decode(request)
                .map_err(|e| Error::protocol(&self.address, e))?;
            let mut reply = request.reply_to(self.reply.clone());
            if self.mismatch {
                reply.response_to += 1;
            }
            self.requests.push(request);
            reply.encode().map_err(|e| Error::protocol(&self.address, e))
        }

        fn address(&self) -> &NodeAddress {
            &self.address
        }
    }

    #[test]
    fn successful_command() {
        let mut server = CannedServer::new(doc! { "ok": 1.0 });
        let reply = run(&mut server, "admin", doc! { "ping": 1 }).unwrap();

        assert_eq!(reply, doc! { "ok": 1.0 });
        assert_eq!(server.requests.len(), 1);
        assert_eq!(
            server.requests[0].document,
            doc! { "ping": 1, "$db": "admin" }
        );
    }

    #[test]
    fn ok_forms() {
        assert!(is_ok(&Bson::Int32(1)));
        assert!(is_ok(&Bson::Int64(1)));
        assert!(is_ok(&Bson::Boolean(true)));
        assert!(!is_ok(&Bson::Double(0.0)));
        assert!(!is_ok(&Bson::String("1".to_string())));
    }

    #[test]
    fn command_failure_carries_server_error() {
        let mut server = CannedServer::new(doc! {
            "ok": 0.0,
            "errmsg": "no such command: 'frobnicate'",
            "code": 59,
        });

        match run(&mut server, "admin", doc! { "frobnicate": 1 }) {
            Err(Error::CommandFailure {
                command,
                code,
                message,
                ..
            }) => {
                assert_eq!(command, "frobnicate");
                assert_eq!(code, Some(59));
                assert_eq!(message, "no such command: 'frobnicate'");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn reply_to_another_request() {
        let mut server = CannedServer::new(doc! { "ok": 1 });
        server.mismatch = true;

        match run(&mut server, "admin", doc! { "ping": 1 }) {
            Err(Error::Protocol {
                source: ProtocolError::ResponseMismatch { .. },
                ..
            }) => (),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
