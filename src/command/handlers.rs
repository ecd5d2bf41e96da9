//! GET / SET / PING handlers
//!
//! Each handler checks arity before touching storage.

use bytes::{BufMut, Bytes, BytesMut};

use crate::engine::Engine;
use crate::protocol::Response;

/// `GET key`
pub fn get(engine: &Engine, args: &[Bytes]) -> Response {
    if args.len() != 2 {
        return arity_error("get");
    }

    match engine.get(&args[1]) {
        Ok(Some(value)) => Response::bulk(value),
        Ok(None) => Response::Null,
        Err(e) => {
            tracing::warn!("GET failed: {}", e);
            Response::error(format!("ERR {}", e))
        }
    }
}

/// `SET key value`; replies with the key once stored
pub fn set(engine: &Engine, args: &[Bytes]) -> Response {
    if args.len() != 3 {
        return arity_error("set");
    }

    match engine.set(&args[1], &args[2]) {
        Ok(()) => Response::Bulk(args[1].clone()),
        Err(e) => {
            tracing::warn!("SET failed: {}", e);
            Response::error(format!("ERR {}", e))
        }
    }
}

/// `PING [message]`
pub fn ping(_engine: &Engine, args: &[Bytes]) -> Response {
    match args.len() {
        1 => Response::simple("PONG"),
        2 => {
            let mut reply = BytesMut::with_capacity(5 + args[1].len());
            reply.put_slice(b"PONG ");
            reply.put_slice(&args[1]);
            // A message with line breaks would break a simple string reply
            if args[1].iter().any(|&b| b == b'\r' || b == b'\n') {
                Response::Bulk(reply.freeze())
            } else {
                Response::Simple(reply.freeze())
            }
        }
        _ => arity_error("ping"),
    }
}

fn arity_error(name: &str) -> Response {
    Response::error(format!("ERR wrong number of arguments for '{}' command", name))
}
