//! Scalability-protocols REQ/REP sockets, wire compatible with nanomsg.
//!
//! The bridge is reached through a REP socket bound to any number of
//! endpoints at once (`ipc://` Unix domain sockets and `tcp://`). Requests from
//! every connected REQ peer are funnelled into a single queue so the caller
//! sees strict receive/send alternation, exactly like `nn_recv`/`nn_send` on
//! an `NN_REP` socket.
//!
//! Wire format per connection:
//! - 8-byte protocol header exchanged once: `00 'S' 'P' 00 <proto u16 BE> 00 00`
//! - TCP messages: `u64 BE length` + body
//! - IPC messages: `0x01` + `u64 BE length` + body
//!
//! REQ bodies carry a backtrace of 4-byte words in front of the payload; the
//! last word has its top bit set and doubles as the request id.

pub mod codec;
pub mod endpoint;
pub mod error;
pub mod handshake;
pub mod listener;
pub mod rep;
pub mod req;
pub mod stream;

pub use codec::{DEFAULT_MAX_MESSAGE_SIZE, PROTO_REP, PROTO_REQ};
pub use endpoint::{Endpoint, DEFAULT_IPC_ENDPOINT, DEFAULT_TCP_ENDPOINT};
pub use error::{Result, SpError};
pub use rep::{ReplySocket, SocketConfig};
pub use req::RequestSocket;
pub use stream::{SpStream, Transport};
