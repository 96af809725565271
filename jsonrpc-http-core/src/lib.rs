//! Core protocol types for JSON-RPC over HTTP.
//!
//! This crate provides the transport-independent pieces used by the client
//! (`jsonrpc-http-client`) and by servers that want to share its conventions.
//!
//! ## Modules
//!
//! - [`error`]: JSON-RPC error codes and codec errors
//! - [`message`]: Request/response wire types and the [`RpcCodec`] contract
//! - [`compression`]: Response content encodings
//! - [`trace`]: Trace context and its header representation
//! - [`path`]: The `/jsonrpc/` service path convention

pub mod compression;
pub mod error;
pub mod message;
pub mod path;
pub mod trace;

pub use compression::*;
pub use error::*;
pub use message::*;
pub use path::*;
pub use trace::*;
