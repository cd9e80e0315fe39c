//! MCP runtime library.
//!
//! A client/server runtime for the Model Context Protocol (MCP): a
//! peer-symmetric JSON-RPC 2.0 engine with request correlation, progress
//! streaming, cancellation, timeouts and capability negotiation, plus
//! transport adapters for stdio, SSE (both halves), Streamable HTTP and
//! WebSocket.
//!
//! The [`Client`] and [`server::Server`]/[`server_session::ServerSession`]
//! roles are thin façades over one shared [`protocol::Protocol`] engine;
//! they differ only in the handlers they install and the capability policy
//! they enforce.

pub mod client;
pub mod errors;
pub mod framing;
pub mod protocol;
pub mod server;
pub mod server_session;
pub mod transport;
pub mod types;

mod registry;

pub use client::{ Client, ClientOptions, ElicitationHandler, SamplingHandler };
pub use errors::{ Error, ErrorCode, ErrorData };
pub use protocol::messages::{ JSONRPCMessage, ProgressToken, RequestId, JSONRPC_VERSION };
pub use protocol::{
    BoxFuture,
    CancelToken,
    Progress,
    Protocol,
    ProtocolOptions,
    RequestContext,
    RequestOptions,
};
pub use server::{ Server, ServerOptions };
pub use server_session::ServerSession;
pub use transport::sse::{ SseOptions, SseTransport };
pub use transport::sse_server::{ SseServer, SseServerOptions, SseServerTransport };
pub use transport::stdio::StdioTransport;
pub use transport::streamable_http::{ StreamableHttpOptions, StreamableHttpTransport };
pub use transport::websocket::WebSocketTransport;
pub use transport::{ SendOptions, Transport };
