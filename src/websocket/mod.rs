//! WebSocket multiplexer: one connection carrying many concurrently
//! in-flight requests, correlated by id, plus chunked-stream reassembly
//! and an async debugger-event feed.

#[ cfg( feature = "websocket" ) ]
pub mod protocol;
#[ cfg( feature = "websocket" ) ]
pub mod connection;
#[ cfg( feature = "websocket" ) ]
pub mod streaming;

#[ cfg( feature = "websocket" ) ]
pub use protocol::{ WsRequest, WsResponse, DebuggerEvent };
#[ cfg( feature = "websocket" ) ]
pub use connection::{ WsConnection, WsConnectionConfig };
#[ cfg( feature = "websocket" ) ]
pub use streaming::{ StreamAssembler, StreamError };
