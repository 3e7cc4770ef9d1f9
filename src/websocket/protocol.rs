//! Wire message schema for the engine's WebSocket channel.

use serde::{ Deserialize, Serialize };
use serde_json::Value;

/// A request frame sent over the WebSocket channel.
#[ derive( Debug, Clone, Serialize, Deserialize ) ]
pub struct WsRequest
{
  /// Correlation id, echoed back on every response frame for this request.
  pub id : String,
  /// The tool facade domain this request targets (e.g. `"read"`, `"workflow"`).
  pub domain : String,
  /// The action within that domain.
  pub action : String,
  /// Action-specific parameters.
  pub params : Value,
  /// Optional per-request timeout, in milliseconds.
  #[ serde( skip_serializing_if = "Option::is_none" ) ]
  pub timeout : Option< u64 >,
  /// Whether the response should be delivered as a chunked stream rather
  /// than a single `complete` frame.
  #[ serde( skip_serializing_if = "Option::is_none" ) ]
  pub stream : Option< bool >,
  /// Preferred chunk size in bytes, when `stream` is set.
  #[ serde( skip_serializing_if = "Option::is_none" ) ]
  pub chunk_size : Option< usize >,
}

/// A response frame. Every variant carries the originating request's `id`
/// so the multiplexer can route it to the right pending future.
#[ derive( Debug, Clone, Serialize, Deserialize ) ]
#[ serde( tag = "type", rename_all = "lowercase" ) ]
pub enum WsResponse
{
  /// Sent once, immediately after the connection opens.
  Welcome
  {
    /// Server-assigned session identifier.
    session_id : String,
  },
  /// An intermediate progress update; the request is still in flight.
  Progress
  {
    /// Correlation id.
    id : String,
    /// Free-form progress payload.
    payload : Value,
  },
  /// One chunk of a streamed response.
  Chunk
  {
    /// Correlation id.
    id : String,
    /// 1-based sequence number within the stream.
    seq : u32,
    /// Chunk payload bytes, base64-encoded on the wire.
    data : String,
  },
  /// The request finished successfully. `total_chunks` is the authoritative
  /// chunk count a streamed call's assembler checks its received `seq`
  /// values against; non-streamed calls carry it as `0` alongside `result`.
  Complete
  {
    /// Correlation id.
    id : String,
    /// The number of chunks the stream was split into.
    #[ serde( rename = "totalChunks", default ) ]
    total_chunks : u32,
    /// The final result payload, for non-streamed calls.
    #[ serde( default, skip_serializing_if = "Option::is_none" ) ]
    result : Option< Value >,
    /// The assembled payload, for streamed calls whose chunks the server
    /// concatenates server-side before signalling completion.
    #[ serde( default, skip_serializing_if = "Option::is_none" ) ]
    data : Option< String >,
  },
  /// The request failed.
  Error
  {
    /// Correlation id.
    id : String,
    /// The stable error kind (matches [`crate::error::Error::kind`]).
    kind : String,
    /// Human-readable message.
    message : String,
  },
}

impl WsResponse
{
  /// The correlation id this response applies to, when it has one (the
  /// welcome frame precedes any request and has none).
  #[ must_use ]
  pub fn correlation_id( &self ) -> Option< &str >
  {
    match self
    {
      WsResponse::Welcome { .. } => None,
      WsResponse::Progress { id, .. }
      | WsResponse::Chunk { id, .. }
      | WsResponse::Complete { id, .. }
      | WsResponse::Error { id, .. } => Some( id ),
    }
  }
}

/// An asynchronous debugger event pushed outside the request/response
/// correlation scheme (breakpoint hit, variable change, session end).
#[ derive( Debug, Clone, Serialize, Deserialize ) ]
pub struct DebuggerEvent
{
  /// The debuggee session this event belongs to.
  pub debuggee_id : String,
  /// Event kind (`"breakpoint"`, `"terminated"`, ...).
  pub event : String,
  /// Event-specific payload.
  pub payload : Value,
}

#[ cfg( test ) ]
mod tests
{
  use super::*;

  #[ test ]
  fn complete_and_error_expose_their_correlation_id()
  {
    let complete = WsResponse::Complete { id : "42".to_string(), total_chunks : 0, result : Some( Value::Null ), data : None };
    assert_eq!( complete.correlation_id(), Some( "42" ) );

    let error = WsResponse::Error { id : "43".to_string(), kind : "not-found".to_string(), message : "x".to_string() };
    assert_eq!( error.correlation_id(), Some( "43" ) );
  }

  #[ test ]
  fn welcome_has_no_correlation_id()
  {
    let welcome = WsResponse::Welcome { session_id : "s1".to_string() };
    assert_eq!( welcome.correlation_id(), None );
  }

  #[ test ]
  fn response_tag_serializes_lowercase()
  {
    let complete = WsResponse::Complete { id : "1".to_string(), total_chunks : 0, result : Some( Value::Null ), data : None };
    let json = serde_json::to_value( &complete ).unwrap();
    assert_eq!( json[ "type" ], "complete" );
  }

  #[ test ]
  fn complete_carries_total_chunks_for_streamed_calls()
  {
    let json = serde_json::json!( { "type" : "complete", "id" : "9", "totalChunks" : 3, "data" : "YWJj" } );
    let parsed : WsResponse = serde_json::from_value( json ).unwrap();
    match parsed
    {
      WsResponse::Complete { total_chunks, result, data, .. } =>
      {
        assert_eq!( total_chunks, 3 );
        assert_eq!( result, None );
        assert_eq!( data.as_deref(), Some( "YWJj" ) );
      },
      other => panic!( "expected Complete, got {other:?}" ),
    }
  }

  #[ test ]
  fn chunk_has_no_total_field()
  {
    let chunk = WsResponse::Chunk { id : "1".to_string(), seq : 1, data : "YQ==".to_string() };
    let json = serde_json::to_value( &chunk ).unwrap();
    assert!( json.get( "total" ).is_none() );
    assert_eq!( json[ "seq" ], 1 );
  }
}
