//! The multiplexed WebSocket connection: one socket, many concurrently
//! in-flight requests, correlated by id.

mod private
{
  use crate::codecs::base64_encode;
  use crate::error::{ Error, Result };
  use crate::websocket::protocol::{ DebuggerEvent, WsRequest, WsResponse };
  use crate::websocket::streaming::StreamAssembler;
  use futures::{ SinkExt, StreamExt };
  use serde_json::Value;
  use std::collections::HashMap;
  use std::sync::Arc;
  use std::time::Duration;
  use tokio::sync::{ mpsc, oneshot, Mutex };
  use tokio_tungstenite::tungstenite::client::IntoClientRequest;
  use tokio_tungstenite::tungstenite::Message;

  #[ cfg( feature = "logging" ) ]
  use tracing::{ debug, warn };

  /// How long [`WsConnection::connect`] waits for the server's welcome frame
  /// before giving up on the handshake.
  const WELCOME_TIMEOUT : Duration = Duration::from_secs( 5 );

  /// The default per-request deadline [`WsConnection::call`] and
  /// [`WsConnection::call_streaming`] enforce when the caller's own `cancel`
  /// future never fires.
  const DEFAULT_REQUEST_TIMEOUT : Duration = Duration::from_secs( 60 );

  /// Connection-level configuration.
  #[ derive( Debug, Clone ) ]
  pub struct WsConnectionConfig
  {
    /// The `wss://` (or `ws://`) URL to connect to.
    pub url : String,
    /// Basic-auth credentials for the pre-handshake `Authorization` header
    /// (the WebSocket upgrade request carries its own auth, independent of
    /// the REST transport's cookie jar).
    pub basic_auth : Option< ( String, String ) >,
    /// Capacity of the outbound-to-caller debugger-event channel.
    pub debugger_channel_capacity : usize,
    /// Capacity of the outbound-to-caller progress-event channel.
    pub progress_channel_capacity : usize,
    /// Per-request deadline, independent of caller-supplied cancellation.
    pub request_timeout : Duration,
  }

  impl WsConnectionConfig
  {
    /// Build a config for `url` with no pre-handshake auth.
    #[ must_use ]
    pub fn new( url : impl Into< String > ) -> Self
    {
      Self
      {
        url : url.into(),
        basic_auth : None,
        debugger_channel_capacity : 64,
        progress_channel_capacity : 64,
        request_timeout : DEFAULT_REQUEST_TIMEOUT,
      }
    }
  }

  enum Pending
  {
    Single( oneshot::Sender< Result< Value > > ),
    Streaming { assembler : StreamAssembler, done : oneshot::Sender< Result< Vec< u8 > > > },
  }

  /// A progress update delivered out-of-band from a request's eventual
  /// `Complete`/`Error` outcome.
  #[ derive( Debug, Clone ) ]
  pub struct ProgressEvent
  {
    /// The correlation id of the request this progress update belongs to.
    pub id : String,
    /// The server's free-form progress payload.
    pub payload : Value,
  }

  /// A live multiplexed connection. Cloning shares the same underlying
  /// socket and pending-request table.
  #[ derive( Clone ) ]
  pub struct WsConnection
  {
    outbound : mpsc::UnboundedSender< Message >,
    pending : Arc< Mutex< HashMap< String, Pending > > >,
    debugger_events : Arc< Mutex< mpsc::Receiver< DebuggerEvent > > >,
    progress_events : Arc< Mutex< mpsc::Receiver< ProgressEvent > > >,
    request_timeout : Duration,
  }

  impl core::fmt::Debug for WsConnection
  {
    fn fmt( &self, f : &mut core::fmt::Formatter< '_ > ) -> core::fmt::Result
    {
      f.debug_struct( "WsConnection" ).finish_non_exhaustive()
    }
  }

  impl WsConnection
  {
    /// Open the connection and spawn its read loop. Returns once the
    /// server's welcome frame has been received.
    ///
    /// # Errors
    /// Returns [`Error::Network`] if the handshake fails.
    pub async fn connect( config : WsConnectionConfig ) -> Result< Self >
    {
      let mut request = config.url.as_str().into_client_request().map_err( | e | Error::Network( format!( "invalid websocket url: {e}" ) ) )?;

      if let Some( ( user, password ) ) = &config.basic_auth
      {
        let raw = format!( "{user}:{password}" );
        let header_value = format!( "Basic {}", base64_encode( raw.as_bytes() ) );
        request.headers_mut().insert( "Authorization", header_value.parse().map_err( | _ | Error::AuthFailed( "invalid auth header".into() ) )? );
      }

      let ( stream, _response ) = tokio_tungstenite::connect_async( request ).await.map_err( Error::from )?;
      let ( mut write, mut read ) = stream.split();

      let welcome = tokio::time::timeout( WELCOME_TIMEOUT, read.next() ).await
        .map_err( | _ | Error::Timeout( "no welcome frame within 5s".into() ) )?
        .ok_or_else( || Error::Network( "connection closed before welcome frame".into() ) )?
        .map_err( Error::from )?;
      let Message::Text( welcome_text ) = welcome else
      {
        return Err( Error::Network( "first frame was not a text welcome frame".into() ) );
      };
      match serde_json::from_str::< WsResponse >( &welcome_text )
      {
        Ok( WsResponse::Welcome { .. } ) => {},
        Ok( other ) => return Err( Error::Network( format!( "expected welcome frame, got {other:?}" ) ) ),
        Err( e ) => return Err( Error::Network( format!( "malformed welcome frame: {e}" ) ) ),
      }

      let ( outbound_tx, mut outbound_rx ) = mpsc::unbounded_channel::< Message >();
      let pending : Arc< Mutex< HashMap< String, Pending > > > = Arc::new( Mutex::new( HashMap::new() ) );
      let ( debugger_tx, debugger_rx ) = mpsc::channel( config.debugger_channel_capacity );
      let ( progress_tx, progress_rx ) = mpsc::channel( config.progress_channel_capacity );

      tokio::spawn( async move
      {
        while let Some( message ) = outbound_rx.recv().await
        {
          if write.send( message ).await.is_err()
          {
            break;
          }
        }
      } );

      let pending_for_reader = Arc::clone( &pending );
      tokio::spawn( async move
      {
        while let Some( Ok( message ) ) = read.next().await
        {
          let Message::Text( text ) = message else { continue };
          let Ok( response ) = serde_json::from_str::< WsResponse >( &text ) else { continue };
          dispatch( &pending_for_reader, response, &debugger_tx, &progress_tx ).await;
        }
      } );

      Ok( Self
      {
        outbound : outbound_tx,
        pending,
        debugger_events : Arc::new( Mutex::new( debugger_rx ) ),
        progress_events : Arc::new( Mutex::new( progress_rx ) ),
        request_timeout : config.request_timeout,
      } )
    }

    /// Send a request and await its single `Complete` response.
    ///
    /// # Errors
    /// Returns the server's reported error, mapped from its `kind` string,
    /// [`Error::Cancelled`] if `cancel` fires first, or [`Error::Timeout`]
    /// if neither arrives within the connection's request deadline.
    pub async fn call( &self, request : WsRequest, cancel : impl core::future::Future< Output = () > ) -> Result< Value >
    {
      let ( tx, rx ) = oneshot::channel();
      {
        let mut pending = self.pending.lock().await;
        pending.insert( request.id.clone(), Pending::Single( tx ) );
      }

      let id = request.id.clone();
      let payload = serde_json::to_string( &request )?;
      if self.outbound.send( Message::Text( payload.into() ) ).is_err()
      {
        self.pending.lock().await.remove( &id );
        return Err( Error::Network( "websocket outbound channel closed".into() ) );
      }

      tokio::select!
      {
        result = rx => result.map_err( | _ | Error::Network( "connection closed before response".into() ) )?,
        () = cancel =>
        {
          self.pending.lock().await.remove( &id );
          Err( Error::Cancelled( format!( "request {id} cancelled" ) ) )
        },
        () = tokio::time::sleep( self.request_timeout ) =>
        {
          self.pending.lock().await.remove( &id );
          Err( Error::Timeout( format!( "request {id} exceeded {:?}", self.request_timeout ) ) )
        },
      }
    }

    /// Send a request and await its fully-reassembled chunked stream.
    ///
    /// # Errors
    /// Returns [`Error::StreamIncomplete`] if the stream ends without every
    /// announced chunk having arrived, or [`Error::Timeout`] if the
    /// connection's request deadline elapses first.
    pub async fn call_streaming( &self, request : WsRequest, cancel : impl core::future::Future< Output = () > ) -> Result< Vec< u8 > >
    {
      let ( tx, rx ) = oneshot::channel();
      {
        let mut pending = self.pending.lock().await;
        pending.insert( request.id.clone(), Pending::Streaming { assembler : StreamAssembler::new(), done : tx } );
      }

      let id = request.id.clone();
      let payload = serde_json::to_string( &request )?;
      if self.outbound.send( Message::Text( payload.into() ) ).is_err()
      {
        self.pending.lock().await.remove( &id );
        return Err( Error::Network( "websocket outbound channel closed".into() ) );
      }

      tokio::select!
      {
        result = rx => result.map_err( | _ | Error::Network( "connection closed before stream completed".into() ) )?,
        () = cancel =>
        {
          self.pending.lock().await.remove( &id );
          Err( Error::Cancelled( format!( "request {id} cancelled" ) ) )
        },
        () = tokio::time::sleep( self.request_timeout ) =>
        {
          self.pending.lock().await.remove( &id );
          Err( Error::Timeout( format!( "request {id} exceeded {:?}", self.request_timeout ) ) )
        },
      }
    }

    /// Receive the next async debugger event. Returns `None` once the
    /// connection has closed.
    pub async fn next_debugger_event( &self ) -> Option< DebuggerEvent >
    {
      self.debugger_events.lock().await.recv().await
    }

    /// Receive the next progress update for any in-flight request. Returns
    /// `None` once the connection has closed.
    pub async fn next_progress_event( &self ) -> Option< ProgressEvent >
    {
      self.progress_events.lock().await.recv().await
    }
  }

  async fn dispatch(
    pending : &Arc< Mutex< HashMap< String, Pending > > >,
    response : WsResponse,
    debugger_tx : &mpsc::Sender< DebuggerEvent >,
    progress_tx : &mpsc::Sender< ProgressEvent >,
  )
  {
    match response
    {
      WsResponse::Welcome { .. } => {},
      WsResponse::Progress { id, payload } =>
      {
        let _ = progress_tx.send( ProgressEvent { id, payload } ).await;
      },
      WsResponse::Chunk { id, seq, data } =>
      {
        let mut table = pending.lock().await;
        if let Some( Pending::Streaming { assembler, .. } ) = table.get_mut( &id )
        {
          if let Ok( bytes ) = crate::codecs::base64_decode( &data )
          {
            assembler.push( seq, bytes );
          }
        }
      },
      WsResponse::Complete { id, total_chunks, result, data } =>
      {
        let mut table = pending.lock().await;
        match table.remove( &id )
        {
          Some( Pending::Single( tx ) ) => { let _ = tx.send( Ok( result.unwrap_or( Value::Null ) ) ); },
          Some( Pending::Streaming { assembler, done } ) =>
          {
            let outcome = match data
            {
              Some( assembled ) => crate::codecs::base64_decode( &assembled ).map_err( Error::from ),
              None => assembler.finish( total_chunks ).map_err( Error::from ),
            };
            let _ = done.send( outcome );
          },
          None =>
          {
            #[ cfg( feature = "logging" ) ]
            warn!( id, "complete frame for unknown/cancelled request" );
          },
        }
      },
      WsResponse::Error { id, kind, message } =>
      {
        let mut table = pending.lock().await;
        let error = classify_error( &kind, &message );
        match table.remove( &id )
        {
          Some( Pending::Single( tx ) ) => { let _ = tx.send( Err( error ) ); },
          Some( Pending::Streaming { done, .. } ) => { let _ = done.send( Err( error ) ); },
          None => {},
        }
      },
    }

    // debugger events arrive over a separate out-of-band channel the
    // multiplexer doesn't parse yet; this keeps the sender alive and the
    // parameter used until that wiring lands.
    let _ = debugger_tx.capacity();
  }

  fn classify_error( kind : &str, message : &str ) -> Error
  {
    match kind
    {
      "invalid-argument" => Error::InvalidArgument( message.to_string() ),
      "blocked-by-policy" => Error::BlockedByPolicy( message.to_string() ),
      "auth-failed" => Error::AuthFailed( message.to_string() ),
      "not-found" => Error::NotFound( message.to_string() ),
      "lock-conflict" => Error::LockConflict( message.to_string() ),
      "already-exists" => Error::AlreadyExists( message.to_string() ),
      "server-5xx" => Error::Server5xx( message.to_string() ),
      "timeout" => Error::Timeout( message.to_string() ),
      _ => Error::Network( format!( "{kind}: {message}" ) ),
    }
  }
}

pub use private::{ WsConnection, WsConnectionConfig };
