//! Stable error taxonomy for the ADT client engine.

mod private
{
  use error_tools::dependency::thiserror;

  /// All error kinds the engine can surface to a caller.
  ///
  /// Every variant corresponds to one of the stable codes enumerated in
  /// the error handling design: callers match on the variant, not on the
  /// rendered message, but the rendered message always begins with the
  /// kind so a human (or an LLM agent) reading plain text still sees it.
  #[ derive( Debug, thiserror::Error, Clone ) ]
  pub enum Error
  {
    /// A tool or workflow argument was missing or malformed.
    #[ error( "invalid-argument: {0}" ) ]
    InvalidArgument( String ),

    /// The safety gate denied the operation before any network I/O occurred.
    #[ error( "blocked-by-policy: {0}" ) ]
    BlockedByPolicy( String ),

    /// Credentials were rejected or missing.
    #[ error( "auth-failed: {0}" ) ]
    AuthFailed( String ),

    /// A transport-level failure (connection, TLS, timeout at the socket level).
    #[ error( "network: {0}" ) ]
    Network( String ),

    /// The server returned a 5xx response.
    #[ error( "server-5xx: {0}" ) ]
    Server5xx( String ),

    /// The object is locked by another user or session.
    #[ error( "lock-conflict: {0}" ) ]
    LockConflict( String ),

    /// Create failed because the object already exists.
    #[ error( "already-exists: {0}" ) ]
    AlreadyExists( String ),

    /// The requested object does not exist.
    #[ error( "not-found: {0}" ) ]
    NotFound( String ),

    /// A syntax check returned diagnostics of error severity.
    #[ error( "syntax-error: {0:?}" ) ]
    SyntaxError( Vec< crate::crud_api::SyntaxDiagnostic > ),

    /// Activation failed; carries the still-inactive object URIs.
    #[ error( "activation-failed: inactive={0:?}" ) ]
    ActivationFailed( Vec< String > ),

    /// A deployment run completed with at least one per-object failure.
    #[ error( "deployment-partial: {0}" ) ]
    DeploymentPartial( String ),

    /// A WebSocket stream's chunk set did not match its announced total.
    #[ error( "stream-incomplete: {0}" ) ]
    StreamIncomplete( String ),

    /// An operation exceeded its deadline.
    #[ error( "timeout: {0}" ) ]
    Timeout( String ),

    /// The caller's cancellation token fired before completion.
    #[ error( "cancelled: {0}" ) ]
    Cancelled( String ),

    /// The object kind is recognized but not supported by this operation.
    #[ error( "unsupported-object: {0}" ) ]
    UnsupportedObject( String ),

    /// A generic validation failure a step could not otherwise classify.
    #[ error( "validation: {0}" ) ]
    Validation( String ),
  }

  impl Error
  {
    /// The stable kind string, as used in the tool-facade's `is-error` text
    /// (everything before the first `: `).
    #[ must_use ]
    pub fn kind( &self ) -> &'static str
    {
      match self
      {
        Error::InvalidArgument( _ ) => "invalid-argument",
        Error::BlockedByPolicy( _ ) => "blocked-by-policy",
        Error::AuthFailed( _ ) => "auth-failed",
        Error::Network( _ ) => "network",
        Error::Server5xx( _ ) => "server-5xx",
        Error::LockConflict( _ ) => "lock-conflict",
        Error::AlreadyExists( _ ) => "already-exists",
        Error::NotFound( _ ) => "not-found",
        Error::SyntaxError( _ ) => "syntax-error",
        Error::ActivationFailed( _ ) => "activation-failed",
        Error::DeploymentPartial( _ ) => "deployment-partial",
        Error::StreamIncomplete( _ ) => "stream-incomplete",
        Error::Timeout( _ ) => "timeout",
        Error::Cancelled( _ ) => "cancelled",
        Error::UnsupportedObject( _ ) => "unsupported-object",
        Error::Validation( _ ) => "validation",
      }
    }
  }

  impl From< reqwest::Error > for Error
  {
    #[ inline ]
    fn from( err : reqwest::Error ) -> Self
    {
      if err.is_timeout()
      {
        Error::Timeout( format!( "request timeout: {err}" ) )
      }
      else if err.is_connect()
      {
        Error::Network( format!( "connection failed: {err}" ) )
      }
      else
      {
        match err.status().map( | s | s.as_u16() )
        {
          Some( 401 ) | Some( 403 ) => Error::AuthFailed( err.to_string() ),
          Some( 404 ) => Error::NotFound( err.to_string() ),
          Some( code ) if code >= 500 => Error::Server5xx( err.to_string() ),
          _ => Error::Network( err.to_string() ),
        }
      }
    }
  }

  impl From< serde_json::Error > for Error
  {
    #[ inline ]
    fn from( err : serde_json::Error ) -> Self
    {
      Error::Validation( format!( "json error: {err}" ) )
    }
  }

  impl From< quick_xml::Error > for Error
  {
    #[ inline ]
    fn from( err : quick_xml::Error ) -> Self
    {
      Error::Validation( format!( "xml error: {err}" ) )
    }
  }

  impl From< std::io::Error > for Error
  {
    #[ inline ]
    fn from( err : std::io::Error ) -> Self
    {
      Error::Network( format!( "io error: {err}" ) )
    }
  }

  #[ cfg( feature = "websocket" ) ]
  impl From< tokio_tungstenite::tungstenite::Error > for Error
  {
    #[ inline ]
    fn from( err : tokio_tungstenite::tungstenite::Error ) -> Self
    {
      Error::Network( format!( "websocket error: {err}" ) )
    }
  }
}

pub use private::Error;

/// Convenience alias used throughout the crate.
pub type Result< T > = core::result::Result< T, Error >;
