//! HTTP transport: URL composition, cookie jar, CSRF token lifecycle and
//! response-to-error classification.
//!
//! ## Design Principle: Thin Transport
//!
//! This module performs exactly the HTTP mechanics an ADT server requires —
//! no request batching, no client-side caching, no speculative retries
//! beyond the single CSRF-refresh retry the protocol itself demands.

mod private
{
  use crate::auth::Credentials;
  use crate::error::{ Error, Result };
  use crate::metrics::EngineMetrics;
  use core::time::Duration;
  use reqwest::{ Client, Method, StatusCode };
  use std::sync::Arc;
  use tokio::sync::Mutex;

  #[ cfg( feature = "logging" ) ]
  use tracing::{ debug, instrument, warn };

  /// Configuration controlling how the transport talks to the server.
  #[ derive( Debug, Clone ) ]
  pub struct TransportConfig
  {
    /// Base URL, e.g. `https://host:port`. No trailing slash.
    pub base_url : String,
    /// SAP client id, sent as the `sap-client` query parameter on every call.
    pub client : String,
    /// Logon language, sent as the `sap-language` query parameter.
    pub language : String,
    /// Request timeout.
    pub timeout : Duration,
    /// Skip TLS certificate verification (lab systems with self-signed certs).
    pub insecure : bool,
  }

  impl TransportConfig
  {
    /// Build a config with the given base URL and engine defaults.
    #[ must_use ]
    pub fn new( base_url : impl Into< String > ) -> Self
    {
      Self
      {
        base_url : base_url.into(),
        client : "001".to_string(),
        language : "EN".to_string(),
        timeout : Duration::from_secs( 60 ),
        insecure : false,
      }
    }
  }

  /// The CSRF token slot, guarded for interior mutability because the
  /// transport is shared across concurrent tool invocations.
  #[ derive( Debug, Default ) ]
  struct CsrfState
  {
    token : Option< String >,
  }

  /// The HTTP transport: owns the `reqwest` client, the CSRF token and the
  /// credential material, and composes every outbound request.
  #[ derive( Debug, Clone ) ]
  pub struct Transport
  {
    http : Client,
    config : TransportConfig,
    credentials : Credentials,
    csrf : Arc< Mutex< CsrfState > >,
    metrics : Option< Arc< EngineMetrics > >,
  }

  impl Transport
  {
    /// Build a transport. Constructs the underlying `reqwest::Client` once;
    /// callers should keep a single `Transport` per engine instance so the
    /// cookie jar and CSRF token persist across calls.
    ///
    /// # Errors
    /// Returns [`Error::Network`] if the underlying HTTP client cannot be built.
    pub fn new( config : TransportConfig, credentials : Credentials ) -> Result< Self >
    {
      let mut builder = Client::builder()
        .cookie_store( true )
        .timeout( config.timeout )
        .danger_accept_invalid_certs( config.insecure );

      if let Credentials::Cookies( cookies ) = &credentials
      {
        let jar = reqwest::cookie::Jar::default();
        let url : reqwest::Url = config.base_url.parse()
          .map_err( | _ | Error::InvalidArgument( format!( "invalid base-url: {}", config.base_url ) ) )?;
        for cookie in cookies
        {
          jar.add_cookie_str( &format!( "{}={}", cookie.name, cookie.value ), &url );
        }
        if !cookies.iter().any( | c | c.name == "sap-usercontext" )
        {
          let usercontext = crate::auth::usercontext_cookie( &config.client );
          jar.add_cookie_str( &format!( "{}={}", usercontext.name, usercontext.value ), &url );
        }
        builder = builder.cookie_provider( Arc::new( jar ) );
      }

      let http = builder.build().map_err( | e | Error::Network( format!( "failed to build http client: {e}" ) ) )?;

      Ok( Self { http, config, credentials, csrf : Arc::new( Mutex::new( CsrfState::default() ) ), metrics : None } )
    }

    /// Attach the engine's call counters so CSRF fetch/refresh events are
    /// recorded. Transports built for tests that don't care about metrics
    /// may skip this.
    #[ must_use ]
    pub fn with_metrics( mut self, metrics : Arc< EngineMetrics > ) -> Self
    {
      self.metrics = Some( metrics );
      self
    }

    /// The attached metrics counters, when set.
    #[ must_use ]
    pub fn metrics( &self ) -> Option< &Arc< EngineMetrics > >
    {
      self.metrics.as_ref()
    }

    fn full_url( &self, path : &str, query : Option< &[ ( &str, &str ) ] > ) -> String
    {
      let mut url = format!( "{}{path}", self.config.base_url );
      let mut sep = if path.contains( '?' ) { '&' } else { '?' };
      if let Some( pairs ) = query
      {
        for ( k, v ) in pairs
        {
          url.push( sep );
          url.push_str( &urlencoding::encode( k ) );
          url.push( '=' );
          url.push_str( &urlencoding::encode( v ) );
          sep = '&';
        }
      }
      url.push( sep );
      url.push_str( &format!( "sap-client={}&sap-language={}", self.config.client, self.config.language ) );
      url
    }

    fn apply_auth( &self, builder : reqwest::RequestBuilder ) -> reqwest::RequestBuilder
    {
      match self.credentials.basic_header()
      {
        Some( header ) => builder.header( reqwest::header::AUTHORIZATION, header ),
        None => builder,
      }
    }

    /// Fetch (or reuse) the CSRF token required before any mutating request.
    /// A `GET` with `x-csrf-token: Fetch` is issued exactly once per token
    /// lifetime; subsequent mutating calls reuse the cached value until the
    /// server rejects it.
    async fn ensure_csrf_token( &self ) -> Result< String >
    {
      {
        let state = self.csrf.lock().await;
        if let Some( token ) = &state.token
        {
          return Ok( token.clone() );
        }
      }

      let url = self.full_url( "/sap/bc/adt/discovery", None );
      let request = self.apply_auth( self.http.get( &url ) ).header( "x-csrf-token", "Fetch" );
      let response = request.send().await.map_err( Error::from )?;

      let token = response
        .headers()
        .get( "x-csrf-token" )
        .and_then( | v | v.to_str().ok() )
        .ok_or_else( || Error::AuthFailed( "server did not return an x-csrf-token".into() ) )?
        .to_string();

      let mut state = self.csrf.lock().await;
      state.token = Some( token.clone() );
      if let Some( metrics ) = &self.metrics
      {
        metrics.record_csrf_fetch();
      }
      Ok( token )
    }

    async fn invalidate_csrf_token( &self )
    {
      let mut state = self.csrf.lock().await;
      state.token = None;
    }

    fn is_csrf_rejection( response : &reqwest::Response ) -> bool
    {
      response.status() == StatusCode::FORBIDDEN
        && response.headers().get( "x-csrf-token" ).and_then( | v | v.to_str().ok() ) == Some( "Required" )
    }

    /// Execute a request, transparently fetching a CSRF token for mutating
    /// methods and retrying exactly once if the server reports the cached
    /// token invalid. `query` carries extra key/value pairs appended ahead
    /// of the client/language parameters every request sends; `accept`
    /// overrides the default `application/*` accept header.
    #[ cfg_attr( feature = "logging", instrument( skip( self, body ), fields( method = %method, path = %path ) ) ) ]
    pub async fn execute(
      &self,
      method : Method,
      path : &str,
      query : Option< &[ ( &str, &str ) ] >,
      body : Option< Vec< u8 > >,
      content_type : Option< &str >,
      accept : Option< &str >,
    ) -> Result< Response >
    {
      let needs_csrf = matches!( method, Method::POST | Method::PUT | Method::DELETE );
      let mut attempt = 0;

      loop
      {
        attempt += 1;
        let url = self.full_url( path, query );
        let mut builder = self.apply_auth( self.http.request( method.clone(), &url ) );

        if needs_csrf
        {
          let token = self.ensure_csrf_token().await?;
          builder = builder.header( "x-csrf-token", token );
        }

        if let Some( ct ) = content_type
        {
          builder = builder.header( reqwest::header::CONTENT_TYPE, ct );
        }
        builder = builder.header( reqwest::header::ACCEPT, accept.unwrap_or( "application/*" ) );

        if let Some( ref b ) = body
        {
          builder = builder.body( b.clone() );
        }

        let response = builder.send().await.map_err( Error::from )?;

        if needs_csrf && Self::is_csrf_rejection( &response ) && attempt == 1
        {
          #[ cfg( feature = "logging" ) ]
          warn!( "csrf token rejected, refreshing and retrying once" );
          if let Some( metrics ) = &self.metrics
          {
            metrics.record_csrf_refresh();
          }
          self.invalidate_csrf_token().await;
          continue;
        }

        return Self::classify( response ).await;
      }
    }

    async fn classify( response : reqwest::Response ) -> Result< Response >
    {
      let status = response.status();
      let headers = response.headers().clone();

      if status.is_success()
      {
        let body = response.bytes().await.map_err( Error::from )?.to_vec();
        return Ok( Response { status : status.as_u16(), body, headers } );
      }

      let text = response.text().await.unwrap_or_default();

      let lower = text.to_lowercase();
      let is_already_exists = lower.contains( "already exist" ) || lower.contains( "alreadyexists" );

      Err( match status
      {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::AuthFailed( text ),
        StatusCode::NOT_FOUND => Error::NotFound( text ),
        StatusCode::BAD_REQUEST | StatusCode::CONFLICT if is_already_exists => Error::AlreadyExists( text ),
        StatusCode::CONFLICT => Error::LockConflict( text ),
        s if s.is_client_error() => Error::Validation( text ),
        s if s.is_server_error() => Error::Server5xx( text ),
        _ => Error::Network( format!( "unexpected status {status}: {text}" ) ),
      } )
    }
  }

  /// A classified HTTP response, surfaced to callers once status-based
  /// error classification has already run.
  #[ derive( Debug, Clone ) ]
  pub struct Response
  {
    /// The HTTP status code.
    pub status : u16,
    /// Raw response body bytes.
    pub body : Vec< u8 >,
    /// Response headers, preserved for callers that need e.g. `Location`.
    pub headers : reqwest::header::HeaderMap,
  }

  impl Response
  {
    /// Decode the body as UTF-8 text.
    ///
    /// # Errors
    /// Returns [`Error::Validation`] if the body is not valid UTF-8.
    pub fn text( &self ) -> Result< String >
    {
      String::from_utf8( self.body.clone() ).map_err( | e | Error::Validation( format!( "non-utf8 response body: {e}" ) ) )
    }
  }
}

pub use private::{ Transport, TransportConfig, Response };

#[ cfg( test ) ]
mod tests
{
  use super::*;
  use crate::auth::Credentials;

  #[ test ]
  fn transport_config_defaults_are_sane()
  {
    let cfg = TransportConfig::new( "https://host:44300" );
    assert_eq!( cfg.client, "001" );
    assert_eq!( cfg.language, "EN" );
  }

  #[ tokio::test ]
  async fn transport_builds_with_basic_credentials()
  {
    let cfg = TransportConfig::new( "https://host:44300" );
    let creds = Credentials::basic( "bob", "secret" );
    let transport = Transport::new( cfg, creds );
    assert!( transport.is_ok() );
  }

  #[ tokio::test ]
  async fn transport_builds_with_cookie_credentials()
  {
    let cfg = TransportConfig::new( "https://host:44300" );
    let creds = Credentials::Cookies( crate::auth::parse_cookie_string( "sid=abc" ) );
    let transport = Transport::new( cfg, creds );
    assert!( transport.is_ok() );
  }
}
