//! Credential handling: basic auth, inline cookie strings and
//! Netscape-format cookie files.

mod private
{
  /// One cookie, as read from a Netscape cookie-jar file or an inline
  /// `name=value` pair.
  #[ derive( Debug, Clone, PartialEq, Eq ) ]
  pub struct Cookie
  {
    /// Cookie name.
    pub name : String,
    /// Cookie value.
    pub value : String,
    /// The domain the cookie is scoped to, when known.
    pub domain : Option< String >,
    /// The path the cookie is scoped to, when known.
    pub path : Option< String >,
    /// Whether the cookie was marked secure-only.
    pub secure : bool,
    /// Whether the cookie line carried the `#HttpOnly_` marker prefix.
    pub http_only : bool,
  }

  /// The resolved authentication material for one engine instance: either
  /// basic-auth credentials or a cookie jar, never both (invariant 8).
  #[ derive( Debug, Clone ) ]
  pub enum Credentials
  {
    /// HTTP Basic authentication.
    Basic
    {
      /// Username.
      user : String,
      /// Password.
      password : String,
    },
    /// A pre-established session, carried as a cookie jar (e.g. from a
    /// prior interactive logon).
    Cookies( Vec< Cookie > ),
  }

  impl Credentials
  {
    /// Build basic-auth credentials.
    #[ must_use ]
    pub fn basic( user : impl Into< String >, password : impl Into< String > ) -> Self
    {
      Self::Basic { user : user.into(), password : password.into() }
    }

    /// The `Authorization: Basic <...>` header value, when basic auth is in use.
    #[ must_use ]
    pub fn basic_header( &self ) -> Option< String >
    {
      match self
      {
        Self::Basic { user, password } =>
        {
          use base64::Engine as _;
          let raw = format!( "{user}:{password}" );
          Some( format!( "Basic {}", base64::engine::general_purpose::STANDARD.encode( raw ) ) )
        },
        Self::Cookies( _ ) => None,
      }
    }

    /// The cookies to seed the jar with, when cookie auth is in use.
    #[ must_use ]
    pub fn cookies( &self ) -> &[ Cookie ]
    {
      match self
      {
        Self::Basic { .. } => &[],
        Self::Cookies( cookies ) => cookies,
      }
    }
  }

  /// Parse an inline `name=value; name2=value2` cookie string (no domain/path
  /// metadata; scoped to the engine's configured base URL by the transport).
  #[ must_use ]
  pub fn parse_cookie_string( s : &str ) -> Vec< Cookie >
  {
    s.split( ';' )
      .filter_map( | part |
      {
        let part = part.trim();
        if part.is_empty()
        {
          return None;
        }
        let ( name, value ) = part.split_once( '=' )?;
        Some( Cookie
        {
          name : name.trim().to_string(),
          value : value.trim().to_string(),
          domain : None,
          path : None,
          secure : false,
          http_only : false,
        } )
      } )
      .collect()
  }

  /// Parse a Netscape-format cookie file (the format written by `curl -c`
  /// and most browser export tools).
  ///
  /// Each data line has seven tab-separated fields: domain, `include
  /// subdomains` flag, path, secure flag, expiry, name, value. A domain
  /// beginning with `#HttpOnly_` marks the cookie http-only; the marker is
  /// stripped before the domain is recorded. Blank lines and comment lines
  /// (`#` not followed by `HttpOnly_`) are skipped.
  #[ must_use ]
  pub fn parse_netscape_cookie_file( contents : &str ) -> Vec< Cookie >
  {
    contents
      .lines()
      .filter_map( | line |
      {
        let line = line.trim_end();
        if line.is_empty()
        {
          return None;
        }

        let ( http_only, line ) = match line.strip_prefix( "#HttpOnly_" )
        {
          Some( rest ) => ( true, rest ),
          None if line.starts_with( '#' ) => return None,
          None => ( false, line ),
        };

        let fields : Vec< &str > = line.split( '\t' ).collect();
        if fields.len() < 7
        {
          return None;
        }

        let domain = fields[ 0 ];
        let path = fields[ 2 ];
        let secure = fields[ 3 ].eq_ignore_ascii_case( "TRUE" );
        let name = fields[ 5 ];
        let value = fields[ 6 ];

        Some( Cookie
        {
          name : name.to_string(),
          value : value.to_string(),
          domain : Some( domain.to_string() ),
          path : Some( path.to_string() ),
          secure,
          http_only,
        } )
      } )
      .collect()
  }

  /// Derive the `sap-usercontext` cookie value carrying the SAP client id,
  /// as sent alongside the session cookie on every request once a logon
  /// has established `client` out of band.
  #[ must_use ]
  pub fn usercontext_cookie( client : &str ) -> Cookie
  {
    Cookie
    {
      name : "sap-usercontext".to_string(),
      value : format!( "sap-client={client}" ),
      domain : None,
      path : None,
      secure : false,
      http_only : false,
    }
  }
}

pub use private::{ Cookie, Credentials, parse_cookie_string, parse_netscape_cookie_file, usercontext_cookie };

#[ cfg( test ) ]
mod tests
{
  use super::*;

  #[ test ]
  fn basic_header_encodes_user_and_password()
  {
    let creds = Credentials::basic( "bob", "secret" );
    let header = creds.basic_header().unwrap();
    assert!( header.starts_with( "Basic " ) );
    assert!( creds.cookies().is_empty() );
  }

  #[ test ]
  fn cookie_credentials_have_no_basic_header()
  {
    let creds = Credentials::Cookies( parse_cookie_string( "sid=abc123" ) );
    assert!( creds.basic_header().is_none() );
    assert_eq!( creds.cookies().len(), 1 );
  }

  #[ test ]
  fn parses_simple_cookie_string_with_multiple_pairs()
  {
    let cookies = parse_cookie_string( "a=1; b=2 ; c= 3" );
    assert_eq!( cookies.len(), 3 );
    assert_eq!( cookies[ 0 ].name, "a" );
    assert_eq!( cookies[ 2 ].value, "3" );
  }

  #[ test ]
  fn parses_netscape_file_honoring_httponly_prefix()
  {
    let contents = "\
# Netscape HTTP Cookie File
.example.com\tTRUE\t/\tTRUE\t0\tsid\tabc123
#HttpOnly_.example.com\tTRUE\t/sap\tFALSE\t0\tMYSAPSSO2\tdeadbeef
";
    let cookies = parse_netscape_cookie_file( contents );
    assert_eq!( cookies.len(), 2 );

    assert_eq!( cookies[ 0 ].name, "sid" );
    assert!( cookies[ 0 ].secure );
    assert!( !cookies[ 0 ].http_only );

    assert_eq!( cookies[ 1 ].name, "MYSAPSSO2" );
    assert!( cookies[ 1 ].http_only );
    assert_eq!( cookies[ 1 ].domain.as_deref(), Some( ".example.com" ) );
    assert_eq!( cookies[ 1 ].path.as_deref(), Some( "/sap" ) );
  }

  #[ test ]
  fn blank_and_short_lines_are_skipped()
  {
    let contents = "\n\nmalformed-short-line\n.example.com\tTRUE\t/\tFALSE\t0\tsid\tabc\n";
    let cookies = parse_netscape_cookie_file( contents );
    assert_eq!( cookies.len(), 1 );
  }

  #[ test ]
  fn usercontext_cookie_carries_client()
  {
    let c = usercontext_cookie( "800" );
    assert_eq!( c.name, "sap-usercontext" );
    assert_eq!( c.value, "sap-client=800" );
  }
}
