//! Configuration surface: the resolved key set from spec §6, and the
//! precedence-merge logic over already-parsed sources.
//!
//! Reading CLI flags, environment variables and dotenv files is the
//! outer framework's job (an external collaborator, per spec §1); this
//! module only defines the merge semantics once those sources have been
//! turned into `HashMap<String, String>`s, and the typed [`Config`] they
//! resolve to.

mod private
{
  use serde::{ Deserialize, Serialize };
  use std::collections::HashMap;

  /// Tool catalog exposure mode (spec §4.10 / §6 `mode` key).
  #[ derive( Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize ) ]
  #[ serde( rename_all = "lowercase" ) ]
  pub enum ExposureMode
  {
    /// A whitelisted subset plus the two unified entry points.
    Focused,
    /// Every tool identifier.
    Expert,
  }

  /// The fully-resolved, immutable configuration for one engine instance.
  #[ derive( Debug, Clone, Serialize, Deserialize ) ]
  pub struct Config
  {
    /// SAP endpoint base URL. Required.
    pub base_url : String,
    /// Basic-auth username.
    pub user : Option< String >,
    /// Basic-auth password.
    pub password : Option< String >,
    /// SAP client id (default "001").
    pub client : String,
    /// SAP logon language (default "EN").
    pub language : String,
    /// Skip TLS certificate verification.
    pub insecure : bool,
    /// Path to a Netscape-format cookie file.
    pub cookie_file : Option< String >,
    /// An inline `k=v; k=v` cookie string.
    pub cookie_string : Option< String >,
    /// Enable verbose transport tracing.
    pub verbose : bool,
    /// Tool catalog exposure mode.
    pub mode : ExposureMode,
    /// Safety: read-only mode.
    pub read_only : bool,
    /// Safety: block free-SQL.
    pub block_free_sql : bool,
    /// Safety: operation allow-list (comma-separated operation names).
    pub allowed_ops : Vec< String >,
    /// Safety: operation deny-list.
    pub disallowed_ops : Vec< String >,
    /// Safety: package allow-patterns.
    pub allowed_packages : Vec< String >,
    /// Safety: opt-in for the transport operation class.
    pub enable_transports : bool,
    /// Safety: restrict transport operations to reads.
    pub transport_read_only : bool,
    /// Safety: transport allow-patterns.
    pub allowed_transports : Vec< String >,
    /// Safety: enable mutations against transportable (non-`$*`) packages.
    pub allow_transportable_edits : bool,
  }

  impl Default for Config
  {
    fn default() -> Self
    {
      Self
      {
        base_url : String::new(),
        user : None,
        password : None,
        client : "001".to_string(),
        language : "EN".to_string(),
        insecure : false,
        cookie_file : None,
        cookie_string : None,
        verbose : false,
        mode : ExposureMode::Focused,
        read_only : false,
        block_free_sql : false,
        allowed_ops : Vec::new(),
        disallowed_ops : Vec::new(),
        allowed_packages : Vec::new(),
        enable_transports : false,
        transport_read_only : false,
        allowed_transports : Vec::new(),
        allow_transportable_edits : false,
      }
    }
  }

  /// One already-parsed configuration source: CLI flags, environment
  /// variables or a dotenv file, each reduced to a flat string map keyed by
  /// the canonical key names in spec §6 (e.g. `"base-url"`, `"read-only"`).
  pub type SourceMap = HashMap< String, String >;

  fn get<'a>( sources : &[ &'a SourceMap ], key : &str ) -> Option< &'a str >
  {
    // `sources` is ordered highest-precedence first; the first source that
    // carries a non-empty value for `key` wins.
    sources.iter().find_map( | m | m.get( key ).map( String::as_str ).filter( | v | !v.is_empty() ) )
  }

  fn get_bool( sources : &[ &SourceMap ], key : &str ) -> bool
  {
    matches!( get( sources, key ), Some( "1" ) | Some( "true" ) | Some( "yes" ) )
  }

  fn get_list( sources : &[ &SourceMap ], key : &str ) -> Vec< String >
  {
    get( sources, key )
      .map( | v | v.split( ',' ).map( str::trim ).filter( | s | !s.is_empty() ).map( str::to_string ).collect() )
      .unwrap_or_default()
  }

  impl Config
  {
    /// Merge configuration sources by precedence: `cli`, then `env`, then
    /// `dotenv`, then the built-in defaults. Highest precedence first in
    /// the parameter list; a key absent or empty in a higher-precedence
    /// source falls through to the next.
    ///
    /// # Errors
    /// Returns [`crate::error::Error::InvalidArgument`] if `base-url` is
    /// missing from every source, or if both basic and cookie auth are
    /// configured (the two are mutually exclusive, invariant 8).
    pub fn resolve( cli : &SourceMap, env : &SourceMap, dotenv : &SourceMap ) -> crate::error::Result< Self >
    {
      let defaults = SourceMap::new();
      let sources : [ &SourceMap; 4 ] = [ cli, env, dotenv, &defaults ];

      let base_url = get( &sources, "base-url" )
        .ok_or_else( || crate::error::Error::InvalidArgument( "base-url is required".into() ) )?
        .to_string();

      let user = get( &sources, "user" ).map( str::to_string );
      let password = get( &sources, "password" ).map( str::to_string );
      let cookie_file = get( &sources, "cookie-file" ).map( str::to_string );
      let cookie_string = get( &sources, "cookie-string" ).map( str::to_string );

      if ( user.is_some() || password.is_some() ) && ( cookie_file.is_some() || cookie_string.is_some() )
      {
        return Err( crate::error::Error::InvalidArgument(
          "basic auth (user/password) and cookie auth are mutually exclusive".into()
        ) );
      }

      let mode = match get( &sources, "mode" )
      {
        Some( "expert" ) => ExposureMode::Expert,
        _ => ExposureMode::Focused,
      };

      Ok( Self
      {
        base_url,
        user,
        password,
        client : get( &sources, "client" ).unwrap_or( "001" ).to_string(),
        language : get( &sources, "language" ).unwrap_or( "EN" ).to_string(),
        insecure : get_bool( &sources, "insecure" ),
        cookie_file,
        cookie_string,
        verbose : get_bool( &sources, "verbose" ),
        mode,
        read_only : get_bool( &sources, "read-only" ),
        block_free_sql : get_bool( &sources, "block-free-sql" ),
        allowed_ops : get_list( &sources, "allowed-ops" ),
        disallowed_ops : get_list( &sources, "disallowed-ops" ),
        allowed_packages : get_list( &sources, "allowed-packages" ),
        enable_transports : get_bool( &sources, "enable-transports" ),
        transport_read_only : get_bool( &sources, "transport-read-only" ),
        allowed_transports : get_list( &sources, "allowed-transports" ),
        allow_transportable_edits : get_bool( &sources, "allow-transportable-edits" ),
      } )
    }

    /// Build the [`crate::safety::SafetyPolicy`] this configuration implies.
    #[ must_use ]
    pub fn safety_policy( &self ) -> crate::safety::SafetyPolicy
    {
      use crate::safety::{ SafetyPolicy, NamePattern, Operation };

      fn parse_ops( names : &[ String ] ) -> std::collections::HashSet< Operation >
      {
        names.iter().filter_map( | n | match n.to_lowercase().as_str()
        {
          "read" => Some( Operation::Read ),
          "search" => Some( Operation::Search ),
          "query" => Some( Operation::Query ),
          "free-sql" | "freesql" => Some( Operation::FreeSql ),
          "create" => Some( Operation::Create ),
          "update" => Some( Operation::Update ),
          "delete" => Some( Operation::Delete ),
          "activate" => Some( Operation::Activate ),
          "test" => Some( Operation::Test ),
          "lock" => Some( Operation::Lock ),
          "intelligence" => Some( Operation::Intelligence ),
          "workflow" => Some( Operation::Workflow ),
          "transport" => Some( Operation::Transport ),
          _ => None,
        } ).collect()
      }

      SafetyPolicy
      {
        read_only : self.read_only,
        block_free_sql : self.block_free_sql,
        allowed_ops : parse_ops( &self.allowed_ops ),
        disallowed_ops : parse_ops( &self.disallowed_ops ),
        allowed_packages : self.allowed_packages.iter().map( | p | NamePattern::new( p.clone() ) ).collect(),
        allowed_transports : self.allowed_transports.iter().map( | p | NamePattern::new( p.clone() ) ).collect(),
        enable_transports : self.enable_transports,
        transport_read_only : self.transport_read_only,
        allow_transportable_edits : self.allow_transportable_edits,
        dry_run : false,
      }
    }
  }
}

pub use private::{ Config, ExposureMode, SourceMap };

#[ cfg( test ) ]
mod tests
{
  use super::*;

  fn map( pairs : &[ ( &str, &str ) ] ) -> SourceMap
  {
    pairs.iter().map( | ( k, v ) | ( ( *k ).to_string(), ( *v ).to_string() ) ).collect()
  }

  #[ test ]
  fn cli_overrides_env_overrides_dotenv()
  {
    let cli = map( &[ ( "base-url", "https://cli.example" ) ] );
    let env = map( &[ ( "base-url", "https://env.example" ) ] );
    let dotenv = map( &[ ( "base-url", "https://dotenv.example" ) ] );

    let cfg = Config::resolve( &cli, &env, &dotenv ).unwrap();
    assert_eq!( cfg.base_url, "https://cli.example" );
  }

  #[ test ]
  fn missing_base_url_is_an_error()
  {
    let empty = SourceMap::new();
    assert!( Config::resolve( &empty, &empty, &empty ).is_err() );
  }

  #[ test ]
  fn basic_and_cookie_auth_are_mutually_exclusive()
  {
    let cli = map( &[ ( "base-url", "https://x" ), ( "user", "bob" ), ( "cookie-string", "a=b" ) ] );
    let empty = SourceMap::new();
    assert!( Config::resolve( &cli, &empty, &empty ).is_err() );
  }

  #[ test ]
  fn defaults_apply_when_absent_everywhere()
  {
    let cli = map( &[ ( "base-url", "https://x" ) ] );
    let empty = SourceMap::new();
    let cfg = Config::resolve( &cli, &empty, &empty ).unwrap();
    assert_eq!( cfg.client, "001" );
    assert_eq!( cfg.language, "EN" );
    assert_eq!( cfg.mode, ExposureMode::Focused );
  }

  #[ test ]
  fn empty_value_in_higher_precedence_falls_through()
  {
    let cli = map( &[ ( "base-url", "https://x" ), ( "client", "" ) ] );
    let env = map( &[ ( "client", "800" ) ] );
    let empty = SourceMap::new();
    let cfg = Config::resolve( &cli, &env, &empty ).unwrap();
    assert_eq!( cfg.client, "800" );
  }
}
