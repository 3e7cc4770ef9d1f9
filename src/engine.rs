//! The top-level `Engine`: owns the transport, the safety policy, the
//! metrics counters and (optionally) a live WebSocket connection, and
//! exposes every workflow as a single gated entry point.

mod private
{
  use crate::auth::Credentials;
  use crate::config::Config;
  use crate::crud_api::{ ActivationResult, SyntaxDiagnostic, TestDuration, TestRisk, UnitTestReport };
  use crate::deployment::{ DeploymentPlan, DeploymentReport };
  use crate::error::{ Error, Result };
  use crate::metrics::EngineMetrics;
  use crate::object_ref::ObjectRef;
  use crate::read_api::{ CodeLocation, DependencyQuery, SearchResult, SourcePosition };
  use crate::safety::{ Operation, SafetyPolicy };
  use crate::transport::{ Transport, TransportConfig };
  use crate::workflow::{ EditResult, EditSpec, WriteResult };
  use std::collections::HashMap;
  use std::sync::Arc;

  #[ cfg( feature = "websocket" ) ]
  use crate::websocket::WsConnection;

  /// A cooperative cancellation signal passed into every long-running
  /// engine call. The engine never spawns its own cancellation timers;
  /// callers (the tool facade, ultimately the outer agent loop) own the
  /// deadline.
  #[ derive( Clone ) ]
  pub struct CancelToken( tokio::sync::watch::Receiver< bool > );

  impl CancelToken
  {
    /// Build a token paired with the sender that fires it.
    #[ must_use ]
    pub fn pair() -> ( tokio::sync::watch::Sender< bool >, Self )
    {
      let ( tx, rx ) = tokio::sync::watch::channel( false );
      ( tx, Self( rx ) )
    }

    /// A token that never fires, for call sites with no cancellation need.
    #[ must_use ]
    pub fn never() -> Self
    {
      Self::pair().1
    }

    async fn fired( &self )
    {
      let mut rx = self.0.clone();
      loop
      {
        if *rx.borrow()
        {
          return;
        }
        if rx.changed().await.is_err()
        {
          return;
        }
      }
    }
  }

  /// Race `fut` against `cancel` firing, surfacing [`Error::Cancelled`] the
  /// moment cancellation wins. Every public `Engine` method runs its
  /// underlying transport/workflow call through this.
  async fn race< T >( cancel : &CancelToken, fut : impl core::future::Future< Output = Result< T > > ) -> Result< T >
  {
    tokio::select!
    {
      result = fut => result,
      () = cancel.fired() => Err( Error::Cancelled( "operation cancelled".into() ) ),
    }
  }

  /// One configured ADT client engine instance.
  #[ derive( Clone ) ]
  pub struct Engine
  {
    transport : Transport,
    policy : SafetyPolicy,
    metrics : Arc< EngineMetrics >,
    #[ cfg( feature = "websocket" ) ]
    ws : Option< WsConnection >,
  }

  impl core::fmt::Debug for Engine
  {
    fn fmt( &self, f : &mut core::fmt::Formatter< '_ > ) -> core::fmt::Result
    {
      f.debug_struct( "Engine" ).finish_non_exhaustive()
    }
  }

  impl Engine
  {
    /// Build an engine from a resolved [`Config`].
    ///
    /// # Errors
    /// Propagates [`Transport::new`]'s error, and [`Config`]'s own
    /// validation errors (mutually-exclusive auth, missing base URL).
    pub fn from_config( config : &Config ) -> Result< Self >
    {
      let credentials = if let Some( user ) = &config.user
      {
        Credentials::basic( user.clone(), config.password.clone().unwrap_or_default() )
      }
      else if let Some( cookie_string ) = &config.cookie_string
      {
        Credentials::Cookies( crate::auth::parse_cookie_string( cookie_string ) )
      }
      else if let Some( path ) = &config.cookie_file
      {
        let contents = std::fs::read_to_string( path )?;
        Credentials::Cookies( crate::auth::parse_netscape_cookie_file( &contents ) )
      }
      else
      {
        return Err( Error::InvalidArgument( "no credentials configured".into() ) );
      };

      let mut transport_config = TransportConfig::new( config.base_url.clone() );
      transport_config.client.clone_from( &config.client );
      transport_config.language.clone_from( &config.language );
      transport_config.insecure = config.insecure;

      let transport = Transport::new( transport_config, credentials )?;
      let policy = config.safety_policy();

      Ok( Self::new( transport, policy ) )
    }

    /// Build an engine directly from its parts, bypassing [`Config`] — used
    /// by tests and by callers assembling credentials out of band.
    #[ must_use ]
    pub fn new( transport : Transport, policy : SafetyPolicy ) -> Self
    {
      let metrics = Arc::new( EngineMetrics::default() );
      let transport = transport.with_metrics( metrics.clone() );
      #[ cfg( feature = "websocket" ) ]
      return Self { transport, policy, metrics, ws : None };
      #[ cfg( not( feature = "websocket" ) ) ]
      return Self { transport, policy, metrics };
    }

    /// The metrics counters for this engine instance.
    #[ must_use ]
    pub fn metrics( &self ) -> &EngineMetrics
    {
      &self.metrics
    }

    fn gate( &self, op : Operation, package : Option< &str > ) -> Result< () >
    {
      self.metrics.record_call();
      match self.policy.evaluate( op, package, None )
      {
        crate::safety::Decision::Allow | crate::safety::Decision::AllowDryRun => Ok( () ),
        crate::safety::Decision::Deny( reason ) =>
        {
          self.metrics.record_blocked();
          Err( Error::BlockedByPolicy( reason ) )
        },
      }
    }

    /// Fetch an object's main source, gated as [`Operation::Read`].
    ///
    /// # Errors
    /// Returns [`Error::BlockedByPolicy`] if denied; otherwise propagates
    /// [`crate::read_api::get_source`]'s errors.
    pub async fn get_source( &self, object : &ObjectRef, cancel : CancelToken ) -> Result< String >
    {
      self.gate( Operation::Read, None )?;
      race( &cancel, crate::read_api::get_source( &self.transport, object ) ).await
    }

    /// Fetch a class's sub-include source, gated as [`Operation::Read`].
    ///
    /// # Errors
    /// See [`Self::get_source`].
    pub async fn get_include_source( &self, object : &ObjectRef, include : crate::object_ref::ClassInclude, cancel : CancelToken ) -> Result< String >
    {
      self.gate( Operation::Read, None )?;
      race( &cancel, crate::read_api::get_include_source( &self.transport, object, include ) ).await
    }

    /// Fetch an object's ADT-core metadata, gated as [`Operation::Read`].
    ///
    /// # Errors
    /// See [`Self::get_source`].
    pub async fn get_metadata( &self, object : &ObjectRef, cancel : CancelToken ) -> Result< HashMap< String, String > >
    {
      self.gate( Operation::Read, None )?;
      race( &cancel, crate::read_api::get_metadata( &self.transport, object ) ).await
    }

    /// List a package's direct contents, gated as [`Operation::Read`].
    ///
    /// # Errors
    /// See [`Self::get_source`].
    pub async fn list_package( &self, package : &str, cancel : CancelToken ) -> Result< Vec< SearchResult > >
    {
      self.gate( Operation::Read, Some( package ) )?;
      race( &cancel, crate::read_api::list_package( &self.transport, package ) ).await
    }

    /// Quick-search, gated as [`Operation::Search`].
    ///
    /// # Errors
    /// See [`Self::get_source`].
    pub async fn quick_search( &self, pattern : &str, max_results : u32, cancel : CancelToken ) -> Result< Vec< SearchResult > >
    {
      self.gate( Operation::Search, None )?;
      race( &cancel, crate::read_api::quick_search( &self.transport, pattern, max_results ) ).await
    }

    /// Fetch a CDS entity's dependency tree, gated as [`Operation::Query`].
    ///
    /// # Errors
    /// See [`Self::get_source`].
    pub async fn dependency_tree( &self, entity : &str, query : &DependencyQuery, cancel : CancelToken ) -> Result< crate::dependency_tree::DependencyTree >
    {
      self.gate( Operation::Query, query.package.as_deref() )?;
      race( &cancel, crate::read_api::dependency_tree( &self.transport, entity, query ) ).await
    }

    /// Resolve a definition site, gated as [`Operation::Intelligence`].
    ///
    /// # Errors
    /// See [`Self::get_source`].
    pub async fn find_definition( &self, object : &ObjectRef, position : SourcePosition, cancel : CancelToken ) -> Result< CodeLocation >
    {
      self.gate( Operation::Intelligence, None )?;
      race( &cancel, crate::read_api::find_definition( &self.transport, object, position ) ).await
    }

    /// Find references, gated as [`Operation::Intelligence`].
    ///
    /// # Errors
    /// See [`Self::get_source`].
    pub async fn find_references( &self, object : &ObjectRef, position : SourcePosition, cancel : CancelToken ) -> Result< Vec< CodeLocation > >
    {
      self.gate( Operation::Intelligence, None )?;
      race( &cancel, crate::read_api::find_references( &self.transport, object, position ) ).await
    }

    /// Request completion proposals, gated as [`Operation::Intelligence`].
    ///
    /// # Errors
    /// See [`Self::get_source`].
    pub async fn completion( &self, object : &ObjectRef, position : SourcePosition, cancel : CancelToken ) -> Result< Vec< String > >
    {
      self.gate( Operation::Intelligence, None )?;
      race( &cancel, crate::read_api::completion( &self.transport, object, position ) ).await
    }

    /// Resolve a type's supertype chain, gated as [`Operation::Intelligence`].
    ///
    /// # Errors
    /// See [`Self::get_source`].
    pub async fn type_hierarchy( &self, object : &ObjectRef, position : SourcePosition, cancel : CancelToken ) -> Result< Vec< CodeLocation > >
    {
      self.gate( Operation::Intelligence, None )?;
      race( &cancel, crate::read_api::type_hierarchy( &self.transport, object, position ) ).await
    }

    /// Acquire an edit lock, gated as [`Operation::Lock`].
    ///
    /// # Errors
    /// See [`Self::get_source`].
    pub async fn lock( &self, object : &ObjectRef, cancel : CancelToken ) -> Result< crate::crud_api::LockHandle >
    {
      self.gate( Operation::Lock, None )?;
      race( &cancel, crate::crud_api::lock( &self.transport, object ) ).await
    }

    /// Release an edit lock, gated as [`Operation::Lock`].
    ///
    /// # Errors
    /// See [`Self::get_source`].
    pub async fn unlock( &self, handle : &crate::crud_api::LockHandle, cancel : CancelToken ) -> Result< () >
    {
      self.gate( Operation::Lock, None )?;
      race( &cancel, crate::crud_api::unlock( &self.transport, handle ) ).await
    }

    /// Create a repository object shell, gated as [`Operation::Create`]
    /// against `package`.
    ///
    /// # Errors
    /// See [`Self::get_source`].
    pub async fn create( &self, object : &ObjectRef, package : &str, description : &str, cancel : CancelToken ) -> Result< () >
    {
      self.gate( Operation::Create, Some( package ) )?;
      race( &cancel, crate::crud_api::create( &self.transport, object, package, description ) ).await
    }

    /// Delete a repository object (caller supplies the lock), gated as
    /// [`Operation::Delete`].
    ///
    /// # Errors
    /// See [`Self::get_source`].
    pub async fn delete( &self, handle : &crate::crud_api::LockHandle, cancel : CancelToken ) -> Result< () >
    {
      self.gate( Operation::Delete, None )?;
      race( &cancel, crate::crud_api::delete( &self.transport, handle ) ).await
    }

    /// Run a syntax check against candidate `source`, gated as [`Operation::Read`]
    /// (a check mutates nothing server-side).
    ///
    /// # Errors
    /// See [`Self::get_source`].
    pub async fn syntax_check( &self, object : &ObjectRef, source : &str, cancel : CancelToken ) -> Result< Vec< SyntaxDiagnostic > >
    {
      self.gate( Operation::Read, None )?;
      race( &cancel, crate::crud_api::syntax_check( &self.transport, object, source ) ).await
    }

    /// Activate one or more objects, gated as [`Operation::Activate`].
    ///
    /// # Errors
    /// See [`Self::get_source`].
    pub async fn activate( &self, objects : &[ &ObjectRef ], cancel : CancelToken ) -> Result< ActivationResult >
    {
      self.gate( Operation::Activate, None )?;
      race( &cancel, crate::crud_api::activate( &self.transport, objects ) ).await
    }

    /// Write and activate a new program, gated as [`Operation::Workflow`]
    /// against `package`.
    ///
    /// # Errors
    /// See [`Self::get_source`].
    pub async fn create_and_activate_program(
      &self,
      name : &str,
      package : &str,
      description : &str,
      source : &str,
      cancel : CancelToken,
    ) -> Result< ActivationResult >
    {
      self.gate( Operation::Workflow, Some( package ) )?;
      race( &cancel, crate::workflow::create_and_activate_program( &self.transport, name, package, description, source ) ).await
    }

    /// Create a class with main and test sources and activate it, gated
    /// as [`Operation::Workflow`] against `package`.
    ///
    /// # Errors
    /// See [`Self::get_source`].
    pub async fn create_class_with_tests(
      &self,
      name : &str,
      package : &str,
      description : &str,
      source : &str,
      test_source : &str,
      cancel : CancelToken,
    ) -> Result< ( ActivationResult, UnitTestReport ) >
    {
      self.gate( Operation::Workflow, Some( package ) )?;
      race( &cancel, crate::workflow::create_class_with_tests( &self.transport, name, package, description, source, test_source ) ).await
    }

    /// Update a program's main source, syntax-checking first and
    /// activating after, gated as [`Operation::Update`].
    ///
    /// # Errors
    /// See [`Self::get_source`].
    pub async fn write_program( &self, object : &ObjectRef, source : &str, package : Option< &str >, cancel : CancelToken ) -> Result< WriteResult >
    {
      self.gate( Operation::Update, package )?;
      race( &cancel, crate::workflow::write_program( &self.transport, object, source ) ).await
    }

    /// Update a class's main include, syntax-checking first and
    /// activating after, gated as [`Operation::Update`].
    ///
    /// # Errors
    /// See [`Self::get_source`].
    pub async fn write_class( &self, object : &ObjectRef, source : &str, package : Option< &str >, cancel : CancelToken ) -> Result< WriteResult >
    {
      self.gate( Operation::Update, package )?;
      race( &cancel, crate::workflow::write_class( &self.transport, object, source ) ).await
    }

    /// Apply a surgical source edit, gated as [`Operation::Update`].
    ///
    /// # Errors
    /// See [`Self::get_source`].
    pub async fn edit_source( &self, object : &ObjectRef, edit : &EditSpec, package : Option< &str >, cancel : CancelToken ) -> Result< EditResult >
    {
      self.gate( Operation::Update, package )?;
      race( &cancel, crate::workflow::edit_source( &self.transport, object, edit ) ).await
    }

    /// Rename a repository object, gated as [`Operation::Workflow`]
    /// against `package`.
    ///
    /// # Errors
    /// See [`Self::get_source`].
    pub async fn rename_object(
      &self,
      object : &ObjectRef,
      new_name : &str,
      package : &str,
      description : &str,
      cancel : CancelToken,
    ) -> Result< () >
    {
      self.gate( Operation::Workflow, Some( package ) )?;
      race( &cancel, crate::workflow::rename_object( &self.transport, object, new_name, package, description ) ).await
    }

    /// Run a deployment plan, gated as [`Operation::Workflow`].
    ///
    /// # Errors
    /// See [`Self::get_source`].
    pub async fn deploy( &self, plan : &DeploymentPlan, max_passes : u32, cancel : CancelToken ) -> Result< DeploymentReport >
    {
      self.gate( Operation::Workflow, None )?;
      race( &cancel, crate::deployment::deploy( &self.transport, plan, max_passes, self.policy.dry_run ) ).await
    }

    /// Run ABAP Unit tests, gated as [`Operation::Test`].
    ///
    /// # Errors
    /// See [`Self::get_source`].
    pub async fn run_unit_tests(
      &self,
      object : &ObjectRef,
      risk : TestRisk,
      duration : TestDuration,
      cancel : CancelToken,
    ) -> Result< UnitTestReport >
    {
      self.gate( Operation::Test, None )?;
      race( &cancel, crate::crud_api::run_unit_tests( &self.transport, object, risk, duration ) ).await
    }
  }
}

pub use private::{ Engine, CancelToken };

#[ cfg( test ) ]
mod tests
{
  use super::*;
  use crate::auth::Credentials;
  use crate::object_ref::{ ObjectKind, ObjectRef };
  use crate::safety::SafetyPolicy;
  use crate::transport::{ Transport, TransportConfig };
  use std::time::Duration;
  use wiremock::matchers::{ method, path };
  use wiremock::{ Mock, MockServer, ResponseTemplate };

  #[ tokio::test ]
  async fn firing_cancel_before_response_surfaces_cancelled()
  {
    let server = MockServer::start().await;
    let object = ObjectRef::new( ObjectKind::Program, "ZTEST" );

    Mock::given( method( "GET" ) )
      .and( path( "/sap/bc/adt/programs/programs/ZTEST/source/main" ) )
      .respond_with( ResponseTemplate::new( 200 ).set_delay( Duration::from_millis( 200 ) ) )
      .mount( &server )
      .await;

    let transport = Transport::new( TransportConfig::new( server.uri() ), Credentials::basic( "bob", "secret" ) ).unwrap();
    let engine = Engine::new( transport, SafetyPolicy::default() );

    let ( tx, cancel ) = CancelToken::pair();
    tx.send( true ).unwrap();

    let err = engine.get_source( &object, cancel ).await.unwrap_err();
    assert_eq!( err.kind(), "cancelled" );
  }

  #[ tokio::test ]
  async fn never_cancels_lets_the_call_proceed()
  {
    let server = MockServer::start().await;
    let object = ObjectRef::new( ObjectKind::Program, "ZTEST" );

    Mock::given( method( "GET" ) )
      .and( path( "/sap/bc/adt/programs/programs/ZTEST/source/main" ) )
      .respond_with( ResponseTemplate::new( 200 ).set_body_string( "REPORT ztest." ) )
      .mount( &server )
      .await;

    let transport = Transport::new( TransportConfig::new( server.uri() ), Credentials::basic( "bob", "secret" ) ).unwrap();
    let engine = Engine::new( transport, SafetyPolicy::default() );

    let source = engine.get_source( &object, CancelToken::never() ).await.unwrap();
    assert_eq!( source, "REPORT ztest." );
  }
}
