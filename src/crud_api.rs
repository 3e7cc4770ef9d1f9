//! Mutating ADT operations: lock/unlock, source upload, create/delete,
//! syntax check, activation and ABAP Unit runs.

mod private
{
  use crate::codecs::{ escape_xml, parse_elements, xml_request, xml_request_nested };
  use crate::error::{ Error, Result };
  use crate::object_ref::{ ClassInclude, ObjectKind, ObjectRef };
  use crate::transport::Transport;
  use reqwest::Method;
  use serde::{ Deserialize, Serialize };

  /// Risk classification a test run may be declared under (spec §4.6).
  #[ derive( Debug, Clone, Copy, PartialEq, Eq ) ]
  pub enum TestRisk
  {
    /// No side effects expected.
    Harmless,
    /// May have side effects outside the test double.
    Dangerous,
    /// May affect other users or persistent state.
    Critical,
  }

  impl TestRisk
  {
    fn as_str( self ) -> &'static str
    {
      match self
      {
        TestRisk::Harmless => "harmless",
        TestRisk::Dangerous => "dangerous",
        TestRisk::Critical => "critical",
      }
    }
  }

  /// Duration classification a test run may be declared under (spec §4.6).
  #[ derive( Debug, Clone, Copy, PartialEq, Eq ) ]
  pub enum TestDuration
  {
    /// Expected to complete quickly.
    Short,
    /// Expected to take a noticeable but bounded time.
    Medium,
    /// Expected to take a long time; excluded unless explicitly requested.
    Long,
  }

  impl TestDuration
  {
    fn as_str( self ) -> &'static str
    {
      match self
      {
        TestDuration::Short => "short",
        TestDuration::Medium => "medium",
        TestDuration::Long => "long",
      }
    }
  }

  /// Severity of one syntax-check or ABAP Unit diagnostic.
  #[ derive( Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize ) ]
  #[ serde( rename_all = "lowercase" ) ]
  pub enum Severity
  {
    /// Informational only.
    Info,
    /// A warning; does not block activation.
    Warning,
    /// A hard error; blocks activation.
    Error,
    /// The check itself could not complete (e.g. a missing dependency).
    Abort,
  }

  impl Severity
  {
    /// Parse the server's `type`/`severity` attribute spelling.
    #[ must_use ]
    pub fn parse( s : &str ) -> Self
    {
      match s.to_lowercase().as_str()
      {
        "warning" => Severity::Warning,
        "error" => Severity::Error,
        "abort" => Severity::Abort,
        _ => Severity::Info,
      }
    }

    /// Whether this severity should block activation / create.
    #[ must_use ]
    pub fn is_blocking( self ) -> bool
    {
      matches!( self, Severity::Error | Severity::Abort )
    }
  }

  /// One `alerts/alert` finding nested under a test method.
  #[ derive( Debug, Clone, PartialEq, Eq, Serialize, Deserialize ) ]
  pub struct UnitTestAlert
  {
    /// `failedAssertion`, `exception` or `warning`.
    pub kind : String,
    /// Finding severity.
    pub severity : Severity,
    /// Detail lines, in document order.
    pub details : Vec< String >,
    /// Stack entries, in document order (outermost frame first).
    pub stack : Vec< String >,
  }

  /// One `testMethods/testMethod` entry.
  #[ derive( Debug, Clone, PartialEq, Eq, Serialize, Deserialize ) ]
  pub struct UnitTestMethod
  {
    /// The method name.
    pub name : String,
    /// Alerts raised while running this method.
    pub alerts : Vec< UnitTestAlert >,
  }

  /// One `testClasses/testClass` entry.
  #[ derive( Debug, Clone, PartialEq, Eq, Serialize, Deserialize ) ]
  pub struct UnitTestClass
  {
    /// The test class name.
    pub name : String,
    /// The ADT URI of the test class.
    pub uri : String,
    /// Methods run within this class, in document order.
    pub methods : Vec< UnitTestMethod >,
  }

  /// The full `program/testClasses/testClass/testMethods/testMethod` tree
  /// an ABAP Unit run reports.
  #[ derive( Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default ) ]
  pub struct UnitTestReport
  {
    /// Every test class the run covered.
    pub classes : Vec< UnitTestClass >,
  }

  impl UnitTestReport
  {
    /// Whether any alert in the whole report blocks (an `exception` or a
    /// `failedAssertion` with error/abort severity counts; plain warnings do not).
    #[ must_use ]
    pub fn has_failures( &self ) -> bool
    {
      self.classes.iter()
        .flat_map( | c | &c.methods )
        .flat_map( | m | &m.alerts )
        .any( | a | a.severity.is_blocking() || a.kind == "exception" || a.kind == "failedAssertion" )
    }
  }

  fn parse_unit_test_report( xml : &str ) -> Result< UnitTestReport >
  {
    use quick_xml::events::Event;
    use quick_xml::reader::Reader;
    use crate::codecs::strip_namespace_prefix;

    let mut reader = Reader::from_str( xml );
    reader.config_mut().trim_text( true );

    let mut classes = Vec::new();
    let mut cur_class : Option< UnitTestClass > = None;
    let mut cur_method : Option< UnitTestMethod > = None;
    let mut cur_alert : Option< UnitTestAlert > = None;
    let mut collecting : Option< &'static str > = None;
    let mut text_buf = String::new();
    let mut buf = Vec::new();

    loop
    {
      match reader.read_event_into( &mut buf )?
      {
        Event::Eof => break,
        Event::Start( e ) | Event::Empty( e ) =>
        {
          let raw_name = String::from_utf8_lossy( e.name().as_ref() ).to_string();
          let name = strip_namespace_prefix( &raw_name ).to_string();
          let get_attr = | key : &str | -> Option< String >
          {
            e.attributes().flatten().find_map( | a |
            {
              let raw_key = String::from_utf8_lossy( a.key.as_ref() ).to_string();
              if strip_namespace_prefix( &raw_key ) == key { Some( a.unescape_value().unwrap_or_default().to_string() ) } else { None }
            } )
          };
          match name.as_str()
          {
            "testClass" => cur_class = Some( UnitTestClass { name : get_attr( "name" ).unwrap_or_default(), uri : get_attr( "uri" ).unwrap_or_default(), methods : Vec::new() } ),
            "testMethod" => cur_method = Some( UnitTestMethod { name : get_attr( "name" ).unwrap_or_default(), alerts : Vec::new() } ),
            "alert" => cur_alert = Some( UnitTestAlert {
              kind : get_attr( "kind" ).unwrap_or_default(),
              severity : Severity::parse( &get_attr( "severity" ).unwrap_or_default() ),
              details : Vec::new(),
              stack : Vec::new(),
            } ),
            "detail" => { collecting = Some( "detail" ); text_buf.clear(); },
            "stackEntry" => { collecting = Some( "stack" ); text_buf.clear(); },
            _ => {},
          }
        },
        Event::Text( t ) =>
        {
          if collecting.is_some()
          {
            text_buf.push_str( &t.unescape().unwrap_or_default() );
          }
        },
        Event::End( e ) =>
        {
          let raw_name = String::from_utf8_lossy( e.name().as_ref() ).to_string();
          let name = strip_namespace_prefix( &raw_name ).to_string();
          match name.as_str()
          {
            "detail" =>
            {
              if let Some( alert ) = cur_alert.as_mut() { alert.details.push( text_buf.clone() ); }
              collecting = None;
            },
            "stackEntry" =>
            {
              if let Some( alert ) = cur_alert.as_mut() { alert.stack.push( text_buf.clone() ); }
              collecting = None;
            },
            "alert" =>
            {
              if let ( Some( method ), Some( alert ) ) = ( cur_method.as_mut(), cur_alert.take() ) { method.alerts.push( alert ); }
            },
            "testMethod" =>
            {
              if let ( Some( class ), Some( method ) ) = ( cur_class.as_mut(), cur_method.take() ) { class.methods.push( method ); }
            },
            "testClass" =>
            {
              if let Some( class ) = cur_class.take() { classes.push( class ); }
            },
            _ => {},
          }
        },
        _ => {},
      }
      buf.clear();
    }

    Ok( UnitTestReport { classes } )
  }

  /// One finding from a syntax check or ABAP Unit run.
  #[ derive( Debug, Clone, PartialEq, Eq, Serialize, Deserialize ) ]
  pub struct SyntaxDiagnostic
  {
    /// The ADT URI the finding applies to (object or include, with `#start=line,offset` fragment).
    pub uri : String,
    /// 1-based line number.
    pub line : u32,
    /// 0-based column offset.
    pub offset : u32,
    /// Finding severity.
    pub severity : Severity,
    /// Human-readable message text.
    pub text : String,
  }

  /// A handle proving an object is locked, required by every mutating call
  /// that follows lock acquisition. Unlock consumes it.
  #[ derive( Debug, Clone ) ]
  pub struct LockHandle
  {
    /// The lock token returned by the server.
    pub token : String,
    /// The object this lock applies to.
    pub object : ObjectRef,
  }

  /// The outcome of an activation request.
  #[ derive( Debug, Clone, Default ) ]
  pub struct ActivationResult
  {
    /// Whether every targeted object activated successfully.
    pub success : bool,
    /// URIs still inactive after the attempt.
    pub inactive : Vec< String >,
    /// Diagnostics emitted during activation (warnings do not imply failure).
    pub diagnostics : Vec< SyntaxDiagnostic >,
  }

  fn diagnostics_from_xml( xml : &str ) -> Result< Vec< SyntaxDiagnostic > >
  {
    let elements = parse_elements( xml )?;
    let mut out = Vec::new();
    for e in &elements
    {
      if e.name != "checkMessage" && e.name != "message"
      {
        continue;
      }
      let get = | key : &str | e.attributes.iter().find( | ( k, _ ) | k == key ).map( | ( _, v ) | v.clone() );
      let uri = get( "uri" ).unwrap_or_default();
      let line = get( "line" ).and_then( | v | v.parse().ok() ).unwrap_or( 0 );
      let offset = get( "offset" ).and_then( | v | v.parse().ok() ).unwrap_or( 0 );
      let severity = Severity::parse( &get( "type" ).or_else( || get( "severity" ) ).unwrap_or_default() );
      let text = get( "shortText" ).or_else( || get( "text" ) ).unwrap_or_else( || e.text.clone() );
      out.push( SyntaxDiagnostic { uri, line, offset, severity, text } );
    }
    Ok( out )
  }

  /// Acquire an edit lock on `object`. The lock must be released via
  /// [`unlock`] on every exit path, including error paths in callers
  /// (the workflow layer enforces this with a guard).
  ///
  /// # Errors
  /// Returns [`Error::LockConflict`] if another session holds the lock.
  pub async fn lock( transport : &Transport, object : &ObjectRef ) -> Result< LockHandle >
  {
    let path = format!( "{}?_action=LOCK&accessMode=MODIFY", object.url()? );
    let response = transport.execute( Method::POST, &path, None, None, None, None ).await?;
    let elements = parse_elements( &response.text()? )?;
    let token = elements
      .iter()
      .find( | e | e.name == "LOCK_HANDLE" || e.name == "lockHandle" )
      .map( | e | e.text.clone() )
      .ok_or_else( || Error::Validation( "lock response missing LOCK_HANDLE".into() ) )?;
    if let Some( metrics ) = transport.metrics()
    {
      metrics.record_lock_acquired();
    }
    Ok( LockHandle { token, object : object.clone() } )
  }

  /// Release a previously-acquired lock. Idempotent from the caller's
  /// perspective: a failure here is reported but does not itself
  /// constitute a data-loss risk because the server-side lock will expire.
  ///
  /// # Errors
  /// Propagates transport-level errors.
  pub async fn unlock( transport : &Transport, handle : &LockHandle ) -> Result< () >
  {
    let path = format!( "{}?_action=UNLOCK&lockHandle={}", handle.object.url()?, handle.token );
    transport.execute( Method::POST, &path, None, None, None, None ).await?;
    if let Some( metrics ) = transport.metrics()
    {
      metrics.record_lock_released();
    }
    Ok( () )
  }

  /// Overwrite an object's (or class include's) source text.
  ///
  /// # Errors
  /// Returns [`Error::LockConflict`] if `handle` is stale.
  pub async fn update_source( transport : &Transport, handle : &LockHandle, url : &str, source : &str ) -> Result< () >
  {
    let path = format!( "{url}?lockHandle={}", handle.token );
    transport
      .execute( Method::PUT, &path, None, Some( source.as_bytes().to_vec() ), Some( "text/plain; charset=utf-8" ), None )
      .await?;
    Ok( () )
  }

  /// The responsible-developer default every creation descriptor carries
  /// unless the caller's session identity is plumbed through (spec §4.6).
  const DEFAULT_RESPONSIBLE : &str = "DEVELOPER";

  /// Create a new repository object shell (no source body). The descriptor
  /// carries `adtcore:name`/`adtcore:type`/`adtcore:description`/
  /// `adtcore:responsible` plus a nested `packageRef` — or, for a function
  /// module, a `containerRef` to its function group instead, POSTed to the
  /// group's `fmodules` collection rather than a per-object URL.
  ///
  /// # Errors
  /// Returns [`Error::AlreadyExists`] if an object of the same name exists.
  pub async fn create( transport : &Transport, object : &ObjectRef, package : &str, description : &str ) -> Result< () >
  {
    let root_attrs : Vec< ( &str, &str ) > = vec![
      ( "adtcore:name", &object.name ),
      ( "adtcore:type", object.kind.adt_type_code() ),
      ( "adtcore:description", description ),
      ( "adtcore:responsible", DEFAULT_RESPONSIBLE ),
    ];

    if object.kind == ObjectKind::FunctionModule
    {
      let group = object.parent.as_deref().ok_or_else( ||
        Error::InvalidArgument( "function-module requires parent (function group)".into() )
      )?;
      let path = format!( "/sap/bc/adt/functions/groups/{group}/fmodules" );
      let body = xml_request_nested( "adtcore:objectStructure", &root_attrs, &[ ( "containerRef", &[ ( "adtcore:name", group ) ] ) ] );
      transport.execute( Method::POST, &path, None, Some( body.into_bytes() ), Some( "application/xml" ), None ).await?;
      return Ok( () );
    }

    let body = xml_request_nested( "adtcore:objectStructure", &root_attrs, &[ ( "packageRef", &[ ( "adtcore:name", package ) ] ) ] );
    transport.execute( Method::POST, &object.url()?, None, Some( body.into_bytes() ), Some( "application/xml" ), None ).await?;
    Ok( () )
  }

  /// Provision a class's non-main include on demand. ADT only creates the
  /// `testclasses` include (and the other secondary includes) lazily, on
  /// this explicit POST, rather than at class-creation time.
  ///
  /// # Errors
  /// Propagates transport-level errors.
  pub async fn create_include( transport : &Transport, object : &ObjectRef, include : ClassInclude ) -> Result< () >
  {
    let base = object.url()?;
    let path = format!( "{base}/includes" );
    let body = xml_request( "class:include", &[ ( "class:includeType", include.segment() ) ] );
    transport
      .execute( Method::POST, &path, None, Some( body.into_bytes() ), Some( "application/vnd.sap.adt.classincludes+xml" ), None )
      .await?;
    Ok( () )
  }

  /// Delete a repository object. Requires the caller to hold a lock.
  ///
  /// # Errors
  /// Propagates transport-level errors.
  pub async fn delete( transport : &Transport, handle : &LockHandle ) -> Result< () >
  {
    let path = format!( "{}?lockHandle={}", handle.object.url()?, handle.token );
    transport.execute( Method::DELETE, &path, None, None, None, None ).await?;
    Ok( () )
  }

  /// Run a syntax check against `source` — a candidate version that need
  /// not yet be saved — returning every diagnostic the server reports.
  /// The source is embedded as the sole base64-encoded artifact of the
  /// `checkObjectList`, so a check never requires a prior write.
  ///
  /// # Errors
  /// Propagates transport-level errors; a non-empty error-severity result
  /// is returned as `Ok` with diagnostics, not as an `Err` — the caller
  /// decides whether errors block the surrounding workflow.
  pub async fn syntax_check( transport : &Transport, object : &ObjectRef, source : &str ) -> Result< Vec< SyntaxDiagnostic > >
  {
    let uri = object.source_url()?;
    let encoded = crate::codecs::base64_encode( source.as_bytes() );
    let body = format!(
      "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
       <chkrun:checkObjectList xmlns:chkrun=\"http://www.sap.com/adt/checkrun\" xmlns:adtcore=\"http://www.sap.com/adt/core\">\n\
       <chkrun:checkObject adtcore:uri=\"{}\" chkrun:version=\"inactive\">\n\
       <chkrun:artifacts>\n\
       <chkrun:artifact chkrun:contentType=\"text/plain; charset=utf-8\" chkrun:uri=\"{}\">\n\
       <chkrun:content>{}</chkrun:content>\n\
       </chkrun:artifact>\n\
       </chkrun:artifacts>\n\
       </chkrun:checkObject>\n\
       </chkrun:checkObjectList>",
      escape_xml( &uri ), escape_xml( &uri ), encoded,
    );
    let response = transport
      .execute( Method::POST, "/sap/bc/adt/checkruns?reporters=abapCheckRun", None, Some( body.into_bytes() ), Some( "application/vnd.sap.adt.checkmessages+xml" ), Some( "application/vnd.sap.adt.checkmessages+xml" ) )
      .await?;
    diagnostics_from_xml( &response.text()? )
  }

  /// Activate one or more objects, returning the aggregate result. The
  /// caller determines whether to retry on `ActivationFailed` after fixing
  /// the offending source (the deployment engine's fixpoint loop does
  /// exactly this).
  ///
  /// # Errors
  /// Returns [`Error::ActivationFailed`] only if the transport call itself
  /// fails; a partially-failed activation is reported via the returned
  /// [`ActivationResult`], not as an `Err`.
  pub async fn activate( transport : &Transport, objects : &[ &ObjectRef ] ) -> Result< ActivationResult >
  {
    let uris : Result< Vec< String > > = objects.iter().map( | o | o.url() ).collect();
    let uris = uris?;
    let body_refs : Vec< ( &str, &str ) > = uris.iter().map( | uri | ( "adtcore:uri", uri.as_str() ) ).collect();
    let body = xml_request( "adtcore:objectReferences", &body_refs );

    let response = transport
      .execute( Method::POST, "/sap/bc/adt/activation?method=activate&preauditRequested=true", None, Some( body.into_bytes() ), Some( "application/xml" ), None )
      .await?;

    let text = response.text()?;
    let elements = parse_elements( &text )?;
    let diagnostics = diagnostics_from_xml( &text )?;
    let inactive : Vec< String > = elements
      .iter()
      .filter( | e | e.name == "inactiveObject" )
      .filter_map( | e | e.attributes.iter().find( | ( k, _ ) | k == "uri" ).map( | ( _, v ) | v.clone() ) )
      .collect();

    let success = inactive.is_empty() && !diagnostics.iter().any( | d | d.severity.is_blocking() );
    Ok( ActivationResult { success, inactive, diagnostics } )
  }

  /// Run ABAP Unit tests for a class or program, declared under the given
  /// risk and duration classes (spec §4.6), returning the nested
  /// `testClasses/testClass/testMethods/testMethod` tree.
  ///
  /// # Errors
  /// Propagates transport-level errors.
  pub async fn run_unit_tests(
    transport : &Transport,
    object : &ObjectRef,
    risk : TestRisk,
    duration : TestDuration,
  ) -> Result< UnitTestReport >
  {
    let body = xml_request(
      "aunit:runConfiguration",
      &[
        ( "aunit:uri", &object.url()? ),
        ( "aunit:risk", risk.as_str() ),
        ( "aunit:duration", duration.as_str() ),
      ],
    );
    let response = transport
      .execute( Method::POST, "/sap/bc/adt/abapunit/testruns", None, Some( body.into_bytes() ), Some( "application/vnd.sap.adt.abapunit.testruns.config.v3+xml" ), None )
      .await?;
    parse_unit_test_report( &response.text()? )
  }
}

pub use private::{
  Severity, SyntaxDiagnostic, LockHandle, ActivationResult, TestRisk, TestDuration,
  UnitTestAlert, UnitTestMethod, UnitTestClass, UnitTestReport,
  lock, unlock, update_source, create, create_include, delete, syntax_check, activate, run_unit_tests,
};

#[ cfg( test ) ]
mod tests
{
  use super::*;

  #[ test ]
  fn severity_parses_known_spellings()
  {
    assert_eq!( Severity::parse( "Error" ), Severity::Error );
    assert_eq!( Severity::parse( "warning" ), Severity::Warning );
    assert_eq!( Severity::parse( "ABORT" ), Severity::Abort );
    assert_eq!( Severity::parse( "info" ), Severity::Info );
  }

  #[ test ]
  fn blocking_severities_are_error_and_abort()
  {
    assert!( Severity::Error.is_blocking() );
    assert!( Severity::Abort.is_blocking() );
    assert!( !Severity::Warning.is_blocking() );
    assert!( !Severity::Info.is_blocking() );
  }
}
