//! Integration tests for the workflow layer against a mock ADT server.

use sap_adt_broker::auth::Credentials;
use sap_adt_broker::object_ref::{ ObjectKind, ObjectRef };
use sap_adt_broker::transport::{ Transport, TransportConfig };
use sap_adt_broker::workflow::{ edit_source, EditSpec };
use wiremock::matchers::{ method, path };
use wiremock::{ Mock, MockServer, ResponseTemplate };

async fn mock_transport( server : &MockServer ) -> Transport
{
  let config = TransportConfig::new( server.uri() );
  let creds = Credentials::basic( "bob", "secret" );
  Transport::new( config, creds ).unwrap()
}

fn default_edit( old_string : &str, new_string : &str ) -> EditSpec
{
  EditSpec
  {
    old_string : old_string.to_string(),
    new_string : new_string.to_string(),
    replace_all : false,
    syntax_check : false,
    case_insensitive : false,
  }
}

#[ tokio::test ]
async fn edit_source_replaces_unique_match_runs_syntax_check_and_activates()
{
  let server = MockServer::start().await;

  Mock::given( method( "GET" ) )
    .and( path( "/sap/bc/adt/discovery" ) )
    .respond_with( ResponseTemplate::new( 200 ).insert_header( "x-csrf-token", "tok123" ) )
    .mount( &server )
    .await;

  Mock::given( method( "GET" ) )
    .and( path( "/sap/bc/adt/programs/programs/ZTEST/source/main" ) )
    .respond_with( ResponseTemplate::new( 200 ).set_body_string( "REPORT ztest.\nWRITE 'old'.\n" ) )
    .mount( &server )
    .await;

  Mock::given( method( "POST" ) )
    .and( path( "/sap/bc/adt/checkruns" ) )
    .respond_with( ResponseTemplate::new( 200 ).set_body_string( "<checkRunReports/>" ) )
    .mount( &server )
    .await;

  Mock::given( method( "POST" ) )
    .and( path( "/sap/bc/adt/programs/programs/ZTEST" ) )
    .respond_with( ResponseTemplate::new( 200 )
      .insert_header( "x-csrf-token", "tok123" )
      .set_body_string( "<LOCK_HANDLE>abc</LOCK_HANDLE>" ) )
    .mount( &server )
    .await;

  Mock::given( method( "PUT" ) )
    .and( path( "/sap/bc/adt/programs/programs/ZTEST/source/main" ) )
    .respond_with( ResponseTemplate::new( 200 ) )
    .mount( &server )
    .await;

  Mock::given( method( "POST" ) )
    .and( path( "/sap/bc/adt/activation" ) )
    .respond_with( ResponseTemplate::new( 200 ).set_body_string( "<activationResult/>" ) )
    .mount( &server )
    .await;

  let transport = mock_transport( &server ).await;
  let object = ObjectRef::new( ObjectKind::Program, "ZTEST" );
  let mut edit = default_edit( "'old'", "'new'" );
  edit.syntax_check = true;

  let result = edit_source( &transport, &object, &edit ).await.unwrap();
  assert!( result.applied );
  assert!( result.activation.is_some() );
}

#[ tokio::test ]
async fn edit_source_rejects_non_unique_match_without_locking()
{
  let server = MockServer::start().await;

  Mock::given( method( "GET" ) )
    .and( path( "/sap/bc/adt/programs/programs/ZTEST/source/main" ) )
    .respond_with( ResponseTemplate::new( 200 ).set_body_string( "WRITE 'x'.\nWRITE 'x'.\nWRITE 'x'.\n" ) )
    .mount( &server )
    .await;

  // No LOCK mock registered: if edit_source tried to lock, wiremock would
  // return a 404 from its default "no matching mock" behavior and the
  // test would fail with a network-shaped error instead of Validation.
  let transport = mock_transport( &server ).await;
  let object = ObjectRef::new( ObjectKind::Program, "ZTEST" );
  let edit = default_edit( "'x'", "'y'" );

  let err = edit_source( &transport, &object, &edit ).await.unwrap_err();
  assert_eq!( err.kind(), "validation" );
  assert!( err.to_string().contains( "non-unique match (3)" ) );
}

#[ tokio::test ]
async fn edit_source_rejects_missing_match()
{
  let server = MockServer::start().await;

  Mock::given( method( "GET" ) )
    .and( path( "/sap/bc/adt/programs/programs/ZTEST/source/main" ) )
    .respond_with( ResponseTemplate::new( 200 ).set_body_string( "WRITE 'hello'.\n" ) )
    .mount( &server )
    .await;

  let transport = mock_transport( &server ).await;
  let object = ObjectRef::new( ObjectKind::Program, "ZTEST" );
  let edit = default_edit( "nonexistent", "x" );

  let err = edit_source( &transport, &object, &edit ).await.unwrap_err();
  assert_eq!( err.kind(), "validation" );
}

#[ tokio::test ]
async fn edit_source_replace_all_applies_every_occurrence()
{
  let server = MockServer::start().await;

  Mock::given( method( "GET" ) )
    .and( path( "/sap/bc/adt/discovery" ) )
    .respond_with( ResponseTemplate::new( 200 ).insert_header( "x-csrf-token", "tok123" ) )
    .mount( &server )
    .await;

  Mock::given( method( "GET" ) )
    .and( path( "/sap/bc/adt/programs/programs/ZTEST/source/main" ) )
    .respond_with( ResponseTemplate::new( 200 ).set_body_string( "WRITE 'x'.\nWRITE 'x'.\n" ) )
    .mount( &server )
    .await;

  Mock::given( method( "POST" ) )
    .and( path( "/sap/bc/adt/programs/programs/ZTEST" ) )
    .respond_with( ResponseTemplate::new( 200 )
      .insert_header( "x-csrf-token", "tok123" )
      .set_body_string( "<LOCK_HANDLE>abc</LOCK_HANDLE>" ) )
    .mount( &server )
    .await;

  Mock::given( method( "PUT" ) )
    .and( path( "/sap/bc/adt/programs/programs/ZTEST/source/main" ) )
    .respond_with( ResponseTemplate::new( 200 ) )
    .mount( &server )
    .await;

  Mock::given( method( "POST" ) )
    .and( path( "/sap/bc/adt/activation" ) )
    .respond_with( ResponseTemplate::new( 200 ).set_body_string( "<activationResult/>" ) )
    .mount( &server )
    .await;

  let transport = mock_transport( &server ).await;
  let object = ObjectRef::new( ObjectKind::Program, "ZTEST" );
  let mut edit = default_edit( "'x'", "'y'" );
  edit.replace_all = true;

  let result = edit_source( &transport, &object, &edit ).await.unwrap();
  assert!( result.applied );
}
