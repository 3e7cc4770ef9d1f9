//! Integration tests for the deployment engine against a mock ADT server.

use sap_adt_broker::auth::Credentials;
use sap_adt_broker::deployment::{ deploy, ArchiveFile, DeploymentArchive };
use sap_adt_broker::transport::{ Transport, TransportConfig };
use std::collections::HashMap;
use wiremock::matchers::{ method, path_regex };
use wiremock::{ Mock, MockServer, ResponseTemplate };

async fn mock_transport( server : &MockServer ) -> Transport
{
  let config = TransportConfig::new( server.uri() );
  let creds = Credentials::basic( "bob", "secret" );
  Transport::new( config, creds ).unwrap()
}

fn single_object_archive() -> DeploymentArchive
{
  let mut files = HashMap::new();
  files.insert(
    "ZPROG.prog.abap".to_string(),
    ArchiveFile { path : "ZPROG.prog.abap".to_string(), bytes : b"REPORT zprog.".to_vec() },
  );
  DeploymentArchive { files }
}

#[ tokio::test ]
async fn dry_run_deploy_makes_no_network_calls()
{
  // No mocks registered at all: any network call would fail against this
  // server, so a successful dry-run result proves zero I/O occurred.
  let server = MockServer::start().await;
  let transport = mock_transport( &server ).await;
  let plan = single_object_archive().into_plan( "$TMP" ).unwrap();

  let report = deploy( &transport, &plan, 5, true ).await.unwrap();
  assert!( report.dry_run );
  assert_eq!( report.uploaded, vec![ "ZPROG".to_string() ] );
  assert!( report.still_inactive.is_empty() );
}

#[ tokio::test ]
async fn real_deploy_creates_uploads_and_activates_in_one_pass()
{
  let server = MockServer::start().await;

  Mock::given( method( "GET" ) )
    .and( path_regex( "^/sap/bc/adt/discovery$" ) )
    .respond_with( ResponseTemplate::new( 200 ).insert_header( "x-csrf-token", "tok123" ) )
    .mount( &server )
    .await;

  Mock::given( method( "POST" ) )
    .and( path_regex( "^/sap/bc/adt/programs/programs/ZPROG$" ) )
    .respond_with( ResponseTemplate::new( 200 ).set_body_string( "<LOCK_HANDLE>h1</LOCK_HANDLE>" ) )
    .mount( &server )
    .await;

  Mock::given( method( "PUT" ) )
    .and( path_regex( "^/sap/bc/adt/programs/programs/ZPROG/source/main$" ) )
    .respond_with( ResponseTemplate::new( 200 ) )
    .mount( &server )
    .await;

  Mock::given( method( "POST" ) )
    .and( path_regex( "^/sap/bc/adt/activation$" ) )
    .respond_with( ResponseTemplate::new( 200 ).set_body_string( "<activationResult/>" ) )
    .mount( &server )
    .await;

  let transport = mock_transport( &server ).await;
  let plan = single_object_archive().into_plan( "$TMP" ).unwrap();

  let report = deploy( &transport, &plan, 5, false ).await.unwrap();
  assert_eq!( report.uploaded, vec![ "ZPROG".to_string() ] );
  assert_eq!( report.activated, vec![ "ZPROG".to_string() ] );
  assert!( report.still_inactive.is_empty() );
}

#[ test ]
fn unrecognized_files_are_dropped_from_the_plan_but_known_ones_still_deploy()
{
  let mut files = HashMap::new();
  files.insert( "notes.txt".to_string(), ArchiveFile { path : "notes.txt".to_string(), bytes : b"hi".to_vec() } );
  files.insert(
    "ZIF_X.intf.abap".to_string(),
    ArchiveFile { path : "ZIF_X.intf.abap".to_string(), bytes : b"interface zif_x.".to_vec() },
  );
  let plan = DeploymentArchive { files }.into_plan( "$TMP" ).unwrap();
  assert_eq!( plan.objects.len(), 1 );
  assert_eq!( plan.objects[ 0 ].object.name, "ZIF_X" );
}
