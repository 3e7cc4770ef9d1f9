//! Integration tests for the CRUD API layer against a mock ADT server.

use sap_adt_broker::auth::Credentials;
use sap_adt_broker::crud_api::{ create_include, run_unit_tests, TestDuration, TestRisk };
use sap_adt_broker::object_ref::{ ClassInclude, ObjectKind, ObjectRef };
use sap_adt_broker::transport::{ Transport, TransportConfig };
use wiremock::matchers::{ method, path };
use wiremock::{ Mock, MockServer, ResponseTemplate };

async fn mock_transport( server : &MockServer ) -> Transport
{
  let config = TransportConfig::new( server.uri() );
  let creds = Credentials::basic( "bob", "secret" );
  Transport::new( config, creds ).unwrap()
}

#[ tokio::test ]
async fn create_include_posts_to_the_class_includes_endpoint()
{
  let server = MockServer::start().await;

  Mock::given( method( "GET" ) )
    .and( path( "/sap/bc/adt/discovery" ) )
    .respond_with( ResponseTemplate::new( 200 ).insert_header( "x-csrf-token", "tok123" ) )
    .mount( &server )
    .await;

  Mock::given( method( "POST" ) )
    .and( path( "/sap/bc/adt/oo/classes/ZCL_FOO/includes" ) )
    .respond_with( ResponseTemplate::new( 200 ) )
    .mount( &server )
    .await;

  let transport = mock_transport( &server ).await;
  let object = ObjectRef::new( ObjectKind::Class, "ZCL_FOO" );

  let result = create_include( &transport, &object, ClassInclude::Testclasses ).await;
  assert!( result.is_ok() );
}

#[ tokio::test ]
async fn run_unit_tests_parses_nested_test_class_tree()
{
  let server = MockServer::start().await;

  let body = r#"<?xml version="1.0" encoding="UTF-8"?>
<aunit:runResult xmlns:aunit="http://www.sap.com/adt/aunit">
  <testClasses>
    <testClass name="LTCL_FOO" uri="/sap/bc/adt/oo/classes/ZCL_FOO/includes/testclasses#type=CLAS%2FOCN%2FLTCL_FOO">
      <testMethods>
        <testMethod name="FIRST_TEST">
          <alerts>
            <alert kind="failedAssertion" severity="error">
              <details>
                <detail>expected 1 but was 2</detail>
              </details>
              <stack>
                <stackEntry>LTCL_FOO-&gt;FIRST_TEST</stackEntry>
              </stack>
            </alert>
          </alerts>
        </testMethod>
        <testMethod name="SECOND_TEST">
          <alerts/>
        </testMethod>
      </testMethods>
    </testClass>
  </testClasses>
</aunit:runResult>"#;

  Mock::given( method( "POST" ) )
    .and( path( "/sap/bc/adt/abapunit/testruns" ) )
    .respond_with( ResponseTemplate::new( 200 ).set_body_string( body ) )
    .mount( &server )
    .await;

  let transport = mock_transport( &server ).await;
  let object = ObjectRef::new( ObjectKind::Class, "ZCL_FOO" );

  let report = run_unit_tests( &transport, &object, TestRisk::Harmless, TestDuration::Short ).await.unwrap();
  assert_eq!( report.classes.len(), 1 );
  let class = &report.classes[ 0 ];
  assert_eq!( class.name, "LTCL_FOO" );
  assert_eq!( class.methods.len(), 2 );
  assert_eq!( class.methods[ 0 ].alerts.len(), 1 );
  assert_eq!( class.methods[ 0 ].alerts[ 0 ].kind, "failedAssertion" );
  assert_eq!( class.methods[ 0 ].alerts[ 0 ].details, vec![ "expected 1 but was 2".to_string() ] );
  assert!( class.methods[ 1 ].alerts.is_empty() );
  assert!( report.has_failures() );
}
