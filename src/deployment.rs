//! Deployment Engine: parses abapGit-style deployment archives and drives
//! a three-phase deploy (create shells, upload sources, fixpoint activate).

mod private
{
  use crate::crud_api::{ self, ActivationResult };
  use crate::error::{ Error, Result };
  use crate::object_ref::{ ClassInclude, ObjectKind, ObjectRef };
  use crate::transport::Transport;
  use std::collections::HashMap;
  use std::io::Read as _;

  /// One file extracted from a deployment archive, before grammar parsing.
  #[ derive( Debug, Clone ) ]
  pub struct ArchiveFile
  {
    /// The file's path within the archive.
    pub path : String,
    /// Raw file bytes.
    pub bytes : Vec< u8 >,
  }

  /// Extract the `DESCRIPT` element's text from an abapGit metadata XML
  /// blob, when present.
  #[ must_use ]
  fn extract_description( xml : &str ) -> Option< String >
  {
    let elements = crate::codecs::parse_elements( xml ).ok()?;
    elements.iter().find( | e | e.name.eq_ignore_ascii_case( "DESCRIPTION" ) || e.name.eq_ignore_ascii_case( "DESCRIPT" ) )
      .map( | e | e.text.clone() )
      .filter( | t | !t.is_empty() )
  }

  /// A parsed deployment archive: every file it contains, keyed by path.
  #[ derive( Debug, Clone, Default ) ]
  pub struct DeploymentArchive
  {
    /// Files, keyed by their archive path.
    pub files : HashMap< String, ArchiveFile >,
  }

  impl DeploymentArchive
  {
    /// Read a zip-format abapGit deployment archive from bytes.
    ///
    /// # Errors
    /// Returns [`Error::Validation`] if the archive is not a valid zip.
    pub fn from_zip_bytes( bytes : &[ u8 ] ) -> Result< Self >
    {
      let cursor = std::io::Cursor::new( bytes );
      let mut zip = zip::ZipArchive::new( cursor ).map_err( | e | Error::Validation( format!( "invalid deployment archive: {e}" ) ) )?;

      let mut files = HashMap::new();
      for i in 0..zip.len()
      {
        let mut entry = zip.by_index( i ).map_err( | e | Error::Validation( format!( "corrupt archive entry: {e}" ) ) )?;
        if entry.is_dir()
        {
          continue;
        }
        let path = entry.name().to_string();
        let mut bytes = Vec::new();
        entry.read_to_end( &mut bytes )?;
        files.insert( path.clone(), ArchiveFile { path, bytes } );
      }

      Ok( Self { files } )
    }
  }

  /// Priority order for object-kind activation: earlier kinds must
  /// activate (or at least be created) before later ones that may depend
  /// on them. Mirrors abapGit's well-known deployment ordering.
  fn type_priority( object_type : &str ) -> u8
  {
    match object_type
    {
      "INTF" => 0,
      "DOMA" => 1,
      "DTEL" => 2,
      "TABL" => 3,
      "DDLS" => 4,
      "CLAS" => 5,
      "PROG" => 6,
      "FUGR" => 7,
      "FUNC" => 8,
      "BDEF" => 9,
      "SRVD" => 10,
      "SRVB" => 11,
      _ => 255,
    }
  }

  /// One object to deploy, as derived from the archive's filename grammar
  /// (`<NAME>.<type>.abap`, `<NAME>.clas.locals_def.abap`, and friends).
  #[ derive( Debug, Clone ) ]
  pub struct DeploymentObject
  {
    /// The parsed object reference.
    pub object : ObjectRef,
    /// The ADT object-type code, used for priority ordering.
    pub object_type : String,
    /// Main source text.
    pub source : String,
    /// Class sub-include sources, keyed by include kind, when `object` is a class.
    pub includes : HashMap< ClassInclude, String >,
    /// The owning package this object should be created in.
    pub package : String,
    /// Description extracted from the object's metadata XML sibling, when
    /// present; falls back to the object's name when absent.
    pub description : String,
  }

  /// An ordered plan: objects grouped by type-priority tier, each tier to
  /// be created, then uploaded, then activated before the next tier begins.
  #[ derive( Debug, Clone, Default ) ]
  pub struct DeploymentPlan
  {
    /// Objects in deployment order (type-priority, then archive order).
    pub objects : Vec< DeploymentObject >,
  }

  /// What one archive file represents once the filename grammar
  /// `{name}.{kind-suffix}[.{include-type}].{ext}` has been parsed.
  enum ParsedFile
  {
    /// A source or metadata file belonging to an object.
    Object
    {
      name : String,
      kind : ObjectKind,
      object_type : &'static str,
      include : Option< ClassInclude >,
      is_metadata : bool,
    },
  }

  fn parse_filename( path : &str ) -> Option< ParsedFile >
  {
    // Grammar: <NAME>.<type>[.<include-type>].<ext>
    // ext in {abap, asddls, asbdef, srvdsrv, xml}; the xml extension marks
    // a metadata sibling blob rather than source text.
    let filename = path.rsplit( '/' ).next().unwrap_or( path );
    let parts : Vec< &str > = filename.split( '.' ).collect();
    if parts.len() < 3
    {
      return None;
    }
    let ext = *parts.last().unwrap();
    let is_metadata = ext == "xml";
    if !matches!( ext, "abap" | "asddls" | "asbdef" | "srvdsrv" | "xml" )
    {
      return None;
    }

    let name = parts[ 0 ].to_uppercase();
    let type_tag = parts[ 1 ].to_lowercase();
    let body_len = parts.len() - 1; // exclude the trailing ext part

    let ( kind, object_type, include ) = match type_tag.as_str()
    {
      "prog" => ( ObjectKind::Program, "PROG", None ),
      "clas" if body_len == 2 => ( ObjectKind::Class, "CLAS", Some( ClassInclude::Main ) ),
      "clas" if body_len == 3 =>
      {
        let include = match parts[ 2 ]
        {
          "locals_def" => ClassInclude::LocalsDef,
          "locals_imp" => ClassInclude::LocalsImp,
          "macros" => ClassInclude::Macros,
          "testclasses" => ClassInclude::Testclasses,
          _ => return None,
        };
        ( ObjectKind::Class, "CLAS", Some( include ) )
      },
      "intf" => ( ObjectKind::Interface, "INTF", None ),
      "fugr" => ( ObjectKind::FunctionGroup, "FUGR", None ),
      "ddls" => ( ObjectKind::Ddls, "DDLS", None ),
      "bdef" => ( ObjectKind::Bdef, "BDEF", None ),
      "srvd" => ( ObjectKind::Srvd, "SRVD", None ),
      "srvb" => ( ObjectKind::Srvb, "SRVB", None ),
      _ => return None,
    };

    Some( ParsedFile { name, kind, object_type, include, is_metadata } )
  }

  impl DeploymentArchive
  {
    /// Group this archive's files into a [`DeploymentPlan`], sorted by
    /// type-priority. All objects deploy into `package`.
    ///
    /// # Errors
    /// Returns [`Error::Validation`] if a source file cannot be decoded as UTF-8.
    pub fn into_plan( self, package : &str ) -> Result< DeploymentPlan >
    {
      let mut objects : HashMap< String, DeploymentObject > = HashMap::new();

      let mut paths : Vec< &String > = self.files.keys().collect();
      paths.sort();

      for path in paths
      {
        let Some( parsed ) = parse_filename( path ) else { continue };
        let ParsedFile { name, kind, object_type, include, is_metadata } = parsed;
        let file = &self.files[ path ];

        let entry = objects.entry( name.clone() ).or_insert_with( || DeploymentObject
        {
          object : ObjectRef::new( kind, name.clone() ),
          object_type : object_type.to_string(),
          source : String::new(),
          includes : HashMap::new(),
          package : package.to_string(),
          description : name.clone(),
        } );

        if is_metadata
        {
          if let Some( description ) = String::from_utf8( file.bytes.clone() ).ok().as_deref().and_then( extract_description )
          {
            entry.description = description;
          }
          continue;
        }

        let text = String::from_utf8( file.bytes.clone() )
          .map_err( | e | Error::Validation( format!( "{path}: not valid utf-8: {e}" ) ) )?;

        match include
        {
          Some( ClassInclude::Main ) | None => entry.source = text,
          Some( other ) => { entry.includes.insert( other, text ); },
        }
      }

      let mut objects : Vec< DeploymentObject > = objects.into_values().collect();
      objects.sort_by_key( | o | ( type_priority( &o.object_type ), o.object.name.clone() ) );

      Ok( DeploymentPlan { objects } )
    }
  }

  /// The outcome of one [`deploy`] run.
  #[ derive( Debug, Clone, Default ) ]
  pub struct DeploymentReport
  {
    /// Objects successfully created (or confirmed pre-existing) and uploaded.
    pub uploaded : Vec< String >,
    /// Objects that activated cleanly by the end of the run.
    pub activated : Vec< String >,
    /// Objects still inactive after exhausting the fixpoint pass budget.
    pub still_inactive : Vec< String >,
    /// Whether this was a dry run (no network calls were made).
    pub dry_run : bool,
  }

  /// Deploy a plan in three phases: create shells (tolerating
  /// `AlreadyExists`), upload every source with no syntax check, then
  /// iteratively activate up to `max_passes` times, each pass retrying
  /// only what remains inactive. `dry_run` short-circuits before any
  /// network call and returns every object as "would deploy".
  ///
  /// # Errors
  /// Returns [`Error::DeploymentPartial`] if objects remain inactive after
  /// `max_passes`.
  pub async fn deploy( transport : &Transport, plan : &DeploymentPlan, max_passes : u32, dry_run : bool ) -> Result< DeploymentReport >
  {
    if dry_run
    {
      return Ok( DeploymentReport
      {
        uploaded : plan.objects.iter().map( | o | o.object.name.clone() ).collect(),
        activated : Vec::new(),
        still_inactive : Vec::new(),
        dry_run : true,
      } );
    }

    let mut uploaded = Vec::new();

    // Phase 1: create shells, tolerating AlreadyExists.
    for item in &plan.objects
    {
      match crud_api::create( transport, &item.object, &item.package, &item.description ).await
      {
        Ok( () ) | Err( Error::AlreadyExists( _ ) ) => {},
        Err( e ) => return Err( e ),
      }
    }

    // Phase 2: upload sources with no syntax check.
    for item in &plan.objects
    {
      let handle = crud_api::lock( transport, &item.object ).await?;

      let main_result = async
      {
        let url = match item.object.kind
        {
          ObjectKind::Class => item.object.include_url( ClassInclude::Main )?,
          _ => item.object.source_url()?,
        };
        crud_api::update_source( transport, &handle, &url, &item.source ).await?;

        for ( include, text ) in &item.includes
        {
          let url = item.object.include_url( *include )?;
          crud_api::update_source( transport, &handle, &url, text ).await?;
        }
        Ok::< (), Error >( () )
      }.await;

      let _ = crud_api::unlock( transport, &handle ).await;
      main_result?;
      uploaded.push( item.object.name.clone() );
    }

    // Phase 3: iterative fixpoint activation.
    let mut remaining : Vec< &ObjectRef > = plan.objects.iter().map( | o | &o.object ).collect();
    let mut activated = Vec::new();

    for _pass in 0..max_passes
    {
      if remaining.is_empty()
      {
        break;
      }
      let result : ActivationResult = crud_api::activate( transport, &remaining ).await?;
      let still_inactive_uris = result.inactive;

      let ( done, pending ) : ( Vec< &ObjectRef >, Vec< &ObjectRef > ) = remaining
        .into_iter()
        .partition( | o | !still_inactive_uris.iter().any( | uri | o.url().map( | u | uri.contains( &u ) ).unwrap_or( false ) ) );

      activated.extend( done.into_iter().map( | o | o.name.clone() ) );
      remaining = pending;
    }

    let still_inactive : Vec< String > = remaining.into_iter().map( | o | o.name.clone() ).collect();

    if !still_inactive.is_empty()
    {
      return Err( Error::DeploymentPartial( format!( "{} object(s) still inactive after {max_passes} passes: {still_inactive:?}", still_inactive.len() ) ) );
    }

    Ok( DeploymentReport { uploaded, activated, still_inactive, dry_run : false } )
  }
}

pub use private::{ ArchiveFile, DeploymentArchive, DeploymentObject, DeploymentPlan, DeploymentReport, deploy };

#[ cfg( test ) ]
mod tests
{
  use super::*;

  #[ test ]
  fn plan_orders_objects_by_type_priority()
  {
    let mut files = std::collections::HashMap::new();
    files.insert( "ZCL_FOO.clas.abap".to_string(), ArchiveFile { path : "ZCL_FOO.clas.abap".to_string(), bytes : b"class zcl_foo.".to_vec() } );
    files.insert( "ZIF_BAR.intf.abap".to_string(), ArchiveFile { path : "ZIF_BAR.intf.abap".to_string(), bytes : b"interface zif_bar.".to_vec() } );
    let archive = DeploymentArchive { files };

    let plan = archive.into_plan( "$TMP" ).unwrap();
    assert_eq!( plan.objects[ 0 ].object_type, "INTF" );
    assert_eq!( plan.objects[ 1 ].object_type, "CLAS" );
  }

  #[ test ]
  fn class_includes_are_grouped_under_one_object()
  {
    let mut files = std::collections::HashMap::new();
    files.insert( "ZCL_FOO.clas.abap".to_string(), ArchiveFile { path : "ZCL_FOO.clas.abap".to_string(), bytes : b"class zcl_foo.".to_vec() } );
    files.insert( "ZCL_FOO.clas.testclasses.abap".to_string(), ArchiveFile { path : "ZCL_FOO.clas.testclasses.abap".to_string(), bytes : b"class ltc_foo.".to_vec() } );
    let archive = DeploymentArchive { files };

    let plan = archive.into_plan( "$TMP" ).unwrap();
    assert_eq!( plan.objects.len(), 1 );
    assert!( plan.objects[ 0 ].includes.contains_key( &crate::object_ref::ClassInclude::Testclasses ) );
  }

  #[ test ]
  fn unrecognized_filenames_are_ignored()
  {
    let mut files = std::collections::HashMap::new();
    files.insert( "README.md".to_string(), ArchiveFile { path : "README.md".to_string(), bytes : b"hello".to_vec() } );
    let archive = DeploymentArchive { files };
    let plan = archive.into_plan( "$TMP" ).unwrap();
    assert!( plan.objects.is_empty() );
  }

  #[ tokio::test ]
  async fn dry_run_reports_without_network_calls()
  {
    let mut files = std::collections::HashMap::new();
    files.insert( "ZPROG.prog.abap".to_string(), ArchiveFile { path : "ZPROG.prog.abap".to_string(), bytes : b"report zprog.".to_vec() } );
    let plan = DeploymentArchive { files }.into_plan( "$TMP" ).unwrap();

    let cfg = crate::transport::TransportConfig::new( "https://host:44300" );
    let creds = crate::auth::Credentials::basic( "bob", "x" );
    let transport = Transport::new( cfg, creds ).unwrap();

    let report = deploy( &transport, &plan, 5, true ).await.unwrap();
    assert!( report.dry_run );
    assert_eq!( report.uploaded, vec![ "ZPROG".to_string() ] );
  }

  #[ test ]
  fn ddic_extensions_are_recognized()
  {
    let mut files = std::collections::HashMap::new();
    files.insert( "Z_VIEW.ddls.asddls".to_string(), ArchiveFile { path : "Z_VIEW.ddls.asddls".to_string(), bytes : b"define view Z_VIEW as select from t1.".to_vec() } );
    files.insert( "Z_BO.bdef.asbdef".to_string(), ArchiveFile { path : "Z_BO.bdef.asbdef".to_string(), bytes : b"managed implementation in class zcl_bo.".to_vec() } );
    files.insert( "Z_SRV.srvb.srvdsrv".to_string(), ArchiveFile { path : "Z_SRV.srvb.srvdsrv".to_string(), bytes : b"service definition.".to_vec() } );
    let archive = DeploymentArchive { files };

    let plan = archive.into_plan( "$TMP" ).unwrap();
    assert_eq!( plan.objects.len(), 3 );
    assert!( plan.objects.iter().any( | o | o.object_type == "DDLS" ) );
    assert!( plan.objects.iter().any( | o | o.object_type == "BDEF" ) );
    assert!( plan.objects.iter().any( | o | o.object_type == "SRVB" ) );
  }

  #[ test ]
  fn metadata_xml_supplies_description_without_becoming_source()
  {
    let mut files = std::collections::HashMap::new();
    files.insert( "ZPROG.prog.abap".to_string(), ArchiveFile { path : "ZPROG.prog.abap".to_string(), bytes : b"REPORT zprog.".to_vec() } );
    files.insert(
      "ZPROG.prog.xml".to_string(),
      ArchiveFile { path : "ZPROG.prog.xml".to_string(), bytes : b"<abapGit><DESCRIPT>My program</DESCRIPT></abapGit>".to_vec() },
    );
    let archive = DeploymentArchive { files };

    let plan = archive.into_plan( "$TMP" ).unwrap();
    assert_eq!( plan.objects.len(), 1 );
    assert_eq!( plan.objects[ 0 ].description, "My program" );
    assert_eq!( plan.objects[ 0 ].source, "REPORT zprog." );
  }

  #[ test ]
  fn missing_metadata_falls_back_to_object_name_as_description()
  {
    let mut files = std::collections::HashMap::new();
    files.insert( "ZPROG.prog.abap".to_string(), ArchiveFile { path : "ZPROG.prog.abap".to_string(), bytes : b"REPORT zprog.".to_vec() } );
    let plan = DeploymentArchive { files }.into_plan( "$TMP" ).unwrap();
    assert_eq!( plan.objects[ 0 ].description, "ZPROG" );
  }
}
