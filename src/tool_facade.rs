//! The stable tool catalog: the fixed set of identifiers an LLM-driven
//! agent invokes, in both Focused and Expert exposure modes, plus the
//! unified `get_source`/`write_source` dispatch by `object_type`.

mod private
{
  use crate::config::ExposureMode;
  use crate::crud_api::{ TestDuration, TestRisk };
  use crate::engine::{ CancelToken, Engine };
  use crate::error::{ Error, Result };
  use crate::object_ref::{ ClassInclude, ObjectKind, ObjectRef };
  use crate::read_api::{ DependencyLevel, DependencyQuery, SourcePosition };
  use crate::workflow::{ EditResult, EditSpec, WriteResult };
  use serde_json::Value;

  /// One entry in the stable tool catalog.
  #[ derive( Debug, Clone, PartialEq, Eq ) ]
  pub struct ToolCatalogEntry
  {
    /// The stable tool identifier an agent calls by name.
    pub name : &'static str,
    /// One-line description shown in the catalog an agent discovers at startup.
    pub description : &'static str,
    /// Whether this tool is exposed in [`ExposureMode::Focused`] mode.
    pub focused : bool,
  }

  /// The full, fixed catalog. Every entry with `focused: true` is exposed
  /// in both modes; the rest only in [`ExposureMode::Expert`].
  #[ must_use ]
  pub fn catalog() -> Vec< ToolCatalogEntry >
  {
    vec![
      // Core read/write surface, exposed in Focused mode.
      ToolCatalogEntry { name : "get_source", description : "Read an object's source by kind and name.", focused : true },
      ToolCatalogEntry { name : "write_source", description : "Create or update an object's source, locking/unlocking and activating around the write.", focused : true },
      ToolCatalogEntry { name : "edit_source", description : "Apply a surgical find/replace edit to an object's source.", focused : true },
      ToolCatalogEntry { name : "quick_search", description : "Search the repository by name pattern.", focused : true },
      ToolCatalogEntry { name : "create_and_activate_program", description : "Create a program, upload source and activate it.", focused : true },
      ToolCatalogEntry { name : "create_class_with_tests", description : "Create a class with main and test sources, then activate it.", focused : true },
      ToolCatalogEntry { name : "run_unit_tests", description : "Run ABAP Unit tests for an object.", focused : true },
      ToolCatalogEntry { name : "get_metadata", description : "Fetch an object's ADT-core metadata.", focused : true },
      ToolCatalogEntry { name : "list_package", description : "List the objects directly contained in a package.", focused : true },

      // Expert-only surface.
      ToolCatalogEntry { name : "deploy_archive", description : "Deploy an abapGit-style archive into a package.", focused : false },
      ToolCatalogEntry { name : "rename_object", description : "Rename a repository object.", focused : false },
      ToolCatalogEntry { name : "dependency_tree", description : "Fetch a CDS entity's dependency tree.", focused : false },
      ToolCatalogEntry { name : "find_definition", description : "Resolve the definition site of a source position.", focused : false },
      ToolCatalogEntry { name : "find_references", description : "Find references to the symbol at a source position.", focused : false },
      ToolCatalogEntry { name : "completion", description : "Request code-completion proposals at a source position.", focused : false },
      ToolCatalogEntry { name : "type_hierarchy", description : "Resolve a class or interface's supertype chain at a source position.", focused : false },
      ToolCatalogEntry { name : "get_include_source", description : "Read a class sub-include's source (locals, macros, testclasses).", focused : false },
      ToolCatalogEntry { name : "lock_object", description : "Acquire an edit lock on an object.", focused : false },
      ToolCatalogEntry { name : "unlock_object", description : "Release a previously-acquired edit lock.", focused : false },
      ToolCatalogEntry { name : "create_object", description : "Create a repository object shell without source.", focused : false },
      ToolCatalogEntry { name : "delete_object", description : "Delete a repository object under an existing lock.", focused : false },
      ToolCatalogEntry { name : "syntax_check", description : "Run a syntax check against candidate source without saving it.", focused : false },
      ToolCatalogEntry { name : "activate_object", description : "Activate one or more objects.", focused : false },
      ToolCatalogEntry { name : "get_metrics", description : "Return this engine instance's call counters.", focused : false },
    ]
  }

  /// The catalog entries visible under `mode`.
  #[ must_use ]
  pub fn exposed_catalog( mode : ExposureMode ) -> Vec< ToolCatalogEntry >
  {
    catalog().into_iter().filter( | e | mode == ExposureMode::Expert || e.focused ).collect()
  }

  fn require_str< 'a >( args : &'a Value, key : &str ) -> Result< &'a str >
  {
    args.get( key ).and_then( Value::as_str ).ok_or_else( || Error::InvalidArgument( format!( "missing argument: {key}" ) ) )
  }

  fn optional_str< 'a >( args : &'a Value, key : &str ) -> Option< &'a str >
  {
    args.get( key ).and_then( Value::as_str )
  }

  fn optional_bool( args : &Value, key : &str ) -> bool
  {
    args.get( key ).and_then( Value::as_bool ).unwrap_or( false )
  }

  /// Validate and build an [`ObjectRef`] from the facade's `object_type`/
  /// `name`/`parent` argument trio. Performed before any I/O, so a
  /// malformed call never reaches the network.
  ///
  /// # Errors
  /// Returns [`Error::InvalidArgument`] or [`Error::UnsupportedObject`] for
  /// malformed or unrecognized arguments.
  pub fn object_ref_from_args( args : &Value ) -> Result< ObjectRef >
  {
    let kind = ObjectKind::parse( require_str( args, "object_type" )? )?;
    let name = require_str( args, "name" )?;
    match ( kind, optional_str( args, "parent" ) )
    {
      ( ObjectKind::FunctionModule, None ) =>
        Err( Error::InvalidArgument( "function-module requires a parent argument".into() ) ),
      ( _, Some( parent ) ) => Ok( ObjectRef::with_parent( kind, name, parent ) ),
      ( _, None ) => Ok( ObjectRef::new( kind, name ) ),
    }
  }

  fn position_from_args( args : &Value ) -> Result< SourcePosition >
  {
    let line = args.get( "line" ).and_then( Value::as_u64 ).ok_or_else( || Error::InvalidArgument( "missing argument: line".into() ) )?;
    let column = args.get( "column" ).and_then( Value::as_u64 ).unwrap_or( 0 );
    Ok( SourcePosition { line : line as u32, column : column as u32 } )
  }

  /// Unified `get_source` dispatch: resolves the object from `args` and
  /// reads its current source, regardless of kind.
  ///
  /// # Errors
  /// Propagates argument-validation and engine errors.
  pub async fn get_source( engine : &Engine, args : &Value, cancel : CancelToken ) -> Result< String >
  {
    let object = object_ref_from_args( args )?;
    engine.get_source( &object, cancel ).await
  }

  /// The mode a `write_source` call requests.
  #[ derive( Debug, Clone, Copy, PartialEq, Eq ) ]
  pub enum WriteMode
  {
    /// Create the object if absent, update it if present.
    Upsert,
    /// Require the object to not already exist.
    Create,
    /// Require the object to already exist.
    Update,
  }

  impl WriteMode
  {
    fn parse( s : &str ) -> Result< Self >
    {
      match s
      {
        "upsert" => Ok( WriteMode::Upsert ),
        "create" => Ok( WriteMode::Create ),
        "update" => Ok( WriteMode::Update ),
        other => Err( Error::InvalidArgument( format!( "unknown write mode: {other}" ) ) ),
      }
    }
  }

  /// The outcome of the unified `write_source` dispatch.
  #[ derive( Debug, Clone ) ]
  pub enum WriteOutcome
  {
    /// The update-workflow path ran (pre-syntax-check, lock, PUT, unlock, activate).
    Updated( WriteResult ),
    /// The create-workflow path ran for a program.
    CreatedProgram( crate::crud_api::ActivationResult ),
    /// The create-workflow path ran for a class, optionally with tests.
    CreatedClass( crate::crud_api::ActivationResult, Option< crate::crud_api::UnitTestReport > ),
  }

  /// Unified `write_source` dispatch: `args` carries `object_type`,
  /// `name`, `parent`, `source`, `mode` (`upsert`/`create`/`update`),
  /// `package`, `description` and, for classes, an optional `test_source`
  /// that provisions the testclasses include.
  ///
  /// # Errors
  /// Propagates argument-validation and engine errors.
  pub async fn write_source( engine : &Engine, args : &Value, cancel : CancelToken ) -> Result< WriteOutcome >
  {
    let object = object_ref_from_args( args )?;
    let source = require_str( args, "source" )?;
    let mode = match optional_str( args, "mode" )
    {
      Some( m ) => WriteMode::parse( m )?,
      None => WriteMode::Upsert,
    };
    let package = optional_str( args, "package" );

    let exists = match mode
    {
      WriteMode::Update => true,
      WriteMode::Create => false,
      WriteMode::Upsert => engine.get_source( &object, cancel.clone() ).await.is_ok(),
    };

    if exists
    {
      if mode == WriteMode::Create
      {
        return Err( Error::AlreadyExists( object.name.clone() ) );
      }
      let result = match object.kind
      {
        ObjectKind::Class => engine.write_class( &object, source, package, cancel ).await?,
        _ => engine.write_program( &object, source, package, cancel ).await?,
      };
      return Ok( WriteOutcome::Updated( result ) );
    }

    if mode == WriteMode::Update
    {
      return Err( Error::NotFound( object.name.clone() ) );
    }

    let package = package.ok_or_else( || Error::InvalidArgument( "missing argument: package".into() ) )?;
    let description = optional_str( args, "description" ).unwrap_or( &object.name );

    match ( object.kind, optional_str( args, "test_source" ) )
    {
      ( ObjectKind::Class, Some( test_source ) ) =>
      {
        let ( activation, tests ) = engine.create_class_with_tests( &object.name, package, description, source, test_source, cancel ).await?;
        Ok( WriteOutcome::CreatedClass( activation, Some( tests ) ) )
      },
      ( ObjectKind::Class, None ) =>
      {
        engine.create( &object, package, description, cancel.clone() ).await?;
        let result = engine.write_class( &object, source, Some( package ), cancel ).await?;
        Ok( WriteOutcome::CreatedClass( result.activation.unwrap_or_default(), None ) )
      },
      _ =>
      {
        let activation = engine.create_and_activate_program( &object.name, package, description, source, cancel ).await?;
        Ok( WriteOutcome::CreatedProgram( activation ) )
      },
    }
  }

  /// Unified `edit_source` dispatch. `args` carries `object_type`, `name`,
  /// `parent`, `old_string`, `new_string`, and the optional
  /// `replace_all`/`syntax_check`/`case_insensitive`/`package` flags.
  ///
  /// # Errors
  /// Propagates argument-validation and engine errors.
  pub async fn edit_source( engine : &Engine, args : &Value, cancel : CancelToken ) -> Result< EditResult >
  {
    let object = object_ref_from_args( args )?;
    let old_string = require_str( args, "old_string" )?.to_string();
    let new_string = require_str( args, "new_string" )?.to_string();
    let edit = EditSpec
    {
      old_string,
      new_string,
      replace_all : optional_bool( args, "replace_all" ),
      syntax_check : optional_bool( args, "syntax_check" ),
      case_insensitive : optional_bool( args, "case_insensitive" ),
    };
    let package = optional_str( args, "package" );
    engine.edit_source( &object, &edit, package, cancel ).await
  }

  /// Unified `run_unit_tests` dispatch. `args` carries `object_type`,
  /// `name`, `parent`, and the optional `risk`/`duration` classification
  /// (default `harmless`/`short`).
  ///
  /// # Errors
  /// Propagates argument-validation and engine errors.
  pub async fn run_unit_tests( engine : &Engine, args : &Value, cancel : CancelToken ) -> Result< crate::crud_api::UnitTestReport >
  {
    let object = object_ref_from_args( args )?;
    let risk = match optional_str( args, "risk" )
    {
      Some( "dangerous" ) => TestRisk::Dangerous,
      Some( "critical" ) => TestRisk::Critical,
      _ => TestRisk::Harmless,
    };
    let duration = match optional_str( args, "duration" )
    {
      Some( "medium" ) => TestDuration::Medium,
      Some( "long" ) => TestDuration::Long,
      _ => TestDuration::Short,
    };
    engine.run_unit_tests( &object, risk, duration, cancel ).await
  }

  /// Unified `dependency_tree` dispatch. `args` carries `entity` and the
  /// optional `level` (`unit`/`hierarchy`, default `hierarchy`),
  /// `associations` and `package` parameters.
  ///
  /// # Errors
  /// Propagates argument-validation and engine errors.
  pub async fn dependency_tree( engine : &Engine, args : &Value, cancel : CancelToken ) -> Result< crate::dependency_tree::DependencyTree >
  {
    let entity = require_str( args, "entity" )?;
    let level = match optional_str( args, "level" )
    {
      Some( "unit" ) => DependencyLevel::Unit,
      _ => DependencyLevel::Hierarchy,
    };
    let query = DependencyQuery
    {
      level,
      include_associations : optional_bool( args, "associations" ),
      package : optional_str( args, "package" ).map( str::to_string ),
    };
    engine.dependency_tree( entity, &query, cancel ).await
  }

  /// Unified code-intelligence dispatch shared by `find_definition`,
  /// `find_references`, `completion` and `type_hierarchy`: `args` carries
  /// `object_type`/`name`/`parent` plus 1-based `line` and 0-based `column`.
  ///
  /// # Errors
  /// Propagates argument-validation and engine errors.
  pub async fn find_definition( engine : &Engine, args : &Value, cancel : CancelToken ) -> Result< crate::read_api::CodeLocation >
  {
    let object = object_ref_from_args( args )?;
    engine.find_definition( &object, position_from_args( args )?, cancel ).await
  }

  /// See [`find_definition`].
  ///
  /// # Errors
  /// Propagates argument-validation and engine errors.
  pub async fn find_references( engine : &Engine, args : &Value, cancel : CancelToken ) -> Result< Vec< crate::read_api::CodeLocation > >
  {
    let object = object_ref_from_args( args )?;
    engine.find_references( &object, position_from_args( args )?, cancel ).await
  }

  /// See [`find_definition`].
  ///
  /// # Errors
  /// Propagates argument-validation and engine errors.
  pub async fn completion( engine : &Engine, args : &Value, cancel : CancelToken ) -> Result< Vec< String > >
  {
    let object = object_ref_from_args( args )?;
    engine.completion( &object, position_from_args( args )?, cancel ).await
  }

  /// See [`find_definition`].
  ///
  /// # Errors
  /// Propagates argument-validation and engine errors.
  pub async fn type_hierarchy( engine : &Engine, args : &Value, cancel : CancelToken ) -> Result< Vec< crate::read_api::CodeLocation > >
  {
    let object = object_ref_from_args( args )?;
    engine.type_hierarchy( &object, position_from_args( args )?, cancel ).await
  }

  /// Unified `get_include_source` dispatch. `args` carries `object_type`
  /// (must be `class`), `name` and `include` (`main`/`locals_def`/
  /// `locals_imp`/`macros`/`testclasses`).
  ///
  /// # Errors
  /// Propagates argument-validation and engine errors.
  pub async fn get_include_source( engine : &Engine, args : &Value, cancel : CancelToken ) -> Result< String >
  {
    let object = object_ref_from_args( args )?;
    let include = match require_str( args, "include" )?
    {
      "main" => ClassInclude::Main,
      "locals_def" => ClassInclude::LocalsDef,
      "locals_imp" => ClassInclude::LocalsImp,
      "macros" => ClassInclude::Macros,
      "testclasses" => ClassInclude::Testclasses,
      other => return Err( Error::InvalidArgument( format!( "unknown include: {other}" ) ) ),
    };
    engine.get_include_source( &object, include, cancel ).await
  }

  /// Unified `rename_object` dispatch. `args` carries `object_type`,
  /// `name`, `new_name`, `package` and `description`.
  ///
  /// # Errors
  /// Propagates argument-validation and engine errors.
  pub async fn rename_object( engine : &Engine, args : &Value, cancel : CancelToken ) -> Result< () >
  {
    let object = object_ref_from_args( args )?;
    let new_name = require_str( args, "new_name" )?;
    let package = require_str( args, "package" )?;
    let description = optional_str( args, "description" ).unwrap_or( new_name );
    engine.rename_object( &object, new_name, package, description, cancel ).await
  }

  /// Render an [`Error`] as the text block the tool facade returns to the
  /// calling agent on failure: the stable kind, then the message.
  #[ must_use ]
  pub fn error_to_text( err : &Error ) -> String
  {
    format!( "error [{}]: {err}", err.kind() )
  }
}

pub use private::{
  ToolCatalogEntry, catalog, exposed_catalog, object_ref_from_args,
  WriteMode, WriteOutcome,
  get_source, write_source, edit_source, run_unit_tests, dependency_tree,
  find_definition, find_references, completion, type_hierarchy,
  get_include_source, rename_object, error_to_text,
};

#[ cfg( test ) ]
mod tests
{
  use super::*;
  use crate::config::ExposureMode;
  use crate::error::Error;

  #[ test ]
  fn focused_mode_excludes_expert_only_tools()
  {
    let focused = exposed_catalog( ExposureMode::Focused );
    assert!( focused.iter().any( | e | e.name == "get_source" ) );
    assert!( !focused.iter().any( | e | e.name == "deploy_archive" ) );
  }

  #[ test ]
  fn expert_mode_exposes_every_tool()
  {
    let expert = exposed_catalog( ExposureMode::Expert );
    assert_eq!( expert.len(), catalog().len() );
  }

  #[ test ]
  fn object_ref_from_args_rejects_function_module_without_parent()
  {
    let args = serde_json::json!( { "object_type" : "function-module", "name" : "Z_FM" } );
    assert!( object_ref_from_args( &args ).is_err() );
  }

  #[ test ]
  fn object_ref_from_args_accepts_program_with_no_parent()
  {
    let args = serde_json::json!( { "object_type" : "program", "name" : "ZTEST" } );
    assert!( object_ref_from_args( &args ).is_ok() );
  }

  #[ test ]
  fn error_to_text_leads_with_stable_kind()
  {
    let err = Error::NotFound( "ZFOO".into() );
    assert!( error_to_text( &err ).starts_with( "error [not-found]" ) );
  }
}
