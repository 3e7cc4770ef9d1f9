//! Object references and the pure URL-derivation function.
//!
//! Kind + name (+ optional parent) determines the ADT path deterministically;
//! `url()` carries no side-state (invariant 7 of the data model).

mod private
{
  use serde::{ Deserialize, Serialize };

  /// The closed set of ABAP object kinds the engine understands.
  #[ derive( Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize ) ]
  #[ serde( rename_all = "kebab-case" ) ]
  pub enum ObjectKind
  {
    /// An executable ABAP report program.
    Program,
    /// A non-executable include belonging to a program.
    Include,
    /// An ABAP OO class.
    Class,
    /// An ABAP OO interface.
    Interface,
    /// A function group container.
    FunctionGroup,
    /// A function module inside a function group.
    FunctionModule,
    /// A DDIC structure.
    Structure,
    /// A DDIC transparent table.
    Table,
    /// A CDS view definition (DDLS source).
    Ddls,
    /// A behavior definition (BDEF source).
    Bdef,
    /// A service definition (SRVD source).
    Srvd,
    /// A service binding (SRVB source).
    Srvb,
    /// A development package.
    Package,
    /// An ABAP transaction code.
    Transaction,
    /// A DDIC data element / type.
    Type,
  }

  impl ObjectKind
  {
    /// Parse a kind from the lowercase kebab-case spelling used by the tool
    /// facade's `object_type` argument.
    ///
    /// # Errors
    /// Returns [`crate::error::Error::UnsupportedObject`] for unknown spellings.
    pub fn parse( s : &str ) -> crate::error::Result< Self >
    {
      Ok( match s
      {
        "program" => ObjectKind::Program,
        "include" => ObjectKind::Include,
        "class" => ObjectKind::Class,
        "interface" => ObjectKind::Interface,
        "function-group" => ObjectKind::FunctionGroup,
        "function-module" => ObjectKind::FunctionModule,
        "structure" => ObjectKind::Structure,
        "table" => ObjectKind::Table,
        "ddls" => ObjectKind::Ddls,
        "bdef" => ObjectKind::Bdef,
        "srvd" => ObjectKind::Srvd,
        "srvb" => ObjectKind::Srvb,
        "package" => ObjectKind::Package,
        "transaction" => ObjectKind::Transaction,
        "type" => ObjectKind::Type,
        other => return Err( crate::error::Error::UnsupportedObject( other.to_string() ) ),
      } )
    }

    /// The `adtcore:type` code a creation descriptor must carry for this kind.
    #[ must_use ]
    pub fn adt_type_code( self ) -> &'static str
    {
      match self
      {
        ObjectKind::Program => "PROG/P",
        ObjectKind::Include => "PROG/I",
        ObjectKind::Class => "CLAS/OC",
        ObjectKind::Interface => "INTF/OI",
        ObjectKind::FunctionGroup => "FUGR/F",
        ObjectKind::FunctionModule => "FUGR/FF",
        ObjectKind::Structure => "TABL/DS",
        ObjectKind::Table => "TABL/DT",
        ObjectKind::Ddls => "DDLS/DF",
        ObjectKind::Bdef => "BDEF/BDO",
        ObjectKind::Srvd => "SRVD/SRV",
        ObjectKind::Srvb => "SRVB/SVB",
        ObjectKind::Package => "DEVC/K",
        ObjectKind::Transaction => "TRAN/T",
        ObjectKind::Type => "DTEL/DE",
      }
    }
  }

  /// The five ordered sub-includes a class carries.
  #[ derive( Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize ) ]
  #[ serde( rename_all = "snake_case" ) ]
  pub enum ClassInclude
  {
    /// The main (public/protected/private section) source.
    Main,
    /// Local type definitions (`locals_def`).
    LocalsDef,
    /// Local type implementations (`locals_imp`).
    LocalsImp,
    /// Macro definitions.
    Macros,
    /// Test class source, created on demand.
    Testclasses,
  }

  impl ClassInclude
  {
    /// All includes, in the fixed creation/upload order used by the
    /// deployment engine (spec §4.8 step 3).
    #[ must_use ]
    pub fn ordered() -> &'static [ ClassInclude ]
    {
      &[
        ClassInclude::Main,
        ClassInclude::LocalsDef,
        ClassInclude::LocalsImp,
        ClassInclude::Macros,
        ClassInclude::Testclasses,
      ]
    }

    /// The ADT include-type segment used in the URL and in include-create
    /// descriptors.
    #[ must_use ]
    pub fn segment( self ) -> &'static str
    {
      match self
      {
        ClassInclude::Main => "main",
        ClassInclude::LocalsDef => "definitions",
        ClassInclude::LocalsImp => "implementations",
        ClassInclude::Macros => "macros",
        ClassInclude::Testclasses => "testclasses",
      }
    }
  }

  /// A reference to one ABAP repository object: kind, name and an optional
  /// parent (function group for a function module, class for an include).
  #[ derive( Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize ) ]
  pub struct ObjectRef
  {
    /// The object's kind.
    pub kind : ObjectKind,
    /// The object's name, as stored server-side (case is significant for URLs).
    pub name : String,
    /// The parent object name, required for function modules (function
    /// group) and meaningless for other kinds.
    pub parent : Option< String >,
  }

  impl ObjectRef
  {
    /// Construct a reference with no parent.
    #[ must_use ]
    pub fn new( kind : ObjectKind, name : impl Into< String > ) -> Self
    {
      Self { kind, name : name.into(), parent : None }
    }

    /// Construct a reference with a parent (e.g. a function module's group).
    #[ must_use ]
    pub fn with_parent( kind : ObjectKind, name : impl Into< String >, parent : impl Into< String > ) -> Self
    {
      Self { kind, name : name.into(), parent : Some( parent.into() ) }
    }

    /// Derive the ADT source/metadata URL for this object. Pure function of
    /// `(kind, name, parent)`; never performs I/O.
    ///
    /// # Errors
    /// Returns [`crate::error::Error::InvalidArgument`] when a kind that
    /// requires a parent (function-module) is missing one.
    pub fn url( &self ) -> crate::error::Result< String >
    {
      let name = self.name.as_str();
      Ok( match self.kind
      {
        ObjectKind::Program => format!( "/sap/bc/adt/programs/programs/{name}" ),
        ObjectKind::Include => format!( "/sap/bc/adt/programs/includes/{name}" ),
        ObjectKind::Class => format!( "/sap/bc/adt/oo/classes/{name}" ),
        ObjectKind::Interface => format!( "/sap/bc/adt/oo/interfaces/{name}" ),
        ObjectKind::FunctionGroup => format!( "/sap/bc/adt/functions/groups/{name}" ),
        ObjectKind::FunctionModule =>
        {
          let group = self.parent.as_deref().ok_or_else( ||
            crate::error::Error::InvalidArgument( "function-module requires parent (function group)".into() )
          )?;
          format!( "/sap/bc/adt/functions/groups/{group}/fmodules/{name}" )
        },
        ObjectKind::Structure => format!( "/sap/bc/adt/ddic/structures/{name}" ),
        ObjectKind::Table => format!( "/sap/bc/adt/ddic/tables/{name}" ),
        ObjectKind::Ddls => format!( "/sap/bc/adt/ddic/ddl/sources/{name}" ),
        ObjectKind::Bdef => format!( "/sap/bc/adt/bo/behaviordefinitions/{name}" ),
        ObjectKind::Srvd => format!( "/sap/bc/adt/ddic/srvd/sources/{name}" ),
        ObjectKind::Srvb => format!( "/sap/bc/adt/businessservices/bindings/{name}" ),
        ObjectKind::Package => format!( "/sap/bc/adt/packages/{name}" ),
        ObjectKind::Transaction => format!( "/sap/bc/adt/vit/docu/transactions/{name}" ),
        ObjectKind::Type => format!( "/sap/bc/adt/ddic/dataelements/{name}" ),
      } )
    }

    /// The `.../source/main` URL for kinds that carry source text directly
    /// (as opposed to class includes, which use [`Self::include_url`]).
    ///
    /// # Errors
    /// Propagates [`Self::url`]'s error, and rejects kinds without a single
    /// main source endpoint (package, transaction, table, structure, type).
    pub fn source_url( &self ) -> crate::error::Result< String >
    {
      match self.kind
      {
        ObjectKind::Package | ObjectKind::Transaction | ObjectKind::Table
        | ObjectKind::Structure | ObjectKind::Type =>
          Err( crate::error::Error::UnsupportedObject( format!( "{:?} has no source/main endpoint", self.kind ) ) ),
        _ => Ok( format!( "{}/source/main", self.url()? ) ),
      }
    }

    /// The URL for one of a class's five ordered includes.
    ///
    /// # Errors
    /// Returns [`crate::error::Error::UnsupportedObject`] if `self.kind` is
    /// not [`ObjectKind::Class`].
    pub fn include_url( &self, include : ClassInclude ) -> crate::error::Result< String >
    {
      if self.kind != ObjectKind::Class
      {
        return Err( crate::error::Error::UnsupportedObject( "only classes carry sub-includes".into() ) );
      }
      let base = self.url()?;
      Ok( match include
      {
        ClassInclude::Main => format!( "{base}/source/main" ),
        other => format!( "{base}/includes/{}", other.segment() ),
      } )
    }
  }
}

pub use private::{ ObjectKind, ClassInclude, ObjectRef };

#[ cfg( test ) ]
mod tests
{
  use super::*;

  #[ test ]
  fn program_url_is_pure_and_deterministic()
  {
    let r = ObjectRef::new( ObjectKind::Program, "ZTEST" );
    assert_eq!( r.url().unwrap(), "/sap/bc/adt/programs/programs/ZTEST" );
    assert_eq!( r.url().unwrap(), r.url().unwrap() );
  }

  #[ test ]
  fn function_module_requires_parent()
  {
    let r = ObjectRef::new( ObjectKind::FunctionModule, "Z_FM" );
    assert!( r.url().is_err() );

    let r = ObjectRef::with_parent( ObjectKind::FunctionModule, "Z_FM", "ZGRP" );
    assert_eq!( r.url().unwrap(), "/sap/bc/adt/functions/groups/ZGRP/fmodules/Z_FM" );
  }

  #[ test ]
  fn class_include_urls_cover_all_five()
  {
    let r = ObjectRef::new( ObjectKind::Class, "ZCL_X" );
    assert_eq!( r.include_url( ClassInclude::Main ).unwrap(), "/sap/bc/adt/oo/classes/ZCL_X/source/main" );
    assert_eq!( r.include_url( ClassInclude::Testclasses ).unwrap(), "/sap/bc/adt/oo/classes/ZCL_X/includes/testclasses" );
    assert_eq!( r.include_url( ClassInclude::LocalsDef ).unwrap(), "/sap/bc/adt/oo/classes/ZCL_X/includes/definitions" );
  }

  #[ test ]
  fn non_class_rejects_include_url()
  {
    let r = ObjectRef::new( ObjectKind::Program, "ZTEST" );
    assert!( r.include_url( ClassInclude::Main ).is_err() );
  }

  #[ test ]
  fn adt_type_code_is_stable_per_kind()
  {
    assert_eq!( ObjectKind::Program.adt_type_code(), "PROG/P" );
    assert_eq!( ObjectKind::Class.adt_type_code(), "CLAS/OC" );
    assert_eq!( ObjectKind::FunctionModule.adt_type_code(), "FUGR/FF" );
  }

  #[ test ]
  fn kind_parse_round_trips_known_spellings()
  {
    for s in [ "program", "class", "interface", "function-group", "function-module",
               "structure", "table", "ddls", "bdef", "srvd", "srvb", "package", "transaction", "type", "include" ]
    {
      assert!( ObjectKind::parse( s ).is_ok(), "expected {s} to parse" );
    }
    assert!( ObjectKind::parse( "nonsense" ).is_err() );
  }
}
