//! Read-only ADT operations: source/metadata retrieval, package listing,
//! quick search, CDS dependency queries and code-intelligence lookups.

mod private
{
  use crate::codecs::parse_elements;
  use crate::dependency_tree::{ DependencyNode, DependencyTree };
  use crate::error::{ Error, Result };
  use crate::object_ref::ObjectRef;
  use crate::transport::Transport;
  use reqwest::Method;
  use std::collections::HashMap;

  /// One quick-search hit.
  #[ derive( Debug, Clone, PartialEq, Eq ) ]
  pub struct SearchResult
  {
    /// The matched object's name.
    pub name : String,
    /// Its ADT object-type code.
    pub object_type : String,
    /// A human-readable description, when the server supplies one.
    pub description : String,
    /// The owning package, when known.
    pub package : Option< String >,
  }

  /// A position in code-intelligence lookups: line (1-based) and column
  /// (0-based) into an object's main source.
  #[ derive( Debug, Clone, Copy, PartialEq, Eq ) ]
  pub struct SourcePosition
  {
    /// 1-based line.
    pub line : u32,
    /// 0-based column offset.
    pub column : u32,
  }

  /// The target of a definition/reference lookup.
  #[ derive( Debug, Clone, PartialEq, Eq ) ]
  pub struct CodeLocation
  {
    /// The ADT URI of the defining (or referencing) object.
    pub uri : String,
    /// The position within that object's source.
    pub position : SourcePosition,
  }

  /// Fetch an object's main source text.
  ///
  /// # Errors
  /// Returns [`Error::NotFound`] if the object does not exist.
  pub async fn get_source( transport : &Transport, object : &ObjectRef ) -> Result< String >
  {
    let response = transport.execute( Method::GET, &object.source_url()?, None, None, None, None ).await?;
    response.text()
  }

  /// Fetch a class's sub-include source (main, locals, macros, testclasses).
  ///
  /// # Errors
  /// Returns [`Error::UnsupportedObject`] for non-class refs.
  pub async fn get_include_source(
    transport : &Transport,
    object : &ObjectRef,
    include : crate::object_ref::ClassInclude,
  ) -> Result< String >
  {
    let response = transport.execute( Method::GET, &object.include_url( include )?, None, None, None, None ).await?;
    response.text()
  }

  /// Fetch an object's metadata document (the ADT-core properties: name,
  /// description, package, responsible, version).
  ///
  /// # Errors
  /// Returns [`Error::NotFound`] if the object does not exist.
  pub async fn get_metadata( transport : &Transport, object : &ObjectRef ) -> Result< HashMap< String, String > >
  {
    let response = transport.execute( Method::GET, &object.url()?, None, None, None, None ).await?;
    let elements = parse_elements( &response.text()? )?;
    let root = elements.first().ok_or_else( || Error::Validation( "empty metadata document".into() ) )?;
    Ok( root.attributes.iter().cloned().collect() )
  }

  /// List the objects directly contained in a package.
  ///
  /// # Errors
  /// Returns [`Error::NotFound`] if the package does not exist.
  pub async fn list_package( transport : &Transport, package : &str ) -> Result< Vec< SearchResult > >
  {
    let path = format!( "/sap/bc/adt/packages/{package}/contents" );
    let response = transport.execute( Method::GET, &path, None, None, None, None ).await?;
    let elements = parse_elements( &response.text()? )?;
    Ok( elements_to_results( &elements, Some( package ) ) )
  }

  fn elements_to_results( elements : &[ crate::codecs::XmlElement ], package : Option< &str > ) -> Vec< SearchResult >
  {
    elements
      .iter()
      .filter( | e | e.name == "objectReference" || e.name == "object" )
      .map( | e |
      {
        let get = | key : &str | e.attributes.iter().find( | ( k, _ ) | k == key ).map( | ( _, v ) | v.clone() );
        SearchResult
        {
          name : get( "name" ).unwrap_or_default(),
          object_type : get( "type" ).unwrap_or_default(),
          description : get( "description" ).unwrap_or_default(),
          package : package.map( str::to_string ).or_else( || get( "packageName" ) ),
        }
      } )
      .collect()
  }

  /// Quick-search for objects by name pattern. `pattern` may include a
  /// trailing `*` wildcard; `max_results` caps the number of hits the
  /// server returns.
  ///
  /// # Errors
  /// Propagates transport-level errors.
  pub async fn quick_search( transport : &Transport, pattern : &str, max_results : u32 ) -> Result< Vec< SearchResult > >
  {
    let encoded = urlencoding::encode( pattern );
    let path = format!( "/sap/bc/adt/repository/informationsystem/search?operation=quickSearch&query={encoded}*&maxResults={max_results}" );
    let response = transport.execute( Method::GET, &path, None, None, None, None ).await?;
    let elements = parse_elements( &response.text()? )?;
    Ok( elements_to_results( &elements, None ) )
  }

  /// The depth of a CDS dependency query: `unit` resolves only direct
  /// dependencies, `hierarchy` resolves the full transitive tree.
  #[ derive( Debug, Clone, Copy, PartialEq, Eq ) ]
  pub enum DependencyLevel
  {
    /// Direct dependencies only.
    Unit,
    /// The full transitive dependency tree.
    Hierarchy,
  }

  impl DependencyLevel
  {
    fn as_str( self ) -> &'static str
    {
      match self { DependencyLevel::Unit => "unit", DependencyLevel::Hierarchy => "hierarchy" }
    }
  }

  /// Parameters for [`dependency_tree`].
  #[ derive( Debug, Clone ) ]
  pub struct DependencyQuery
  {
    /// Resolution depth.
    pub level : DependencyLevel,
    /// Whether to include CDS association edges alongside `USING`/`EXTEND` ones.
    pub include_associations : bool,
    /// Restrict resolution to objects within this package, when given.
    pub package : Option< String >,
  }

  impl Default for DependencyQuery
  {
    fn default() -> Self
    {
      Self { level : DependencyLevel::Hierarchy, include_associations : false, package : None }
    }
  }

  /// Fetch a CDS entity's dependency tree via the `dependencyanalysis` POST.
  ///
  /// # Errors
  /// Returns [`Error::NotFound`] if the entity does not exist.
  pub async fn dependency_tree( transport : &Transport, entity : &str, query : &DependencyQuery ) -> Result< DependencyTree >
  {
    let uri = format!( "/sap/bc/adt/ddic/ddl/sources/{entity}" );
    let mut attrs = vec![
      ( "ddic:uri", uri.as_str() ),
      ( "ddic:dependencyLevel", query.level.as_str() ),
      ( "ddic:associations", if query.include_associations { "true" } else { "false" } ),
    ];
    if let Some( package ) = &query.package
    {
      attrs.push( ( "ddic:package", package.as_str() ) );
    }
    let body = crate::codecs::xml_request( "ddic:dependencyAnalysisRequest", &attrs );

    let response = transport
      .execute(
        Method::POST,
        "/sap/bc/adt/ddic/ddl/dependencyanalysis",
        None,
        Some( body.into_bytes() ),
        Some( "application/vnd.sap.adt.ddic.dependencyanalysis+xml" ),
        Some( "application/vnd.sap.adt.ddic.dependencyanalysis+xml" ),
      )
      .await?;
    let elements = parse_elements( &response.text()? )?;

    let mut nodes = HashMap::new();
    for e in &elements
    {
      if e.name != "node" && e.name != "entity"
      {
        continue;
      }
      let get = | key : &str | e.attributes.iter().find( | ( k, _ ) | k == key ).map( | ( _, v ) | v.clone() );
      let name = match get( "name" ) { Some( n ) => n, None => continue };
      let object_type = get( "type" ).unwrap_or_default();
      let inactive = get( "inactive" ).as_deref() == Some( "true" );
      let children = get( "children" )
        .map( | c | c.split( ',' ).map( str::trim ).filter( | s | !s.is_empty() ).map( str::to_string ).collect() )
        .unwrap_or_default();
      nodes.insert( name.clone(), DependencyNode { name, object_type, inactive, children } );
    }

    Ok( DependencyTree::new( entity, nodes ) )
  }

  /// Look up the definition site of the symbol at `position` in `object`'s source.
  ///
  /// # Errors
  /// Returns [`Error::NotFound`] if nothing resolves at that position.
  pub async fn find_definition( transport : &Transport, object : &ObjectRef, position : SourcePosition ) -> Result< CodeLocation >
  {
    let path = format!(
      "/sap/bc/adt/navigation/target?uri={}%23start%3D{}%2C{}",
      urlencoding::encode( &object.source_url()? ), position.line, position.column
    );
    let response = transport.execute( Method::GET, &path, None, None, None, None ).await?;
    let elements = parse_elements( &response.text()? )?;
    let target = elements.first().ok_or_else( || Error::NotFound( "no definition found".into() ) )?;
    let uri = target.attributes.iter().find( | ( k, _ ) | k == "uri" ).map( | ( _, v ) | v.clone() )
      .ok_or_else( || Error::NotFound( "navigation target missing uri".into() ) )?;
    Ok( CodeLocation { uri, position } )
  }

  /// Find references to the symbol at `position` in `object`'s source.
  ///
  /// # Errors
  /// Propagates transport-level errors.
  pub async fn find_references( transport : &Transport, object : &ObjectRef, position : SourcePosition ) -> Result< Vec< CodeLocation > >
  {
    let path = format!(
      "/sap/bc/adt/repository/informationsystem/usageReferences?uri={}%23start%3D{}%2C{}",
      urlencoding::encode( &object.source_url()? ), position.line, position.column
    );
    let response = transport.execute( Method::GET, &path, None, None, None, None ).await?;
    let elements = parse_elements( &response.text()? )?;
    Ok( elements
      .iter()
      .filter( | e | e.name == "referencedObject" )
      .filter_map( | e | e.attributes.iter().find( | ( k, _ ) | k == "uri" ).map( | ( _, v ) | CodeLocation
      {
        uri : v.clone(),
        position,
      } ) )
      .collect() )
  }

  /// Request code-completion proposals at `position`.
  ///
  /// # Errors
  /// Propagates transport-level errors.
  pub async fn completion( transport : &Transport, object : &ObjectRef, position : SourcePosition ) -> Result< Vec< String > >
  {
    let path = format!(
      "/sap/bc/adt/abapsource/codecompletion/proposal?uri={}%23start%3D{}%2C{}",
      urlencoding::encode( &object.source_url()? ), position.line, position.column
    );
    let response = transport.execute( Method::GET, &path, None, None, None, None ).await?;
    let elements = parse_elements( &response.text()? )?;
    Ok( elements.iter().filter( | e | e.name == "proposal" ).map( | e | e.text.clone() ).collect() )
  }

  /// Resolve the supertype chain of the class or interface at `position`.
  ///
  /// # Errors
  /// Returns [`Error::NotFound`] if nothing resolves at that position.
  pub async fn type_hierarchy( transport : &Transport, object : &ObjectRef, position : SourcePosition ) -> Result< Vec< CodeLocation > >
  {
    let path = format!(
      "/sap/bc/adt/abapsource/typehierarchy?uri={}%23start%3D{}%2C{}",
      urlencoding::encode( &object.source_url()? ), position.line, position.column
    );
    let response = transport.execute( Method::GET, &path, None, None, None, None ).await?;
    let elements = parse_elements( &response.text()? )?;
    Ok( elements
      .iter()
      .filter( | e | e.name == "superType" || e.name == "type" )
      .filter_map( | e | e.attributes.iter().find( | ( k, _ ) | k == "uri" ).map( | ( _, v ) | CodeLocation
      {
        uri : v.clone(),
        position,
      } ) )
      .collect() )
  }
}

pub use private::{
  SearchResult, SourcePosition, CodeLocation, DependencyLevel, DependencyQuery,
  get_source, get_include_source, get_metadata, list_package, quick_search,
  dependency_tree, find_definition, find_references, completion, type_hierarchy,
};
