//! CDS dependency trees: the node/edge model the read API's dependency
//! query returns, plus the pure traversal helpers built on top of it.

mod private
{
  use std::collections::{ HashMap, HashSet };

  /// One node in a CDS dependency tree: a DDIC/CDS entity name, its kind
  /// (e.g. `"DDLS"`, `"TABL"`), and whether it is currently inactive.
  #[ derive( Debug, Clone, PartialEq, Eq ) ]
  pub struct DependencyNode
  {
    /// The entity name.
    pub name : String,
    /// The ADT object-type code (`"DDLS"`, `"TABL"`, `"VIEW"`, ...).
    pub object_type : String,
    /// Whether an inactive version exists for this entity.
    pub inactive : bool,
    /// Names of entities this node directly depends on.
    pub children : Vec< String >,
  }

  /// A full CDS dependency tree: a root entity plus the transitive closure
  /// of its dependencies, keyed by name.
  #[ derive( Debug, Clone, Default ) ]
  pub struct DependencyTree
  {
    /// The root entity's name.
    pub root : String,
    /// All nodes, keyed by name, including the root.
    pub nodes : HashMap< String, DependencyNode >,
  }

  impl DependencyTree
  {
    /// Build a tree from its root name and node set. `nodes` must contain
    /// an entry for `root`; callers (the read API) guarantee this from the
    /// server response shape.
    #[ must_use ]
    pub fn new( root : impl Into< String >, nodes : HashMap< String, DependencyNode > ) -> Self
    {
      Self { root : root.into(), nodes }
    }

    /// Flatten the tree into a list of every reachable node, in
    /// breadth-first order starting at the root, each name appearing once
    /// even if reached via multiple paths (CDS dependency graphs are DAGs
    /// in the common case, not strict trees).
    #[ must_use ]
    pub fn flatten( &self ) -> Vec< &DependencyNode >
    {
      let mut seen = HashSet::new();
      let mut queue = std::collections::VecDeque::new();
      let mut out = Vec::new();

      queue.push_back( self.root.clone() );
      seen.insert( self.root.clone() );

      while let Some( name ) = queue.pop_front()
      {
        if let Some( node ) = self.nodes.get( &name )
        {
          out.push( node );
          for child in &node.children
          {
            if seen.insert( child.clone() )
            {
              queue.push_back( child.clone() );
            }
          }
        }
      }

      out
    }

    /// The maximum depth below the root: a leaf root has depth 1; each
    /// level of children adds 1. Returns 0 if the root is absent from
    /// `nodes`.
    #[ must_use ]
    pub fn depth( &self ) -> u32
    {
      fn node_depth( tree : &DependencyTree, name : &str, visiting : &mut HashSet< String > ) -> u32
      {
        if !visiting.insert( name.to_string() )
        {
          // cycle: do not recurse further down this path.
          return 1;
        }
        let depth = match tree.nodes.get( name )
        {
          Some( node ) if node.children.is_empty() => 1,
          Some( node ) => 1 + node.children.iter().map( | c | node_depth( tree, c, visiting ) ).max().unwrap_or( 0 ),
          None => 0,
        };
        visiting.remove( name );
        depth
      }

      if self.nodes.contains_key( &self.root )
      {
        node_depth( self, &self.root, &mut HashSet::new() )
      }
      else
      {
        0
      }
    }

    /// Count reachable nodes by `object_type`.
    #[ must_use ]
    pub fn counts_by_type( &self ) -> HashMap< String, usize >
    {
      let mut counts = HashMap::new();
      for node in self.flatten()
      {
        *counts.entry( node.object_type.clone() ).or_insert( 0 ) += 1;
      }
      counts
    }

    /// The subset of reachable nodes that are DDIC tables (`object_type ==
    /// "TABL"`) with no further children — the leaves a CDS view ultimately
    /// reads from.
    #[ must_use ]
    pub fn table_leaves( &self ) -> Vec< &DependencyNode >
    {
      self.flatten().into_iter().filter( | n | n.object_type == "TABL" && n.children.is_empty() ).collect()
    }

    /// Whether the dependency graph contains a cycle, found via
    /// depth-first search with a recursion-stack back-edge check.
    #[ must_use ]
    pub fn has_cycle( &self ) -> bool
    {
      fn visit(
        tree : &DependencyTree,
        name : &str,
        stack : &mut HashSet< String >,
        done : &mut HashSet< String >,
      ) -> bool
      {
        if stack.contains( name )
        {
          return true;
        }
        if done.contains( name )
        {
          return false;
        }
        stack.insert( name.to_string() );
        let cyclic = match tree.nodes.get( name )
        {
          Some( node ) => node.children.iter().any( | c | visit( tree, c, stack, done ) ),
          None => false,
        };
        stack.remove( name );
        done.insert( name.to_string() );
        cyclic
      }

      visit( self, &self.root, &mut HashSet::new(), &mut HashSet::new() )
    }
  }
}

pub use private::{ DependencyNode, DependencyTree };

#[ cfg( test ) ]
mod tests
{
  use super::*;
  use std::collections::HashMap;

  fn node( name : &str, object_type : &str, children : &[ &str ] ) -> DependencyNode
  {
    DependencyNode
    {
      name : name.to_string(),
      object_type : object_type.to_string(),
      inactive : false,
      children : children.iter().map( | s | ( *s ).to_string() ).collect(),
    }
  }

  fn sample_tree() -> DependencyTree
  {
    let mut nodes = HashMap::new();
    nodes.insert( "Z_VIEW".to_string(), node( "Z_VIEW", "DDLS", &[ "Z_BASE", "Z_ASSOC" ] ) );
    nodes.insert( "Z_BASE".to_string(), node( "Z_BASE", "TABL", &[] ) );
    nodes.insert( "Z_ASSOC".to_string(), node( "Z_ASSOC", "DDLS", &[ "Z_BASE" ] ) );
    DependencyTree::new( "Z_VIEW", nodes )
  }

  #[ test ]
  fn flatten_visits_each_node_once_even_with_shared_child()
  {
    let tree = sample_tree();
    let flat = tree.flatten();
    assert_eq!( flat.len(), 3 );
  }

  #[ test ]
  fn depth_counts_longest_path()
  {
    let tree = sample_tree();
    assert_eq!( tree.depth(), 3 );
  }

  #[ test ]
  fn counts_by_type_aggregates_correctly()
  {
    let tree = sample_tree();
    let counts = tree.counts_by_type();
    assert_eq!( counts.get( "DDLS" ), Some( &2 ) );
    assert_eq!( counts.get( "TABL" ), Some( &1 ) );
  }

  #[ test ]
  fn table_leaves_excludes_non_leaf_tables()
  {
    let tree = sample_tree();
    let leaves = tree.table_leaves();
    assert_eq!( leaves.len(), 1 );
    assert_eq!( leaves[ 0 ].name, "Z_BASE" );
  }

  #[ test ]
  fn acyclic_tree_reports_no_cycle()
  {
    assert!( !sample_tree().has_cycle() );
  }

  #[ test ]
  fn self_referencing_node_is_a_cycle()
  {
    let mut nodes = HashMap::new();
    nodes.insert( "Z_A".to_string(), node( "Z_A", "DDLS", &[ "Z_B" ] ) );
    nodes.insert( "Z_B".to_string(), node( "Z_B", "DDLS", &[ "Z_A" ] ) );
    let tree = DependencyTree::new( "Z_A", nodes );
    assert!( tree.has_cycle() );
  }
}
