//! Safety Gate: operation-class, package-scope, transport-scope and
//! free-SQL checks, plus read-only/dry-run short-circuiting.

mod private
{
  use serde::{ Deserialize, Serialize };
  use std::collections::HashSet;

  /// The operation classes every tool carries, in the exact evaluation
  /// order the gate applies them.
  #[ derive( Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize ) ]
  #[ serde( rename_all = "kebab-case" ) ]
  pub enum Operation
  {
    /// Source/metadata reads.
    Read,
    /// Quick search.
    Search,
    /// CDS dependency queries.
    Query,
    /// Free-form SQL execution.
    FreeSql,
    /// Object creation.
    Create,
    /// Source/content updates.
    Update,
    /// Object deletion.
    Delete,
    /// Activation.
    Activate,
    /// ABAP Unit test runs.
    Test,
    /// Lock/unlock.
    Lock,
    /// Code-intelligence lookups (definition, references, completion).
    Intelligence,
    /// Multi-step editing workflows.
    Workflow,
    /// Transport-object operations.
    Transport,
  }

  impl Operation
  {
    /// Whether this class mutates server state (used by the read-only check).
    #[ must_use ]
    pub fn is_write( self ) -> bool
    {
      matches!( self, Operation::Create | Operation::Update | Operation::Delete
        | Operation::Activate | Operation::Workflow )
    }
  }

  /// A package- or transport-name pattern: either an exact match or a
  /// `prefix*` suffix wildcard.
  #[ derive( Debug, Clone, PartialEq, Eq, Serialize, Deserialize ) ]
  pub struct NamePattern( String );

  impl NamePattern
  {
    /// Build a pattern from its textual form (as configured).
    #[ must_use ]
    pub fn new( s : impl Into< String > ) -> Self
    {
      Self( s.into() )
    }

    /// Whether `candidate` matches this pattern.
    #[ must_use ]
    pub fn matches( &self, candidate : &str ) -> bool
    {
      if let Some( prefix ) = self.0.strip_suffix( '*' )
      {
        candidate.starts_with( prefix )
      }
      else
      {
        self.0 == candidate
      }
    }
  }

  /// Immutable safety configuration for one engine instance.
  #[ derive( Debug, Clone, Default ) ]
  pub struct SafetyPolicy
  {
    /// When set, all write-class operations are denied.
    pub read_only : bool,
    /// When set, [`Operation::FreeSql`] is always denied.
    pub block_free_sql : bool,
    /// When non-empty, only these operation classes are permitted.
    pub allowed_ops : HashSet< Operation >,
    /// Operation classes that are always denied, regardless of `allowed_ops`.
    pub disallowed_ops : HashSet< Operation >,
    /// When non-empty, mutation targets must match one of these package patterns.
    pub allowed_packages : Vec< NamePattern >,
    /// When non-empty, transport targets must match one of these patterns.
    pub allowed_transports : Vec< NamePattern >,
    /// Opt-in: without this, [`Operation::Transport`] is always denied.
    pub enable_transports : bool,
    /// When set, transport-class operations are restricted to reads.
    pub transport_read_only : bool,
    /// Without this, mutations against non-`$*` (transportable) packages are denied.
    pub allow_transportable_edits : bool,
    /// Dry-run: allow the call but short-circuit before any network I/O.
    pub dry_run : bool,
  }

  /// The outcome of a single gate evaluation.
  #[ derive( Debug, Clone, PartialEq, Eq ) ]
  pub enum Decision
  {
    /// The operation may proceed to network I/O.
    Allow,
    /// The operation may proceed, but must not perform network I/O
    /// (dry-run).
    AllowDryRun,
    /// The operation is denied; the string names the failing rule.
    Deny( String ),
  }

  impl SafetyPolicy
  {
    /// Whether a package name is recognized as transportable, i.e. not a
    /// local package (`$*`).
    #[ must_use ]
    pub fn is_transportable_package( package : &str ) -> bool
    {
      !package.starts_with( '$' )
    }

    fn package_check( &self, package : Option< &str > ) -> Option< String >
    {
      let package = package?;
      if !self.allowed_packages.is_empty() && !self.allowed_packages.iter().any( | p | p.matches( package ) )
      {
        return Some( format!( "package '{package}' not in allowed-packages" ) );
      }
      None
    }

    fn transport_check( &self, transport : Option< &str > ) -> Option< String >
    {
      let transport = transport?;
      if !self.allowed_transports.is_empty() && !self.allowed_transports.iter().any( | p | p.matches( transport ) )
      {
        return Some( format!( "transport '{transport}' not in allowed-transports" ) );
      }
      None
    }

    /// Evaluate the gate for one operation.
    ///
    /// `package` names the object's owning package, when known, for the
    /// package-scope and transportable-edit checks. `transport` names a
    /// transport request number, when the operation targets one.
    #[ must_use ]
    pub fn evaluate( &self, op : Operation, package : Option< &str >, transport : Option< &str > ) -> Decision
    {
      // 1. dry-run short-circuits before anything else, including denials,
      //    per spec: "Dry-run -> allow but short-circuit network."
      if self.dry_run
      {
        return Decision::AllowDryRun;
      }

      // 2. read-only mode denies write-class operations.
      if self.read_only && op.is_write()
      {
        return Decision::Deny( "read-only mode forbids write operations".into() );
      }

      // 3. block-free-sql.
      if self.block_free_sql && op == Operation::FreeSql
      {
        return Decision::Deny( "free-SQL is blocked by policy".into() );
      }

      // 4. transport class gated behind explicit opt-in.
      if op == Operation::Transport && !self.enable_transports
      {
        return Decision::Deny( "transport operations require enable-transports".into() );
      }
      if op == Operation::Transport && self.transport_read_only
      {
        return Decision::Deny( "transport-read-only forbids transport mutations".into() );
      }

      // 5. deny-list.
      if self.disallowed_ops.contains( &op )
      {
        return Decision::Deny( format!( "{op:?} is in disallowed-ops" ) );
      }

      // 6. allow-list, when non-empty.
      if !self.allowed_ops.is_empty() && !self.allowed_ops.contains( &op )
      {
        return Decision::Deny( format!( "{op:?} is not in allowed-ops" ) );
      }

      // Package scope.
      if let Some( reason ) = self.package_check( package )
      {
        return Decision::Deny( reason );
      }

      // Transport scope.
      if let Some( reason ) = self.transport_check( transport )
      {
        return Decision::Deny( reason );
      }

      // Transportable-edit guard. Open question in the design notes resolved
      // as: the stricter rule applies, i.e. deny if either the package
      // allow-list or the transportable-edit flag denies (see DESIGN.md).
      if op.is_write()
      {
        if let Some( package ) = package
        {
          if Self::is_transportable_package( package ) && !self.allow_transportable_edits
          {
            return Decision::Deny(
              "mutation targets a transportable package; set allow-transportable-edits to enable".into()
            );
          }
        }
      }

      Decision::Allow
    }
  }
}

pub use private::{ Operation, NamePattern, SafetyPolicy, Decision };

#[ cfg( test ) ]
mod tests
{
  use super::*;

  fn policy() -> SafetyPolicy
  {
    SafetyPolicy::default()
  }

  #[ test ]
  fn dry_run_always_wins()
  {
    let mut p = policy();
    p.read_only = true;
    p.dry_run = true;
    assert_eq!( p.evaluate( Operation::Create, None, None ), Decision::AllowDryRun );
  }

  #[ test ]
  fn read_only_denies_writes_but_not_reads()
  {
    let mut p = policy();
    p.read_only = true;
    assert!( matches!( p.evaluate( Operation::Update, None, None ), Decision::Deny( _ ) ) );
    assert_eq!( p.evaluate( Operation::Read, None, None ), Decision::Allow );
  }

  #[ test ]
  fn block_free_sql()
  {
    let mut p = policy();
    p.block_free_sql = true;
    assert!( matches!( p.evaluate( Operation::FreeSql, None, None ), Decision::Deny( _ ) ) );
  }

  #[ test ]
  fn transport_requires_opt_in_before_any_io()
  {
    let p = policy();
    assert!( matches!( p.evaluate( Operation::Transport, None, None ), Decision::Deny( _ ) ) );
  }

  #[ test ]
  fn package_wildcard_suffix_matches()
  {
    let mut p = policy();
    p.allowed_packages = vec![ NamePattern::new( "Z_TEAM*" ) ];
    assert_eq!( p.evaluate( Operation::Read, Some( "Z_TEAM_FOO" ), None ), Decision::Allow );
    assert!( matches!( p.evaluate( Operation::Read, Some( "Y_OTHER" ), None ), Decision::Deny( _ ) ) );
  }

  #[ test ]
  fn transportable_edit_requires_explicit_flag()
  {
    let p = policy();
    assert!( matches!( p.evaluate( Operation::Update, Some( "ZPKG" ), None ), Decision::Deny( _ ) ) );

    let mut p2 = policy();
    p2.allow_transportable_edits = true;
    assert_eq!( p2.evaluate( Operation::Update, Some( "ZPKG" ), None ), Decision::Allow );
  }

  #[ test ]
  fn local_package_write_needs_no_transportable_flag()
  {
    let p = policy();
    assert_eq!( p.evaluate( Operation::Update, Some( "$TMP" ), None ), Decision::Allow );
  }

  #[ test ]
  fn stricter_rule_applies_when_package_allowlist_and_transportable_flag_disagree()
  {
    // Package allow-list permits ZPKG, but transportable edits are not
    // enabled: the stricter (deny) rule wins (see DESIGN.md open question).
    let mut p = policy();
    p.allowed_packages = vec![ NamePattern::new( "ZPKG" ) ];
    assert!( matches!( p.evaluate( Operation::Update, Some( "ZPKG" ), None ), Decision::Deny( _ ) ) );
  }

  #[ test ]
  fn deny_list_overrides_allow_list()
  {
    let mut p = policy();
    p.allowed_ops = [ Operation::Read ].into_iter().collect();
    p.disallowed_ops = [ Operation::Read ].into_iter().collect();
    assert!( matches!( p.evaluate( Operation::Read, None, None ), Decision::Deny( _ ) ) );
  }
}
