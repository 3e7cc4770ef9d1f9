//! Multi-step editing workflows: every call here acquires a lock, performs
//! one or more mutations, and releases the lock on every exit path —
//! success, syntax failure or transport error alike.

mod private
{
  use crate::codecs::{ canonicalize_line_endings, restore_line_ending };
  use crate::crud_api::{ self, ActivationResult, LockHandle, SyntaxDiagnostic, TestDuration, TestRisk, UnitTestReport };
  use crate::error::{ Error, Result };
  use crate::object_ref::{ ClassInclude, ObjectKind, ObjectRef };
  use crate::transport::Transport;

  /// Run `body` with a lock held on `object`, releasing it afterward
  /// regardless of how `body` completes. This is the single place the
  /// lock-release invariant is enforced; every workflow function below
  /// goes through it.
  async fn with_lock< F, Fut, T >( transport : &Transport, object : &ObjectRef, body : F ) -> Result< T >
  where
    F : FnOnce( LockHandle ) -> Fut,
    Fut : core::future::Future< Output = Result< T > >,
  {
    let handle = crud_api::lock( transport, object ).await?;
    let result = body( handle.clone() ).await;
    let _ = crud_api::unlock( transport, &handle ).await;
    result
  }

  /// The outcome of [`write_program`] / [`write_class`]: an update workflow
  /// that syntax-checks the candidate source *before* touching the
  /// server, so a doomed write never takes the lock.
  #[ derive( Debug, Clone ) ]
  pub struct WriteResult
  {
    /// Whether the new source was actually saved. `false` means the
    /// pre-write syntax check found a blocking diagnostic and the object
    /// was left untouched.
    pub saved : bool,
    /// Diagnostics from the pre-write syntax check.
    pub syntax_diagnostics : Vec< SyntaxDiagnostic >,
    /// The activation outcome, present only when `saved` is `true`.
    pub activation : Option< ActivationResult >,
  }

  /// Update an existing object's main source, following the exact
  /// five-step update workflow (spec §4.7): (1) syntax-check the
  /// candidate source against the object URL, aborting without saving on
  /// any blocking severity; (2) lock; (3) PUT; (4) unlock unconditionally;
  /// (5) activate.
  ///
  /// # Errors
  /// Propagates transport-level errors. A blocking syntax diagnostic is
  /// reported via `Ok(WriteResult { saved: false, .. })`, not as an `Err`.
  async fn update_object( transport : &Transport, object : &ObjectRef, url : &str, source : &str ) -> Result< WriteResult >
  {
    let diagnostics = crud_api::syntax_check( transport, object, source ).await?;
    if diagnostics.iter().any( | d | d.severity.is_blocking() )
    {
      return Ok( WriteResult { saved : false, syntax_diagnostics : diagnostics, activation : None } );
    }

    with_lock( transport, object, | handle |
    {
      let url = url.to_string();
      let source = source.to_string();
      async move { crud_api::update_source( transport, &handle, &url, &source ).await }
    } ).await?;

    let activation = crud_api::activate( transport, &[ object ] ).await?;
    Ok( WriteResult { saved : true, syntax_diagnostics : diagnostics, activation : Some( activation ) } )
  }

  /// Update a program's main source (the update variant of `write_program`
  /// — creation is handled by [`create_and_activate_program`]).
  ///
  /// # Errors
  /// See [`update_object`].
  pub async fn write_program( transport : &Transport, object : &ObjectRef, source : &str ) -> Result< WriteResult >
  {
    let url = object.source_url()?;
    update_object( transport, object, &url, source ).await
  }

  /// Update a class's main include (the update variant of `write_class` —
  /// creation is handled by [`create_class_with_tests`]).
  ///
  /// # Errors
  /// See [`update_object`].
  pub async fn write_class( transport : &Transport, object : &ObjectRef, source : &str ) -> Result< WriteResult >
  {
    let url = object.include_url( ClassInclude::Main )?;
    update_object( transport, object, &url, source ).await
  }

  /// Create a program, upload its source and activate it in one call
  /// (spec §4.7 CreateAndActivateProgram): (1) create shell; (2) lock;
  /// (3) PUT main source; (4) unlock; (5) activate.
  ///
  /// # Errors
  /// Returns [`Error::AlreadyExists`] if `name` is already taken;
  /// otherwise propagates transport errors. A failed activation is
  /// reported via the returned [`ActivationResult`], not as an `Err`.
  pub async fn create_and_activate_program(
    transport : &Transport,
    name : &str,
    package : &str,
    description : &str,
    source : &str,
  ) -> Result< ActivationResult >
  {
    let object = ObjectRef::new( ObjectKind::Program, name );
    crud_api::create( transport, &object, package, description ).await?;

    with_lock( transport, &object, | handle |
    {
      let url = object.source_url().expect( "source_url valid for Program" );
      let source = source.to_string();
      async move { crud_api::update_source( transport, &handle, &url, &source ).await }
    } ).await?;

    crud_api::activate( transport, &[ &object ] ).await
  }

  /// Create a class, upload main and test-class sources, and activate it
  /// (spec §4.7 CreateClassWithTests): (1) create shell; (2) lock; (3)
  /// PUT main source; (4) create the testclasses include on demand, then
  /// PUT test source to it; (5) unlock; (6) activate; (7) run unit tests
  /// and include the results.
  ///
  /// # Errors
  /// Propagates creation/transport errors; a failed activation is
  /// reported via the returned [`ActivationResult`].
  pub async fn create_class_with_tests(
    transport : &Transport,
    name : &str,
    package : &str,
    description : &str,
    source : &str,
    test_source : &str,
  ) -> Result< ( ActivationResult, UnitTestReport ) >
  {
    let object = ObjectRef::new( ObjectKind::Class, name );
    crud_api::create( transport, &object, package, description ).await?;

    with_lock( transport, &object, | handle |
    {
      let url = object.include_url( ClassInclude::Main ).expect( "include_url valid for Class" );
      let source = source.to_string();
      async move { crud_api::update_source( transport, &handle, &url, &source ).await }
    } ).await?;

    crud_api::create_include( transport, &object, ClassInclude::Testclasses ).await?;

    with_lock( transport, &object, | handle |
    {
      let url = object.include_url( ClassInclude::Testclasses ).expect( "include_url valid for Class" );
      let test_source = test_source.to_string();
      async move { crud_api::update_source( transport, &handle, &url, &test_source ).await }
    } ).await?;

    let activation = crud_api::activate( transport, &[ &object ] ).await?;
    let tests = crud_api::run_unit_tests( transport, &object, TestRisk::Harmless, TestDuration::Short ).await?;
    Ok( ( activation, tests ) )
  }

  /// A single-occurrence or blanket text replacement within an object's
  /// source, addressed by the literal text to match rather than by line
  /// range (surviving upstream reformatting better than line-anchored
  /// edits).
  #[ derive( Debug, Clone ) ]
  pub struct EditSpec
  {
    /// The exact text to find.
    pub old_string : String,
    /// The text to substitute in its place.
    pub new_string : String,
    /// Replace every occurrence instead of requiring exactly one.
    pub replace_all : bool,
    /// Run a pre-write syntax check on the candidate source; abort
    /// without writing if it reports a blocking severity.
    pub syntax_check : bool,
    /// Fold case when matching `old_string`.
    pub case_insensitive : bool,
  }

  /// The outcome of [`edit_source`].
  #[ derive( Debug, Clone ) ]
  pub struct EditResult
  {
    /// Whether the edit was applied. `false` only when `syntax_check` was
    /// requested and the candidate source failed it — the object is then
    /// left untouched and never locked.
    pub applied : bool,
    /// Diagnostics from the pre-write syntax check, when requested.
    pub syntax_diagnostics : Vec< SyntaxDiagnostic >,
    /// The activation outcome, present only when `applied` is `true`.
    pub activation : Option< ActivationResult >,
  }

  fn count_matches( haystack : &str, needle : &str, case_insensitive : bool ) -> usize
  {
    if needle.is_empty()
    {
      return 0;
    }
    if case_insensitive
    {
      haystack.to_lowercase().matches( needle.to_lowercase().as_str() ).count()
    }
    else
    {
      haystack.matches( needle ).count()
    }
  }

  fn replace_matches( haystack : &str, needle : &str, replacement : &str, replace_all : bool, case_insensitive : bool ) -> String
  {
    if !case_insensitive
    {
      return if replace_all { haystack.replace( needle, replacement ) } else { haystack.replacen( needle, replacement, 1 ) };
    }

    // Case-insensitive replacement preserves surrounding text byte-for-byte
    // and substitutes `replacement` verbatim at each case-folded match.
    let lower_haystack = haystack.to_lowercase();
    let lower_needle = needle.to_lowercase();
    let mut out = String::with_capacity( haystack.len() );
    let mut rest = haystack;
    let mut lower_rest = lower_haystack.as_str();
    let mut replaced = 0_usize;

    while let Some( pos ) = lower_rest.find( lower_needle.as_str() )
    {
      if !replace_all && replaced >= 1
      {
        break;
      }
      out.push_str( &rest[ .. pos ] );
      out.push_str( replacement );
      let advance = pos + needle.len();
      rest = &rest[ advance .. ];
      lower_rest = &lower_rest[ advance .. ];
      replaced += 1;
      if !replace_all
      {
        break;
      }
    }
    out.push_str( rest );
    out
  }

  /// Perform a surgical text replacement against an object's current
  /// source, following the exact steps (spec §4.7 EditSource): (1) GET
  /// current source, canonicalize line endings; (2) match `old_string`
  /// (case-folded if `case_insensitive`) — if `replace_all` is `false`,
  /// require exactly one match, else error naming the count; (3) build
  /// the new source; (4) if `syntax_check`, run it and abort without
  /// writing on a blocking severity; (5) lock, PUT, unlock (always),
  /// activate.
  ///
  /// Guarantees: no server-side change occurs on any failure before
  /// step 5's PUT; after PUT, unlock is always attempted.
  ///
  /// # Errors
  /// Returns [`Error::Validation`] if `edit.old_string` does not occur
  /// (or, with `replace_all=false`, occurs more than once) in the current
  /// source, naming the match count.
  pub async fn edit_source( transport : &Transport, object : &ObjectRef, edit : &EditSpec ) -> Result< EditResult >
  {
    let current = crate::read_api::get_source( transport, object ).await?;
    let ( canonical, ending ) = canonicalize_line_endings( &current );

    let occurrences = count_matches( &canonical, &edit.old_string, edit.case_insensitive );
    if occurrences == 0
    {
      return Err( Error::Validation( "invalid-argument: old_string did not match the current source (0)".into() ) );
    }
    if !edit.replace_all && occurrences > 1
    {
      return Err( Error::Validation( format!( "invalid-argument: non-unique match ({occurrences})" ) ) );
    }

    let updated_canonical = replace_matches( &canonical, &edit.old_string, &edit.new_string, edit.replace_all, edit.case_insensitive );
    let updated = restore_line_ending( &updated_canonical, ending );

    let syntax_diagnostics = if edit.syntax_check
    {
      let diagnostics = crud_api::syntax_check( transport, object, &updated ).await?;
      if diagnostics.iter().any( | d | d.severity.is_blocking() )
      {
        return Ok( EditResult { applied : false, syntax_diagnostics : diagnostics, activation : None } );
      }
      diagnostics
    }
    else
    {
      Vec::new()
    };

    with_lock( transport, object, | handle |
    {
      let url = object.source_url().expect( "edit_source requires a source-bearing object" );
      let updated = updated.clone();
      async move { crud_api::update_source( transport, &handle, &url, &updated ).await }
    } ).await?;

    let activation = crud_api::activate( transport, &[ object ] ).await?;
    Ok( EditResult { applied : true, syntax_diagnostics, activation : Some( activation ) } )
  }

  /// Rename a repository object: read source, substitute old→new names
  /// (case-preserving where the source uses upper-case identifiers),
  /// create under the new name, activate it, then delete the original
  /// under its own lock. ADT has no atomic rename endpoint for most
  /// object kinds; this workflow makes the two-step nature explicit
  /// rather than hiding it behind a misleading single call.
  ///
  /// # Errors
  /// If creation and activation under the new name succeed but the
  /// original's deletion fails, returns [`Error::DeploymentPartial`]
  /// naming both the surviving original and the new object.
  pub async fn rename_object(
    transport : &Transport,
    object : &ObjectRef,
    new_name : &str,
    package : &str,
    description : &str,
  ) -> Result< () >
  {
    let source = crate::read_api::get_source( transport, object ).await?;
    let renamed_source = substitute_identifier( &source, &object.name, new_name );
    let renamed = ObjectRef::new( object.kind, new_name );
    crud_api::create( transport, &renamed, package, description ).await?;

    with_lock( transport, &renamed, | handle |
    {
      let url = renamed.source_url().expect( "rename_object requires a source-bearing object" );
      let renamed_source = renamed_source.clone();
      async move { crud_api::update_source( transport, &handle, &url, &renamed_source ).await }
    } ).await?;

    crud_api::activate( transport, &[ &renamed ] ).await?;

    let original_handle = crud_api::lock( transport, object ).await?;
    let delete_result = crud_api::delete( transport, &original_handle ).await;
    let _ = crud_api::unlock( transport, &original_handle ).await;

    delete_result.map_err( | e | Error::DeploymentPartial( format!(
      "{new_name} created and activated but original {} could not be deleted: {e}", object.name
    ) ) )
  }

  /// Replace every case-insensitive occurrence of `old_name` in `source`
  /// with `new_name`, preserving the matched occurrence's case pattern
  /// (all-uppercase stays uppercase, all-lowercase stays lowercase; mixed
  /// case falls back to `new_name` verbatim).
  fn substitute_identifier( source : &str, old_name : &str, new_name : &str ) -> String
  {
    let lower_source = source.to_lowercase();
    let lower_old = old_name.to_lowercase();
    let mut out = String::with_capacity( source.len() );
    let mut rest = source;
    let mut lower_rest = lower_source.as_str();

    while let Some( pos ) = lower_rest.find( lower_old.as_str() )
    {
      out.push_str( &rest[ .. pos ] );
      let matched = &rest[ pos .. pos + old_name.len() ];
      let replacement = if matched.chars().all( | c | !c.is_alphabetic() || c.is_uppercase() )
      {
        new_name.to_uppercase()
      }
      else if matched.chars().all( | c | !c.is_alphabetic() || c.is_lowercase() )
      {
        new_name.to_lowercase()
      }
      else
      {
        new_name.to_string()
      };
      out.push_str( &replacement );
      let advance = pos + old_name.len();
      rest = &rest[ advance .. ];
      lower_rest = &lower_rest[ advance .. ];
    }
    out.push_str( rest );
    out
  }
}

pub use private::{
  EditSpec, EditResult, WriteResult,
  write_program, write_class, create_and_activate_program, create_class_with_tests,
  edit_source, rename_object,
};
