//! Lightweight in-process counters for one engine instance. Not a
//! metrics-export surface (Prometheus et al. are an explicit non-goal);
//! these exist for logging and for the tool facade's own introspection tools.

mod private
{
  use std::sync::atomic::{ AtomicU64, Ordering };

  /// Monotonic counters describing one engine instance's lifetime activity.
  #[ derive( Debug, Default ) ]
  pub struct EngineMetrics
  {
    /// Total tool invocations dispatched, regardless of outcome.
    pub calls_total : AtomicU64,
    /// Calls denied by the safety gate before any network I/O.
    pub calls_blocked : AtomicU64,
    /// Calls that completed with an error after network I/O began.
    pub calls_failed : AtomicU64,
    /// CSRF token fetches performed.
    pub csrf_fetches : AtomicU64,
    /// CSRF token refreshes triggered by a rejected cached token.
    pub csrf_refreshes : AtomicU64,
    /// Locks acquired.
    pub locks_acquired : AtomicU64,
    /// Locks released.
    pub locks_released : AtomicU64,
  }

  impl EngineMetrics
  {
    /// Record one dispatched call.
    pub fn record_call( &self )
    {
      self.calls_total.fetch_add( 1, Ordering::Relaxed );
    }

    /// Record one call denied by the safety gate.
    pub fn record_blocked( &self )
    {
      self.calls_blocked.fetch_add( 1, Ordering::Relaxed );
    }

    /// Record one call that failed after I/O began.
    pub fn record_failed( &self )
    {
      self.calls_failed.fetch_add( 1, Ordering::Relaxed );
    }

    /// Record one CSRF token fetch (the first `GET .../discovery` per token lifetime).
    pub fn record_csrf_fetch( &self )
    {
      self.csrf_fetches.fetch_add( 1, Ordering::Relaxed );
    }

    /// Record one CSRF token refresh, triggered by a rejected cached token.
    pub fn record_csrf_refresh( &self )
    {
      self.csrf_refreshes.fetch_add( 1, Ordering::Relaxed );
    }

    /// Record one lock acquired.
    pub fn record_lock_acquired( &self )
    {
      self.locks_acquired.fetch_add( 1, Ordering::Relaxed );
    }

    /// Record one lock released.
    pub fn record_lock_released( &self )
    {
      self.locks_released.fetch_add( 1, Ordering::Relaxed );
    }

    /// A point-in-time snapshot of every counter.
    #[ must_use ]
    pub fn snapshot( &self ) -> EngineMetricsSnapshot
    {
      EngineMetricsSnapshot
      {
        calls_total : self.calls_total.load( Ordering::Relaxed ),
        calls_blocked : self.calls_blocked.load( Ordering::Relaxed ),
        calls_failed : self.calls_failed.load( Ordering::Relaxed ),
        csrf_fetches : self.csrf_fetches.load( Ordering::Relaxed ),
        csrf_refreshes : self.csrf_refreshes.load( Ordering::Relaxed ),
        locks_acquired : self.locks_acquired.load( Ordering::Relaxed ),
        locks_released : self.locks_released.load( Ordering::Relaxed ),
      }
    }
  }

  /// An immutable snapshot of [`EngineMetrics`], suitable for logging or
  /// returning from a `get_metrics` tool call.
  #[ derive( Debug, Clone, Copy, Default, PartialEq, Eq ) ]
  pub struct EngineMetricsSnapshot
  {
    /// See [`EngineMetrics::calls_total`].
    pub calls_total : u64,
    /// See [`EngineMetrics::calls_blocked`].
    pub calls_blocked : u64,
    /// See [`EngineMetrics::calls_failed`].
    pub calls_failed : u64,
    /// See [`EngineMetrics::csrf_fetches`].
    pub csrf_fetches : u64,
    /// See [`EngineMetrics::csrf_refreshes`].
    pub csrf_refreshes : u64,
    /// See [`EngineMetrics::locks_acquired`].
    pub locks_acquired : u64,
    /// See [`EngineMetrics::locks_released`].
    pub locks_released : u64,
  }
}

pub use private::{ EngineMetrics, EngineMetricsSnapshot };

#[ cfg( test ) ]
mod tests
{
  use super::*;

  #[ test ]
  fn counters_start_at_zero()
  {
    let metrics = EngineMetrics::default();
    assert_eq!( metrics.snapshot(), EngineMetricsSnapshot::default() );
  }

  #[ test ]
  fn record_call_increments_total()
  {
    let metrics = EngineMetrics::default();
    metrics.record_call();
    metrics.record_call();
    assert_eq!( metrics.snapshot().calls_total, 2 );
  }

  #[ test ]
  fn blocked_and_failed_are_independent_counters()
  {
    let metrics = EngineMetrics::default();
    metrics.record_blocked();
    metrics.record_failed();
    metrics.record_failed();
    let snap = metrics.snapshot();
    assert_eq!( snap.calls_blocked, 1 );
    assert_eq!( snap.calls_failed, 2 );
  }
}
