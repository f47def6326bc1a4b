//! Pure freshness resolution: what to emit and whether to refresh.
//!
//! Nothing here touches storage or the network; the orchestrator feeds in
//! the stored entry's expiry and acts on the resulting plan.

use chrono::{DateTime, Utc};

use crate::priority::PriorityBehaviour;
use crate::token::CacheStatus;

/// The decision plan for one request, computed before any fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
  pub has_stored: bool,
  /// Stored entry expired, or logically expired by an invalidating mode.
  pub is_stale: bool,
  /// Emit the stored payload with status `Stale` before refreshing.
  pub emit_stale_first: bool,
  /// Emit the stored payload with status `Fresh` and stop; no refresh.
  pub emit_fresh: bool,
  /// Invoke the fetch collaborator.
  pub attempt_fetch: bool,
}

/// Compute the decision plan from the stored entry's expiry (if any), the
/// current time, and the priority's behavioural flags.
pub fn resolve(
  now: DateTime<Utc>,
  stored_expiry: Option<DateTime<Utc>>,
  behaviour: &PriorityBehaviour,
) -> Resolution {
  let has_stored = stored_expiry.is_some();
  let expired = stored_expiry.map(|expiry| expiry <= now).unwrap_or(false);
  // Invalidating modes treat the entry as expired without mutating storage.
  let is_stale = expired || (has_stored && behaviour.invalidates_existing);

  let emit_fresh = has_stored && !is_stale;
  let emit_stale_first =
    behaviour.emits_cached_stale && has_stored && is_stale && !behaviour.single_response;
  let attempt_fetch = behaviour.uses_network && (!has_stored || is_stale);

  Resolution {
    has_stored,
    is_stale,
    emit_stale_first,
    emit_fresh,
    attempt_fetch,
  }
}

/// Status of the final emission after a fetch attempt.
pub fn status_after_fetch(
  fetch_succeeded: bool,
  resolution: &Resolution,
  behaviour: &PriorityBehaviour,
) -> CacheStatus {
  if fetch_succeeded {
    if resolution.has_stored {
      CacheStatus::Refreshed
    } else {
      CacheStatus::Network
    }
  } else if behaviour.emits_network_stale && resolution.has_stored {
    CacheStatus::CouldNotRefresh
  } else {
    CacheStatus::Empty
  }
}

/// Terminal status when the priority forbids network use and the stored
/// entry (if any) was not fresh.
pub fn offline_fallback_status(
  resolution: &Resolution,
  behaviour: &PriorityBehaviour,
) -> CacheStatus {
  if resolution.has_stored && resolution.is_stale && behaviour.emits_cached_stale {
    CacheStatus::Stale
  } else {
    CacheStatus::Empty
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::priority::{CacheMode, CachePreference, CachePriority};
  use chrono::TimeZone;

  fn behaviour(mode: CacheMode, preference: CachePreference) -> &'static PriorityBehaviour {
    CachePriority::new(mode, preference).behaviour()
  }

  fn at(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).unwrap()
  }

  #[test]
  fn test_fresh_hit_emits_fresh_and_skips_fetch() {
    let b = behaviour(CacheMode::Cache, CachePreference::Default);
    let r = resolve(at(1_000), Some(at(61_000)), b);
    assert!(r.emit_fresh);
    assert!(!r.emit_stale_first);
    assert!(!r.attempt_fetch);
  }

  #[test]
  fn test_stale_default_emits_stale_then_fetches() {
    let b = behaviour(CacheMode::Cache, CachePreference::Default);
    let r = resolve(at(1_000), Some(at(999)), b);
    assert!(r.is_stale);
    assert!(r.emit_stale_first);
    assert!(r.attempt_fetch);
    assert!(!r.emit_fresh);
  }

  #[test]
  fn test_expiry_equal_to_now_counts_as_stale() {
    let b = behaviour(CacheMode::Cache, CachePreference::Default);
    let r = resolve(at(1_000), Some(at(1_000)), b);
    assert!(r.is_stale);
  }

  #[test]
  fn test_missing_entry_fetches_without_stale_emission() {
    let b = behaviour(CacheMode::Cache, CachePreference::Default);
    let r = resolve(at(1_000), None, b);
    assert!(!r.has_stored);
    assert!(!r.emit_stale_first);
    assert!(r.attempt_fetch);
  }

  #[test]
  fn test_single_response_suppresses_stale_first() {
    let b = behaviour(CacheMode::Cache, CachePreference::FreshPreferred);
    let r = resolve(at(1_000), Some(at(999)), b);
    assert!(r.is_stale);
    assert!(!r.emit_stale_first);
    assert!(r.attempt_fetch);
  }

  #[test]
  fn test_refresh_mode_invalidates_fresh_entry() {
    let b = behaviour(CacheMode::Refresh, CachePreference::Default);
    let r = resolve(at(1_000), Some(at(1_000_000)), b);
    assert!(r.is_stale);
    assert!(!r.emit_fresh);
    assert!(r.emit_stale_first);
    assert!(r.attempt_fetch);
  }

  #[test]
  fn test_offline_never_fetches() {
    let b = behaviour(CacheMode::Offline, CachePreference::Default);
    let stale = resolve(at(1_000), Some(at(999)), b);
    assert!(!stale.attempt_fetch);
    assert_eq!(offline_fallback_status(&stale, b), CacheStatus::Stale);

    let missing = resolve(at(1_000), None, b);
    assert!(!missing.attempt_fetch);
    assert_eq!(offline_fallback_status(&missing, b), CacheStatus::Empty);
  }

  #[test]
  fn test_offline_fresh_only_excludes_stale_entry() {
    let b = behaviour(CacheMode::Offline, CachePreference::FreshOnly);
    let r = resolve(at(1_000), Some(at(999)), b);
    assert!(!r.emit_fresh);
    assert_eq!(offline_fallback_status(&r, b), CacheStatus::Empty);
  }

  #[test]
  fn test_status_after_fetch_success() {
    let b = behaviour(CacheMode::Cache, CachePreference::Default);
    let refreshed = resolve(at(1_000), Some(at(999)), b);
    assert_eq!(
      status_after_fetch(true, &refreshed, b),
      CacheStatus::Refreshed
    );
    let network = resolve(at(1_000), None, b);
    assert_eq!(status_after_fetch(true, &network, b), CacheStatus::Network);
  }

  #[test]
  fn test_status_after_fetch_failure() {
    let default = behaviour(CacheMode::Cache, CachePreference::Default);
    let stored = resolve(at(1_000), Some(at(999)), default);
    assert_eq!(
      status_after_fetch(false, &stored, default),
      CacheStatus::CouldNotRefresh
    );

    let fresh_only = behaviour(CacheMode::Cache, CachePreference::FreshOnly);
    let stored = resolve(at(1_000), Some(at(999)), fresh_only);
    assert_eq!(
      status_after_fetch(false, &stored, fresh_only),
      CacheStatus::Empty
    );

    let missing = resolve(at(1_000), None, default);
    assert_eq!(
      status_after_fetch(false, &missing, default),
      CacheStatus::Empty
    );
  }

  #[test]
  fn test_resolved_statuses_stay_within_allowed_sets() {
    use crate::priority::{CacheMode::*, CachePreference::*};
    let combos = [
      (Cache, Default),
      (Cache, FreshPreferred),
      (Cache, FreshOnly),
      (Refresh, Default),
      (Refresh, FreshPreferred),
      (Refresh, FreshOnly),
      (Offline, Default),
      (Offline, FreshPreferred),
      (Offline, FreshOnly),
    ];
    let expiries = [None, Some(at(999)), Some(at(5_000))];
    for (mode, preference) in combos {
      let b = behaviour(mode, preference);
      for expiry in expiries {
        let r = resolve(at(1_000), expiry, b);
        if r.emit_fresh {
          assert!(b.allows(CacheStatus::Fresh));
        }
        if r.emit_stale_first {
          assert!(b.allows(CacheStatus::Stale));
        }
        if r.attempt_fetch {
          for ok in [true, false] {
            assert!(b.allows(status_after_fetch(ok, &r, b)));
          }
        } else if !b.uses_network && !r.emit_fresh {
          assert!(b.allows(offline_fallback_status(&r, b)));
        }
      }
    }
  }
}
