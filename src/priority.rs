//! The priority matrix: how (mode, preference) maps to refresh behaviour.

use crate::token::CacheStatus;

/// Whether the request may touch the network and how stored data is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheMode {
  /// Serve stored data when fresh, refresh when stale or missing.
  Cache,
  /// Always refresh, treating any stored entry as expired.
  Refresh,
  /// Never touch the network; serve whatever the store has.
  Offline,
}

/// How tolerant the caller is of stale emissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CachePreference {
  /// Stale data may be emitted, both before and after a failed refresh.
  Default,
  /// No stale-first emission, but a failed refresh may fall back to stale
  /// data.
  FreshPreferred,
  /// Stale data is never emitted.
  FreshOnly,
}

/// The configured freshness policy for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CachePriority {
  pub mode: CacheMode,
  pub preference: CachePreference,
}

/// Behavioural flags derived from a priority. Immutable; one record per
/// (mode, preference) combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriorityBehaviour {
  /// Whether a refresh may be attempted at all.
  pub uses_network: bool,
  /// Whether any stored entry is treated as expired for this request.
  pub invalidates_existing: bool,
  /// Whether stale stored data may be emitted.
  pub emits_cached_stale: bool,
  /// Whether a failed refresh may fall back to stale stored data.
  pub emits_network_stale: bool,
  /// Whether exactly one result is emitted regardless of staleness.
  pub single_response: bool,
  /// Every status this priority is allowed to emit.
  pub allowed_statuses: &'static [CacheStatus],
}

impl PriorityBehaviour {
  pub fn allows(&self, status: CacheStatus) -> bool {
    self.allowed_statuses.contains(&status)
  }
}

use CacheStatus::{CouldNotRefresh, Empty, Fresh, Network, Refreshed, Stale};

const CACHE_DEFAULT: PriorityBehaviour = PriorityBehaviour {
  uses_network: true,
  invalidates_existing: false,
  emits_cached_stale: true,
  emits_network_stale: true,
  single_response: false,
  allowed_statuses: &[Fresh, Stale, Network, Refreshed, Empty, CouldNotRefresh],
};

const CACHE_FRESH_PREFERRED: PriorityBehaviour = PriorityBehaviour {
  uses_network: true,
  invalidates_existing: false,
  emits_cached_stale: false,
  emits_network_stale: true,
  single_response: true,
  allowed_statuses: &[Fresh, Network, Refreshed, Empty, CouldNotRefresh],
};

const CACHE_FRESH_ONLY: PriorityBehaviour = PriorityBehaviour {
  uses_network: true,
  invalidates_existing: false,
  emits_cached_stale: false,
  emits_network_stale: false,
  single_response: true,
  allowed_statuses: &[Fresh, Network, Refreshed, Empty],
};

const REFRESH_DEFAULT: PriorityBehaviour = PriorityBehaviour {
  uses_network: true,
  invalidates_existing: true,
  emits_cached_stale: true,
  emits_network_stale: true,
  single_response: false,
  allowed_statuses: &[Stale, Network, Refreshed, Empty, CouldNotRefresh],
};

const REFRESH_FRESH_PREFERRED: PriorityBehaviour = PriorityBehaviour {
  uses_network: true,
  invalidates_existing: true,
  emits_cached_stale: false,
  emits_network_stale: true,
  single_response: true,
  allowed_statuses: &[Network, Refreshed, Empty, CouldNotRefresh],
};

const REFRESH_FRESH_ONLY: PriorityBehaviour = PriorityBehaviour {
  uses_network: true,
  invalidates_existing: true,
  emits_cached_stale: false,
  emits_network_stale: false,
  single_response: true,
  allowed_statuses: &[Network, Refreshed, Empty],
};

const OFFLINE_DEFAULT: PriorityBehaviour = PriorityBehaviour {
  uses_network: false,
  invalidates_existing: false,
  emits_cached_stale: true,
  emits_network_stale: false,
  single_response: true,
  allowed_statuses: &[Fresh, Stale, Empty],
};

const OFFLINE_FRESH_ONLY: PriorityBehaviour = PriorityBehaviour {
  uses_network: false,
  invalidates_existing: false,
  emits_cached_stale: false,
  emits_network_stale: false,
  single_response: true,
  allowed_statuses: &[Fresh, Empty],
};

impl CachePriority {
  pub fn new(mode: CacheMode, preference: CachePreference) -> Self {
    Self { mode, preference }
  }

  /// Resolve the behavioural flags for this priority. Total over all nine
  /// (mode, preference) combinations.
  pub fn behaviour(&self) -> &'static PriorityBehaviour {
    match (self.mode, self.preference) {
      (CacheMode::Cache, CachePreference::Default) => &CACHE_DEFAULT,
      (CacheMode::Cache, CachePreference::FreshPreferred) => &CACHE_FRESH_PREFERRED,
      (CacheMode::Cache, CachePreference::FreshOnly) => &CACHE_FRESH_ONLY,
      (CacheMode::Refresh, CachePreference::Default) => &REFRESH_DEFAULT,
      (CacheMode::Refresh, CachePreference::FreshPreferred) => &REFRESH_FRESH_PREFERRED,
      (CacheMode::Refresh, CachePreference::FreshOnly) => &REFRESH_FRESH_ONLY,
      // With no network call to prefer, FreshPreferred collapses into
      // Default for offline requests. Explicit alias, same record.
      (CacheMode::Offline, CachePreference::Default)
      | (CacheMode::Offline, CachePreference::FreshPreferred) => &OFFLINE_DEFAULT,
      (CacheMode::Offline, CachePreference::FreshOnly) => &OFFLINE_FRESH_ONLY,
    }
  }
}
