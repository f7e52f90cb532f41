//! Reconciliation of the local graph mirrors against remote snapshots.
//!
//! One full paginated fetch per run, guarded by a refresh policy so the
//! common "nothing changed" case costs a single counter comparison instead
//! of a pagination walk. Applying the delta is best-effort per row; an
//! unreachable remote aborts the run with local state untouched.

use std::collections::HashSet;
use std::hash::Hash;
use std::time::Duration;

use tracing::info;

use crate::api::{GraphReader, SocialApi};
use crate::error::Result;
use crate::model::BotProfile;
use crate::store::Store;

/// Additions and removals needed to bring a local mirror in line with a
/// remote snapshot. The two sets are disjoint by construction.
#[derive(Debug, Clone)]
pub struct SetDelta<T> {
    pub added: HashSet<T>,
    pub removed: HashSet<T>,
}

impl<T> SetDelta<T> {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    /// Net membership change after applying this delta.
    #[must_use]
    pub fn net_change(&self) -> i64 {
        self.added.len() as i64 - self.removed.len() as i64
    }
}

/// `added = remote - local`, `removed = local - remote`.
pub fn diff<T: Eq + Hash + Clone>(local: &HashSet<T>, remote: &HashSet<T>) -> SetDelta<T> {
    SetDelta {
        added: remote.difference(local).cloned().collect(),
        removed: local.difference(remote).cloned().collect(),
    }
}

/// When to pay for a full remote snapshot.
///
/// The counter comparison is a heuristic, not a correctness requirement:
/// `Always` trades extra remote calls for certainty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPolicy {
    /// Fetch and reconcile unconditionally.
    Always,
    /// Fetch only when the locally cached count disagrees with the
    /// authoritative remote counter.
    IfCountDiffers,
}

impl RefreshPolicy {
    #[must_use]
    pub fn should_refresh(self, local_count: i64, remote_count: i64) -> bool {
        match self {
            Self::Always => true,
            Self::IfCountDiffers => local_count != remote_count,
        }
    }
}

/// Synchronizes the follower, friend, and allowed-to-DM mirrors.
pub struct Reconciler<'a, A: SocialApi + ?Sized> {
    api: &'a A,
    store: &'a Store,
    throttle: Duration,
}

impl<'a, A: SocialApi + ?Sized> Reconciler<'a, A> {
    pub fn new(api: &'a A, store: &'a Store, throttle: Duration) -> Self {
        Self {
            api,
            store,
            throttle,
        }
    }

    /// Reconcile the follower mirror against the remote follower list.
    ///
    /// # Errors
    ///
    /// Propagates a failed remote fetch; local state is untouched in that
    /// case.
    pub fn sync_followers(&self, profile: &BotProfile, policy: RefreshPolicy) -> Result<()> {
        let local_count = self.store.count_followers()?;
        info!(
            "Locally have {local_count} followers, remote reports {}",
            profile.followers_count
        );

        if !policy.should_refresh(local_count, profile.followers_count) {
            return Ok(());
        }

        let local = self.store.followers()?;
        let remote = GraphReader::new(self.api, self.throttle).followers(&profile.account.screen_name)?;
        let delta = diff(&local, &remote);

        info!(
            "Followers: {} new, {} lost, net {:+}",
            delta.added.len(),
            delta.removed.len(),
            delta.net_change()
        );
        self.store.apply_follower_delta(&delta.added, &delta.removed)
    }

    /// Reconcile the friend mirror against the remote followee list.
    ///
    /// # Errors
    ///
    /// Propagates a failed remote fetch.
    pub fn sync_friends(&self, profile: &BotProfile, policy: RefreshPolicy) -> Result<()> {
        let local_count = self.store.count_friends()?;
        info!(
            "Locally have {local_count} friends, remote reports {}",
            profile.friends_count
        );

        if !policy.should_refresh(local_count, profile.friends_count) {
            return Ok(());
        }

        let local = self.store.friends()?;
        let remote = GraphReader::new(self.api, self.throttle).friends(&profile.account.screen_name)?;
        let delta = diff(&local, &remote);

        info!(
            "Friends: {} new, {} lost, net {:+}",
            delta.added.len(),
            delta.removed.len(),
            delta.net_change()
        );
        self.store.apply_friend_delta(&delta.added, &delta.removed)
    }

    /// Reconcile the allowed-to-DM mirror against the retweeters of the
    /// marker tweet. The marker's retweet count is the remote count signal.
    ///
    /// # Errors
    ///
    /// Propagates a failed remote fetch.
    pub fn sync_allowed_to_dm(
        &self,
        accept_dm_tweet_id: &str,
        policy: RefreshPolicy,
    ) -> Result<()> {
        let local_count = self.store.count_allowed_to_dm()?;
        let remote_count = self.api.get_tweet(accept_dm_tweet_id)?.retweet_count;
        info!("Locally have {local_count} allowed-to-DM, marker tweet reports {remote_count}");

        if !policy.should_refresh(local_count, remote_count) {
            return Ok(());
        }

        let local = self.store.allowed_to_dm()?;
        let remote = GraphReader::new(self.api, self.throttle).retweeters(accept_dm_tweet_id)?;
        let delta = diff(&local, &remote);

        info!(
            "Allowed-to-DM: {} new, {} lost, net {:+}",
            delta.added.len(),
            delta.removed.len(),
            delta.net_change()
        );
        self.store.apply_allowed_to_dm_delta(&delta.added, &delta.removed)
    }
}
