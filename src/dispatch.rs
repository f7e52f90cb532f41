//! Side-effecting actions implied by a classification.
//!
//! Every action honors the live flag: without it, the action is only
//! logged. Individual action failures are logged and swallowed so one bad
//! tweet never takes down a batch; only the DM outcome is surfaced because
//! callers branch on refusal.

use tracing::{debug, error, info};

use crate::api::SocialApi;
use crate::error::BotError;
use crate::messages;
use crate::model::{tweet_url, Account, DmOutcome};

/// Executes favorites, replies, DMs, and follows against the remote API.
pub struct Dispatcher<'a, A: SocialApi + ?Sized> {
    api: &'a A,
    live: bool,
}

impl<'a, A: SocialApi + ?Sized> Dispatcher<'a, A> {
    pub fn new(api: &'a A, live: bool) -> Self {
        Self { api, live }
    }

    #[must_use]
    pub const fn is_live(&self) -> bool {
        self.live
    }

    /// Like a tweet. Permission or availability failures are non-fatal.
    pub fn favorite(&self, tweet_id: &str) {
        if self.live {
            if let Err(e) = self.api.favorite(tweet_id) {
                error!("Cannot fav tweet {tweet_id}: {e}");
            }
        }
        debug!("[live={}] fav {tweet_id}", self.live);
    }

    /// Reply to a tweet with `@screen_name message`, returning the new
    /// tweet's id when one was posted (needed to chain thread segments).
    pub fn reply(&self, to_screen_name: &str, message: &str, in_reply_to: &str) -> Option<String> {
        let full = format!("@{to_screen_name} {message}");

        let posted = if self.live {
            match self.api.post_reply(&full, in_reply_to) {
                Ok(id) => Some(id),
                Err(e) => {
                    error!(
                        "Cannot reply to {}: {e}",
                        tweet_url(to_screen_name, in_reply_to)
                    );
                    None
                }
            }
        } else {
            None
        };

        debug!(
            "[live={}] reply to {in_reply_to} in {} chars: [{}]",
            self.live,
            full.len(),
            full.replace('\n', ";")
        );
        posted
    }

    /// Post an ordered list of messages as a thread under `first_tweet_id`.
    ///
    /// A failed segment is skipped; the next segment chains onto the last
    /// tweet that actually posted (or the original id if none has yet).
    pub fn reply_thread(&self, to_screen_name: &str, segments: &[String], first_tweet_id: &str) {
        let mut parent = first_tweet_id.to_string();

        for segment in segments {
            if let Some(posted) = self.reply(to_screen_name, segment, &parent) {
                parent = posted;
            }
        }
    }

    /// Send a direct message.
    ///
    /// `Refused` is the expected non-error outcome for recipients that
    /// cannot be DMed; callers fall back to a public reply. `Failed` is an
    /// unexpected API error, logged at error severity.
    pub fn direct_message(
        &self,
        recipient_name: &str,
        recipient_id: i64,
        message: &str,
    ) -> DmOutcome {
        if !self.live {
            debug!(
                "[live=false] DM to {recipient_id}: [[{}]]",
                message.replace('\n', ";")
            );
            return DmOutcome::Sent;
        }

        match self.api.send_direct_message(recipient_id, message) {
            Ok(()) => {
                debug!(
                    "[live=true] DM to {recipient_id}: [[{}]]",
                    message.replace('\n', ";")
                );
                DmOutcome::Sent
            }
            Err(BotError::DmRefused { .. }) => {
                info!("Cannot send DM to {recipient_name}: recipient does not accept DMs");
                DmOutcome::Refused
            }
            Err(e) => {
                error!("Unknown: cannot send DM to {recipient_name}: {e}");
                DmOutcome::Failed
            }
        }
    }

    /// Follow an account. Best-effort remediation used when a timeline is
    /// not accessible, hoping the account accepts and unlocks visibility
    /// for the next run.
    pub fn follow(&self, screen_name: &str) {
        if self.live {
            if let Err(e) = self.api.follow(screen_name) {
                error!("Cannot follow user {screen_name}: {e}");
                return;
            }
        }
        debug!("[live={}] now following {screen_name}", self.live);
    }

    /// Nudge the author of a partially compliant tweet.
    ///
    /// Followers who opted in get a DM, falling back to a public reply
    /// when the DM is refused or fails. Followers without opt-in are never
    /// contacted. Non-followers get the public nudge reply.
    pub fn nudge(&self, author: &Account, tweet_id: &str, is_follower: bool, allowed_to_dm: bool) {
        let url = tweet_url(&author.screen_name, tweet_id);

        if is_follower && allowed_to_dm {
            debug!("Nudging follower @{} via DM for {url}", author.screen_name);
            let outcome = self.direct_message(
                &author.screen_name,
                author.user_id,
                &messages::dm_missing_alt_text(&url),
            );
            if outcome != DmOutcome::Sent {
                self.reply(&author.screen_name, &messages::reply_dm_unavailable(), tweet_id);
            }
        } else if is_follower {
            // never DM without consent
            debug!(
                "Skipping nudge for follower @{} without DM opt-in ({url})",
                author.screen_name
            );
        } else {
            debug!("Nudging non-follower @{} via reply ({url})", author.screen_name);
            self.reply(&author.screen_name, &messages::reply_missing_alt_text(), tweet_id);
        }
    }
}

/// Split a long message into tweet-sized segments on word boundaries.
#[must_use]
pub fn split_for_thread(text: &str, max_chars: usize) -> Vec<String> {
    textwrap::wrap(text, max_chars)
        .into_iter()
        .map(|line| line.into_owned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Page;
    use crate::error::Result;
    use crate::model::{BotProfile, RemoteTweet};
    use std::cell::RefCell;

    /// Records outbound calls; DMs and replies can be scripted to fail.
    #[derive(Default)]
    struct RecordingApi {
        favorites: RefCell<Vec<String>>,
        replies: RefCell<Vec<(String, String)>>,
        dms: RefCell<Vec<(i64, String)>>,
        follows: RefCell<Vec<String>>,
        refuse_dms: bool,
        fail_replies_containing: Option<String>,
        next_reply_id: RefCell<i64>,
    }

    impl SocialApi for RecordingApi {
        fn verify_credentials(&self) -> Result<BotProfile> {
            unimplemented!()
        }
        fn followers_page(&self, _n: &str, _c: Option<&str>) -> Result<Page<Account>> {
            unimplemented!()
        }
        fn friends_page(&self, _n: &str, _c: Option<&str>) -> Result<Page<Account>> {
            unimplemented!()
        }
        fn retweeters_page(&self, _i: &str, _c: Option<&str>) -> Result<Page<i64>> {
            unimplemented!()
        }
        fn user_timeline(&self, _n: &str, _c: usize, _r: bool) -> Result<Vec<String>> {
            unimplemented!()
        }
        fn get_tweet(&self, _i: &str) -> Result<RemoteTweet> {
            unimplemented!()
        }
        fn mentions_since(&self, _i: i64) -> Result<Vec<RemoteTweet>> {
            unimplemented!()
        }

        fn favorite(&self, tweet_id: &str) -> Result<()> {
            self.favorites.borrow_mut().push(tweet_id.to_string());
            Ok(())
        }

        fn post_reply(&self, text: &str, in_reply_to: &str) -> Result<String> {
            if let Some(marker) = &self.fail_replies_containing {
                if text.contains(marker.as_str()) {
                    return Err(BotError::Api("over capacity".to_string()));
                }
            }
            self.replies
                .borrow_mut()
                .push((text.to_string(), in_reply_to.to_string()));
            let mut next = self.next_reply_id.borrow_mut();
            *next += 1;
            Ok(format!("posted-{next}"))
        }

        fn send_direct_message(&self, user_id: i64, text: &str) -> Result<()> {
            if self.refuse_dms {
                return Err(BotError::DmRefused { user_id });
            }
            self.dms.borrow_mut().push((user_id, text.to_string()));
            Ok(())
        }

        fn follow(&self, screen_name: &str) -> Result<()> {
            self.follows.borrow_mut().push(screen_name.to_string());
            Ok(())
        }
    }

    #[test]
    fn dry_run_sends_nothing() {
        let api = RecordingApi::default();
        let dispatcher = Dispatcher::new(&api, false);

        dispatcher.favorite("1");
        dispatcher.reply("alice", "hola", "1");
        dispatcher.direct_message("alice", 1, "hola");
        dispatcher.follow("alice");

        assert!(api.favorites.borrow().is_empty());
        assert!(api.replies.borrow().is_empty());
        assert!(api.dms.borrow().is_empty());
        assert!(api.follows.borrow().is_empty());
    }

    #[test]
    fn reply_prefixes_screen_name_and_returns_id() {
        let api = RecordingApi::default();
        let dispatcher = Dispatcher::new(&api, true);

        let id = dispatcher.reply("alice", "hola", "99");
        assert_eq!(id.as_deref(), Some("posted-1"));

        let replies = api.replies.borrow();
        assert_eq!(replies[0].0, "@alice hola");
        assert_eq!(replies[0].1, "99");
    }

    #[test]
    fn thread_chains_onto_previous_segment() {
        let api = RecordingApi::default();
        let dispatcher = Dispatcher::new(&api, true);

        let segments = vec!["uno".to_string(), "dos".to_string(), "tres".to_string()];
        dispatcher.reply_thread("alice", &segments, "100");

        let replies = api.replies.borrow();
        assert_eq!(replies[0].1, "100");
        assert_eq!(replies[1].1, "posted-1");
        assert_eq!(replies[2].1, "posted-2");
    }

    #[test]
    fn thread_continues_past_failed_segment_with_last_good_parent() {
        let api = RecordingApi {
            fail_replies_containing: Some("dos".to_string()),
            ..RecordingApi::default()
        };
        let dispatcher = Dispatcher::new(&api, true);

        let segments = vec!["uno".to_string(), "dos".to_string(), "tres".to_string()];
        dispatcher.reply_thread("alice", &segments, "100");

        let replies = api.replies.borrow();
        assert_eq!(replies.len(), 2);
        // "tres" chains onto "uno"'s id because "dos" never posted
        assert_eq!(replies[1].1, "posted-1");
    }

    #[test]
    fn dm_refusal_is_an_outcome_not_an_error() {
        let api = RecordingApi {
            refuse_dms: true,
            ..RecordingApi::default()
        };
        let dispatcher = Dispatcher::new(&api, true);

        assert_eq!(dispatcher.direct_message("alice", 1, "hola"), DmOutcome::Refused);
    }

    #[test]
    fn nudge_dms_opted_in_follower() {
        let api = RecordingApi::default();
        let dispatcher = Dispatcher::new(&api, true);

        dispatcher.nudge(&Account::new("alice", 1), "50", true, true);

        assert_eq!(api.dms.borrow().len(), 1);
        assert!(api.replies.borrow().is_empty());
    }

    #[test]
    fn nudge_falls_back_to_reply_when_dm_refused() {
        let api = RecordingApi {
            refuse_dms: true,
            ..RecordingApi::default()
        };
        let dispatcher = Dispatcher::new(&api, true);

        dispatcher.nudge(&Account::new("alice", 1), "50", true, true);

        assert!(api.dms.borrow().is_empty());
        let replies = api.replies.borrow();
        assert_eq!(replies.len(), 1);
        assert!(replies[0].0.contains("Mandame DM"));
    }

    #[test]
    fn nudge_never_contacts_follower_without_opt_in() {
        let api = RecordingApi::default();
        let dispatcher = Dispatcher::new(&api, true);

        dispatcher.nudge(&Account::new("alice", 1), "50", true, false);

        assert!(api.dms.borrow().is_empty());
        assert!(api.replies.borrow().is_empty());
    }

    #[test]
    fn nudge_replies_publicly_to_non_follower() {
        let api = RecordingApi::default();
        let dispatcher = Dispatcher::new(&api, true);

        dispatcher.nudge(&Account::new("bob", 2), "51", false, false);

        assert!(api.dms.borrow().is_empty());
        assert_eq!(api.replies.borrow().len(), 1);
    }

    #[test]
    fn split_for_thread_respects_word_boundaries() {
        let text = "palabra ".repeat(100);
        let segments = split_for_thread(&text, 250);

        assert!(segments.len() > 1);
        for segment in &segments {
            assert!(segment.len() <= 250);
            assert!(!segment.starts_with(' '));
        }
    }
}
