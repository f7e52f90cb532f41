//! Orchestrator composing the use cases behind the CLI flags.

use chrono::{Duration as ChronoDuration, Utc};
use colored::Colorize;
use std::time::Duration;
use tracing::info;

use crate::api::SocialApi;
use crate::caption::Captioner;
use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::error::Result;
use crate::evaluate::Evaluator;
use crate::mentions::MentionProcessor;
use crate::model::BotProfile;
use crate::reconcile::{Reconciler, RefreshPolicy};
use crate::store::Store;
use crate::watch;

/// The bot: a remote endpoint, a local store, and the knobs from config.
///
/// Holds no remote session state itself, so use cases can run in any order
/// within one invocation.
pub struct AltBot<'a, A: SocialApi + ?Sized> {
    api: &'a A,
    store: Store,
    config: Config,
    captioner: Option<&'a dyn Captioner>,
    live: bool,
}

impl<'a, A: SocialApi + ?Sized> AltBot<'a, A> {
    pub fn new(
        api: &'a A,
        store: Store,
        config: Config,
        captioner: Option<&'a dyn Captioner>,
        live: bool,
    ) -> Self {
        Self {
            api,
            store,
            config,
            captioner,
            live,
        }
    }

    fn throttle(&self) -> Duration {
        Duration::from_secs(self.config.processing.kindly_sleep_secs)
    }

    fn dispatcher(&self) -> Dispatcher<'a, A> {
        Dispatcher::new(self.api, self.live)
    }

    fn evaluator(&self) -> Evaluator<'a, A> {
        Evaluator::new(self.api, self.captioner)
    }

    /// Reconcile the follower, friend, and allowed-to-DM mirrors.
    ///
    /// With `force`, the remote snapshots are fetched unconditionally;
    /// otherwise only when the cached counts disagree with the remote
    /// counters.
    ///
    /// # Errors
    ///
    /// Returns an error if credentials cannot be verified or a sync fails.
    pub fn update_users(&self, force: bool) -> Result<BotProfile> {
        let profile = self.api.verify_credentials()?;
        info!(
            "Authenticated as @{} ({} followers, {} friends)",
            profile.account.screen_name, profile.followers_count, profile.friends_count
        );

        let policy = if force {
            RefreshPolicy::Always
        } else {
            RefreshPolicy::IfCountDiffers
        };

        let reconciler = Reconciler::new(self.api, &self.store, self.throttle());
        reconciler.sync_followers(&profile, policy)?;
        reconciler.sync_friends(&profile, policy)?;
        reconciler.sync_allowed_to_dm(&self.config.bot.accept_dm_tweet_id, policy)?;
        Ok(profile)
    }

    /// Watch pass over every follower.
    ///
    /// # Errors
    ///
    /// Propagates transport failures only.
    pub fn watch_followers(&mut self) -> Result<()> {
        let dispatcher = self.dispatcher();
        let evaluator = self.evaluator();
        watch::process_followers(
            self.api,
            &mut self.store,
            &dispatcher,
            &evaluator,
            &self.config.processing,
        )
    }

    /// Watch pass over friends that are not also followers.
    ///
    /// # Errors
    ///
    /// Propagates transport failures only.
    pub fn watch_friends(&mut self) -> Result<()> {
        let dispatcher = self.dispatcher();
        let evaluator = self.evaluator();
        watch::process_friends(
            self.api,
            &mut self.store,
            &dispatcher,
            &evaluator,
            &self.config.processing,
        )
    }

    /// Handle every mention newer than the stored cursor.
    ///
    /// # Errors
    ///
    /// Returns an error if mentions cannot be fetched, or on a fatal
    /// failure mid-batch.
    pub fn process_mentions(&mut self) -> Result<usize> {
        let dispatcher = self.dispatcher();
        let evaluator = self.evaluator();
        let processor = MentionProcessor::new(self.api, &dispatcher, &evaluator, &self.config);
        processor.run(&mut self.store)
    }

    /// DM a message (literal text or a path to a text file) to every
    /// follower. Returns `(sent, total)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the follower snapshot cannot be read.
    pub fn broadcast(&self, message: &str) -> Result<(usize, usize)> {
        let dispatcher = self.dispatcher();
        watch::broadcast(&self.store, &dispatcher, message)
    }

    /// Print the alt-text usage ranking over the last year.
    ///
    /// # Errors
    ///
    /// Returns an error if the ranking query fails.
    pub fn top_users_report(&self, top_n: usize) -> Result<()> {
        let since = Utc::now() - ChronoDuration::days(365);
        let report = self.store.top_users(false, false, since, top_n)?;

        println!("{}", "Top alt-text users".bold().underline());
        if report.ranking.is_empty() {
            println!("{}", "No recorded image history yet.".dimmed());
            return Ok(());
        }

        for (position, user) in report.ranking.iter().enumerate() {
            println!(
                "{:>3}. {} {} of {} images described",
                position + 1,
                format!("@{}", user.screen_name).cyan(),
                user.images_with_alt.to_string().green(),
                user.total_images,
            );
        }
        println!(
            "\n{} accounts seen, {} used alt text at least once",
            report.total_accounts, report.accounts_with_alt_text
        );
        Ok(())
    }

    /// Borrow the underlying store, mainly for integration tests.
    #[must_use]
    pub fn store(&self) -> &Store {
        &self.store
    }
}
