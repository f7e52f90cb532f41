//! Account-watch pipeline.
//!
//! Walks an account's recent timeline, evaluates every tweet not yet
//! handled, and dispatches the action its classification implies. Batch
//! passes over followers and friends build on the single-account case;
//! per-account and per-tweet failures are logged at the loop boundary and
//! never abort the batch.

use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, error, info};

use crate::api::SocialApi;
use crate::config::{NoMediaPolicy, ProcessingConfig};
use crate::dispatch::Dispatcher;
use crate::error::{BotError, Result};
use crate::evaluate::{Evaluation, Evaluator};
use crate::messages;
use crate::model::{tweet_url, AltTextRecord, Classification, DmOutcome};
use crate::store::Store;

/// An account about to be processed, with its relationship to the bot.
#[derive(Debug, Clone)]
pub struct AccountContext {
    pub screen_name: String,
    pub user_id: i64,
    pub is_follower: bool,
    pub allowed_to_dm: bool,
}

/// Inspect the last `n_tweets` of one account and handle every tweet not
/// yet processed.
///
/// An inaccessible timeline (protected or blocking account) is recovered
/// by requesting a follow and skipping the account.
///
/// # Errors
///
/// Propagates transport failures; everything else is contained.
pub fn process_account<A: SocialApi + ?Sized>(
    api: &A,
    store: &mut Store,
    dispatcher: &Dispatcher<'_, A>,
    evaluator: &Evaluator<'_, A>,
    ctx: &AccountContext,
    config: &ProcessingConfig,
) -> Result<()> {
    let timeline = match api.user_timeline(&ctx.screen_name, config.last_n_tweets, false) {
        Ok(ids) => ids,
        Err(BotError::NotAccessible { subject, reason }) => {
            error!("Cannot extract tweets for {subject}: {reason}");
            // a pending follow request may unlock the timeline next run
            dispatcher.follow(&ctx.screen_name);
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    for tweet_id in timeline {
        if let Err(e) = process_timeline_tweet(store, dispatcher, evaluator, ctx, &tweet_id, config) {
            if e.is_fatal() {
                return Err(e);
            }
            error!(
                "Error while processing tweet {}: {e}",
                tweet_url(&ctx.screen_name, &tweet_id)
            );
        }
    }

    Ok(())
}

fn process_timeline_tweet<A: SocialApi + ?Sized>(
    store: &mut Store,
    dispatcher: &Dispatcher<'_, A>,
    evaluator: &Evaluator<'_, A>,
    ctx: &AccountContext,
    tweet_id: &str,
    config: &ProcessingConfig,
) -> Result<()> {
    if store.is_processed(tweet_id)? {
        return Ok(());
    }

    info!("Processing tweet {}", tweet_url(&ctx.screen_name, tweet_id));
    let evaluation = evaluator.evaluate(tweet_id)?;

    match evaluation.classification {
        Classification::NoMedia => {
            debug!(
                "No images in {}, marking processed",
                tweet_url(&ctx.screen_name, tweet_id)
            );
            if config.no_media_in_watch == NoMediaPolicy::Reply {
                dispatcher.reply(
                    &ctx.screen_name,
                    &messages::reply_no_images_found(&ctx.screen_name),
                    tweet_id,
                );
            }
            store.mark_processed(tweet_id, false)?;
        }
        Classification::FullCompliance => {
            debug!(
                "All images described in {}",
                tweet_url(&ctx.screen_name, tweet_id)
            );
            dispatcher.favorite(tweet_id);
            persist_evaluation(store, &evaluation, false)?;
        }
        Classification::PartialCompliance(score) => {
            debug!(
                "Some images ({:.0} %) lack alt text in {}",
                score * 100.0,
                tweet_url(&ctx.screen_name, tweet_id)
            );
            dispatcher.nudge(
                &evaluation.tweet.author,
                tweet_id,
                ctx.is_follower,
                ctx.allowed_to_dm,
            );
            persist_evaluation(store, &evaluation, false)?;
        }
    }

    Ok(())
}

/// Persist an evaluation that found photos: the alt-text record plus the
/// processed mark, in one transactional write.
///
/// # Errors
///
/// With `tolerate_duplicate`, a conflict on an already-recorded tweet is
/// swallowed; otherwise it propagates.
pub fn persist_evaluation(
    store: &mut Store,
    evaluation: &Evaluation,
    tolerate_duplicate: bool,
) -> Result<()> {
    let Some(alt_texts) = &evaluation.alt_texts else {
        return Ok(());
    };

    let author = &evaluation.tweet.author;
    let record = AltTextRecord {
        tweet_id: evaluation.tweet.id.clone(),
        screen_name: author.screen_name.clone(),
        user_id: author.user_id,
        n_images: alt_texts.len() as i64,
        alt_score: match evaluation.classification {
            Classification::FullCompliance => 1.0,
            Classification::PartialCompliance(score) => score,
            Classification::NoMedia => return Ok(()),
        },
        processed_at: Utc::now(),
        is_friend: store.is_friend(author.user_id)?,
        is_follower: store.is_follower(author.user_id)?,
        user_alt_texts: alt_texts.clone(),
        bot_captions: evaluation.bot_captions.clone(),
    };

    match store.record_alt_text_info(&record) {
        Ok(()) => Ok(()),
        Err(e) if tolerate_duplicate && e.is_conflict() => {
            debug!("Tweet {} already recorded", record.tweet_id);
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Watch pass over every follower; followers with the DM opt-in take the
/// direct-message nudge path.
///
/// # Errors
///
/// Propagates transport failures only.
pub fn process_followers<A: SocialApi + ?Sized>(
    api: &A,
    store: &mut Store,
    dispatcher: &Dispatcher<'_, A>,
    evaluator: &Evaluator<'_, A>,
    config: &ProcessingConfig,
) -> Result<()> {
    let followers = store.followers()?;
    let allowed = store.allowed_to_dm()?;
    let bar = watch_progress(followers.len() as u64, "followers");

    for follower in &followers {
        bar.set_message(format!("@{}", follower.screen_name));
        let ctx = AccountContext {
            screen_name: follower.screen_name.clone(),
            user_id: follower.user_id,
            is_follower: true,
            allowed_to_dm: allowed.contains(&follower.user_id),
        };

        if let Err(e) = process_account(api, store, dispatcher, evaluator, &ctx, config) {
            if e.is_fatal() {
                bar.abandon();
                return Err(e);
            }
            error!("Error while processing follower @{}: {e}", follower.screen_name);
        }
        bar.inc(1);
    }

    bar.finish_with_message("done");
    if !followers.is_empty() {
        info!(
            "{} followers processed, {} allowed to DM ({:.2} %)",
            followers.len(),
            allowed.len(),
            allowed.len() as f64 / followers.len() as f64 * 100.0
        );
    }
    Ok(())
}

/// Watch pass over friends that are not also followers (those were already
/// covered); friends only ever take the reply-only path.
///
/// # Errors
///
/// Propagates transport failures only.
pub fn process_friends<A: SocialApi + ?Sized>(
    api: &A,
    store: &mut Store,
    dispatcher: &Dispatcher<'_, A>,
    evaluator: &Evaluator<'_, A>,
    config: &ProcessingConfig,
) -> Result<()> {
    let followers = store.followers()?;
    let follower_ids: std::collections::HashSet<i64> =
        followers.iter().map(|f| f.user_id).collect();
    let friends = store.friends()?;
    let bar = watch_progress(friends.len() as u64, "friends");

    for friend in &friends {
        if follower_ids.contains(&friend.user_id) {
            bar.inc(1);
            continue;
        }

        bar.set_message(format!("@{}", friend.screen_name));
        let ctx = AccountContext {
            screen_name: friend.screen_name.clone(),
            user_id: friend.user_id,
            is_follower: false,
            allowed_to_dm: false,
        };

        if let Err(e) = process_account(api, store, dispatcher, evaluator, &ctx, config) {
            if e.is_fatal() {
                bar.abandon();
                return Err(e);
            }
            error!("Error while processing friend @{}: {e}", friend.screen_name);
        }
        bar.inc(1);
    }

    bar.finish_with_message("done");
    info!("{} friends processed", friends.len());
    Ok(())
}

/// DM a message to every follower, returning `(sent, total)`.
///
/// `message` may be literal text or the path to a text file holding it.
///
/// # Errors
///
/// Returns an error if the follower snapshot cannot be read.
pub fn broadcast<A: SocialApi + ?Sized>(
    store: &Store,
    dispatcher: &Dispatcher<'_, A>,
    message: &str,
) -> Result<(usize, usize)> {
    let text = if std::path::Path::new(message).is_file() {
        info!("Reading broadcast message from file {message}");
        std::fs::read_to_string(message)?
    } else {
        message.to_string()
    };

    let followers = store.followers()?;
    let mut sent = 0usize;

    for follower in &followers {
        match dispatcher.direct_message(&follower.screen_name, follower.user_id, &text) {
            DmOutcome::Sent => sent += 1,
            _ => info!("Cannot write DM to @{}", follower.screen_name),
        }
    }

    info!("{sent}/{} broadcast messages sent", followers.len());
    Ok((sent, followers.len()))
}

fn watch_progress(len: u64, label: &str) -> ProgressBar {
    let bar = ProgressBar::new(len);
    bar.set_style(
        ProgressStyle::with_template("{prefix:>10} [{bar:30}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar.set_prefix(label.to_string());
    bar
}
