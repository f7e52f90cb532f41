//! Tweet compliance evaluation.
//!
//! Decides, for one tweet, whether it carries photos, how many of them the
//! author described, and which action class follows from that.

use tracing::{debug, warn};

use crate::api::SocialApi;
use crate::caption::Captioner;
use crate::error::Result;
use crate::model::{Classification, RemoteTweet};

/// Outcome of evaluating one tweet.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub tweet: RemoteTweet,
    /// Per-photo author alt texts; `None` when the tweet carries no media.
    pub alt_texts: Option<Vec<Option<String>>>,
    pub classification: Classification,
    /// Bot-generated caption suggestions for photos lacking alt text.
    pub bot_captions: Vec<Option<String>>,
}

/// Author-supplied alt text per photo, `None` when the tweet carries no
/// media entities at all. Extended entities with an empty media list are
/// treated identically to no media.
#[must_use]
pub fn alt_texts(tweet: &RemoteTweet) -> Option<Vec<Option<String>>> {
    match &tweet.media {
        None => {
            debug!("Tweet {} has no extended entities", tweet.id);
            None
        }
        Some(media) if media.is_empty() => {
            debug!("Tweet {} has extended entities but no media", tweet.id);
            None
        }
        Some(media) => Some(media.iter().map(|m| m.alt_text.clone()).collect()),
    }
}

/// Fraction of photos with alt text, rounded to 2 decimals.
///
/// Precondition: `alt_texts` is non-empty; callers exclude the no-media
/// case first.
#[must_use]
pub fn score(alt_texts: &[Option<String>]) -> f64 {
    debug_assert!(!alt_texts.is_empty());
    let described = alt_texts
        .iter()
        .filter(|at| at.as_deref().is_some_and(|text| !text.is_empty()))
        .count();
    let fraction = described as f64 / alt_texts.len() as f64;
    (fraction * 100.0).round() / 100.0
}

/// Classify a tweet from its alt-text listing.
#[must_use]
pub fn classify(alt_texts: Option<&[Option<String>]>) -> Classification {
    match alt_texts {
        None => Classification::NoMedia,
        Some([]) => Classification::NoMedia,
        Some(texts) => {
            let s = score(texts);
            if s >= 1.0 {
                Classification::FullCompliance
            } else {
                Classification::PartialCompliance(s)
            }
        }
    }
}

/// Fetches and classifies tweets, optionally back-filling caption
/// suggestions for undescribed photos.
pub struct Evaluator<'a, A: SocialApi + ?Sized> {
    api: &'a A,
    captioner: Option<&'a dyn Captioner>,
}

impl<'a, A: SocialApi + ?Sized> Evaluator<'a, A> {
    pub fn new(api: &'a A, captioner: Option<&'a dyn Captioner>) -> Self {
        Self { api, captioner }
    }

    /// Fetch a tweet and evaluate it.
    ///
    /// # Errors
    ///
    /// Propagates tweet-fetch failures; captioning failures are swallowed
    /// with a warning.
    pub fn evaluate(&self, tweet_id: &str) -> Result<Evaluation> {
        let tweet = self.api.get_tweet(tweet_id)?;
        Ok(self.evaluate_tweet(tweet))
    }

    /// Evaluate an already-fetched tweet.
    #[must_use]
    pub fn evaluate_tweet(&self, tweet: RemoteTweet) -> Evaluation {
        let alt_texts = alt_texts(&tweet);
        let classification = classify(alt_texts.as_deref());
        let bot_captions = self.caption_missing(&tweet, alt_texts.as_deref());

        debug!("Tweet {} classified as {classification}", tweet.id);

        Evaluation {
            tweet,
            alt_texts,
            classification,
            bot_captions,
        }
    }

    fn caption_missing(
        &self,
        tweet: &RemoteTweet,
        alt_texts: Option<&[Option<String>]>,
    ) -> Vec<Option<String>> {
        let (Some(captioner), Some(texts), Some(media)) =
            (self.captioner, alt_texts, tweet.media.as_deref())
        else {
            return Vec::new();
        };

        texts
            .iter()
            .zip(media)
            .map(|(alt, entity)| {
                if alt.is_some() {
                    return None;
                }
                match captioner.caption(&entity.url) {
                    Ok(caption) => Some(caption),
                    Err(e) => {
                        warn!("Cannot caption {}: {e}", entity.url);
                        None
                    }
                }
            })
            .collect()
    }
}
