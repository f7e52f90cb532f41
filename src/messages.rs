//! Canned outbound message templates.
//!
//! The bot speaks Spanish, matching its home audience. Templates are kept as
//! plain functions so callers never touch the raw strings.

/// Twitter's help article on image descriptions.
pub const ALT_TEXT_TUTORIAL_URL: &str =
    "https://help.twitter.com/es/using-twitter/picture-descriptions";

/// Direct message sent to a follower whose tweet is missing alt text.
#[must_use]
pub fn dm_missing_alt_text(tweet_url: &str) -> String {
    format!(
        "Este tweet sería más inclusivo con el uso de textos alternativos (alt_text) \
         para describir todas sus imágenes... {tweet_url}. Este artículo podría ayudar: \
         {ALT_TEXT_TUTORIAL_URL}\nGracias por seguirme!"
    )
}

/// Public reply used when the DM to a follower could not be delivered.
#[must_use]
pub fn reply_dm_unavailable() -> String {
    format!(
        "☝️ Este tweet sería más inclusivo con el uso de textos alternativos (alt_text) \
         para describir todas sus imágenes... Este artículo podría ayudar: \
         {ALT_TEXT_TUTORIAL_URL}\nGracias por seguirme! \
         Mandame DM para recordarte por ahí a futuro 😉"
    )
}

/// Public nudge reply for a non-follower whose tweet is missing alt text.
#[must_use]
pub fn reply_missing_alt_text() -> String {
    format!(
        "☝️ Este tweet sería más inclusivo con el uso de textos alternativos (alt_text) \
         para describir todas sus imágenes... Este artículo te podría ayudar: \
         {ALT_TEXT_TUTORIAL_URL}"
    )
}

/// Reply to a query about a tweet that turned out to carry no images.
#[must_use]
pub fn reply_no_images_found(screen_name: &str) -> String {
    format!("No encontré imágenes en el tweet de @{screen_name} 🔍")
}

/// Reply to a query about a tweet with incomplete alt text.
#[must_use]
pub fn reply_query_missing_alt_text(screen_name: &str) -> String {
    format!(
        "Encontré imágenes sin texto alternativo en el tweet de @{screen_name} 😔 \
         Este artículo podría ayudar: {ALT_TEXT_TUTORIAL_URL}"
    )
}

/// Reply to a query about a fully compliant tweet.
#[must_use]
pub fn reply_query_full_alt_text(screen_name: &str) -> String {
    format!("Todas las imágenes del tweet de @{screen_name} tienen texto alternativo 🎉")
}

/// One report line for an account with recorded image history.
#[must_use]
pub fn report_line(screen_name: &str, percentage: f64, n_images: i64) -> String {
    format!("@{screen_name}: {percentage:.0}% de {n_images} imágenes con texto alternativo")
}

/// One report line for an account with no recorded images.
#[must_use]
pub fn report_line_no_images(screen_name: &str) -> String {
    format!("@{screen_name}: no encontré imágenes recientes")
}

/// Header framing the usage report.
#[must_use]
pub fn report_header() -> String {
    "📋 Reporte de uso de textos alternativos:".to_string()
}

/// Footer framing the usage report.
#[must_use]
pub fn report_footer() -> String {
    format!("Más info sobre textos alternativos: {ALT_TEXT_TUTORIAL_URL}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn templates_embed_arguments() {
        let dm = dm_missing_alt_text("https://twitter.com/a/status/1");
        assert!(dm.contains("https://twitter.com/a/status/1"));
        assert!(dm.contains(ALT_TEXT_TUTORIAL_URL));

        assert!(reply_no_images_found("alice").contains("@alice"));
        assert!(report_line("bob", 75.0, 8).contains("75%"));
    }
}
