//! CLI definitions for altbot.
//!
//! Uses clap for argument parsing with derive macros. The bot is driven by
//! use-case flags rather than subcommands: a single cron invocation usually
//! combines several of them.

use clap::Parser;
use std::path::PathBuf;

/// altbot - Twitter accessibility bot for alt-text usage
#[derive(Parser, Debug)]
#[command(name = "altbot")]
#[command(version)]
#[command(about = "Rewards tweets with image descriptions and nudges authors who skip them")]
#[command(long_about = r#"
altbot inspects tweets for image alt-text. Compliant tweets get a like;
non-compliant followers get a gentle DM (with consent) or reply. Users can
mention the bot to query a specific tweet or request a usage report for
other accounts.

Without --live nothing is sent: every outbound action is only logged.
"#)]
pub struct Cli {
    /// Update the local mirror of followers, friends, and DM opt-ins
    #[arg(long, short = 'u')]
    pub update_users: bool,

    /// Run the watch-alt-text pass over all followers
    #[arg(long = "watch-followers", short = 'w')]
    pub watch_followers: bool,

    /// Run the watch-alt-text pass over friends that are not followers
    #[arg(long = "watch-friends", short = 'W')]
    pub watch_friends: bool,

    /// Process tweets that mention the bot since the last run
    #[arg(long, short = 'p')]
    pub process_mentions: bool,

    /// Send a DM to every follower; literal text or a path to a text file
    #[arg(long, short = 'm', value_name = "TEXT|FILE")]
    pub message: Option<String>,

    /// Print the top-N accounts by alt-text image count
    #[arg(long, value_name = "N")]
    pub top_users: Option<usize>,

    /// Actually send DMs, tweets, and favs. Omit during development
    #[arg(long, short = 'l')]
    pub live: bool,

    /// Path to the database file
    #[arg(long, env = "ALTBOT_DB")]
    pub db: Option<PathBuf>,

    /// Path to a config file (default: ~/.config/altbot/config.toml)
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Be verbose (show debug info)
    #[arg(long, short = 'v')]
    pub verbose: bool,

    /// Be quiet (suppress non-error output)
    #[arg(long, short = 'q')]
    pub quiet: bool,
}

impl Cli {
    /// Whether any use case was requested at all.
    #[must_use]
    pub fn has_work(&self) -> bool {
        self.update_users
            || self.watch_followers
            || self.watch_friends
            || self.process_mentions
            || self.message.is_some()
            || self.top_users.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn no_flags_means_no_work() {
        let cli = Cli::parse_from(["altbot"]);
        assert!(!cli.has_work());
        assert!(!cli.live);
    }

    #[test]
    fn combined_use_case_flags() {
        let cli = Cli::parse_from(["altbot", "-u", "-w", "--process-mentions", "--live"]);
        assert!(cli.update_users);
        assert!(cli.watch_followers);
        assert!(!cli.watch_friends);
        assert!(cli.process_mentions);
        assert!(cli.live);
        assert!(cli.has_work());
    }
}
