// Discord commands module.
// Each feature gets its own command file.

pub mod help;

pub mod moderation;

use moderation::{Data, Error};

/// Every command the framework registers.
pub fn all() -> Vec<poise::Command<Data, Error>> {
    vec![
        help::help(),
        moderation::warn(),
        moderation::ban(),
        moderation::purge(),
        moderation::rule(),
        moderation::modstats(),
        moderation::modlogs(),
    ]
}
