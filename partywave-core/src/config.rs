use std::{env, time::Duration};

use log::warn;

/// The configuration of the room runtime
#[derive(Debug, Clone)]
pub struct Config {
    /// Namespace prepended to every key written to the runtime store
    pub key_prefix: String,
    /// How long an idle room's runtime state lives before it expires
    pub idle_ttl: Duration,
}

impl Config {
    pub const KEY_PREFIX_VAR: &'static str = "PARTYWAVE_KEY_PREFIX";
    pub const IDLE_TTL_VAR: &'static str = "PARTYWAVE_IDLE_TTL_SECONDS";

    /// Reads the config from the environment, falling back to the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let key_prefix = env::var(Self::KEY_PREFIX_VAR).unwrap_or(defaults.key_prefix);
        let idle_ttl = env::var(Self::IDLE_TTL_VAR)
            .ok()
            .and_then(|value| match value.parse::<u64>() {
                Ok(seconds) => Some(Duration::from_secs(seconds)),
                Err(_) => {
                    warn!("Ignoring {}={}, not a number of seconds", Self::IDLE_TTL_VAR, value);
                    None
                }
            })
            .unwrap_or(defaults.idle_ttl);

        Self {
            key_prefix,
            idle_ttl,
        }
    }

    /// How many votes are needed for a threshold action to fire.
    ///
    /// This is a strict majority rounded up: `ceil(online / 2)`.
    /// Nothing can fire in an empty room, since the result is then zero.
    pub fn required_votes(online_members: u64) -> u64 {
        online_members.div_ceil(2)
    }

    /// Returns true if `votes` satisfies the threshold for `online_members`.
    pub fn threshold_reached(votes: u64, online_members: u64) -> bool {
        let required = Self::required_votes(online_members);
        required > 0 && votes >= required
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            key_prefix: "partywave:".to_string(),
            // An hour is enough for everyone to come back after a disconnect
            idle_ttl: Duration::from_secs(60 * 60),
        }
    }
}
