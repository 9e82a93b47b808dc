//! In-memory capture sessions for free-text bulk role id input.
//!
//! A staff member asks to type a list of role ids instead of picking them
//! from a 25-option select menu. The session pins the guild and channel the
//! ids must arrive in and expires after a short TTL.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use tracing::debug;

const CANCEL_KEYWORDS: [&str; 3] = ["cancelar", "cancel", "sair"];

static TOKEN_SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s,;]+").expect("valid regex"));
static SNOWFLAKE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{17,20}$").expect("valid regex"));

/// Which configured role list a capture session feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureTarget {
    FullEligible,
    LiteEligible,
}

#[derive(Debug, Clone)]
pub struct CaptureSession {
    pub guild_id: String,
    pub channel_id: String,
    pub target: CaptureTarget,
    expires_at: Instant,
}

/// An incoming chat message, reduced to the fields the capture flow needs.
#[derive(Debug, Clone)]
pub struct CaptureMessage {
    pub author_id: String,
    pub author_is_bot: bool,
    pub guild_id: String,
    pub channel_id: String,
    pub content: String,
    pub has_manage_guild: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// Not capture input at all: no session, wrong place, or a bot author.
    Ignored,
    Cancelled,
    /// The author lost the required permission since starting the session.
    PermissionDenied,
    /// Nothing in the message looked like a role id. The session stays open
    /// so the author can retry.
    NoValidIds { invalid: Vec<String> },
    /// Ids parsed but none matched an existing role. The session stays open.
    NoneResolved {
        invalid: Vec<String>,
        not_found: Vec<String>,
    },
    Captured {
        target: CaptureTarget,
        role_ids: Vec<String>,
        invalid: Vec<String>,
        not_found: Vec<String>,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedIds {
    pub valid: Vec<String>,
    pub invalid: Vec<String>,
}

/// Splits free text into candidate role ids. Mention decoration is stripped
/// per token, ids are deduplicated preserving first-seen order, and anything
/// that does not look like a snowflake is reported back rather than dropped.
pub fn parse_id_list(input: &str) -> ParsedIds {
    let mut parsed = ParsedIds::default();
    let mut seen = HashSet::new();

    for token in TOKEN_SEPARATORS.split(input) {
        if token.is_empty() {
            continue;
        }
        let stripped = token.trim_matches(|c| matches!(c, '<' | '@' | '&' | '#' | '>'));
        if stripped.is_empty() {
            continue;
        }
        if SNOWFLAKE.is_match(stripped) {
            if seen.insert(stripped.to_string()) {
                parsed.valid.push(stripped.to_string());
            }
        } else {
            parsed.invalid.push(token.to_string());
        }
    }

    parsed
}

pub struct SessionStore {
    ttl: Duration,
    sessions: Mutex<HashMap<String, CaptureSession>>,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Starts (or restarts) a capture session for a user. An existing session
    /// for the same user is overwritten.
    pub fn start(&self, user_id: &str, guild_id: &str, channel_id: &str, target: CaptureTarget) {
        let session = CaptureSession {
            guild_id: guild_id.to_string(),
            channel_id: channel_id.to_string(),
            target,
            expires_at: Instant::now() + self.ttl,
        };
        self.sessions
            .lock()
            .insert(user_id.to_string(), session);
        debug!(user_id = user_id, guild_id = guild_id, "capture session started");
    }

    /// Returns the live session for a user. Expired entries are evicted on
    /// read, independent of the periodic sweep.
    pub fn get(&self, user_id: &str) -> Option<CaptureSession> {
        let mut sessions = self.sessions.lock();
        match sessions.get(user_id) {
            Some(session) if session.expires_at > Instant::now() => Some(session.clone()),
            Some(_) => {
                sessions.remove(user_id);
                None
            }
            None => None,
        }
    }

    pub fn clear(&self, user_id: &str) {
        self.sessions.lock().remove(user_id);
    }

    /// Evicts every expired session, returning how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut sessions = self.sessions.lock();
        let before = sessions.len();
        sessions.retain(|_, session| session.expires_at > now);
        before - sessions.len()
    }

    /// Runs `sweep_expired` on a fixed interval for the life of the process.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let evicted = store.sweep_expired();
                if evicted > 0 {
                    debug!(evicted = evicted, "expired capture sessions evicted");
                }
            }
        })
    }

    /// Classifies an incoming message against the author's capture session.
    /// `role_exists` answers whether a parsed id names a real role in the
    /// session's guild.
    pub fn process_message(
        &self,
        message: &CaptureMessage,
        role_exists: impl Fn(&str) -> bool,
    ) -> CaptureOutcome {
        if message.author_is_bot {
            return CaptureOutcome::Ignored;
        }

        let session = match self.get(&message.author_id) {
            Some(session) => session,
            None => return CaptureOutcome::Ignored,
        };

        if session.guild_id != message.guild_id || session.channel_id != message.channel_id {
            return CaptureOutcome::Ignored;
        }

        let trimmed = message.content.trim().to_lowercase();
        if CANCEL_KEYWORDS.contains(&trimmed.as_str()) {
            self.clear(&message.author_id);
            return CaptureOutcome::Cancelled;
        }

        if !message.has_manage_guild {
            self.clear(&message.author_id);
            return CaptureOutcome::PermissionDenied;
        }

        let parsed = parse_id_list(&message.content);
        if parsed.valid.is_empty() {
            return CaptureOutcome::NoValidIds {
                invalid: parsed.invalid,
            };
        }

        let (role_ids, not_found): (Vec<String>, Vec<String>) =
            parsed.valid.into_iter().partition(|id| role_exists(id));

        if role_ids.is_empty() {
            return CaptureOutcome::NoneResolved {
                invalid: parsed.invalid,
                not_found,
            };
        }

        self.clear(&message.author_id);
        CaptureOutcome::Captured {
            target: session.target,
            role_ids,
            invalid: parsed.invalid,
            not_found,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{CaptureMessage, CaptureOutcome, CaptureTarget, SessionStore, parse_id_list};

    fn message(author_id: &str, content: &str) -> CaptureMessage {
        CaptureMessage {
            author_id: author_id.to_string(),
            author_is_bot: false,
            guild_id: "guild-1".to_string(),
            channel_id: "chan-1".to_string(),
            content: content.to_string(),
            has_manage_guild: true,
        }
    }

    #[test]
    fn mention_decoration_is_stripped_and_invalid_tokens_reported() {
        let parsed = parse_id_list("123456789012345678, <@&234567890123456789> notanid");
        assert_eq!(
            parsed.valid,
            vec![
                "123456789012345678".to_string(),
                "234567890123456789".to_string()
            ]
        );
        assert_eq!(parsed.invalid, vec!["notanid".to_string()]);
    }

    #[test]
    fn duplicate_ids_keep_first_seen_order() {
        let parsed = parse_id_list(
            "234567890123456789 123456789012345678; 234567890123456789\n123456789012345678",
        );
        assert_eq!(
            parsed.valid,
            vec![
                "234567890123456789".to_string(),
                "123456789012345678".to_string()
            ]
        );
        assert!(parsed.invalid.is_empty());
    }

    #[test]
    fn session_is_retrievable_until_cleared() {
        let store = SessionStore::new(Duration::from_secs(180));
        store.start("user-1", "guild-1", "chan-1", CaptureTarget::FullEligible);

        assert!(store.get("user-1").is_some());
        store.clear("user-1");
        assert!(store.get("user-1").is_none());
    }

    #[test]
    fn expired_session_is_evicted_on_read() {
        let store = SessionStore::new(Duration::from_millis(10));
        store.start("user-1", "guild-1", "chan-1", CaptureTarget::FullEligible);

        std::thread::sleep(Duration::from_millis(30));
        assert!(store.get("user-1").is_none());
    }

    #[test]
    fn sweep_evicts_expired_sessions() {
        let store = SessionStore::new(Duration::from_millis(10));
        store.start("user-1", "guild-1", "chan-1", CaptureTarget::FullEligible);
        store.start("user-2", "guild-1", "chan-1", CaptureTarget::LiteEligible);

        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(store.sweep_expired(), 2);
        assert_eq!(store.sweep_expired(), 0);
    }

    #[test]
    fn messages_outside_the_session_location_are_ignored() {
        let store = SessionStore::new(Duration::from_secs(180));
        store.start("user-1", "guild-1", "chan-1", CaptureTarget::FullEligible);

        let mut wrong_channel = message("user-1", "123456789012345678");
        wrong_channel.channel_id = "chan-2".to_string();
        assert_eq!(
            store.process_message(&wrong_channel, |_| true),
            CaptureOutcome::Ignored
        );

        let no_session = message("user-2", "123456789012345678");
        assert_eq!(
            store.process_message(&no_session, |_| true),
            CaptureOutcome::Ignored
        );

        let mut bot = message("user-1", "123456789012345678");
        bot.author_is_bot = true;
        assert_eq!(store.process_message(&bot, |_| true), CaptureOutcome::Ignored);

        // The session survives all of the above.
        assert!(store.get("user-1").is_some());
    }

    #[test]
    fn cancel_keyword_clears_the_session() {
        let store = SessionStore::new(Duration::from_secs(180));
        store.start("user-1", "guild-1", "chan-1", CaptureTarget::FullEligible);

        assert_eq!(
            store.process_message(&message("user-1", "  Cancelar "), |_| true),
            CaptureOutcome::Cancelled
        );
        assert!(store.get("user-1").is_none());
    }

    #[test]
    fn lost_permission_clears_the_session() {
        let store = SessionStore::new(Duration::from_secs(180));
        store.start("user-1", "guild-1", "chan-1", CaptureTarget::FullEligible);

        let mut demoted = message("user-1", "123456789012345678");
        demoted.has_manage_guild = false;
        assert_eq!(
            store.process_message(&demoted, |_| true),
            CaptureOutcome::PermissionDenied
        );
        assert!(store.get("user-1").is_none());
    }

    #[test]
    fn unusable_input_keeps_the_session_open() {
        let store = SessionStore::new(Duration::from_secs(180));
        store.start("user-1", "guild-1", "chan-1", CaptureTarget::FullEligible);

        assert_eq!(
            store.process_message(&message("user-1", "nothing here"), |_| true),
            CaptureOutcome::NoValidIds {
                invalid: vec!["nothing".to_string(), "here".to_string()],
            }
        );
        assert!(store.get("user-1").is_some());

        assert_eq!(
            store.process_message(&message("user-1", "123456789012345678"), |_| false),
            CaptureOutcome::NoneResolved {
                invalid: Vec::new(),
                not_found: vec!["123456789012345678".to_string()],
            }
        );
        assert!(store.get("user-1").is_some());
    }

    #[test]
    fn successful_capture_consumes_the_session() {
        let store = SessionStore::new(Duration::from_secs(180));
        store.start("user-1", "guild-1", "chan-1", CaptureTarget::LiteEligible);

        let outcome = store.process_message(
            &message("user-1", "123456789012345678 <#234567890123456789> junk"),
            |id| id == "123456789012345678",
        );
        assert_eq!(
            outcome,
            CaptureOutcome::Captured {
                target: CaptureTarget::LiteEligible,
                role_ids: vec!["123456789012345678".to_string()],
                invalid: vec!["junk".to_string()],
                not_found: vec!["234567890123456789".to_string()],
            }
        );
        assert!(store.get("user-1").is_none());
    }
}
