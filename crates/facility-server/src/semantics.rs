//! Invocation semantics for retried requests.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::cache::ReplyCache;

/// How the server treats a request id it has already seen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InvocationSemantics {
    /// Execute every request, retransmissions included.
    #[default]
    AtLeastOnce,
    /// Execute each request id once; answer retransmissions from the cache.
    AtMostOnce,
}

impl fmt::Display for InvocationSemantics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AtLeastOnce => f.write_str("at-least-once"),
            Self::AtMostOnce => f.write_str("at-most-once"),
        }
    }
}

impl FromStr for InvocationSemantics {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "at-least-once" | "atleast" => Ok(Self::AtLeastOnce),
            "at-most-once" | "atmost" => Ok(Self::AtMostOnce),
            _ => Err(format!(
                "unknown invocation semantics {s:?} (expected at-least-once or at-most-once)"
            )),
        }
    }
}

/// Duplicate filter in front of the dispatcher.
///
/// Under at-most-once, [`InvocationLayer::replay`] answers a known request id
/// and [`InvocationLayer::remember`] stores the reply of a first execution.
/// Under at-least-once both are no-ops and nothing is cached.
#[derive(Debug)]
pub struct InvocationLayer {
    semantics: InvocationSemantics,
    cache: ReplyCache,
}

impl InvocationLayer {
    pub fn new(semantics: InvocationSemantics) -> Self {
        Self {
            semantics,
            cache: ReplyCache::new(),
        }
    }

    pub fn semantics(&self) -> InvocationSemantics {
        self.semantics
    }

    /// Cached reply for a retransmitted request, if it must not run again.
    pub fn replay(&mut self, req_id: u32) -> Option<Vec<u8>> {
        match self.semantics {
            InvocationSemantics::AtLeastOnce => None,
            InvocationSemantics::AtMostOnce => self.cache.replay(req_id).map(<[u8]>::to_vec),
        }
    }

    /// Records the reply of a first execution, whether it succeeded or not.
    pub fn remember(&mut self, req_id: u32, reply: &[u8]) {
        if self.semantics == InvocationSemantics::AtMostOnce {
            self.cache.insert(req_id, reply.to_vec());
        }
    }

    /// The underlying cache.
    pub fn cache(&self) -> &ReplyCache {
        &self.cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display() {
        assert_eq!(
            "at-most-once".parse::<InvocationSemantics>().unwrap(),
            InvocationSemantics::AtMostOnce
        );
        assert_eq!(
            "AT_LEAST_ONCE".parse::<InvocationSemantics>().unwrap(),
            InvocationSemantics::AtLeastOnce
        );
        assert_eq!(
            "atmost".parse::<InvocationSemantics>().unwrap(),
            InvocationSemantics::AtMostOnce
        );
        assert!("exactly-once".parse::<InvocationSemantics>().is_err());
        assert_eq!(InvocationSemantics::AtMostOnce.to_string(), "at-most-once");
    }

    #[test]
    fn at_least_once_never_caches() {
        let mut layer = InvocationLayer::new(InvocationSemantics::AtLeastOnce);
        layer.remember(5, b"reply");
        assert!(layer.replay(5).is_none());
        assert!(layer.cache().is_empty());
    }

    #[test]
    fn at_most_once_replays_first_reply() {
        let mut layer = InvocationLayer::new(InvocationSemantics::AtMostOnce);
        assert!(layer.replay(5).is_none());
        layer.remember(5, b"reply");
        assert_eq!(layer.replay(5).as_deref(), Some(&b"reply"[..]));
        assert!(layer.replay(6).is_none());
    }
}
