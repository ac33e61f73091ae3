//! Reply cache for at-most-once execution.
//!
//! Stores the encoded reply for every request id the server has executed so a
//! retransmission can be answered with the exact same bytes. Entries are
//! never evicted while the server runs.

use std::collections::HashMap;

use tracing::{debug, trace};

/// An encoded reply and how often it has been replayed.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Reply datagram exactly as first sent.
    pub reply: Vec<u8>,
    /// Number of times the reply was served from the cache.
    pub replays: u32,
}

/// Encoded replies keyed by request id.
#[derive(Debug, Default)]
pub struct ReplyCache {
    entries: HashMap<u32, CacheEntry>,
}

impl ReplyCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached reply for `req_id` and counts the replay.
    pub fn replay(&mut self, req_id: u32) -> Option<&[u8]> {
        let entry = self.entries.get_mut(&req_id)?;
        entry.replays += 1;
        debug!(req_id, replays = entry.replays, "Replaying cached reply");
        Some(&entry.reply)
    }

    /// Looks an entry up without counting a replay.
    pub fn get(&self, req_id: u32) -> Option<&CacheEntry> {
        self.entries.get(&req_id)
    }

    /// Returns true if a reply for `req_id` is cached.
    pub fn contains(&self, req_id: u32) -> bool {
        self.entries.contains_key(&req_id)
    }

    /// Stores the reply for a first execution. An existing entry is kept.
    pub fn insert(&mut self, req_id: u32, reply: Vec<u8>) {
        self.entries.entry(req_id).or_insert_with(|| {
            trace!(req_id, len = reply.len(), "Cached reply");
            CacheEntry { reply, replays: 0 }
        });
    }

    /// Returns the number of cached replies.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_replay() {
        let mut cache = ReplyCache::new();
        assert!(cache.replay(1).is_none());

        cache.insert(1, vec![1, 2, 3]);
        assert!(cache.contains(1));
        assert_eq!(cache.replay(1), Some(&[1u8, 2, 3][..]));
        assert_eq!(cache.replay(1), Some(&[1u8, 2, 3][..]));
        assert_eq!(cache.get(1).unwrap().replays, 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn first_reply_wins() {
        let mut cache = ReplyCache::new();
        cache.insert(9, b"first".to_vec());
        cache.insert(9, b"second".to_vec());
        assert_eq!(cache.get(9).unwrap().reply, b"first");
    }

    #[test]
    fn distinct_ids_do_not_collide() {
        let mut cache = ReplyCache::new();
        cache.insert(1, vec![1]);
        cache.insert(2, vec![2]);
        assert_eq!(cache.replay(2), Some(&[2u8][..]));
        assert!(!cache.is_empty());
    }
}
