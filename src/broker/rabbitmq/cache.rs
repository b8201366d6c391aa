// Copyright 2018-2019 Parity Technologies (UK) Ltd.
// This file is part of jobrelay.

// jobrelay is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// jobrelay is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with jobrelay.  If not, see <http://www.gnu.org/licenses/>.

//! A bounded, LRU-by-insertion cache of result messages that arrived on a
//! shared reply queue for some job other than the one currently being
//! awaited.

use std::collections::{HashMap, VecDeque};

/// At most this many entries...
const MAX_ENTRIES: usize = 102_400;
/// ...or this many encoded bytes, whichever binds first.
const MAX_BYTES: usize = 10 * 1024 * 1024;

#[derive(Default)]
pub struct ResultCache {
    entries: HashMap<String, Vec<u8>>,
    order: VecDeque<String>,
    total_bytes: usize,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, correlation_id: &str) -> Option<&[u8]> {
        self.entries.get(correlation_id).map(|v| v.as_slice())
    }

    /// Remove and return a cached result, if present.
    pub fn take(&mut self, correlation_id: &str) -> Option<Vec<u8>> {
        if let Some(body) = self.entries.remove(correlation_id) {
            self.total_bytes -= body.len();
            if let Some(pos) = self.order.iter().position(|k| k == correlation_id) {
                self.order.remove(pos);
            }
            Some(body)
        } else {
            None
        }
    }

    /// Insert a result message, evicting the least-recently-inserted entry
    /// as many times as necessary to respect both bounds.
    pub fn insert(&mut self, correlation_id: String, body: Vec<u8>) {
        if let Some(old) = self.entries.remove(&correlation_id) {
            self.total_bytes -= old.len();
            if let Some(pos) = self.order.iter().position(|k| k == &correlation_id) {
                self.order.remove(pos);
            }
        }

        self.total_bytes += body.len();
        self.order.push_back(correlation_id.clone());
        self.entries.insert(correlation_id, body);

        self.evict_if_needed();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn evict_if_needed(&mut self) {
        while self.entries.len() > MAX_ENTRIES || self.total_bytes > MAX_BYTES {
            let oldest = match self.order.pop_front() {
                Some(key) => key,
                None => break,
            };
            if let Some(body) = self.entries.remove(&oldest) {
                self.total_bytes -= body.len();
                tracing::warn!(
                    correlation_id = %oldest,
                    "evicting cached result before it was collected; a waiter for this job may now block forever"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_take_round_trips() {
        let mut cache = ResultCache::new();
        cache.insert("job-a".into(), b"hello".to_vec());
        assert_eq!(cache.take("job-a"), Some(b"hello".to_vec()));
        assert!(cache.is_empty());
    }

    #[test]
    fn take_is_a_one_shot_removal() {
        let mut cache = ResultCache::new();
        cache.insert("job-a".into(), b"hello".to_vec());
        cache.take("job-a");
        assert_eq!(cache.take("job-a"), None);
    }

    #[test]
    fn eviction_at_entry_capacity_drops_exactly_one_oldest_entry() {
        let mut cache = ResultCache::new();
        for i in 0..MAX_ENTRIES {
            cache.insert(format!("job-{}", i), vec![0u8; 1]);
        }
        assert_eq!(cache.len(), MAX_ENTRIES);

        cache.insert("job-new".into(), vec![0u8; 1]);

        assert_eq!(cache.len(), MAX_ENTRIES);
        assert!(cache.get("job-0").is_none());
        assert!(cache.get("job-new").is_some());
    }

    #[test]
    fn eviction_at_byte_capacity_drops_oldest_entries() {
        let mut cache = ResultCache::new();
        let chunk = vec![0u8; MAX_BYTES / 2];
        cache.insert("job-1".into(), chunk.clone());
        cache.insert("job-2".into(), chunk.clone());
        // A third insertion of this size must evict at least job-1.
        cache.insert("job-3".into(), chunk);
        assert!(cache.get("job-1").is_none());
        assert!(cache.get("job-3").is_some());
    }

    #[test]
    fn other_jobs_result_is_retrievable_after_being_cached() {
        let mut cache = ResultCache::new();
        cache.insert("job-b".into(), b"for-b".to_vec());
        // job-a's sync call consults the cache for its own id and misses...
        assert!(cache.get("job-a").is_none());
        // ...but job-b's own consumer can still retrieve its cached result.
        assert_eq!(cache.take("job-b"), Some(b"for-b".to_vec()));
    }
}
