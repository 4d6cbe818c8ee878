//! Read-through cache for thread and message lists
//!
//! Entries are fresh for `ttl` after they were fetched. Marking a thread dirty
//! forces the next read of its messages (and of the thread list) to go to the
//! gateway regardless of age. Stale entries stay readable so the UI can keep
//! showing them while a refresh fails.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use tokio::time::Instant;

use crate::types::{Message, Thread};

/// Result of a cache read
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<T> {
    /// Within TTL and not invalidated
    Fresh(T),
    /// Present but expired or invalidated
    Stale(T),
    Missing,
}

impl<T> Lookup<T> {
    pub fn fresh(self) -> Option<T> {
        match self {
            Lookup::Fresh(value) => Some(value),
            _ => None,
        }
    }

    /// The cached value regardless of freshness
    pub fn any(self) -> Option<T> {
        match self {
            Lookup::Fresh(value) | Lookup::Stale(value) => Some(value),
            Lookup::Missing => None,
        }
    }
}

#[derive(Debug, Clone)]
struct Entry<T> {
    value: T,
    fetched_at: Instant,
}

/// Thread list and per-thread message lists with an explicit dirty set
#[derive(Debug)]
pub struct ThreadCache {
    ttl: Duration,
    threads: Option<Entry<Vec<Thread>>>,
    threads_dirty: bool,
    messages: HashMap<String, Entry<Vec<Message>>>,
    dirty: HashSet<String>,
}

impl ThreadCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            threads: None,
            threads_dirty: false,
            messages: HashMap::new(),
            dirty: HashSet::new(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn threads(&self) -> Lookup<Vec<Thread>> {
        match &self.threads {
            Some(entry) if !self.threads_dirty && self.is_within_ttl(entry.fetched_at) => {
                Lookup::Fresh(entry.value.clone())
            }
            Some(entry) => Lookup::Stale(entry.value.clone()),
            None => Lookup::Missing,
        }
    }

    pub fn store_threads(&mut self, threads: Vec<Thread>) {
        self.threads = Some(Entry {
            value: threads,
            fetched_at: Instant::now(),
        });
        self.threads_dirty = false;
    }

    /// Whether `thread_id` appears in the cached thread list
    pub fn knows_thread(&self, thread_id: &str) -> bool {
        self.threads.as_ref().is_some_and(|entry| {
            entry
                .value
                .iter()
                .any(|t| t.id.as_deref() == Some(thread_id))
        })
    }

    /// Insert or replace one thread in the cached list without refreshing its age
    pub fn upsert_thread(&mut self, thread: Thread) {
        let Some(id) = thread.id.clone() else {
            return;
        };
        match &mut self.threads {
            Some(entry) => {
                entry.value.retain(|t| t.id.as_deref() != Some(id.as_str()));
                entry.value.insert(0, thread);
            }
            None => {
                self.threads = Some(Entry {
                    value: vec![thread],
                    fetched_at: Instant::now(),
                });
                self.threads_dirty = true;
            }
        }
    }

    pub fn messages(&self, thread_id: &str) -> Lookup<Vec<Message>> {
        match self.messages.get(thread_id) {
            Some(entry) if !self.dirty.contains(thread_id) && self.is_within_ttl(entry.fetched_at) => {
                Lookup::Fresh(entry.value.clone())
            }
            Some(entry) => Lookup::Stale(entry.value.clone()),
            None => Lookup::Missing,
        }
    }

    pub fn store_messages(&mut self, thread_id: &str, messages: Vec<Message>) {
        self.messages.insert(
            thread_id.to_string(),
            Entry {
                value: messages,
                fetched_at: Instant::now(),
            },
        );
        self.dirty.remove(thread_id);
    }

    /// Force the next read of this thread's messages and of the thread list
    /// to bypass the TTL
    pub fn invalidate_thread(&mut self, thread_id: &str) {
        self.dirty.insert(thread_id.to_string());
        self.threads_dirty = true;
    }

    pub fn invalidate_threads(&mut self) {
        self.threads_dirty = true;
    }

    pub fn is_dirty(&self, thread_id: &str) -> bool {
        self.dirty.contains(thread_id)
    }

    /// Forget a deleted thread
    pub fn remove_thread(&mut self, thread_id: &str) {
        self.messages.remove(thread_id);
        self.dirty.remove(thread_id);
        if let Some(entry) = &mut self.threads {
            entry
                .value
                .retain(|t| t.id.as_deref() != Some(thread_id));
        }
        self.threads_dirty = true;
    }

    pub fn clear(&mut self) {
        self.threads = None;
        self.threads_dirty = false;
        self.messages.clear();
        self.dirty.clear();
    }

    fn is_within_ttl(&self, fetched_at: Instant) -> bool {
        fetched_at.elapsed() < self.ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn thread(id: &str) -> Thread {
        let now = Utc::now();
        Thread {
            id: Some(id.to_string()),
            title: Some(format!("Thread {}", id)),
            created_at: now,
            updated_at: now,
        }
    }

    fn message(id: &str, content: &str) -> Message {
        Message::persisted(id, crate::MessageRole::User, content, Utc::now())
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire_after_ttl() {
        let mut cache = ThreadCache::new(Duration::from_secs(30));
        cache.store_messages("t1", vec![message("m1", "hello")]);
        assert!(matches!(cache.messages("t1"), Lookup::Fresh(_)));

        tokio::time::advance(Duration::from_secs(31)).await;

        match cache.messages("t1") {
            Lookup::Stale(messages) => assert_eq!(messages.len(), 1),
            other => panic!("expected stale entry, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidation_bypasses_ttl() {
        let mut cache = ThreadCache::new(Duration::from_secs(30));
        cache.store_threads(vec![thread("t1")]);
        cache.store_messages("t1", vec![message("m1", "hello")]);

        cache.invalidate_thread("t1");

        assert!(cache.is_dirty("t1"));
        assert!(matches!(cache.messages("t1"), Lookup::Stale(_)));
        assert!(matches!(cache.threads(), Lookup::Stale(_)));

        cache.store_messages("t1", vec![message("m1", "hello"), message("m2", "reply")]);
        assert!(!cache.is_dirty("t1"));
        assert_eq!(cache.messages("t1").fresh().map(|m| m.len()), Some(2));
    }

    #[tokio::test]
    async fn test_missing_entries() {
        let cache = ThreadCache::new(Duration::from_secs(30));
        assert_eq!(cache.threads(), Lookup::Missing);
        assert_eq!(cache.messages("nope"), Lookup::Missing);
        assert!(cache.messages("nope").any().is_none());
    }

    #[tokio::test]
    async fn test_remove_thread_drops_messages_and_list_entry() {
        let mut cache = ThreadCache::new(Duration::from_secs(30));
        cache.store_threads(vec![thread("t1"), thread("t2")]);
        cache.store_messages("t1", vec![message("m1", "hello")]);

        cache.remove_thread("t1");

        assert_eq!(cache.messages("t1"), Lookup::Missing);
        assert!(!cache.knows_thread("t1"));
        let remaining = cache.threads().any().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id.as_deref(), Some("t2"));
    }

    #[tokio::test]
    async fn test_upsert_moves_thread_to_front() {
        let mut cache = ThreadCache::new(Duration::from_secs(30));
        cache.store_threads(vec![thread("t1"), thread("t2")]);

        cache.upsert_thread(thread("t2"));

        let threads = cache.threads().any().unwrap();
        let ids: Vec<_> = threads.iter().filter_map(|t| t.id.as_deref()).collect();
        assert_eq!(ids, vec!["t2", "t1"]);
    }

    #[tokio::test]
    async fn test_draft_threads_are_never_cached() {
        let mut cache = ThreadCache::new(Duration::from_secs(30));
        cache.upsert_thread(Thread::draft(Utc::now()));
        assert_eq!(cache.threads(), Lookup::Missing);
    }
}
