//! Bounded-depth graph walk over accounts.
//!
//! Commenters of a profile's posts are themselves profiles to visit. Accounts
//! that comment on each other would send a naive recursive walk round in
//! circles, so the walk keeps a visited set and an explicit FIFO frontier.

use std::collections::{HashSet, VecDeque};

/// A node waiting to be visited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontierEntry {
    pub handle: String,
    pub depth: usize,
}

/// Breadth-first frontier with a visited set and a depth bound.
#[derive(Debug, Clone)]
pub struct CrawlFrontier {
    queue: VecDeque<FrontierEntry>,
    visited: HashSet<String>,
    max_depth: usize,
}

impl CrawlFrontier {
    /// `max_depth` is the deepest level that may be visited; seeds sit at depth 0.
    pub fn new(max_depth: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            visited: HashSet::new(),
            max_depth,
        }
    }

    /// Enqueues `handle` at `depth`.
    ///
    /// Returns false, and enqueues nothing, when the handle was already seen
    /// or `depth` exceeds the bound.
    pub fn push(&mut self, handle: &str, depth: usize) -> bool {
        let key = normalize(handle);
        if key.is_empty() || depth > self.max_depth || self.visited.contains(&key) {
            return false;
        }
        self.visited.insert(key.clone());
        self.queue.push_back(FrontierEntry { handle: key, depth });
        true
    }

    pub fn pop(&mut self) -> Option<FrontierEntry> {
        self.queue.pop_front()
    }

    /// Takes up to `limit` entries of the shallowest queued depth.
    ///
    /// Entries are queued in non-decreasing depth order, so a level is fully
    /// drained before the next one starts.
    pub fn next_level(&mut self, limit: usize) -> Vec<FrontierEntry> {
        let Some(depth) = self.queue.front().map(|e| e.depth) else {
            return Vec::new();
        };
        let mut level = Vec::new();
        while level.len() < limit {
            match self.queue.front() {
                Some(entry) if entry.depth == depth => {
                    if let Some(entry) = self.queue.pop_front() {
                        level.push(entry);
                    }
                }
                _ => break,
            }
        }
        level
    }

    /// Whether a node at `depth` may expand its neighbours.
    pub fn can_expand(&self, depth: usize) -> bool {
        depth < self.max_depth
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn visited_count(&self) -> usize {
        self.visited.len()
    }
}

fn normalize(handle: &str) -> String {
    handle.trim().trim_start_matches('@').to_string()
}

/// Extracts the `@handle` from a profile URL, or returns the input unchanged.
///
/// # Examples
///
/// ```
/// use siphon_core::crawl::handle_from_url;
///
/// assert_eq!(handle_from_url("https://www.tiktok.com/@someone?lang=en"), "someone");
/// assert_eq!(handle_from_url("someone"), "someone");
/// ```
pub fn handle_from_url(url: &str) -> &str {
    match url.find("/@") {
        Some(pos) => {
            let rest = &url[pos + 2..];
            let end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
            &rest[..end]
        }
        None => url,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_rejects_revisits() {
        let mut f = CrawlFrontier::new(2);
        assert!(f.push("alice", 0));
        assert!(!f.push("@alice", 1));
        assert!(f.push("bob", 1));
        assert_eq!(f.visited_count(), 2);
    }

    #[test]
    fn test_push_rejects_beyond_depth() {
        let mut f = CrawlFrontier::new(1);
        assert!(f.push("a", 1));
        assert!(!f.push("b", 2));
        assert!(!f.push("", 0));
    }

    #[test]
    fn test_mutual_commenters_terminate() {
        // alice <-> bob comment on each other forever
        let mut f = CrawlFrontier::new(10);
        f.push("alice", 0);
        let mut visits = 0;
        while let Some(entry) = f.pop() {
            visits += 1;
            let other = if entry.handle == "alice" { "bob" } else { "alice" };
            if f.can_expand(entry.depth) {
                f.push(other, entry.depth + 1);
            }
        }
        assert_eq!(visits, 2);
    }

    #[test]
    fn test_next_level_drains_one_depth() {
        let mut f = CrawlFrontier::new(3);
        f.push("a", 0);
        f.push("b", 0);
        f.push("c", 1);

        let level = f.next_level(10);
        assert_eq!(level.len(), 2);
        assert!(level.iter().all(|e| e.depth == 0));

        let level = f.next_level(10);
        assert_eq!(level, vec![FrontierEntry { handle: "c".into(), depth: 1 }]);
        assert!(f.next_level(10).is_empty());
    }

    #[test]
    fn test_next_level_respects_limit() {
        let mut f = CrawlFrontier::new(0);
        for h in ["a", "b", "c"] {
            f.push(h, 0);
        }
        assert_eq!(f.next_level(2).len(), 2);
        assert_eq!(f.next_level(2).len(), 1);
        assert!(f.is_empty());
    }

    #[test]
    fn test_can_expand() {
        let f = CrawlFrontier::new(2);
        assert!(f.can_expand(1));
        assert!(!f.can_expand(2));
    }

    #[test]
    fn test_handle_from_url() {
        assert_eq!(handle_from_url("https://www.tiktok.com/@kamala/video/1"), "kamala");
        assert_eq!(handle_from_url("https://www.tiktok.com/@x#top"), "x");
    }
}
