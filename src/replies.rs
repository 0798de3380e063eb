use std::collections::HashMap;

use anyhow::Result;
use tracing::{debug, warn};

use crate::model::{Post, Reply};

#[derive(Debug, Clone, Default)]
pub struct ReplyThread {
    pub replies: Vec<Reply>,
    pub expanded: bool,
    pub refresh_token: u64,
    pub loading: bool,
    loaded_token: Option<u64>,
    pending: Option<(u64, u64)>,
}

impl ReplyThread {
    pub fn is_loaded(&self) -> bool {
        self.loaded_token.is_some()
    }

    pub fn is_stale(&self) -> bool {
        self.loaded_token != Some(self.refresh_token)
    }

    fn needs_fetch(&self) -> bool {
        let fetching_current = matches!(self.pending, Some((_, token)) if token == self.refresh_token);
        self.expanded && self.is_stale() && !fetching_current
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyTicket {
    pub post_id: i64,
    pub token: u64,
    seq: u64,
}

#[derive(Debug, Default)]
pub struct ReplyAggregator {
    threads: HashMap<i64, ReplyThread>,
    next_seq: u64,
}

impl ReplyAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn thread(&self, post_id: i64) -> Option<&ReplyThread> {
        self.threads.get(&post_id)
    }

    pub fn is_loading(&self) -> bool {
        self.threads.values().any(|thread| thread.loading)
    }

    /// Shows a thread, creating it on first use. Returns the fetch to run, if
    /// the thread has nothing current to show.
    pub fn expand(&mut self, post_id: i64) -> Option<ReplyTicket> {
        self.threads.entry(post_id).or_default().expanded = true;
        self.fetch_if_needed(post_id)
    }

    pub fn collapse(&mut self, post_id: i64) {
        if let Some(thread) = self.threads.get_mut(&post_id) {
            thread.expanded = false;
        }
    }

    /// Records a reply the viewer just posted: the parent's count goes up, the
    /// thread opens, and it is refetched so the new reply shows.
    pub fn notify_reply_created(
        &mut self,
        post_id: i64,
        post: Option<&mut Post>,
    ) -> Option<ReplyTicket> {
        if let Some(post) = post {
            post.reply_count = post.reply_count.saturating_add(1);
        }
        let thread = self.threads.entry(post_id).or_default();
        thread.refresh_token = thread.refresh_token.wrapping_add(1);
        thread.expanded = true;
        self.fetch_if_needed(post_id)
    }

    /// Stores fetched replies. Responses for superseded fetches are dropped,
    /// and a failed fetch keeps whatever was shown before.
    pub fn complete(&mut self, ticket: ReplyTicket, result: Result<Vec<Reply>>) -> bool {
        let Some(thread) = self.threads.get_mut(&ticket.post_id) else {
            return false;
        };
        if thread.pending.map(|(seq, _)| seq) != Some(ticket.seq) {
            debug!(post_id = ticket.post_id, "dropping stale replies response");
            return false;
        }
        thread.pending = None;
        thread.loading = false;
        match result {
            Ok(replies) => {
                thread.replies = replies;
                thread.loaded_token = Some(ticket.token);
            }
            Err(err) => {
                warn!(post_id = ticket.post_id, "failed to fetch replies: {err:#}");
            }
        }
        true
    }

    fn fetch_if_needed(&mut self, post_id: i64) -> Option<ReplyTicket> {
        let thread = self.threads.get_mut(&post_id)?;
        if !thread.needs_fetch() {
            return None;
        }
        self.next_seq = self.next_seq.wrapping_add(1);
        let ticket = ReplyTicket {
            post_id,
            token: thread.refresh_token,
            seq: self.next_seq,
        };
        thread.pending = Some((ticket.seq, ticket.token));
        thread.loading = true;
        Some(ticket)
    }
}
