use std::collections::HashMap;

use anyhow::Result;
use tracing::{debug, warn};

use crate::model::{LikeAck, Post};
use crate::session::{Session, SessionError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LikeState {
    pub liked: bool,
    pub count: u32,
}

impl LikeState {
    pub fn of(post: &Post) -> Self {
        Self {
            liked: post.liked_by_current_user,
            count: post.like_count,
        }
    }

    pub fn toggled(self) -> Self {
        if self.liked {
            Self {
                liked: false,
                count: self.count.saturating_sub(1),
            }
        } else {
            Self {
                liked: true,
                count: self.count.saturating_add(1),
            }
        }
    }

    pub fn apply_to(self, post: &mut Post) {
        post.liked_by_current_user = self.liked;
        post.like_count = self.count;
    }
}

/// One request to send. `expected` is the like state the server should end
/// up in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LikeTicket {
    pub post_id: i64,
    pub expected: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToggleOutcome {
    Dispatch(LikeTicket),
    Queued,
    Rejected(SessionError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LikeCompletion {
    pub next: Option<LikeTicket>,
    pub rolled_back: bool,
}

#[derive(Debug)]
struct LikeQueue {
    confirmed: LikeState,
    in_flight: bool,
    queued: u32,
}

impl LikeQueue {
    fn visible(&self) -> LikeState {
        let flips = u32::from(self.in_flight) + self.queued;
        if flips % 2 == 1 {
            self.confirmed.toggled()
        } else {
            self.confirmed
        }
    }

    fn dispatch(&mut self, post_id: i64) -> LikeTicket {
        self.in_flight = true;
        LikeTicket {
            post_id,
            expected: self.confirmed.toggled().liked,
        }
    }
}

#[derive(Debug, Default)]
pub struct LikeCoordinator {
    queues: HashMap<i64, LikeQueue>,
}

impl LikeCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_pending(&self, post_id: i64) -> bool {
        self.queues.contains_key(&post_id)
    }

    pub fn has_pending(&self) -> bool {
        !self.queues.is_empty()
    }

    /// Flips the like on `post` right away and says whether to send a request.
    pub fn toggle(&mut self, session: &Session, post: &mut Post) -> ToggleOutcome {
        if let Err(err) = session.require() {
            return ToggleOutcome::Rejected(err);
        }

        let queue = self.queues.entry(post.id).or_insert_with(|| LikeQueue {
            confirmed: LikeState::of(post),
            in_flight: false,
            queued: 0,
        });

        let outcome = if queue.in_flight {
            queue.queued += 1;
            ToggleOutcome::Queued
        } else {
            ToggleOutcome::Dispatch(queue.dispatch(post.id))
        };
        queue.visible().apply_to(post);
        outcome
    }

    /// Settles the in-flight request for `ticket.post_id`.
    ///
    /// On success the server's answer becomes the confirmed state and the next
    /// queued toggle, if any, is released. On failure the post returns to the
    /// last confirmed state and queued toggles are dropped, since they were
    /// relative to the rejected one.
    pub fn complete(
        &mut self,
        ticket: LikeTicket,
        result: Result<LikeAck>,
        post: Option<&mut Post>,
    ) -> LikeCompletion {
        let Some(queue) = self.queues.get_mut(&ticket.post_id) else {
            debug!(post_id = ticket.post_id, "like settled for an untracked post");
            return LikeCompletion::default();
        };

        let mut completion = LikeCompletion::default();
        let visible = match result {
            Ok(ack) => {
                let mut settled = queue.confirmed.toggled();
                if let Some(liked) = ack.liked {
                    if liked != settled.liked {
                        debug!(post_id = ticket.post_id, liked, "server disagreed with like toggle");
                        settled = queue.confirmed;
                    }
                }
                queue.confirmed = settled;
                queue.in_flight = false;
                if queue.queued > 0 {
                    queue.queued -= 1;
                    completion.next = Some(queue.dispatch(ticket.post_id));
                }
                let visible = queue.visible();
                if completion.next.is_none() {
                    self.queues.remove(&ticket.post_id);
                }
                visible
            }
            Err(err) => {
                warn!(post_id = ticket.post_id, "like toggle failed: {err:#}");
                let confirmed = queue.confirmed;
                self.queues.remove(&ticket.post_id);
                completion.rolled_back = true;
                confirmed
            }
        };

        if let Some(post) = post {
            visible.apply_to(post);
        }
        completion
    }

    pub fn overlay(&self, post: &mut Post) {
        if let Some(queue) = self.queues.get(&post.id) {
            queue.visible().apply_to(post);
        }
    }
}
