use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, warn};

use crate::compose::{self, PostForm, ValidationError, MAX_TAGS};
use crate::data::{FeedService, InteractionService, ReplyService, UserService};
use crate::likes::{LikeCoordinator, LikeTicket, ToggleOutcome};
use crate::model::{LikeAck, Post, Reply, SearchScope, User};
use crate::replies::{ReplyAggregator, ReplyThread, ReplyTicket};
use crate::search::{FeedRequest, SearchFilterEngine};
use crate::session::{Session, SessionError};

#[derive(Clone)]
pub struct Services {
    pub feed: Arc<dyn FeedService>,
    pub interaction: Arc<dyn InteractionService>,
    pub replies: Arc<dyn ReplyService>,
    pub users: Arc<dyn UserService>,
}

impl Services {
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: FeedService + InteractionService + ReplyService + UserService + 'static,
    {
        Self {
            feed: backend.clone(),
            interaction: backend.clone(),
            replies: backend.clone(),
            users: backend,
        }
    }
}

pub struct Options {
    pub services: Services,
    pub session: Session,
    pub max_tags: usize,
}

impl Options {
    pub fn new(services: Services, session: Session) -> Self {
        Self {
            services,
            session,
            max_tags: MAX_TAGS,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("post {0} is not in the feed")]
    UnknownPost(i64),
    #[error("a post is already being submitted")]
    PostInFlight,
    #[error("a reply to post {0} is already being submitted")]
    ReplyInFlight(i64),
}

/// What changed while draining responses, for the front end to react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    PostsReplaced,
    PostCreated(i64),
    PostFailed(String),
    LikeSettled(i64),
    LikeFailed { post_id: i64, message: String },
    RepliesUpdated(i64),
    ReplyCreated(i64),
    ReplyFailed { post_id: i64, message: String },
    UsersLoaded,
}

enum AsyncResponse {
    Feed {
        generation: u64,
        result: Result<Vec<Post>>,
    },
    PostCreated {
        result: Result<Post>,
    },
    Like {
        ticket: LikeTicket,
        result: Result<LikeAck>,
    },
    Replies {
        ticket: ReplyTicket,
        result: Result<Vec<Reply>>,
    },
    ReplySubmitted {
        post_id: i64,
        result: Result<()>,
    },
    Users {
        request_id: u64,
        result: Result<Vec<User>>,
    },
}

pub struct FeedController {
    services: Services,
    session: Session,
    max_tags: usize,
    posts: Vec<Post>,
    users: Vec<User>,
    search: SearchFilterEngine,
    likes: LikeCoordinator,
    replies: ReplyAggregator,
    creating_post: bool,
    submitting_replies: HashSet<i64>,
    next_request_id: u64,
    pending_users: Option<u64>,
    status_message: String,
    response_tx: Sender<AsyncResponse>,
    response_rx: Receiver<AsyncResponse>,
}

impl FeedController {
    pub fn new(options: Options) -> Self {
        let (response_tx, response_rx) = unbounded();
        Self {
            services: options.services,
            session: options.session,
            max_tags: options.max_tags.min(MAX_TAGS),
            posts: Vec::new(),
            users: Vec::new(),
            search: SearchFilterEngine::new(),
            likes: LikeCoordinator::new(),
            replies: ReplyAggregator::new(),
            creating_post: false,
            submitting_replies: HashSet::new(),
            next_request_id: 1,
            pending_users: None,
            status_message: String::new(),
            response_tx,
            response_rx,
        }
    }

    pub fn posts(&self) -> &[Post] {
        &self.posts
    }

    pub fn post(&self, post_id: i64) -> Option<&Post> {
        self.posts.iter().find(|post| post.id == post_id)
    }

    pub fn users(&self) -> &[User] {
        &self.users
    }

    pub fn search(&self) -> &SearchFilterEngine {
        &self.search
    }

    pub fn thread(&self, post_id: i64) -> Option<&ReplyThread> {
        self.replies.thread(post_id)
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn status_message(&self) -> &str {
        &self.status_message
    }

    pub fn is_loading(&self) -> bool {
        self.search.is_loading()
    }

    pub fn is_searching(&self) -> bool {
        self.search.is_searching()
    }

    pub fn is_creating_post(&self) -> bool {
        self.creating_post
    }

    pub fn is_busy(&self) -> bool {
        self.search.in_flight()
            || self.creating_post
            || self.likes.has_pending()
            || self.replies.is_loading()
            || !self.submitting_replies.is_empty()
            || self.pending_users.is_some()
    }

    pub fn set_session(&mut self, session: Session) {
        self.session = session;
    }

    pub fn load_initial(&mut self) {
        let request = self.search.load_initial();
        self.dispatch_feed(request);
    }

    pub fn set_query_text(&mut self, text: impl Into<String>) {
        self.search.set_query_text(text);
    }

    pub fn set_scope(&mut self, scope: SearchScope) {
        self.search.set_scope(scope);
    }

    pub fn submit_search(&mut self) {
        let request = self.search.submit();
        self.dispatch_feed(request);
    }

    pub fn clear_search(&mut self) {
        let request = self.search.clear();
        self.dispatch_feed(request);
    }

    pub fn search_by_tag(&mut self, tag: &str) {
        let request = self.search.search_by_tag(tag);
        self.dispatch_feed(request);
    }

    pub fn filter_by_user(&mut self, user_id: Option<i64>) {
        let request = self.search.filter_by_user(user_id);
        self.dispatch_feed(request);
    }

    pub fn refresh(&mut self) {
        let request = self.search.refresh();
        self.dispatch_feed(request);
    }

    /// Validates and submits the compose form. Nothing is sent when
    /// validation fails; the form is the caller's to clear once
    /// [`FeedEvent::PostCreated`] arrives.
    pub fn create_post(&mut self, form: &PostForm) -> Result<(), FeedError> {
        self.session.require()?;
        if self.creating_post {
            return Err(FeedError::PostInFlight);
        }
        let payload = form.to_new_post(self.max_tags)?;

        self.creating_post = true;
        self.status_message = "Posting...".to_string();
        let tx = self.response_tx.clone();
        let service = self.services.feed.clone();
        thread::spawn(move || {
            let result = service.create_post(&payload);
            let _ = tx.send(AsyncResponse::PostCreated { result });
        });
        Ok(())
    }

    pub fn toggle_like(&mut self, post_id: i64) -> Result<(), FeedError> {
        let post = self
            .posts
            .iter_mut()
            .find(|post| post.id == post_id)
            .ok_or(FeedError::UnknownPost(post_id))?;
        match self.likes.toggle(&self.session, post) {
            ToggleOutcome::Dispatch(ticket) => self.dispatch_like(ticket),
            ToggleOutcome::Queued => debug!(post_id, "like queued behind in-flight toggle"),
            ToggleOutcome::Rejected(err) => return Err(err.into()),
        }
        Ok(())
    }

    pub fn expand_replies(&mut self, post_id: i64) {
        if let Some(ticket) = self.replies.expand(post_id) {
            self.dispatch_replies(ticket);
        }
    }

    pub fn collapse_replies(&mut self, post_id: i64) {
        self.replies.collapse(post_id);
    }

    pub fn submit_reply(&mut self, post_id: i64, content: &str) -> Result<(), FeedError> {
        self.session.require()?;
        compose::validate_reply(content)?;
        if !self.submitting_replies.insert(post_id) {
            return Err(FeedError::ReplyInFlight(post_id));
        }

        let tx = self.response_tx.clone();
        let service = self.services.replies.clone();
        let content = content.to_string();
        thread::spawn(move || {
            let result = service.reply(post_id, &content);
            let _ = tx.send(AsyncResponse::ReplySubmitted { post_id, result });
        });
        Ok(())
    }

    pub fn notify_reply_created(&mut self, post_id: i64) {
        let post = self.posts.iter_mut().find(|post| post.id == post_id);
        if let Some(ticket) = self.replies.notify_reply_created(post_id, post) {
            self.dispatch_replies(ticket);
        }
    }

    pub fn load_users(&mut self, query: Option<&str>) {
        let request_id = self.next_request_id;
        self.next_request_id = self.next_request_id.wrapping_add(1);
        self.pending_users = Some(request_id);

        let tx = self.response_tx.clone();
        let service = self.services.users.clone();
        let query = query.map(str::to_string);
        thread::spawn(move || {
            let result = service.search_users(query.as_deref());
            let _ = tx.send(AsyncResponse::Users { request_id, result });
        });
    }

    pub fn poll_async(&mut self) -> Vec<FeedEvent> {
        let mut events = Vec::new();
        while let Ok(message) = self.response_rx.try_recv() {
            self.handle_async_response(message, &mut events);
        }
        events
    }

    /// Waits up to `timeout` for at least one response, then drains the rest.
    pub fn wait_async(&mut self, timeout: Duration) -> Vec<FeedEvent> {
        let mut events = Vec::new();
        match self.response_rx.recv_timeout(timeout) {
            Ok(message) => self.handle_async_response(message, &mut events),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                return events
            }
        }
        events.extend(self.poll_async());
        events
    }

    /// Drains responses until nothing is outstanding or `timeout` elapses.
    pub fn settle(&mut self, timeout: Duration) -> Vec<FeedEvent> {
        let deadline = Instant::now() + timeout;
        let mut events = self.poll_async();
        while self.is_busy() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            events.extend(self.wait_async(remaining));
        }
        events
    }

    fn dispatch_feed(&mut self, request: FeedRequest) {
        debug!(generation = request.generation, query = %request.query.path(), "fetching feed");
        let tx = self.response_tx.clone();
        let service = self.services.feed.clone();
        let FeedRequest {
            generation, query, ..
        } = request;
        thread::spawn(move || {
            let result = service.load_feed(&query);
            let _ = tx.send(AsyncResponse::Feed { generation, result });
        });
    }

    fn dispatch_like(&self, ticket: LikeTicket) {
        let tx = self.response_tx.clone();
        let service = self.services.interaction.clone();
        thread::spawn(move || {
            let result = service.toggle_like(ticket.post_id);
            let _ = tx.send(AsyncResponse::Like { ticket, result });
        });
    }

    fn dispatch_replies(&self, ticket: ReplyTicket) {
        let tx = self.response_tx.clone();
        let service = self.services.replies.clone();
        thread::spawn(move || {
            let result = service.load_replies(ticket.post_id);
            let _ = tx.send(AsyncResponse::Replies { ticket, result });
        });
    }

    fn handle_async_response(&mut self, message: AsyncResponse, events: &mut Vec<FeedEvent>) {
        match message {
            AsyncResponse::Feed { generation, result } => {
                let Some(mut posts) = self.search.complete(generation, result) else {
                    return;
                };
                for post in &mut posts {
                    self.likes.overlay(post);
                }
                self.posts = posts;
                events.push(FeedEvent::PostsReplaced);
            }
            AsyncResponse::PostCreated { result } => {
                self.creating_post = false;
                match result {
                    Ok(post) => {
                        self.status_message = format!("Posted \"{}\".", post.title);
                        let request = self.search.clear();
                        self.dispatch_feed(request);
                        events.push(FeedEvent::PostCreated(post.id));
                    }
                    Err(err) => {
                        warn!("create post failed: {err:#}");
                        let message = format!("Failed to create post: {err:#}");
                        self.status_message = message.clone();
                        events.push(FeedEvent::PostFailed(message));
                    }
                }
            }
            AsyncResponse::Like { ticket, result } => {
                let failure = result.as_ref().err().map(|err| format!("{err:#}"));
                let post = self.posts.iter_mut().find(|post| post.id == ticket.post_id);
                let completion = self.likes.complete(ticket, result, post);
                if let Some(next) = completion.next {
                    self.dispatch_like(next);
                }
                match failure {
                    Some(err) => {
                        let message = format!("Failed to update like: {err}");
                        self.status_message = message.clone();
                        events.push(FeedEvent::LikeFailed {
                            post_id: ticket.post_id,
                            message,
                        });
                    }
                    None => events.push(FeedEvent::LikeSettled(ticket.post_id)),
                }
            }
            AsyncResponse::Replies { ticket, result } => {
                if self.replies.complete(ticket, result) {
                    events.push(FeedEvent::RepliesUpdated(ticket.post_id));
                }
            }
            AsyncResponse::ReplySubmitted { post_id, result } => {
                self.submitting_replies.remove(&post_id);
                match result {
                    Ok(()) => {
                        self.status_message = "Reply posted.".to_string();
                        self.notify_reply_created(post_id);
                        events.push(FeedEvent::ReplyCreated(post_id));
                    }
                    Err(err) => {
                        warn!(post_id, "reply failed: {err:#}");
                        let message = format!("Failed to post reply: {err:#}");
                        self.status_message = message.clone();
                        events.push(FeedEvent::ReplyFailed { post_id, message });
                    }
                }
            }
            AsyncResponse::Users { request_id, result } => {
                if self.pending_users != Some(request_id) {
                    return;
                }
                self.pending_users = None;
                match result {
                    Ok(users) => self.users = users,
                    Err(err) => {
                        warn!("failed to load users: {err:#}");
                        self.users.clear();
                    }
                }
                events.push(FeedEvent::UsersLoaded);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use crossbeam_channel::bounded;
    use parking_lot::Mutex;

    use crate::data::MockBackend;
    use crate::model::{NewPost, SongRef};

    const WAIT: Duration = Duration::from_secs(5);

    fn viewer() -> Session {
        Session::authenticated(User {
            id: MockBackend::VIEWER_ID,
            display_name: "Demo User".into(),
            profile_image: String::new(),
            bio: None,
        })
    }

    fn controller(backend: Arc<MockBackend>, session: Session) -> FeedController {
        let mut controller =
            FeedController::new(Options::new(Services::from_backend(backend), session));
        controller.load_initial();
        controller.settle(WAIT);
        controller
    }

    fn ids(controller: &FeedController) -> Vec<i64> {
        controller.posts().iter().map(|post| post.id).collect()
    }

    #[test]
    fn initial_load_is_a_blocking_load() {
        let backend = Arc::new(MockBackend::sample());
        let mut controller =
            FeedController::new(Options::new(Services::from_backend(backend), viewer()));
        controller.load_initial();
        assert!(controller.is_loading());
        assert!(!controller.is_searching());
        let events = controller.settle(WAIT);
        assert!(events.contains(&FeedEvent::PostsReplaced));
        assert_eq!(ids(&controller), vec![3, 2, 1]);
        assert!(!controller.is_loading() && !controller.is_searching());
    }

    #[test]
    fn tag_search_then_clear_restores_everything() {
        let mut controller = controller(Arc::new(MockBackend::sample()), viewer());
        controller.search_by_tag("chill");
        assert!(controller.is_searching());
        controller.settle(WAIT);
        assert_eq!(ids(&controller), vec![2, 1]);
        assert_eq!(controller.search().applied().scope, SearchScope::Tag);

        controller.clear_search();
        controller.settle(WAIT);
        assert_eq!(ids(&controller), vec![3, 2, 1]);
        assert!(!controller.search().applied().is_filtered());
    }

    #[test]
    fn user_filter_survives_refresh() {
        let mut controller = controller(Arc::new(MockBackend::sample()), viewer());
        controller.filter_by_user(Some(2));
        controller.settle(WAIT);
        assert_eq!(ids(&controller), vec![3]);
        controller.refresh();
        controller.settle(WAIT);
        assert_eq!(ids(&controller), vec![3]);
    }

    #[test]
    fn like_round_trip_through_the_backend() {
        let backend = Arc::new(MockBackend::sample());
        let mut controller = controller(backend.clone(), viewer());
        controller.toggle_like(2).unwrap();
        let post = controller.post(2).unwrap();
        assert_eq!((post.liked_by_current_user, post.like_count), (true, 1));

        let events = controller.settle(WAIT);
        assert!(events.contains(&FeedEvent::LikeSettled(2)));
        assert_eq!(backend.like_count(2), 1);
        assert_eq!(controller.post(2).unwrap().like_count, 1);
    }

    #[test]
    fn rapid_likes_are_serialized_against_the_backend() {
        let backend = Arc::new(MockBackend::sample());
        let mut controller = controller(backend.clone(), viewer());
        for _ in 0..3 {
            controller.toggle_like(3).unwrap();
        }
        controller.settle(WAIT);
        let post = controller.post(3).unwrap();
        assert_eq!((post.liked_by_current_user, post.like_count), (true, 1));
        assert_eq!(backend.like_count(3), 1);
    }

    #[test]
    fn failed_like_rolls_back_and_reports() {
        let backend = Arc::new(MockBackend::sample());
        let mut controller = controller(backend.clone(), viewer());
        backend.set_fail_likes(true);
        controller.toggle_like(1).unwrap();
        let events = controller.settle(WAIT);
        assert!(events
            .iter()
            .any(|event| matches!(event, FeedEvent::LikeFailed { post_id: 1, .. })));
        let post = controller.post(1).unwrap();
        assert_eq!((post.liked_by_current_user, post.like_count), (false, 0));
        assert!(controller.status_message().starts_with("Failed to update like"));
    }

    #[test]
    fn anonymous_viewers_cannot_mutate() {
        let mut controller = controller(Arc::new(MockBackend::sample()), Session::anonymous());
        assert!(matches!(controller.toggle_like(1), Err(FeedError::Session(_))));
        assert!(matches!(
            controller.submit_reply(1, "hi"),
            Err(FeedError::Session(_))
        ));
        assert!(matches!(
            controller.create_post(&PostForm::default()),
            Err(FeedError::Session(_))
        ));
        assert!(!controller.is_busy());
        assert_eq!(controller.post(1).unwrap().like_count, 0);
    }

    #[test]
    fn unknown_post_is_rejected() {
        let mut controller = controller(Arc::new(MockBackend::sample()), viewer());
        assert!(matches!(
            controller.toggle_like(404),
            Err(FeedError::UnknownPost(404))
        ));
    }

    #[test]
    fn invalid_post_is_rejected_without_a_request() {
        let mut controller = controller(Arc::new(MockBackend::sample()), viewer());
        let form = PostForm {
            title: "only a title".into(),
            ..PostForm::default()
        };
        assert!(matches!(
            controller.create_post(&form),
            Err(FeedError::Validation(ValidationError::MissingUrl))
        ));
        assert!(!controller.is_creating_post());
        assert!(!controller.is_busy());
    }

    #[test]
    fn created_post_reloads_and_clears_the_filter() {
        let mut controller = controller(Arc::new(MockBackend::sample()), viewer());
        controller.search_by_tag("citypop");
        controller.settle(WAIT);
        assert_eq!(ids(&controller), vec![3]);

        let form = PostForm {
            title: "Ride on Time".into(),
            url: "https://open.spotify.com/intl-ja/track/3n3Ppam7vgaVa1iaRUc9Lp?si=abc".into(),
            comment: "summer".into(),
            tags: "citypop, summer,,".into(),
            post_to_twitter: false,
        };
        controller.create_post(&form).unwrap();
        assert!(matches!(
            controller.create_post(&form),
            Err(FeedError::PostInFlight)
        ));
        let events = controller.settle(WAIT);
        let created = events
            .iter()
            .find_map(|event| match event {
                FeedEvent::PostCreated(id) => Some(*id),
                _ => None,
            })
            .expect("post created");
        assert!(!controller.search().applied().is_filtered());
        assert_eq!(controller.search().query_text(), "");
        assert_eq!(controller.posts().len(), 4);
        let post = controller.post(created).unwrap();
        assert_eq!(post.song, SongRef::Spotify("3n3Ppam7vgaVa1iaRUc9Lp".into()));
        assert_eq!(post.tags, vec!["citypop", "summer"]);
    }

    #[test]
    fn configured_tag_limit_is_capped() {
        let backend = Arc::new(MockBackend::sample());
        let mut controller = FeedController::new(Options {
            max_tags: 25,
            ..Options::new(Services::from_backend(backend), viewer())
        });
        let tags: Vec<String> = (1..=15).map(|n| format!("t{n}")).collect();
        let form = PostForm {
            title: "Many tags".into(),
            url: "https://youtu.be/dQw4w9WgXcQ".into(),
            comment: "too many".into(),
            tags: tags.join(", "),
            post_to_twitter: false,
        };
        controller.create_post(&form).unwrap();
        let events = controller.settle(WAIT);
        let created = events
            .iter()
            .find_map(|event| match event {
                FeedEvent::PostCreated(id) => Some(*id),
                _ => None,
            })
            .expect("post created");
        let post = controller.post(created).unwrap();
        assert_eq!(post.tags.len(), MAX_TAGS);
        assert_eq!(post.tags.last().map(String::as_str), Some("t10"));
    }

    #[test]
    fn replies_expand_lazily_and_refresh_after_posting() {
        let mut controller = controller(Arc::new(MockBackend::sample()), viewer());
        controller.expand_replies(3);
        assert!(controller.thread(3).unwrap().loading);
        controller.settle(WAIT);
        let thread = controller.thread(3).unwrap();
        assert!(thread.expanded && thread.replies.is_empty());

        controller.collapse_replies(3);
        assert!(matches!(
            controller.submit_reply(3, "   "),
            Err(FeedError::Validation(ValidationError::EmptyReply))
        ));
        controller.submit_reply(3, "what a track").unwrap();
        let events = controller.settle(WAIT);
        assert!(events.contains(&FeedEvent::ReplyCreated(3)));
        assert!(events.contains(&FeedEvent::RepliesUpdated(3)));

        let thread = controller.thread(3).unwrap();
        assert!(thread.expanded);
        assert_eq!(thread.refresh_token, 1);
        assert_eq!(thread.replies.len(), 1);
        assert_eq!(thread.replies[0].content, "what a track");
        assert_eq!(controller.post(3).unwrap().reply_count, 1);
    }

    #[test]
    fn notify_on_collapsed_thread_counts_expands_and_fetches() {
        let mut controller = controller(Arc::new(MockBackend::sample()), viewer());
        controller.notify_reply_created(1);
        assert_eq!(controller.post(1).unwrap().reply_count, 1);
        let thread = controller.thread(1).unwrap();
        assert!(thread.expanded && thread.loading);
        controller.settle(WAIT);
        assert!(!controller.thread(1).unwrap().loading);
    }

    #[test]
    fn users_directory_loads() {
        let mut controller = controller(Arc::new(MockBackend::sample()), viewer());
        controller.load_users(Some("a"));
        let events = controller.settle(WAIT);
        assert!(events.contains(&FeedEvent::UsersLoaded));
        let names: Vec<&str> = controller
            .users()
            .iter()
            .map(|user| user.display_name.as_str())
            .collect();
        assert_eq!(names, vec!["Aki", "Sam"]);
    }

    /// Feed service whose search responses are held until released.
    struct GatedFeed {
        backend: MockBackend,
        gate: Mutex<Option<Receiver<()>>>,
    }

    impl FeedService for GatedFeed {
        fn load_feed(&self, query: &crate::search::FeedQuery) -> Result<Vec<Post>> {
            if query.is_search() {
                let gate = self.gate.lock().take();
                if let Some(gate) = gate {
                    gate.recv_timeout(WAIT)
                        .map_err(|_| anyhow!("gate never opened"))?;
                }
            }
            self.backend.load_feed(query)
        }

        fn create_post(&self, post: &NewPost) -> Result<Post> {
            self.backend.create_post(post)
        }
    }

    #[test]
    fn clear_before_search_resolves_shows_the_unfiltered_feed() {
        let (open, gate) = bounded(1);
        let backend = Arc::new(MockBackend::sample());
        let gated = Arc::new(GatedFeed {
            backend: MockBackend::sample(),
            gate: Mutex::new(Some(gate)),
        });
        let services = Services {
            feed: gated,
            ..Services::from_backend(backend)
        };
        let mut controller = FeedController::new(Options::new(services, viewer()));

        controller.set_query_text("teardrop");
        controller.submit_search();
        controller.clear_search();

        let events = controller.wait_async(WAIT);
        assert_eq!(events, vec![FeedEvent::PostsReplaced]);
        assert_eq!(ids(&controller), vec![3, 2, 1]);

        open.send(()).unwrap();
        thread::sleep(Duration::from_millis(100));
        assert!(controller.poll_async().is_empty());
        assert_eq!(ids(&controller), vec![3, 2, 1]);
        assert!(!controller.is_busy());
    }
}
