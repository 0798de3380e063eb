use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{Duration as ChronoDuration, Utc};
use parking_lot::Mutex;

use crate::api;
use crate::model::{LikeAck, NewPost, Post, Reply, SearchScope, SongRef, User};
use crate::search::FeedQuery;

pub trait FeedService: Send + Sync {
    fn load_feed(&self, query: &FeedQuery) -> Result<Vec<Post>>;
    fn create_post(&self, post: &NewPost) -> Result<Post>;
}

pub trait InteractionService: Send + Sync {
    fn toggle_like(&self, post_id: i64) -> Result<LikeAck>;
}

pub trait ReplyService: Send + Sync {
    fn load_replies(&self, post_id: i64) -> Result<Vec<Reply>>;
    fn reply(&self, post_id: i64, content: &str) -> Result<()>;
}

pub trait AuthService: Send + Sync {
    fn current_user(&self) -> Result<Option<User>>;
    fn logout(&self) -> Result<()>;
}

pub trait UserService: Send + Sync {
    fn search_users(&self, query: Option<&str>) -> Result<Vec<User>>;
}

pub struct HttpFeedService {
    client: Arc<api::Client>,
}

impl HttpFeedService {
    pub fn new(client: Arc<api::Client>) -> Self {
        Self { client }
    }
}

impl FeedService for HttpFeedService {
    fn load_feed(&self, query: &FeedQuery) -> Result<Vec<Post>> {
        self.client
            .feed(query)
            .with_context(|| format!("fetch {}", query.path()))
    }

    fn create_post(&self, post: &NewPost) -> Result<Post> {
        self.client.create_post(post).context("create post")
    }
}

pub struct HttpInteractionService {
    client: Arc<api::Client>,
}

impl HttpInteractionService {
    pub fn new(client: Arc<api::Client>) -> Self {
        Self { client }
    }
}

impl InteractionService for HttpInteractionService {
    fn toggle_like(&self, post_id: i64) -> Result<LikeAck> {
        self.client.toggle_like(post_id).context("toggle like")
    }
}

pub struct HttpReplyService {
    client: Arc<api::Client>,
}

impl HttpReplyService {
    pub fn new(client: Arc<api::Client>) -> Self {
        Self { client }
    }
}

impl ReplyService for HttpReplyService {
    fn load_replies(&self, post_id: i64) -> Result<Vec<Reply>> {
        self.client.replies(post_id).context("fetch replies")
    }

    fn reply(&self, post_id: i64, content: &str) -> Result<()> {
        self.client.reply(post_id, content).context("post reply")
    }
}

pub struct HttpAuthService {
    client: Arc<api::Client>,
}

impl HttpAuthService {
    pub fn new(client: Arc<api::Client>) -> Self {
        Self { client }
    }
}

impl AuthService for HttpAuthService {
    fn current_user(&self) -> Result<Option<User>> {
        self.client.current_user()
    }

    fn logout(&self) -> Result<()> {
        self.client.logout()
    }
}

pub struct HttpUserService {
    client: Arc<api::Client>,
}

impl HttpUserService {
    pub fn new(client: Arc<api::Client>) -> Self {
        Self { client }
    }
}

impl UserService for HttpUserService {
    fn search_users(&self, query: Option<&str>) -> Result<Vec<User>> {
        self.client.users(query).context("fetch users")
    }
}

/// In-memory backend for offline browsing and tests. Behaves like the real
/// server for everything the client relies on.
pub struct MockBackend {
    posts: Mutex<Vec<Post>>,
    likes: Mutex<Vec<(i64, i64)>>,
    replies: Mutex<Vec<Reply>>,
    users: Vec<User>,
    signed_in: AtomicBool,
    fail_likes: AtomicBool,
    next_id: AtomicI64,
}

impl MockBackend {
    pub const VIEWER_ID: i64 = 1;

    pub fn new(users: Vec<User>, posts: Vec<Post>) -> Self {
        let next_id = posts.iter().map(|post| post.id).max().unwrap_or(0) + 100;
        Self {
            posts: Mutex::new(posts),
            likes: Mutex::new(Vec::new()),
            replies: Mutex::new(Vec::new()),
            users,
            signed_in: AtomicBool::new(true),
            fail_likes: AtomicBool::new(false),
            next_id: AtomicI64::new(next_id),
        }
    }

    pub fn sample() -> Self {
        let users = vec![
            mock_user(Self::VIEWER_ID, "Demo User"),
            mock_user(2, "Aki"),
            mock_user(3, "Sam"),
        ];
        let now = Utc::now();
        let posts = vec![
            mock_post(
                3,
                &users[1],
                "Plastic Love",
                SongRef::YouTube("3bNITQR4Uso".into()),
                "city pop forever",
                &["citypop", "80s"],
                now - ChronoDuration::hours(1),
            ),
            mock_post(
                2,
                &users[2],
                "Teardrop",
                SongRef::Spotify("67Hna13dNDkZvBpTXRIaOJ".into()),
                "late night listening",
                &["trip-hop", "chill"],
                now - ChronoDuration::hours(5),
            ),
            mock_post(
                1,
                &users[0],
                "Midnight Drive",
                SongRef::Other("https://example.com/midnight-drive.mp3".into()),
                "self-recorded demo",
                &["chill"],
                now - ChronoDuration::days(1),
            ),
        ];
        Self::new(users, posts)
    }

    pub fn set_signed_in(&self, signed_in: bool) {
        self.signed_in.store(signed_in, Ordering::SeqCst);
    }

    pub fn set_fail_likes(&self, fail: bool) {
        self.fail_likes.store(fail, Ordering::SeqCst);
    }

    pub fn like_count(&self, post_id: i64) -> usize {
        self.likes
            .lock()
            .iter()
            .filter(|(_, post)| *post == post_id)
            .count()
    }

    fn viewer(&self) -> Result<&User> {
        if !self.signed_in.load(Ordering::SeqCst) {
            bail!(api::ApiError::Unauthorized);
        }
        self.users
            .iter()
            .find(|user| user.id == Self::VIEWER_ID)
            .ok_or_else(|| anyhow!("mock viewer missing"))
    }

    fn decorate(&self, mut post: Post) -> Post {
        let likes = self.likes.lock();
        post.like_count = likes.iter().filter(|(_, id)| *id == post.id).count() as u32;
        post.liked_by_current_user = self.signed_in.load(Ordering::SeqCst)
            && likes.contains(&(Self::VIEWER_ID, post.id));
        post.reply_count = self
            .replies
            .lock()
            .iter()
            .filter(|reply| reply.post_id == post.id)
            .count() as u32;
        post
    }

    fn ensure_post(&self, post_id: i64) -> Result<()> {
        if self.posts.lock().iter().any(|post| post.id == post_id) {
            Ok(())
        } else {
            bail!(api::ApiError::NotFound)
        }
    }
}

impl FeedService for MockBackend {
    fn load_feed(&self, query: &FeedQuery) -> Result<Vec<Post>> {
        let posts = self.posts.lock().clone();
        let matches = |post: &Post| match query {
            FeedQuery::All => true,
            FeedQuery::ByUser(user_id) => post.user_id == *user_id,
            FeedQuery::Search { text, scope } => {
                let needle = text.to_lowercase();
                let in_title = post.title.to_lowercase().contains(&needle);
                let in_comment = post.comment.to_lowercase().contains(&needle);
                let in_tags = post.tags.iter().any(|tag| tag == text);
                match scope {
                    SearchScope::All => in_title || in_comment || in_tags,
                    SearchScope::Title => in_title,
                    SearchScope::Comment => in_comment,
                    SearchScope::Tag => in_tags,
                }
            }
        };
        Ok(posts
            .into_iter()
            .filter(|post| matches(post))
            .map(|post| self.decorate(post))
            .collect())
    }

    fn create_post(&self, post: &NewPost) -> Result<Post> {
        let author = self.viewer()?.clone();
        let created = Post {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            user_id: author.id,
            title: post.title.clone(),
            song: post.song.clone(),
            comment: post.comment.clone(),
            tags: post.tags.clone(),
            created_at: Utc::now(),
            author: Some(author),
            like_count: 0,
            reply_count: 0,
            liked_by_current_user: false,
        };
        self.posts.lock().insert(0, created.clone());
        Ok(created)
    }
}

impl InteractionService for MockBackend {
    fn toggle_like(&self, post_id: i64) -> Result<LikeAck> {
        let viewer = self.viewer()?.id;
        if self.fail_likes.load(Ordering::SeqCst) {
            bail!(api::ApiError::Status {
                status: 500,
                body: "like failed".into(),
            });
        }
        self.ensure_post(post_id)?;
        let mut likes = self.likes.lock();
        let key = (viewer, post_id);
        let liked = if let Some(index) = likes.iter().position(|entry| *entry == key) {
            likes.remove(index);
            false
        } else {
            likes.push(key);
            true
        };
        Ok(LikeAck { liked: Some(liked) })
    }
}

impl ReplyService for MockBackend {
    fn load_replies(&self, post_id: i64) -> Result<Vec<Reply>> {
        self.ensure_post(post_id)?;
        Ok(self
            .replies
            .lock()
            .iter()
            .filter(|reply| reply.post_id == post_id)
            .cloned()
            .collect())
    }

    fn reply(&self, post_id: i64, content: &str) -> Result<()> {
        let author = self.viewer()?.clone();
        self.ensure_post(post_id)?;
        if content.is_empty() {
            bail!(api::ApiError::Status {
                status: 400,
                body: "Content is required".into(),
            });
        }
        self.replies.lock().push(Reply {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            post_id,
            author_id: author.id,
            content: content.to_string(),
            created_at: Utc::now(),
            author: Some(author),
        });
        Ok(())
    }
}

impl AuthService for MockBackend {
    fn current_user(&self) -> Result<Option<User>> {
        Ok(self.viewer().ok().cloned())
    }

    fn logout(&self) -> Result<()> {
        self.set_signed_in(false);
        Ok(())
    }
}

impl UserService for MockBackend {
    fn search_users(&self, query: Option<&str>) -> Result<Vec<User>> {
        let needle = query.unwrap_or_default().trim().to_lowercase();
        let mut users: Vec<User> = self
            .users
            .iter()
            .filter(|user| needle.is_empty() || user.display_name.to_lowercase().contains(&needle))
            .cloned()
            .collect();
        users.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        Ok(users)
    }
}

fn mock_user(id: i64, name: &str) -> User {
    User {
        id,
        display_name: name.into(),
        profile_image: String::new(),
        bio: None,
    }
}

fn mock_post(
    id: i64,
    author: &User,
    title: &str,
    song: SongRef,
    comment: &str,
    tags: &[&str],
    created_at: chrono::DateTime<Utc>,
) -> Post {
    Post {
        id,
        user_id: author.id,
        title: title.into(),
        song,
        comment: comment.into(),
        tags: tags.iter().map(|tag| tag.to_string()).collect(),
        created_at,
        author: Some(author.clone()),
        like_count: 0,
        reply_count: 0,
        liked_by_current_user: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_search_respects_scope() {
        let backend = MockBackend::sample();
        let by_tag = backend
            .load_feed(&FeedQuery::Search {
                text: "chill".into(),
                scope: SearchScope::Tag,
            })
            .unwrap();
        assert_eq!(by_tag.iter().map(|p| p.id).collect::<Vec<_>>(), vec![2, 1]);

        let by_title = backend
            .load_feed(&FeedQuery::Search {
                text: "chill".into(),
                scope: SearchScope::Title,
            })
            .unwrap();
        assert!(by_title.is_empty());

        let by_user = backend.load_feed(&FeedQuery::ByUser(2)).unwrap();
        assert_eq!(by_user.len(), 1);
    }

    #[test]
    fn mock_like_toggles_and_counts() {
        let backend = MockBackend::sample();
        assert_eq!(backend.toggle_like(3).unwrap().liked, Some(true));
        let feed = backend.load_feed(&FeedQuery::All).unwrap();
        let post = feed.iter().find(|p| p.id == 3).unwrap();
        assert_eq!((post.like_count, post.liked_by_current_user), (1, true));
        assert_eq!(backend.toggle_like(3).unwrap().liked, Some(false));
        assert_eq!(backend.like_count(3), 0);
    }

    #[test]
    fn mock_mutations_require_sign_in() {
        let backend = MockBackend::sample();
        backend.set_signed_in(false);
        assert!(backend.toggle_like(3).is_err());
        assert!(backend.reply(3, "hi").is_err());
        assert_eq!(backend.current_user().unwrap(), None);
    }
}
