use anyhow::Result;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use tracing::{debug, warn};

use crate::model::{Post, SearchScope};

/// Characters `encodeURIComponent` leaves alone.
const QUERY_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedQuery {
    All,
    ByUser(i64),
    Search { text: String, scope: SearchScope },
}

impl FeedQuery {
    /// Request path relative to the API base.
    pub fn path(&self) -> String {
        match self {
            FeedQuery::All => "/api/posts".to_string(),
            FeedQuery::ByUser(user_id) => format!("/api/posts?user_id={user_id}"),
            FeedQuery::Search { text, scope } => format!(
                "/api/search/posts?q={}&type={}",
                utf8_percent_encode(text, QUERY_COMPONENT),
                scope.as_str()
            ),
        }
    }

    pub fn is_search(&self) -> bool {
        matches!(self, FeedQuery::Search { .. })
    }
}

/// Which loading indicator a fetch drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadKind {
    Initial,
    Background,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedRequest {
    pub generation: u64,
    pub query: FeedQuery,
    pub kind: LoadKind,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppliedQuery {
    pub text: String,
    pub scope: SearchScope,
    pub user: Option<i64>,
}

impl AppliedQuery {
    pub fn query(&self) -> FeedQuery {
        if !self.text.is_empty() {
            FeedQuery::Search {
                text: self.text.clone(),
                scope: self.scope,
            }
        } else if let Some(user_id) = self.user {
            FeedQuery::ByUser(user_id)
        } else {
            FeedQuery::All
        }
    }

    pub fn is_filtered(&self) -> bool {
        !self.text.is_empty() || self.user.is_some()
    }
}

#[derive(Debug, Default)]
pub struct SearchFilterEngine {
    query_text: String,
    scope: SearchScope,
    applied: AppliedQuery,
    generation: u64,
    in_flight: Option<(u64, LoadKind)>,
}

impl SearchFilterEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query_text(&self) -> &str {
        &self.query_text
    }

    pub fn scope(&self) -> SearchScope {
        self.scope
    }

    pub fn applied(&self) -> &AppliedQuery {
        &self.applied
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.in_flight, Some((_, LoadKind::Initial)))
    }

    pub fn is_searching(&self) -> bool {
        matches!(self.in_flight, Some((_, LoadKind::Background)))
    }

    pub fn set_query_text(&mut self, text: impl Into<String>) {
        self.query_text = text.into();
    }

    pub fn set_scope(&mut self, scope: SearchScope) {
        self.scope = scope;
    }

    pub fn load_initial(&mut self) -> FeedRequest {
        self.issue(LoadKind::Initial)
    }

    /// Commits the editing state and fetches it.
    pub fn submit(&mut self) -> FeedRequest {
        self.applied = AppliedQuery {
            text: self.query_text.clone(),
            scope: self.scope,
            user: self.applied.user,
        };
        let kind = self.kind_for_applied();
        self.issue(kind)
    }

    pub fn clear(&mut self) -> FeedRequest {
        self.query_text.clear();
        self.scope = SearchScope::All;
        self.applied = AppliedQuery::default();
        self.issue(LoadKind::Initial)
    }

    pub fn search_by_tag(&mut self, tag: &str) -> FeedRequest {
        self.query_text = tag.to_string();
        self.scope = SearchScope::Tag;
        self.submit()
    }

    pub fn filter_by_user(&mut self, user_id: Option<i64>) -> FeedRequest {
        self.query_text.clear();
        self.scope = SearchScope::All;
        self.applied = AppliedQuery {
            user: user_id,
            ..AppliedQuery::default()
        };
        self.issue(LoadKind::Initial)
    }

    pub fn refresh(&mut self) -> FeedRequest {
        let kind = self.kind_for_applied();
        self.issue(kind)
    }

    /// Settles a fetch. Returns the posts to display, or `None` when the
    /// response belongs to a superseded request. Failures degrade to an empty
    /// feed.
    pub fn complete(&mut self, generation: u64, result: Result<Vec<Post>>) -> Option<Vec<Post>> {
        match self.in_flight {
            Some((current, _)) if current == generation => {}
            _ => {
                debug!(generation, latest = self.generation, "dropping stale feed response");
                return None;
            }
        }
        self.in_flight = None;
        match result {
            Ok(posts) => Some(posts),
            Err(err) => {
                warn!(query = %self.applied.query().path(), "feed request failed: {err:#}");
                Some(Vec::new())
            }
        }
    }

    fn kind_for_applied(&self) -> LoadKind {
        if self.applied.text.is_empty() {
            LoadKind::Initial
        } else {
            LoadKind::Background
        }
    }

    fn issue(&mut self, kind: LoadKind) -> FeedRequest {
        self.generation = self.generation.wrapping_add(1);
        self.in_flight = Some((self.generation, kind));
        FeedRequest {
            generation: self.generation,
            query: self.applied.query(),
            kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use chrono::Utc;

    use crate::model::SongRef;

    fn post(id: i64) -> Post {
        Post {
            id,
            user_id: 1,
            title: format!("post {id}"),
            song: SongRef::Other("https://example.com".into()),
            comment: String::new(),
            tags: Vec::new(),
            created_at: Utc::now(),
            author: None,
            like_count: 0,
            reply_count: 0,
            liked_by_current_user: false,
        }
    }

    #[test]
    fn query_paths() {
        assert_eq!(FeedQuery::All.path(), "/api/posts");
        assert_eq!(FeedQuery::ByUser(4).path(), "/api/posts?user_id=4");
        assert_eq!(
            FeedQuery::Search {
                text: "lo-fi & jazz/2024".into(),
                scope: SearchScope::Comment,
            }
            .path(),
            "/api/search/posts?q=lo-fi%20%26%20jazz%2F2024&type=comment"
        );
    }

    #[test]
    fn editing_does_not_touch_applied_state() {
        let mut engine = SearchFilterEngine::new();
        engine.set_query_text("rock");
        engine.set_scope(SearchScope::Title);
        assert_eq!(engine.applied(), &AppliedQuery::default());
        assert!(!engine.in_flight());
    }

    #[test]
    fn submit_commits_text_and_scope_together() {
        let mut engine = SearchFilterEngine::new();
        engine.set_query_text("rock");
        engine.set_scope(SearchScope::Title);
        let request = engine.submit();
        assert_eq!(
            request.query,
            FeedQuery::Search {
                text: "rock".into(),
                scope: SearchScope::Title
            }
        );
        assert_eq!(request.kind, LoadKind::Background);
        assert!(engine.is_searching());
        assert!(!engine.is_loading());
        assert_eq!(engine.applied().text, "rock");
        assert_eq!(engine.applied().scope, SearchScope::Title);
    }

    #[test]
    fn empty_submit_fetches_unfiltered_feed() {
        let mut engine = SearchFilterEngine::new();
        engine.set_scope(SearchScope::Tag);
        let request = engine.submit();
        assert_eq!(request.query, FeedQuery::All);
        assert!(engine.is_loading());
    }

    #[test]
    fn clear_after_submit_discards_the_stale_search() {
        let mut engine = SearchFilterEngine::new();
        engine.set_query_text("rock");
        let search = engine.submit();
        let clear = engine.clear();
        assert_eq!(clear.query, FeedQuery::All);
        assert_eq!(engine.query_text(), "");
        assert_eq!(engine.scope(), SearchScope::All);

        assert_eq!(engine.complete(search.generation, Ok(vec![post(1)])), None);
        assert!(engine.in_flight());
        let shown = engine.complete(clear.generation, Ok(vec![post(2), post(3)]));
        assert_eq!(shown.map(|posts| posts.len()), Some(2));
        assert!(!engine.in_flight());
    }

    #[test]
    fn stale_response_after_newer_one_is_ignored() {
        let mut engine = SearchFilterEngine::new();
        engine.set_query_text("a");
        let first = engine.submit();
        engine.set_query_text("b");
        let second = engine.submit();
        assert!(engine.complete(second.generation, Ok(vec![post(2)])).is_some());
        assert_eq!(engine.complete(first.generation, Ok(vec![post(1)])), None);
        assert!(!engine.is_loading() && !engine.is_searching());
    }

    #[test]
    fn failures_degrade_to_an_empty_feed() {
        let mut engine = SearchFilterEngine::new();
        let request = engine.load_initial();
        let shown = engine.complete(request.generation, Err(anyhow!("connection refused")));
        assert_eq!(shown, Some(Vec::new()));
        assert!(!engine.in_flight());
    }

    #[test]
    fn search_by_tag_bypasses_manual_edit() {
        let mut engine = SearchFilterEngine::new();
        engine.set_query_text("half typed");
        let request = engine.search_by_tag("chill");
        assert_eq!(
            request.query,
            FeedQuery::Search {
                text: "chill".into(),
                scope: SearchScope::Tag
            }
        );
        assert_eq!(engine.query_text(), "chill");
        assert_eq!(engine.scope(), SearchScope::Tag);
    }

    #[test]
    fn refresh_reissues_applied_state_not_edits() {
        let mut engine = SearchFilterEngine::new();
        engine.set_query_text("jazz");
        let first = engine.submit();
        engine.set_query_text("something else");
        let again = engine.refresh();
        assert_eq!(again.query, first.query);
        assert!(again.generation > first.generation);
    }

    #[test]
    fn user_filter_applies_only_without_text() {
        let mut engine = SearchFilterEngine::new();
        assert_eq!(engine.filter_by_user(Some(9)).query, FeedQuery::ByUser(9));
        engine.set_query_text("rock");
        assert!(engine.submit().query.is_search());
        engine.set_query_text("");
        assert_eq!(engine.submit().query, FeedQuery::ByUser(9));
        assert_eq!(engine.clear().query, FeedQuery::All);
        assert!(!engine.applied().is_filtered());
    }
}
