use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub profile_image: String,
    #[serde(default)]
    pub bio: Option<String>,
}

impl User {
    pub fn label(&self) -> &str {
        if self.display_name.trim().is_empty() {
            "Unknown User"
        } else {
            &self.display_name
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Spotify,
    YouTube,
    AppleMusic,
    #[serde(other)]
    Other,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Spotify => "spotify",
            Provider::YouTube => "youtube",
            Provider::AppleMusic => "applemusic",
            Provider::Other => "other",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Provider::Spotify => "Spotify",
            Provider::YouTube => "YouTube",
            Provider::AppleMusic => "Apple Music",
            Provider::Other => "Link",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A playable song reference. The variant is fixed when the post is created.
///
/// On the wire this is the `song_type` / `song_id` pair of a post.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SongRef {
    Spotify(String),
    YouTube(String),
    AppleMusic(String),
    Other(String),
}

impl SongRef {
    pub fn new(provider: Provider, id: impl Into<String>) -> Self {
        let id = id.into();
        match provider {
            Provider::Spotify => SongRef::Spotify(id),
            Provider::YouTube => SongRef::YouTube(id),
            Provider::AppleMusic => SongRef::AppleMusic(id),
            Provider::Other => SongRef::Other(id),
        }
    }

    pub fn provider(&self) -> Provider {
        match self {
            SongRef::Spotify(_) => Provider::Spotify,
            SongRef::YouTube(_) => Provider::YouTube,
            SongRef::AppleMusic(_) => Provider::AppleMusic,
            SongRef::Other(_) => Provider::Other,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            SongRef::Spotify(id)
            | SongRef::YouTube(id)
            | SongRef::AppleMusic(id)
            | SongRef::Other(id) => id,
        }
    }

    pub fn display_url(&self) -> String {
        match self {
            SongRef::Spotify(id) => format!("https://open.spotify.com/track/{id}"),
            SongRef::YouTube(id) => format!("https://www.youtube.com/watch?v={id}"),
            SongRef::AppleMusic(path) => format!("https://music.apple.com{path}"),
            SongRef::Other(url) => url.clone(),
        }
    }

    pub fn embed_url(&self) -> Option<String> {
        match self {
            SongRef::Spotify(id) => Some(format!("https://open.spotify.com/embed/track/{id}")),
            SongRef::YouTube(id) => Some(format!("https://www.youtube.com/embed/{id}")),
            SongRef::AppleMusic(path) => Some(format!("https://embed.music.apple.com{path}")),
            SongRef::Other(_) => None,
        }
    }
}

#[derive(Serialize)]
struct WireSongRef<'a> {
    song_id: &'a str,
    song_type: Provider,
}

#[derive(Deserialize)]
struct OwnedWireSongRef {
    #[serde(default)]
    song_id: String,
    #[serde(default = "default_provider")]
    song_type: Provider,
}

fn default_provider() -> Provider {
    Provider::Other
}

impl Serialize for SongRef {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        WireSongRef {
            song_id: self.id(),
            song_type: self.provider(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SongRef {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let wire = OwnedWireSongRef::deserialize(deserializer)?;
        Ok(SongRef::new(wire.song_type, wire.song_id))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    #[serde(default)]
    pub user_id: i64,
    pub title: String,
    #[serde(flatten)]
    pub song: SongRef,
    #[serde(default)]
    pub comment: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, rename = "user")]
    pub author: Option<User>,
    #[serde(default)]
    pub like_count: u32,
    #[serde(default)]
    pub reply_count: u32,
    #[serde(default)]
    pub liked_by_current_user: bool,
}

impl Post {
    pub fn author_name(&self) -> &str {
        self.author
            .as_ref()
            .map(User::label)
            .unwrap_or("Unknown User")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub id: i64,
    #[serde(default)]
    pub post_id: i64,
    #[serde(default, rename = "user_id")]
    pub author_id: i64,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, rename = "user")]
    pub author: Option<User>,
}

/// Body of `POST /api/posts`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewPost {
    pub title: String,
    pub comment: String,
    pub tags: Vec<String>,
    #[serde(flatten)]
    pub song: SongRef,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub post_to_twitter: bool,
}

/// Response of the like toggle. The server may omit the body entirely.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct LikeAck {
    #[serde(default)]
    pub liked: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchScope {
    #[default]
    All,
    Title,
    Comment,
    Tag,
}

impl SearchScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchScope::All => "all",
            SearchScope::Title => "title",
            SearchScope::Comment => "comment",
            SearchScope::Tag => "tag",
        }
    }
}

impl fmt::Display for SearchScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchScope {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "all" => Ok(SearchScope::All),
            "title" => Ok(SearchScope::Title),
            "comment" => Ok(SearchScope::Comment),
            "tag" => Ok(SearchScope::Tag),
            other => bail!("unknown search scope {other:?} (expected all, title, comment or tag)"),
        }
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}
