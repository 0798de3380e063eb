use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::{Provider, SongRef};

pub struct Matcher {
    pub provider: Provider,
    pattern: Regex,
}

impl Matcher {
    fn new(provider: Provider, pattern: &str) -> Self {
        Self {
            provider,
            pattern: Regex::new(pattern).expect("valid song link regex"),
        }
    }

    /// Extracts the provider id from `url`, if this matcher applies.
    pub fn capture<'a>(&self, url: &'a str) -> Option<&'a str> {
        self.pattern
            .captures(url)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
    }
}

static MATCHERS: Lazy<[Matcher; 3]> = Lazy::new(|| {
    [
        Matcher::new(
            Provider::Spotify,
            r"open\.spotify\.com/(?:intl-[A-Za-z]{2}/)?track/([A-Za-z0-9]+)",
        ),
        Matcher::new(Provider::AppleMusic, r"music\.apple\.com(/.+)"),
        Matcher::new(
            Provider::YouTube,
            r#"(?:youtube\.com/(?:[^/]+/.+/|(?:v|e(?:mbed)?)/|.*[?&]v=)|youtu\.be/)([^"&?/\s]{11})(?:["&?/\s]|$)"#,
        ),
    ]
});

/// Known providers in match order. `Other` is the implicit fallback.
pub fn matchers() -> &'static [Matcher] {
    MATCHERS.as_slice()
}

/// Classifies a raw URL. Never fails: unrecognised input becomes
/// [`SongRef::Other`] carrying the string verbatim.
pub fn classify(url: &str) -> SongRef {
    matchers()
        .iter()
        .find_map(|matcher| {
            matcher
                .capture(url)
                .map(|id| SongRef::new(matcher.provider, id))
        })
        .unwrap_or_else(|| SongRef::Other(url.to_string()))
}
