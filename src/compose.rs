use crate::link;
use crate::model::NewPost;

pub const MAX_TAGS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("a song title is required")]
    MissingTitle,
    #[error("a song URL is required")]
    MissingUrl,
    #[error("a comment is required")]
    MissingComment,
    #[error("too many tags ({count}, max {max})")]
    TooManyTags { count: usize, max: usize },
    #[error("tags cannot be blank")]
    BlankTag,
    #[error("reply cannot be empty")]
    EmptyReply,
}

/// Splits comma separated tag text. Blank entries are dropped, duplicates and
/// order are kept, and at most `max` tags survive.
pub fn parse_tags(input: &str, max: usize) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .take(max)
        .map(str::to_string)
        .collect()
}

/// Editing state of the compose form. Owned by the front end and only cleared
/// once the post has been accepted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostForm {
    pub title: String,
    pub url: String,
    pub comment: String,
    pub tags: String,
    pub post_to_twitter: bool,
}

impl PostForm {
    pub fn clear(&mut self) {
        *self = PostForm {
            post_to_twitter: self.post_to_twitter,
            ..PostForm::default()
        };
    }

    /// Builds the request body, classifying the URL on the way.
    pub fn to_new_post(&self, max_tags: usize) -> Result<NewPost, ValidationError> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(ValidationError::MissingTitle);
        }
        let url = self.url.trim();
        if url.is_empty() {
            return Err(ValidationError::MissingUrl);
        }
        if self.comment.trim().is_empty() {
            return Err(ValidationError::MissingComment);
        }

        let post = NewPost {
            title: title.to_string(),
            comment: self.comment.clone(),
            tags: parse_tags(&self.tags, max_tags),
            song: link::classify(url),
            post_to_twitter: self.post_to_twitter,
        };
        validate_new_post(&post, max_tags)?;
        Ok(post)
    }
}

/// Checks a payload built elsewhere against the same rules as the form.
pub fn validate_new_post(post: &NewPost, max_tags: usize) -> Result<(), ValidationError> {
    if post.title.trim().is_empty() {
        return Err(ValidationError::MissingTitle);
    }
    if post.comment.trim().is_empty() {
        return Err(ValidationError::MissingComment);
    }
    if post.song.id().trim().is_empty() {
        return Err(ValidationError::MissingUrl);
    }
    if post.tags.len() > max_tags {
        return Err(ValidationError::TooManyTags {
            count: post.tags.len(),
            max: max_tags,
        });
    }
    if post.tags.iter().any(|tag| tag.trim().is_empty()) {
        return Err(ValidationError::BlankTag);
    }
    Ok(())
}

pub fn validate_reply(content: &str) -> Result<(), ValidationError> {
    if content.trim().is_empty() {
        Err(ValidationError::EmptyReply)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SongRef;

    fn form() -> PostForm {
        PostForm {
            title: " Karma Police ".into(),
            url: " https://youtu.be/1uYWYWPc9HU ".into(),
            comment: "rainy day".into(),
            tags: String::new(),
            post_to_twitter: false,
        }
    }

    #[test]
    fn tags_keep_order_and_duplicates_but_drop_blanks() {
        assert_eq!(
            parse_tags("chill, rock, chill, 2024,,", MAX_TAGS),
            vec!["chill", "rock", "chill", "2024"]
        );
    }

    #[test]
    fn tags_are_capped() {
        let input = (1..=14).map(|n| n.to_string()).collect::<Vec<_>>().join(",");
        let tags = parse_tags(&input, MAX_TAGS);
        assert_eq!(tags.len(), MAX_TAGS);
        assert_eq!(tags.last().map(String::as_str), Some("10"));
    }

    #[test]
    fn form_classifies_trimmed_url() {
        let post = form().to_new_post(MAX_TAGS).unwrap();
        assert_eq!(post.title, "Karma Police");
        assert_eq!(post.song, SongRef::YouTube("1uYWYWPc9HU".into()));
        assert!(post.tags.is_empty());
    }

    #[test]
    fn required_fields_are_checked_before_anything_else() {
        let mut missing_title = form();
        missing_title.title = "   ".into();
        assert_eq!(
            missing_title.to_new_post(MAX_TAGS),
            Err(ValidationError::MissingTitle)
        );

        let mut missing_comment = form();
        missing_comment.comment = "\n".into();
        assert_eq!(
            missing_comment.to_new_post(MAX_TAGS),
            Err(ValidationError::MissingComment)
        );

        let mut missing_url = form();
        missing_url.url.clear();
        assert_eq!(
            missing_url.to_new_post(MAX_TAGS),
            Err(ValidationError::MissingUrl)
        );
    }

    #[test]
    fn hand_built_payloads_are_checked_for_tag_overflow() {
        let mut post = form().to_new_post(MAX_TAGS).unwrap();
        post.tags = vec!["x".to_string(); 11];
        assert_eq!(
            validate_new_post(&post, MAX_TAGS),
            Err(ValidationError::TooManyTags { count: 11, max: 10 })
        );
        post.tags = vec!["ok".into(), " ".into()];
        assert_eq!(validate_new_post(&post, MAX_TAGS), Err(ValidationError::BlankTag));
    }

    #[test]
    fn clearing_keeps_the_share_preference() {
        let mut form = form();
        form.post_to_twitter = true;
        form.clear();
        assert!(form.title.is_empty());
        assert!(form.post_to_twitter);
    }

    #[test]
    fn replies_must_have_content() {
        assert_eq!(validate_reply("  \t"), Err(ValidationError::EmptyReply));
        assert!(validate_reply("nice pick").is_ok());
    }
}
