use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use textwrap::{wrap, Options as WrapOptions};
use tracing::warn;

use crate::api;
use crate::compose::PostForm;
use crate::config::{self, Config};
use crate::data::{
    self, AuthService, FeedService, InteractionService, MockBackend, ReplyService, UserService,
};
use crate::feed::{self, FeedController, FeedEvent, Services};
use crate::model::{Post, SearchScope};
use crate::session::{self, Session};

const WRAP_WIDTH: usize = 78;

const HELP: &str = "\
Commands:
  feed | refresh         reload what the feed is showing
  search <text>          search with the current scope
  scope <all|title|comment|tag>
                         change the scope used by the next search
  tag <tag>              show posts with this tag
  user <id|all>          show posts by one user, or everyone
  users [name]           list users
  clear                  drop every filter
  like <post>            like or unlike a post
  replies <post>         show replies
  hide <post>            hide replies
  reply <post> <text>    reply to a post
  post                   share a song
  open <post>            open the song in your browser
  cookie <value>         save a session cookie to the config file
  whoami | logout
  help | quit";

#[derive(Debug, Clone, Default)]
pub struct Options {
    /// Serve sample data instead of talking to a backend.
    pub offline: bool,
    pub config_file: Option<PathBuf>,
}

pub fn run(options: Options) -> Result<()> {
    let cfg = config::load(config::LoadOptions {
        config_file: options.config_file.clone(),
        env_prefix: None,
    })
    .context("load config")?;

    let (services, auth) = if options.offline {
        let backend = Arc::new(MockBackend::sample());
        let auth: Arc<dyn AuthService> = backend.clone();
        (Services::from_backend(backend), auth)
    } else {
        http_services(&cfg)?
    };

    let manager = session::Manager::new(auth);
    let session = match manager.refresh() {
        Ok(session) => session,
        Err(err) => {
            warn!("could not resolve session: {err:#}");
            Session::anonymous()
        }
    };

    let controller = FeedController::new(feed::Options {
        services,
        session,
        max_tags: cfg.feed.max_tags,
    });
    let mut shell = Shell::new(controller, manager, &cfg, options.config_file);

    let stdin = io::stdin();
    let stdout = io::stdout();
    shell.run(stdin.lock(), &mut stdout.lock())
}

fn http_services(cfg: &Config) -> Result<(Services, Arc<dyn AuthService>)> {
    let client = api::Client::new(api::ClientConfig {
        user_agent: cfg.api.user_agent.clone(),
        base_url: Some(cfg.api.base_url.clone()),
        timeout: Some(cfg.api.timeout),
        mutation_timeout: Some(cfg.api.mutation_timeout),
        session_cookie: Some(cfg.api.session_cookie.clone()),
        http_client: None,
    })
    .context("create api client")?;
    let client = Arc::new(client);

    let feed: Arc<dyn FeedService> = Arc::new(data::HttpFeedService::new(client.clone()));
    let interaction: Arc<dyn InteractionService> =
        Arc::new(data::HttpInteractionService::new(client.clone()));
    let replies: Arc<dyn ReplyService> = Arc::new(data::HttpReplyService::new(client.clone()));
    let users: Arc<dyn UserService> = Arc::new(data::HttpUserService::new(client.clone()));
    let auth: Arc<dyn AuthService> = Arc::new(data::HttpAuthService::new(client));

    Ok((
        Services {
            feed,
            interaction,
            replies,
            users,
        },
        auth,
    ))
}

enum Flow {
    Continue,
    Quit,
}

struct Shell {
    controller: FeedController,
    manager: session::Manager,
    settle_timeout: Duration,
    draft: PostForm,
    config_file: Option<PathBuf>,
}

impl Shell {
    fn new(
        controller: FeedController,
        manager: session::Manager,
        cfg: &Config,
        config_file: Option<PathBuf>,
    ) -> Self {
        Self {
            controller,
            manager,
            settle_timeout: cfg.api.timeout.max(cfg.api.mutation_timeout),
            draft: PostForm {
                post_to_twitter: cfg.feed.post_to_twitter,
                ..PostForm::default()
            },
            config_file,
        }
    }

    fn run<R: BufRead, W: Write>(&mut self, mut input: R, out: &mut W) -> Result<()> {
        match self.controller.session().user() {
            Some(user) => writeln!(out, "songfeed {}: signed in as {}", crate::VERSION, user.label())?,
            None => writeln!(out, "songfeed {}: browsing anonymously", crate::VERSION)?,
        }
        writeln!(out, "Type `help` for commands.")?;

        self.controller.load_initial();
        self.settle(out)?;

        let mut line = String::new();
        loop {
            write!(out, "> ")?;
            out.flush()?;
            line.clear();
            if input.read_line(&mut line)? == 0 {
                break;
            }
            let command = line.trim().to_string();
            if command.is_empty() {
                continue;
            }
            if let Flow::Quit = self.execute(&command, &mut input, out)? {
                break;
            }
        }
        Ok(())
    }

    fn execute<R: BufRead, W: Write>(
        &mut self,
        line: &str,
        input: &mut R,
        out: &mut W,
    ) -> Result<Flow> {
        let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
        let rest = rest.trim();

        match command {
            "help" | "?" => writeln!(out, "{HELP}")?,
            "quit" | "exit" | "q" => return Ok(Flow::Quit),
            "feed" | "refresh" => {
                self.controller.refresh();
                self.settle(out)?;
            }
            "search" => {
                self.controller.set_query_text(rest);
                self.controller.submit_search();
                self.settle(out)?;
            }
            "scope" => match rest.parse::<SearchScope>() {
                Ok(scope) => {
                    self.controller.set_scope(scope);
                    writeln!(out, "Scope set to {scope}. It applies to the next search.")?;
                }
                Err(err) => writeln!(out, "! {err}")?,
            },
            "tag" => {
                let tag = rest.trim_start_matches('#');
                if tag.is_empty() {
                    writeln!(out, "! usage: tag <tag>")?;
                } else {
                    self.controller.search_by_tag(tag);
                    self.settle(out)?;
                }
            }
            "clear" => {
                self.controller.clear_search();
                self.settle(out)?;
            }
            "user" => match rest {
                "" | "all" => {
                    self.controller.filter_by_user(None);
                    self.settle(out)?;
                }
                id => match id.parse::<i64>() {
                    Ok(user_id) => {
                        self.controller.filter_by_user(Some(user_id));
                        self.settle(out)?;
                    }
                    Err(_) => writeln!(out, "! usage: user <id|all>")?,
                },
            },
            "users" => {
                self.controller
                    .load_users(if rest.is_empty() { None } else { Some(rest) });
                self.settle(out)?;
            }
            "like" => {
                if let Some(post_id) = post_arg(rest, out)? {
                    match self.controller.toggle_like(post_id) {
                        Ok(()) => {
                            if let Some(post) = self.controller.post(post_id) {
                                writeln!(out, "{}", like_line(post))?;
                            }
                            self.settle(out)?;
                        }
                        Err(err) => writeln!(out, "! {err}")?,
                    }
                }
            }
            "replies" => {
                if let Some(post_id) = post_arg(rest, out)? {
                    self.controller.expand_replies(post_id);
                    self.settle(out)?;
                    self.print_thread(post_id, out)?;
                }
            }
            "hide" => {
                if let Some(post_id) = post_arg(rest, out)? {
                    self.controller.collapse_replies(post_id);
                }
            }
            "reply" => {
                let (id, content) = rest.split_once(' ').unwrap_or((rest, ""));
                if let Some(post_id) = post_arg(id, out)? {
                    match self.controller.submit_reply(post_id, content) {
                        Ok(()) => self.settle(out)?,
                        Err(err) => writeln!(out, "! {err}")?,
                    }
                }
            }
            "post" => self.compose(input, out)?,
            "open" => {
                if let Some(post_id) = post_arg(rest, out)? {
                    self.open(post_id, out)?;
                }
            }
            "cookie" => match config::save_session_cookie(self.config_file.clone(), rest) {
                Ok(path) => writeln!(
                    out,
                    "Saved session cookie to {}. Restart to sign in with it.",
                    path.display()
                )?,
                Err(err) => writeln!(out, "! {err:#}")?,
            },
            "whoami" => match self.manager.refresh() {
                Ok(session) => {
                    match session.user() {
                        Some(user) => writeln!(out, "Signed in as {} (#{}).", user.label(), user.id)?,
                        None => writeln!(out, "Not signed in.")?,
                    }
                    self.controller.set_session(session);
                }
                Err(err) => writeln!(out, "! {err:#}")?,
            },
            "logout" => match self.manager.logout() {
                Ok(()) => {
                    self.controller.set_session(self.manager.current());
                    writeln!(out, "Signed out.")?;
                }
                Err(err) => writeln!(out, "! {err:#}")?,
            },
            other => writeln!(out, "! unknown command `{other}`, try `help`")?,
        }
        Ok(Flow::Continue)
    }

    /// Fills the draft field by field. An empty answer keeps what the draft
    /// already holds, so a rejected post can be fixed without retyping it.
    fn compose<R: BufRead, W: Write>(&mut self, input: &mut R, out: &mut W) -> Result<()> {
        self.draft.title = prompt(input, out, "Title", &self.draft.title)?;
        self.draft.url = prompt(input, out, "Song URL", &self.draft.url)?;
        self.draft.comment = prompt(input, out, "Comment", &self.draft.comment)?;
        self.draft.tags = prompt(input, out, "Tags (comma separated)", &self.draft.tags)?;

        match self.controller.create_post(&self.draft) {
            Ok(()) => self.settle(out),
            Err(err) => {
                writeln!(out, "! {err}")?;
                Ok(())
            }
        }
    }

    fn open<W: Write>(&mut self, post_id: i64, out: &mut W) -> Result<()> {
        let Some(post) = self.controller.post(post_id) else {
            writeln!(out, "! post {post_id} is not in the feed")?;
            return Ok(());
        };
        let url = post.song.display_url();
        match webbrowser::open(&url) {
            Ok(_) => writeln!(out, "Opened {url}")?,
            Err(err) => writeln!(out, "! failed to open {url}: {err}")?,
        }
        Ok(())
    }

    /// Waits for outstanding requests and prints what they changed.
    fn settle<W: Write>(&mut self, out: &mut W) -> Result<()> {
        if self.controller.is_loading() {
            writeln!(out, "Loading...")?;
        } else if self.controller.is_searching() {
            writeln!(out, "Searching...")?;
        }

        for event in self.controller.settle(self.settle_timeout) {
            match event {
                FeedEvent::PostsReplaced => self.print_feed(out)?,
                FeedEvent::PostCreated(id) => {
                    self.draft.clear();
                    writeln!(out, "Shared post #{id}.")?;
                }
                FeedEvent::PostFailed(message)
                | FeedEvent::LikeFailed { message, .. }
                | FeedEvent::ReplyFailed { message, .. } => writeln!(out, "! {message}")?,
                FeedEvent::LikeSettled(_) => {}
                FeedEvent::RepliesUpdated(post_id) => self.print_thread(post_id, out)?,
                FeedEvent::ReplyCreated(post_id) => writeln!(out, "Replied to #{post_id}.")?,
                FeedEvent::UsersLoaded => self.print_users(out)?,
            }
        }

        if self.controller.is_busy() {
            writeln!(out, "Still waiting on the server.")?;
        }
        Ok(())
    }

    fn print_feed<W: Write>(&self, out: &mut W) -> Result<()> {
        let applied = self.controller.search().applied();
        if !applied.text.is_empty() {
            writeln!(out, "Results for \"{}\" in {}:", applied.text, applied.scope)?;
        } else if let Some(user_id) = applied.user {
            writeln!(out, "Posts by user #{user_id}:")?;
        }

        let posts = self.controller.posts();
        if posts.is_empty() {
            writeln!(out, "No posts.")?;
            return Ok(());
        }
        let now = Utc::now();
        for post in posts {
            writeln!(
                out,
                "#{} {} by {} [{}] {}",
                post.id,
                post.title,
                post.author_name(),
                post.song.provider().display_name(),
                ago(post.created_at, now)
            )?;
            for line in indented(&post.comment, "    ") {
                writeln!(out, "{line}")?;
            }
            if !post.tags.is_empty() {
                let tags: Vec<String> = post.tags.iter().map(|tag| format!("#{tag}")).collect();
                writeln!(out, "    {}", tags.join(" "))?;
            }
            writeln!(out, "    {}  {} replies", like_line(post), post.reply_count)?;
        }
        Ok(())
    }

    fn print_thread<W: Write>(&self, post_id: i64, out: &mut W) -> Result<()> {
        let Some(thread) = self.controller.thread(post_id) else {
            return Ok(());
        };
        if !thread.expanded {
            return Ok(());
        }
        if thread.loading {
            writeln!(out, "  Loading replies...")?;
            return Ok(());
        }
        if thread.replies.is_empty() {
            writeln!(out, "  No replies to #{post_id} yet.")?;
            return Ok(());
        }
        let now = Utc::now();
        writeln!(out, "  Replies to #{post_id}:")?;
        for reply in &thread.replies {
            let author = reply
                .author
                .as_ref()
                .map(|user| user.label().to_string())
                .unwrap_or_else(|| format!("user #{}", reply.author_id));
            writeln!(out, "  {author}, {}:", ago(reply.created_at, now))?;
            for line in indented(&reply.content, "      ") {
                writeln!(out, "{line}")?;
            }
        }
        Ok(())
    }

    fn print_users<W: Write>(&self, out: &mut W) -> Result<()> {
        let users = self.controller.users();
        if users.is_empty() {
            writeln!(out, "No users.")?;
        }
        for user in users {
            writeln!(out, "  #{} {}", user.id, user.label())?;
        }
        Ok(())
    }
}

fn post_arg<W: Write>(arg: &str, out: &mut W) -> Result<Option<i64>> {
    match arg.trim().trim_start_matches('#').parse::<i64>() {
        Ok(id) => Ok(Some(id)),
        Err(_) => {
            writeln!(out, "! expected a post number like 12")?;
            Ok(None)
        }
    }
}

fn prompt<R: BufRead, W: Write>(
    input: &mut R,
    out: &mut W,
    label: &str,
    current: &str,
) -> Result<String> {
    if current.is_empty() {
        write!(out, "{label}: ")?;
    } else {
        write!(out, "{label} [{current}]: ")?;
    }
    out.flush()?;
    let mut line = String::new();
    input.read_line(&mut line)?;
    let answer = line.trim_end_matches(['\r', '\n']);
    if answer.trim().is_empty() {
        Ok(current.to_string())
    } else {
        Ok(answer.to_string())
    }
}

fn like_line(post: &Post) -> String {
    let heart = if post.liked_by_current_user { "♥" } else { "♡" };
    format!("{heart} {}", post.like_count)
}

fn indented(text: &str, prefix: &str) -> Vec<String> {
    let options = WrapOptions::new(WRAP_WIDTH)
        .break_words(false)
        .initial_indent(prefix)
        .subsequent_indent(prefix);
    text.lines()
        .flat_map(|line| wrap(line, &options))
        .map(|cow| cow.into_owned())
        .collect()
}

fn ago(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now.signed_duration_since(then);
    if elapsed.num_minutes() < 1 {
        "just now".to_string()
    } else if elapsed.num_hours() < 1 {
        format!("{}m ago", elapsed.num_minutes())
    } else if elapsed.num_days() < 1 {
        format!("{}h ago", elapsed.num_hours())
    } else if elapsed.num_days() < 30 {
        format!("{}d ago", elapsed.num_days())
    } else {
        then.format("%Y-%m-%d").to_string()
    }
}
