//! Rule-based WordPress assistant with an LLM fallback.
//!
//! Recognised commands (case-insensitive, matched on words in the message):
//!
//! - "show posts" / "get posts" / "list posts": recent posts
//! - "search posts TERM": posts matching TERM
//! - "create post": guided title, content and status prompts, then publish
//! - "site info": name and tagline of the site
//! - "help": the command list
//! - "cancel": abandon a post in progress
//!
//! Anything else goes to the LLM together with the session's recent history.

use crate::llm::{AskAsync, ChatMessage};
use crate::models::{PostStatus, PostSummary};
use crate::session::SessionStore;
use crate::wordpress::{NewPost, WordPressPublisher};
use itertools::Itertools;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Messages of history kept per session.
const MAX_HISTORY: usize = 30;

const RECENT_POSTS: u32 = 10;

pub const HELP_TEXT: &str = "I can help you with these WordPress tasks:

**Available Commands:**
• \"show posts\" or \"get posts\" - View recent posts
• \"create post\" - Create a new blog post (I'll guide you step by step)
• \"search posts [term]\" - Search for specific posts
• \"site info\" - Get WordPress site information
• \"help\" - Show this help message

Just tell me what you'd like to do!";

const GREETING: &str = "I'm your WordPress assistant! I can help you:

• **View posts** - Say \"show posts\"
• **Create posts** - Say \"create post\"
• **Search posts** - Say \"search posts [term]\"
• **Get site info** - Say \"site info\"

What would you like to do?";

const STATUS_QUESTION: &str = "Perfect! What status should this post have?
- 'draft' (default)
- 'publish' (live on site)
- 'private' (hidden)";

const SYSTEM_PROMPT: &str = "You are a helpful assistant for a WordPress site. \
Answer briefly. When the user wants to manage posts, point them to the commands: \
\"show posts\", \"search posts [term]\", \"create post\", \"site info\".";

/// A post being assembled over several messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostDraft {
    AwaitingTitle,
    AwaitingContent { title: String },
    AwaitingStatus { title: String, content: String },
}

/// Per-session conversation state.
#[derive(Debug, Clone, Default)]
pub struct ChatSession {
    pub draft: Option<PostDraft>,
    pub history: Vec<ChatMessage>,
}

impl ChatSession {
    fn remember(&mut self, user: &str, reply: &str) {
        self.history.push(ChatMessage::user(user));
        self.history.push(ChatMessage::assistant(reply));
        if self.history.len() > MAX_HISTORY {
            let excess = self.history.len() - MAX_HISTORY;
            self.history.drain(..excess);
        }
    }
}

/// What a message asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Cancel,
    ListPosts,
    SearchPosts(Option<String>),
    CreatePost,
    SiteInfo,
    Help,
    Other,
}

/// Classify a message by keywords.
pub fn parse_command(message: &str) -> Command {
    let lower = message.trim().to_lowercase();
    let has = |w: &str| lower.contains(w);

    if lower == "cancel" {
        return Command::Cancel;
    }
    if has("search") && has("post") {
        let words: Vec<&str> = message.split_whitespace().collect();
        let term = words
            .iter()
            .position(|w| w.eq_ignore_ascii_case("search"))
            .map(|i| words.iter().skip(i + 2).join(" "))
            .filter(|t| !t.is_empty());
        return Command::SearchPosts(term);
    }
    if has("create") && has("post") {
        return Command::CreatePost;
    }
    if (has("show") || has("get") || has("list")) && has("post") {
        return Command::ListPosts;
    }
    if has("site") && has("info") {
        return Command::SiteInfo;
    }
    if has("help") {
        return Command::Help;
    }
    Command::Other
}

/// Status picked from a free-form answer; draft unless publish/private is named.
pub fn status_from_answer(answer: &str) -> PostStatus {
    let lower = answer.to_lowercase();
    if lower.contains("publish") {
        PostStatus::Publish
    } else if lower.contains("private") {
        PostStatus::Private
    } else {
        PostStatus::Draft
    }
}

fn format_posts(header: &str, posts: &[PostSummary]) -> String {
    if posts.is_empty() {
        return format!("{header}\n\nNo posts found.");
    }
    let lines = posts
        .iter()
        .enumerate()
        .map(|(i, p)| {
            format!(
                "{}. **{}** ({}{})\n   {}",
                i + 1,
                p.title,
                p.status,
                p.date.as_deref().map(|d| format!(", {d}")).unwrap_or_default(),
                p.link
            )
        })
        .join("\n");
    format!("{header}\n\n{lines}")
}

/// Chat front end over a WordPress site.
#[derive(Debug)]
pub struct ChatAssistant<L>
where
    L: AskAsync<Response = String>,
{
    wordpress: WordPressPublisher,
    llm: Option<Arc<L>>,
    sessions: SessionStore<ChatSession>,
}

impl<L> ChatAssistant<L>
where
    L: AskAsync<Response = String>,
{
    pub fn new(wordpress: WordPressPublisher, llm: Option<Arc<L>>, sessions: SessionStore<ChatSession>) -> Self {
        Self {
            wordpress,
            llm,
            sessions,
        }
    }

    /// Forget everything about a session.
    pub async fn clear(&self, session_id: &str) {
        self.sessions.clear(session_id).await;
        info!(session_id, "session cleared");
    }

    /// Reply to one message.
    #[instrument(level = "info", skip(self, message))]
    pub async fn handle(&self, session_id: &str, message: &str) -> String {
        let message = message.trim();
        if message.is_empty() {
            return "Message cannot be empty.".to_string();
        }
        let mut session = self.sessions.load(session_id).await;
        let command = parse_command(message);

        let reply = match (session.draft.take(), command) {
            (Some(_), Command::Cancel) => "Okay, I've discarded that post.".to_string(),
            (None, Command::Cancel) => "There is nothing to cancel.".to_string(),
            (Some(draft), _) => self.continue_draft(&mut session, draft, message).await,
            (None, Command::ListPosts) => self.list_posts(None).await,
            (None, Command::SearchPosts(term)) => self.list_posts(term.as_deref()).await,
            (None, Command::CreatePost) => {
                session.draft = Some(PostDraft::AwaitingTitle);
                "I'll help you create a new post! What would you like the title to be?".to_string()
            }
            (None, Command::SiteInfo) => self.site_info().await,
            (None, Command::Help) => HELP_TEXT.to_string(),
            (None, Command::Other) => self.fallback(&session, message).await,
        };

        session.remember(message, &reply);
        self.sessions.save(session_id, session).await;
        reply
    }

    async fn continue_draft(&self, session: &mut ChatSession, draft: PostDraft, message: &str) -> String {
        match draft {
            PostDraft::AwaitingTitle => {
                let reply = format!("Great! The title is '{message}'. Now, what should the content be?");
                session.draft = Some(PostDraft::AwaitingContent {
                    title: message.to_string(),
                });
                reply
            }
            PostDraft::AwaitingContent { title } => {
                session.draft = Some(PostDraft::AwaitingStatus {
                    title,
                    content: message.to_string(),
                });
                STATUS_QUESTION.to_string()
            }
            PostDraft::AwaitingStatus { title, content } => {
                let status = status_from_answer(message);
                let body = format!("<p>{content}</p>");
                match self
                    .wordpress
                    .create_post(&NewPost::new(&title, &body, status))
                    .await
                {
                    Ok(post) => format!(
                        "✅ Post created!\n\n**Title:** {}\n**Status:** {}\n**ID:** {}\n**Link:** {}",
                        post.title, post.status, post.id, post.url
                    ),
                    Err(e) => {
                        warn!(error = %e, "chat post creation failed");
                        format!("Error creating post: {e}")
                    }
                }
            }
        }
    }

    async fn list_posts(&self, search: Option<&str>) -> String {
        let header = match search {
            Some(term) => format!("**Posts matching '{term}':**"),
            None => "**Recent posts:**".to_string(),
        };
        match self.wordpress.list_posts(search, RECENT_POSTS).await {
            Ok(posts) => format_posts(&header, &posts),
            Err(e) => format!("Error getting posts: {e}"),
        }
    }

    async fn site_info(&self) -> String {
        match self.wordpress.site_info().await {
            Ok(info) => format!(
                "**WordPress Site Information:**\n\n**Site URL:** {}\n**Name:** {}\n**Description:** {}",
                info.url,
                info.name,
                if info.description.is_empty() {
                    "No description"
                } else {
                    info.description.as_str()
                }
            ),
            Err(e) => format!("Error getting site info: {e}"),
        }
    }

    async fn fallback(&self, session: &ChatSession, message: &str) -> String {
        let Some(llm) = &self.llm else {
            return GREETING.to_string();
        };
        let mut messages = Vec::with_capacity(session.history.len() + 2);
        messages.push(ChatMessage::system(SYSTEM_PROMPT));
        messages.extend(session.history.iter().cloned());
        messages.push(ChatMessage::user(message));
        match llm.ask(&messages).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!(error = %e, "assistant model call failed");
                GREETING.to_string()
            }
        }
    }
}
