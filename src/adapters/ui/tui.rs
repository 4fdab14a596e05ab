//! Implements InputPort. Inquire-based interactive client.
//!
//! One menu loop acting as the current actor (anonymous until someone signs in).
//! Domain errors are printed and the loop continues. Esc leaves the current action;
//! a broken terminal ends the session.

use crate::domain::{Actor, DomainError, Group, ImageUpdate, Page, Post};
use crate::ports::{FeedQuery, InputPort};
use crate::usecases::{AdminService, FeedComposer, MutationService, PostForm};
use async_trait::async_trait;
use inquire::error::InquireError;
use inquire::ui::{Color, RenderConfig, Styled};
use inquire::{Confirm, CustomType, Select, Text};
use std::fmt;
use std::sync::{Arc, Mutex};

/// Prompt styling shared by every inquire prompt in the session.
pub fn apply_theme() {
    let config = RenderConfig::default()
        .with_prompt_prefix(Styled::new("»").with_fg(Color::LightMagenta))
        .with_highlighted_option_prefix(Styled::new("›").with_fg(Color::LightCyan));
    inquire::set_global_render_config(config);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MenuItem {
    GlobalFeed,
    FollowingFeed,
    GroupFeed,
    Profile,
    OpenPost,
    WritePost,
    EditPost,
    DeletePost,
    Comment,
    Follow,
    Unfollow,
    RegisterUser,
    CreateGroup,
    SwitchUser,
    Quit,
}

impl MenuItem {
    const ALL: [MenuItem; 15] = [
        MenuItem::GlobalFeed,
        MenuItem::FollowingFeed,
        MenuItem::GroupFeed,
        MenuItem::Profile,
        MenuItem::OpenPost,
        MenuItem::WritePost,
        MenuItem::EditPost,
        MenuItem::DeletePost,
        MenuItem::Comment,
        MenuItem::Follow,
        MenuItem::Unfollow,
        MenuItem::RegisterUser,
        MenuItem::CreateGroup,
        MenuItem::SwitchUser,
        MenuItem::Quit,
    ];
}

impl fmt::Display for MenuItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MenuItem::GlobalFeed => "Latest posts",
            MenuItem::FollowingFeed => "Following",
            MenuItem::GroupFeed => "Group",
            MenuItem::Profile => "Profile",
            MenuItem::OpenPost => "Open post",
            MenuItem::WritePost => "New post",
            MenuItem::EditPost => "Edit post",
            MenuItem::DeletePost => "Delete post",
            MenuItem::Comment => "Comment",
            MenuItem::Follow => "Follow",
            MenuItem::Unfollow => "Unfollow",
            MenuItem::RegisterUser => "Register user",
            MenuItem::CreateGroup => "Create group",
            MenuItem::SwitchUser => "Sign in / out",
            MenuItem::Quit => "Quit",
        };
        f.write_str(label)
    }
}

/// Which feed a pager is walking.
enum FeedSource {
    Global,
    Following,
    Group(String),
}

/// Terminal client over the feed and write services.
pub struct TuiInputPort {
    feeds: Arc<dyn FeedQuery>,
    views: Arc<FeedComposer>,
    writes: Arc<MutationService>,
    admin: Arc<AdminService>,
    actor: Mutex<Actor>,
}

/// Outcome of a menu action that did not complete.
#[derive(Debug, thiserror::Error)]
enum UiError {
    /// Esc or Ctrl-C inside an action: back to the menu.
    #[error("cancelled")]
    Cancelled,
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("prompt failed: {0}")]
    Prompt(InquireError),
}

impl From<InquireError> for UiError {
    fn from(e: InquireError) -> Self {
        match e {
            InquireError::OperationCanceled | InquireError::OperationInterrupted => {
                UiError::Cancelled
            }
            other => UiError::Prompt(other),
        }
    }
}

fn print_post(post: &Post, groups: &[Group]) {
    let group = post
        .group_id
        .and_then(|id| groups.iter().find(|g| g.id == id))
        .map(|g| format!(" [{}]", g.title))
        .unwrap_or_default();
    println!(
        "#{} {} · {}{}",
        post.id,
        post.author,
        post.created_at.format("%d.%m.%Y %H:%M"),
        group
    );
    println!("  {}", post.text);
    if let Some(image) = &post.image {
        println!("  (image: {image})");
    }
}

fn print_page(page: &Page<Post>, groups: &[Group]) {
    if page.is_empty() {
        println!("Nothing here yet.");
    }
    for post in &page.items {
        print_post(post, groups);
    }
    println!(
        "page {}/{} · {} posts",
        page.number, page.num_pages, page.total_count
    );
}

impl TuiInputPort {
    pub fn new(
        feeds: Arc<dyn FeedQuery>,
        views: Arc<FeedComposer>,
        writes: Arc<MutationService>,
        admin: Arc<AdminService>,
    ) -> Self {
        Self {
            feeds,
            views,
            writes,
            admin,
            actor: Mutex::new(Actor::Anonymous),
        }
    }

    fn actor(&self) -> Actor {
        self.actor.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn set_actor(&self, actor: Actor) {
        *self.actor.lock().unwrap_or_else(|e| e.into_inner()) = actor;
    }

    async fn fetch(&self, source: &FeedSource, number: i64) -> Result<Page<Post>, DomainError> {
        match source {
            FeedSource::Global => self.feeds.global_feed(number).await,
            FeedSource::Following => self.feeds.following_feed(&self.actor(), number).await,
            FeedSource::Group(slug) => self.feeds.group_feed(slug, number).await,
        }
    }

    /// Shows pages of one feed until the user goes back.
    async fn browse(&self, source: FeedSource) -> Result<(), UiError> {
        let groups = self.views.groups().await?;
        let mut number = 1i64;
        loop {
            let page = self.fetch(&source, number).await?;
            print_page(&page, &groups);

            let mut moves = Vec::new();
            if page.has_next() {
                moves.push("Next page");
            }
            if page.has_previous() {
                moves.push("Previous page");
            }
            moves.push("Back");
            match Select::new("Navigate", moves).prompt()? {
                "Next page" => number = page.number as i64 + 1,
                "Previous page" => number = page.number as i64 - 1,
                _ => return Ok(()),
            }
        }
    }

    async fn pick_group(&self, allow_none: bool) -> Result<Option<Group>, UiError> {
        let groups = self.views.groups().await?;
        let mut labels: Vec<String> = groups
            .iter()
            .map(|g| format!("{} ({})", g.title, g.slug))
            .collect();
        if allow_none {
            labels.insert(0, "(no group)".to_string());
        }
        if labels.is_empty() {
            println!("No groups yet.");
            return Ok(None);
        }
        let chosen = Select::new("Group", labels).raw_prompt()?;
        let index = if allow_none {
            match chosen.index.checked_sub(1) {
                Some(i) => i,
                None => return Ok(None),
            }
        } else {
            chosen.index
        };
        Ok(groups.get(index).cloned())
    }

    async fn show_profile(&self) -> Result<(), UiError> {
        let username = Text::new("Username:").prompt()?;
        let number = CustomType::<i64>::new("Page:").with_default(1).prompt()?;
        let view = self.views.profile(&self.actor(), username.trim(), number).await?;
        println!(
            "{} · {} posts · {} followers · following {}{}",
            view.author,
            view.post_count,
            view.follower_count,
            view.following_count,
            if view.following { " · you follow them" } else { "" }
        );
        let groups = self.views.groups().await?;
        print_page(&view.page, &groups);
        Ok(())
    }

    async fn open_post(&self) -> Result<(), UiError> {
        let username = Text::new("Author:").prompt()?;
        let post_id = CustomType::<i64>::new("Post id:").prompt()?;
        let view = self
            .views
            .post_detail(&self.actor(), username.trim(), post_id)
            .await?;
        let groups = self.views.groups().await?;
        print_post(&view.post, &groups);
        println!("{} has {} posts", view.author, view.author_post_count);
        for comment in &view.comments {
            println!(
                "  - {} ({}): {}",
                comment.author,
                comment.created_at.format("%d.%m.%Y %H:%M"),
                comment.text
            );
        }
        Ok(())
    }

    async fn post_form(&self) -> Result<PostForm, UiError> {
        let text = Text::new("Text:").prompt()?;
        let group = self.pick_group(true).await?;
        Ok(PostForm {
            text,
            group_id: group.map(|g| g.id),
        })
    }

    async fn write_post(&self) -> Result<(), UiError> {
        let form = self.post_form().await?;
        let image = Text::new("Image reference (empty for none):").prompt()?;
        let image = Some(image.trim().to_string()).filter(|s| !s.is_empty());
        let post = self.writes.create_post(&self.actor(), form, image).await?;
        println!("Published #{}", post.id);
        Ok(())
    }

    async fn edit_post(&self) -> Result<(), UiError> {
        let post_id = CustomType::<i64>::new("Post id:").prompt()?;
        let form = self.post_form().await?;
        let image = match Select::new("Image", vec!["Keep", "Replace", "Remove"]).prompt()? {
            "Replace" => ImageUpdate::Replace(
                Text::new("New image reference:").prompt()?,
            ),
            "Remove" => ImageUpdate::Clear,
            _ => ImageUpdate::Keep,
        };
        let post = self
            .writes
            .edit_post(&self.actor(), post_id, form, image)
            .await?;
        println!("Saved #{}", post.id);
        Ok(())
    }

    async fn delete_post(&self) -> Result<(), UiError> {
        let post_id = CustomType::<i64>::new("Post id:").prompt()?;
        let sure = Confirm::new("Delete this post and its comments?")
            .with_default(false)
            .prompt()?;
        if sure {
            self.writes.delete_post(&self.actor(), post_id).await?;
            println!("Deleted #{post_id}");
        }
        Ok(())
    }

    async fn comment(&self) -> Result<(), UiError> {
        let post_id = CustomType::<i64>::new("Post id:").prompt()?;
        let text = Text::new("Comment:").prompt()?;
        self.writes.add_comment(&self.actor(), post_id, &text).await?;
        println!("Comment added");
        Ok(())
    }

    async fn follow(&self, follow: bool) -> Result<(), UiError> {
        let target = Text::new("Author:").prompt()?;
        let target = target.trim();
        let actor = self.actor();
        let changed = if follow {
            self.writes.follow(&actor, target).await?
        } else {
            self.writes.unfollow(&actor, target).await?
        };
        if !changed {
            println!("Nothing changed");
        }
        Ok(())
    }

    async fn register_user(&self) -> Result<(), UiError> {
        let username = Text::new("New username:").prompt()?;
        let user = self.admin.register_user(&username).await?;
        println!("Registered {user}");
        Ok(())
    }

    async fn create_group(&self) -> Result<(), UiError> {
        let title = Text::new("Title:").prompt()?;
        let slug = Text::new("Slug:").prompt()?;
        let description = Text::new("Description:").prompt()?;
        let group = self.admin.create_group(&title, &slug, &description).await?;
        println!("Created group {group} ({})", group.slug);
        Ok(())
    }

    async fn switch_user(&self) -> Result<(), UiError> {
        let name = Text::new("Sign in as (empty to sign out):").prompt()?;
        let actor = if name.trim().is_empty() {
            Actor::Anonymous
        } else {
            self.admin.sign_in(&name).await?
        };
        self.set_actor(actor);
        Ok(())
    }

    async fn dispatch(&self, item: MenuItem) -> Result<(), UiError> {
        match item {
            MenuItem::GlobalFeed => self.browse(FeedSource::Global).await,
            MenuItem::FollowingFeed => {
                if !self.actor().is_authenticated() {
                    println!("Sign in to see the authors you follow.");
                    return Ok(());
                }
                self.browse(FeedSource::Following).await
            }
            MenuItem::GroupFeed => match self.pick_group(false).await? {
                Some(group) => self.browse(FeedSource::Group(group.slug)).await,
                None => Ok(()),
            },
            MenuItem::Profile => self.show_profile().await,
            MenuItem::OpenPost => self.open_post().await,
            MenuItem::WritePost => self.write_post().await,
            MenuItem::EditPost => self.edit_post().await,
            MenuItem::DeletePost => self.delete_post().await,
            MenuItem::Comment => self.comment().await,
            MenuItem::Follow => self.follow(true).await,
            MenuItem::Unfollow => self.follow(false).await,
            MenuItem::RegisterUser => self.register_user().await,
            MenuItem::CreateGroup => self.create_group().await,
            MenuItem::SwitchUser => self.switch_user().await,
            MenuItem::Quit => Ok(()),
        }
    }
}

#[async_trait]
impl InputPort for TuiInputPort {
    async fn run(&self) -> Result<(), DomainError> {
        loop {
            let prompt = format!("[{}] What next?", self.actor());
            let choice = Select::new(&prompt, MenuItem::ALL.to_vec())
                .with_page_size(MenuItem::ALL.len())
                .prompt();
            let item = match choice.map_err(UiError::from) {
                Ok(MenuItem::Quit) | Err(UiError::Cancelled) => return Ok(()),
                Ok(item) => item,
                Err(e) => return Err(DomainError::Repo(e.to_string())),
            };
            match self.dispatch(item).await {
                Ok(()) | Err(UiError::Cancelled) => {}
                Err(UiError::Domain(e)) => println!("✗ {e} ({})", e.http_status()),
                Err(e @ UiError::Prompt(_)) => return Err(DomainError::Repo(e.to_string())),
            }
        }
    }
}
