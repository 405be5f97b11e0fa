use anyhow::{anyhow, bail, Context, Result};
use bookshelf::backend::{BackendClient, LikeApi, ReviewApi};
use bookshelf::catalog::{BookCatalog, CatalogClient};
use bookshelf::config::{self, Config};
use bookshelf::likes::{LikeStateController, LikedBooks};
use bookshelf::model::{AuthSession, BookSummary, Category, LoginCredentials, Registration, Review};
use bookshelf::reviews::{ReviewCard, ReviewCollectionController, ReviewPermissions};
use bookshelf::search::SearchResultAggregator;
use bookshelf::session::SessionManager;
use bookshelf::store;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Search the catalog, optionally within one category
    Search {
        query: Vec<String>,
        #[arg(long)]
        category: Option<String>,
        /// How many pages of 12 to load
        #[arg(long, default_value_t = 1)]
        pages: u32,
    },
    /// Show one book with its likes and reviews
    Book { id: String },
    /// List the searchable categories
    Categories,
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    Register {
        #[arg(long)]
        firstname: String,
        #[arg(long)]
        lastname: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    Logout,
    Whoami,
    /// Like a book, or unlike it if already liked
    Like { id: String },
    /// Books you have liked
    Likes,
    /// List reviews
    Reviews {
        #[command(subcommand)]
        target: ReviewTarget,
    },
    /// Write, edit or delete a review
    Review {
        #[command(subcommand)]
        action: ReviewAction,
    },
}

#[derive(Debug, Subcommand)]
enum ReviewTarget {
    Book { id: String },
    Mine,
    All,
}

#[derive(Debug, Subcommand)]
enum ReviewAction {
    Add {
        book_id: String,
        #[arg(long)]
        rating: u8,
        #[arg(long)]
        text: String,
    },
    Edit {
        review_id: String,
        #[arg(long)]
        rating: u8,
        #[arg(long)]
        text: String,
    },
    Delete { review_id: String },
}

struct App {
    cfg: Config,
    catalog: Arc<CatalogClient>,
    backend: Arc<BackendClient>,
    sessions: SessionManager,
    session: AuthSession,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(args.config.as_path()))
        .with_context(|| format!("failed to load {}", args.config.display()))?;
    cfg.ensure_dirs()?;

    let pool = store::init_pool(&cfg.database_url()).await?;
    store::run_migrations(&pool).await?;

    let catalog = Arc::new(CatalogClient::with_base_url(cfg.catalog_url()?, cfg.backend_timeout())?);
    let backend = Arc::new(BackendClient::with_base_url(cfg.backend_url()?, cfg.backend_timeout())?);
    let sessions = SessionManager::new(backend.clone(), pool);
    let session = sessions.init().await.context("failed to restore session")?;

    let mut app = App {
        cfg,
        catalog,
        backend,
        sessions,
        session,
    };
    app.run(args.command).await
}

impl App {
    async fn run(&mut self, command: Command) -> Result<()> {
        match command {
            Command::Search {
                query,
                category,
                pages,
            } => self.search(&query.join(" "), category.as_deref(), pages).await,
            Command::Book { id } => self.book(&id).await,
            Command::Categories => {
                for category in Category::all() {
                    println!("{:<12} {}", category.value, category.label);
                }
                Ok(())
            }
            Command::Login { email, password } => {
                let credentials = LoginCredentials { email, password };
                self.session = self.sessions.login(&credentials).await?;
                self.whoami();
                Ok(())
            }
            Command::Register {
                firstname,
                lastname,
                email,
                password,
            } => {
                let registration = Registration {
                    firstname,
                    lastname,
                    email,
                    password,
                };
                self.session = self.sessions.register(&registration).await?;
                self.whoami();
                Ok(())
            }
            Command::Logout => {
                self.sessions.logout(&mut self.session).await?;
                println!("Signed out.");
                Ok(())
            }
            Command::Whoami => {
                self.whoami();
                Ok(())
            }
            Command::Like { id } => self.like(&id).await,
            Command::Likes => self.likes().await,
            Command::Reviews { target } => self.reviews(target).await,
            Command::Review { action } => self.review(action).await,
        }
    }

    fn whoami(&self) {
        match &self.session.user {
            Some(user) => println!("Signed in as {} <{}> ({:?})", user.display_name(), user.email, user.role),
            None => println!("Not signed in."),
        }
    }

    async fn search(&self, query: &str, category: Option<&str>, pages: u32) -> Result<()> {
        let category = match category {
            Some(raw) => Category::parse(raw)
                .map(|c| c.value)
                .ok_or_else(|| anyhow!("unknown category '{raw}'; see `bookshelf categories`"))?,
            None => "",
        };
        // The aggregator never invents a query; the default term is ours to supply.
        let query = if query.trim().is_empty() && category.is_empty() {
            self.cfg.catalog.default_term.as_str()
        } else {
            query
        };

        let mut aggregator = SearchResultAggregator::new();
        let mut snapshot = aggregator.search(query, category, self.catalog.as_ref()).await?;
        for _ in 1..pages {
            if !snapshot.has_more {
                break;
            }
            snapshot = aggregator.load_page(self.catalog.as_ref()).await?;
        }

        if snapshot.items.is_empty() {
            println!("No books found.");
            return Ok(());
        }
        for (i, book) in snapshot.items.iter().enumerate() {
            print_summary(i + 1, book);
        }
        info!(
            shown = snapshot.items.len(),
            total = aggregator.results().total_available(),
            "search finished"
        );
        if snapshot.has_more {
            println!("... more results available (use --pages)");
        }
        Ok(())
    }

    async fn book(&self, id: &str) -> Result<()> {
        let detail = self.catalog.volume(id).await.context("could not load the book")?;
        println!("{}", detail.title);
        if let Some(subtitle) = &detail.subtitle {
            println!("{subtitle}");
        }
        println!("Authors:    {}", detail.summary().authors_line());
        println!("Published:  {}", detail.published_date.as_deref().unwrap_or("unknown"));
        println!("Publisher:  {}", detail.publisher.as_deref().unwrap_or("unknown"));
        match detail.page_count {
            Some(pages) => println!("Pages:      {pages}"),
            None => println!("Pages:      unknown"),
        }
        println!("Language:   {}", detail.language.as_deref().unwrap_or("unknown"));
        if !detail.categories.is_empty() {
            println!("Categories: {}", detail.categories.join(", "));
        }
        if let Some(cover) = detail.cover_url() {
            println!("Cover:      {cover}");
        }
        println!();
        println!(
            "{}",
            detail
                .description
                .as_deref()
                .unwrap_or("No description available.")
        );

        let likes = LikeStateController::new(self.like_api(), id);
        likes.refresh(id, &self.session).await?;
        let state = likes.state().await;
        println!();
        println!(
            "Likes: {}{}",
            state.count,
            if state.liked_by_current_user { " (you like this)" } else { "" }
        );

        let reviews = ReviewCollectionController::new(self.review_api());
        reviews.load_for_book(id).await?;
        print_reviews(&reviews.reviews().await, self.session.user.as_ref());
        Ok(())
    }

    async fn like(&self, id: &str) -> Result<()> {
        let likes = LikeStateController::new(self.like_api(), id)
            .on_unlike(|book_id| println!("Removed {book_id} from your liked books."));
        likes.refresh(id, &self.session).await?;
        let state = likes.toggle(&self.session).await?;
        println!(
            "{} ({} likes)",
            if state.liked_by_current_user { "Liked" } else { "Unliked" },
            state.count
        );
        Ok(())
    }

    async fn likes(&self) -> Result<()> {
        let liked = LikedBooks::load(self.backend.as_ref(), self.catalog.as_ref(), &self.session).await?;
        if liked.is_empty() {
            println!("You have not liked any books yet.");
        }
        for (i, book) in liked.books().iter().enumerate() {
            print_summary(i + 1, book);
        }
        Ok(())
    }

    async fn reviews(&self, target: ReviewTarget) -> Result<()> {
        let reviews = ReviewCollectionController::new(self.review_api());
        match target {
            ReviewTarget::Book { id } => reviews.load_for_book(&id).await?,
            ReviewTarget::Mine => {
                let user_id = self.current_user_id()?;
                reviews.load_for_user(&user_id, &self.session).await?
            }
            ReviewTarget::All => reviews.load_all(&self.session).await?,
        };
        print_reviews(&reviews.reviews().await, self.session.user.as_ref());
        Ok(())
    }

    async fn review(&self, action: ReviewAction) -> Result<()> {
        let reviews = ReviewCollectionController::new(self.review_api());
        match action {
            ReviewAction::Add {
                book_id,
                rating,
                text,
            } => {
                let detail = self.catalog.volume(&book_id).await.context("could not load the book")?;
                reviews
                    .add(&book_id, &detail.title, &text, rating, &self.session)
                    .await?;
                // The create response is partial; reload for author and date.
                reviews.load_for_book(&book_id).await?;
                print_reviews(&reviews.reviews().await, self.session.user.as_ref());
            }
            ReviewAction::Edit {
                review_id,
                rating,
                text,
            } => {
                let review = self.find_review(&reviews, &review_id).await?;
                if !ReviewPermissions::for_actor(self.session.user.as_ref(), &review).can_edit {
                    bail!("you can only edit your own reviews");
                }
                let mut card = ReviewCard::new(&review.id);
                card.begin_edit(&review)?;
                card.set_draft(&text, rating)?;
                let patch = card.save()?;
                reviews
                    .update(&review.id, &patch.review_text, patch.rating, &self.session)
                    .await?;
                println!("Review updated.");
            }
            ReviewAction::Delete { review_id } => {
                let review = self.find_review(&reviews, &review_id).await?;
                if !ReviewPermissions::for_actor(self.session.user.as_ref(), &review).can_delete {
                    bail!("you are not allowed to delete this review");
                }
                let mut card = ReviewCard::new(&review.id);
                card.request_delete()?;
                let id = card.confirm_delete()?;
                reviews.remove(&id, &self.session).await?;
                println!("Review deleted.");
            }
        }
        Ok(())
    }

    /// Look the review up among the user's own, then (for admins) all reviews.
    async fn find_review(&self, reviews: &ReviewCollectionController, review_id: &str) -> Result<Review> {
        let user_id = self.current_user_id()?;
        reviews.load_for_user(&user_id, &self.session).await?;
        if let Some(found) = reviews.reviews().await.into_iter().find(|r| r.id == review_id) {
            return Ok(found);
        }
        if self.session.user.as_ref().is_some_and(|u| u.is_admin()) {
            reviews.load_all(&self.session).await?;
            if let Some(found) = reviews.reviews().await.into_iter().find(|r| r.id == review_id) {
                return Ok(found);
            }
        }
        bail!("review {review_id} not found")
    }

    fn current_user_id(&self) -> Result<String> {
        self.session
            .credentials()
            .map(|(user, _)| user.id.clone())
            .ok_or_else(|| anyhow!(bookshelf::Error::Unauthenticated))
    }

    fn like_api(&self) -> Arc<dyn LikeApi> {
        self.backend.clone()
    }

    fn review_api(&self) -> Arc<dyn ReviewApi> {
        self.backend.clone()
    }
}

fn print_summary(position: usize, book: &BookSummary) {
    println!("{:>3}. {} - {} [{}]", position, book.title, book.authors_line(), book.id);
}

fn print_reviews(reviews: &[Review], viewer: Option<&bookshelf::model::User>) {
    println!();
    if reviews.is_empty() {
        println!("No reviews yet.");
        return;
    }
    for review in reviews {
        let perms = ReviewPermissions::for_actor(viewer, review);
        let mut flags = Vec::new();
        if perms.can_edit {
            flags.push("editable");
        }
        if perms.can_delete {
            flags.push("deletable");
        }
        println!(
            "[{}] {} gave {} {}/5 on {}{}",
            review.id,
            review.author.firstname,
            review.book_title,
            review.rating,
            review.created_at.format("%Y-%m-%d"),
            if flags.is_empty() { String::new() } else { format!(" ({})", flags.join(", ")) }
        );
        println!("    {}", review.review_text);
    }
}
