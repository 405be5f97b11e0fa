//! Review lists for a book, a user or everyone, kept in step with server
//! mutations without refetching.
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, instrument, warn};

use crate::backend::ReviewApi;
use crate::error::{ApiError, Error, FieldError, Result};
use crate::model::{AuthSession, NewReview, Review, ReviewAck, ReviewPatch, User};

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;

/// Local check run before any review is sent.
pub fn validate_review(text: &str, rating: u8) -> Result<()> {
    let mut errors = Vec::new();
    if text.trim().is_empty() {
        errors.push(FieldError::new("reviewText", "review text is required"));
    }
    if !(MIN_RATING..=MAX_RATING).contains(&rating) {
        errors.push(FieldError::new("rating", "rating must be between 1 and 5"));
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(Error::ValidationFailed(errors))
    }
}

/// Which reviews a controller lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewScope {
    Book(String),
    User(String),
    All,
}

impl fmt::Display for ReviewScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReviewScope::Book(id) => write!(f, "book {id}"),
            ReviewScope::User(id) => write!(f, "user {id}"),
            ReviewScope::All => f.write_str("all reviews"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Load {
    Applied(Vec<Review>),
    Discarded,
}

struct Inner {
    scope: Option<ReviewScope>,
    reviews: Vec<Review>,
    generation: u64,
}

pub struct ReviewCollectionController {
    api: Arc<dyn ReviewApi>,
    inner: Mutex<Inner>,
    tx: watch::Sender<Vec<Review>>,
}

impl ReviewCollectionController {
    pub fn new(api: Arc<dyn ReviewApi>) -> Self {
        let (tx, _rx) = watch::channel(Vec::new());
        Self {
            api,
            inner: Mutex::new(Inner {
                scope: None,
                reviews: Vec::new(),
                generation: 0,
            }),
            tx,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<Review>> {
        self.tx.subscribe()
    }

    pub async fn reviews(&self) -> Vec<Review> {
        self.inner.lock().await.reviews.clone()
    }

    pub async fn scope(&self) -> Option<ReviewScope> {
        self.inner.lock().await.scope.clone()
    }

    #[instrument(skip(self))]
    pub async fn load_for_book(&self, book_id: &str) -> Result<Load> {
        let scope = ReviewScope::Book(book_id.to_string());
        let generation = self.begin_load(&scope).await;
        let fetched = self.api.reviews_for_book(book_id).await;
        self.finish_load(&scope, generation, fetched).await
    }

    #[instrument(skip(self, session))]
    pub async fn load_for_user(&self, user_id: &str, session: &AuthSession) -> Result<Load> {
        let Some((_, token)) = session.credentials() else {
            return Err(Error::Unauthenticated);
        };
        let scope = ReviewScope::User(user_id.to_string());
        let generation = self.begin_load(&scope).await;
        let fetched = self.api.reviews_for_user(user_id, token).await;
        self.finish_load(&scope, generation, fetched).await
    }

    /// Every review; the backend only answers this for admins.
    #[instrument(skip_all)]
    pub async fn load_all(&self, session: &AuthSession) -> Result<Load> {
        let Some((_, token)) = session.credentials() else {
            return Err(Error::Unauthenticated);
        };
        let scope = ReviewScope::All;
        let generation = self.begin_load(&scope).await;
        let fetched = self.api.all_reviews(token).await;
        self.finish_load(&scope, generation, fetched).await
    }

    /// Switching scope clears the list at once so entries from the previous
    /// entity are never shown under the new one.
    async fn begin_load(&self, scope: &ReviewScope) -> u64 {
        let mut inner = self.inner.lock().await;
        if inner.scope.as_ref() != Some(scope) {
            inner.scope = Some(scope.clone());
            inner.reviews.clear();
            self.tx.send_replace(Vec::new());
        }
        inner.generation += 1;
        inner.generation
    }

    async fn finish_load(
        &self,
        scope: &ReviewScope,
        generation: u64,
        fetched: Result<Vec<Review>, ApiError>,
    ) -> Result<Load> {
        let mut inner = self.inner.lock().await;
        if inner.generation != generation || inner.scope.as_ref() != Some(scope) {
            debug!(%scope, "discarding stale review list");
            return Ok(Load::Discarded);
        }
        let reviews = fetched.map_err(|err| {
            warn!(%err, %scope, "could not load reviews");
            err
        })?;
        debug!(%scope, count = reviews.len(), "reviews loaded");
        inner.reviews = reviews.clone();
        self.tx.send_replace(reviews.clone());
        Ok(Load::Applied(reviews))
    }

    /// Create a review. The list is not touched: the backend answers with a
    /// partial record, so callers reload to get author and timestamps.
    #[instrument(skip(self, text, session))]
    pub async fn add(
        &self,
        book_id: &str,
        book_title: &str,
        text: &str,
        rating: u8,
        session: &AuthSession,
    ) -> Result<ReviewAck> {
        let Some((_, token)) = session.credentials() else {
            return Err(Error::Unauthenticated);
        };
        validate_review(text, rating)?;
        let review = NewReview {
            book_id: book_id.to_string(),
            book_title: book_title.to_string(),
            review_text: text.trim().to_string(),
            rating,
        };
        let ack = self.api.create_review(&review, token).await?;
        info!(review_id = %ack.id, "review added");
        Ok(ack)
    }

    /// Edit text and rating. On success only those two fields of the matching
    /// entry change.
    #[instrument(skip(self, text, session))]
    pub async fn update(
        &self,
        review_id: &str,
        text: &str,
        rating: u8,
        session: &AuthSession,
    ) -> Result<()> {
        let Some((_, token)) = session.credentials() else {
            return Err(Error::Unauthenticated);
        };
        validate_review(text, rating)?;
        let patch = ReviewPatch {
            review_text: text.trim().to_string(),
            rating,
        };
        if let Err(err) = self.api.update_review(review_id, &patch, token).await {
            warn!(%err, "review update failed");
            return Err(Error::ReviewUpdateFailed(err));
        }

        let mut inner = self.inner.lock().await;
        if let Some(review) = inner.reviews.iter_mut().find(|r| r.id == review_id) {
            review.review_text = patch.review_text;
            review.rating = patch.rating;
        }
        self.tx.send_replace(inner.reviews.clone());
        info!("review updated");
        Ok(())
    }

    #[instrument(skip(self, session))]
    pub async fn remove(&self, review_id: &str, session: &AuthSession) -> Result<()> {
        let Some((_, token)) = session.credentials() else {
            return Err(Error::Unauthenticated);
        };
        if let Err(err) = self.api.delete_review(review_id, token).await {
            warn!(%err, "review delete failed");
            return Err(Error::ReviewDeleteFailed(err));
        }

        let mut inner = self.inner.lock().await;
        inner.reviews.retain(|r| r.id != review_id);
        self.tx.send_replace(inner.reviews.clone());
        info!("review deleted");
        Ok(())
    }
}

/// What an actor may do with one review. Owners edit and delete their own;
/// admins may delete anything but still only edit their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReviewPermissions {
    pub can_edit: bool,
    pub can_delete: bool,
}

impl ReviewPermissions {
    pub fn for_actor(actor: Option<&User>, review: &Review) -> Self {
        let Some(actor) = actor else {
            return Self::default();
        };
        let owner = actor.id == review.author.id;
        Self {
            can_edit: owner,
            can_delete: owner || actor.is_admin(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CardMode {
    Viewing,
    Editing { text: String, rating: u8 },
    ConfirmingDelete,
    Deleted,
}

impl CardMode {
    fn name(&self) -> &'static str {
        match self {
            CardMode::Viewing => "viewing",
            CardMode::Editing { .. } => "editing",
            CardMode::ConfirmingDelete => "confirming delete",
            CardMode::Deleted => "deleted",
        }
    }
}

#[derive(Debug, Error)]
pub enum CardError {
    #[error("cannot {action} while {mode}")]
    InvalidTransition {
        action: &'static str,
        mode: &'static str,
    },
    #[error(transparent)]
    Invalid(#[from] Error),
}

/// Editing UI state for one displayed review.
#[derive(Debug, Clone)]
pub struct ReviewCard {
    review_id: String,
    mode: CardMode,
}

impl ReviewCard {
    pub fn new(review_id: &str) -> Self {
        Self {
            review_id: review_id.to_string(),
            mode: CardMode::Viewing,
        }
    }

    pub fn review_id(&self) -> &str {
        &self.review_id
    }

    pub fn mode(&self) -> &CardMode {
        &self.mode
    }

    fn invalid(&self, action: &'static str) -> CardError {
        CardError::InvalidTransition {
            action,
            mode: self.mode.name(),
        }
    }

    /// Viewing → Editing, with the draft seeded from the current review.
    pub fn begin_edit(&mut self, current: &Review) -> Result<(), CardError> {
        if self.mode != CardMode::Viewing {
            return Err(self.invalid("edit"));
        }
        self.mode = CardMode::Editing {
            text: current.review_text.clone(),
            rating: current.rating,
        };
        Ok(())
    }

    pub fn set_draft(&mut self, new_text: &str, new_rating: u8) -> Result<(), CardError> {
        if let CardMode::Editing { text, rating } = &mut self.mode {
            *text = new_text.to_string();
            *rating = new_rating;
            return Ok(());
        }
        Err(self.invalid("change the draft"))
    }

    /// Editing → Viewing. Returns the patch to send; an invalid draft keeps
    /// the card in Editing.
    pub fn save(&mut self) -> Result<ReviewPatch, CardError> {
        let CardMode::Editing { text, rating } = &self.mode else {
            return Err(self.invalid("save"));
        };
        validate_review(text, *rating)?;
        let patch = ReviewPatch {
            review_text: text.trim().to_string(),
            rating: *rating,
        };
        self.mode = CardMode::Viewing;
        Ok(patch)
    }

    /// Editing or ConfirmingDelete → Viewing.
    pub fn cancel(&mut self) -> Result<(), CardError> {
        match self.mode {
            CardMode::Editing { .. } | CardMode::ConfirmingDelete => {
                self.mode = CardMode::Viewing;
                Ok(())
            }
            _ => Err(self.invalid("cancel")),
        }
    }

    pub fn request_delete(&mut self) -> Result<(), CardError> {
        if self.mode != CardMode::Viewing {
            return Err(self.invalid("delete"));
        }
        self.mode = CardMode::ConfirmingDelete;
        Ok(())
    }

    /// ConfirmingDelete → Deleted (terminal). Returns the id to remove.
    pub fn confirm_delete(&mut self) -> Result<String, CardError> {
        if self.mode != CardMode::ConfirmingDelete {
            return Err(self.invalid("confirm delete"));
        }
        self.mode = CardMode::Deleted;
        Ok(self.review_id.clone())
    }
}
