//! Per-book like state and the signed-in user's liked-books collection.
use std::sync::{Arc, PoisonError};
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, instrument, warn};

use crate::backend::LikeApi;
use crate::catalog::BookCatalog;
use crate::error::{Error, Result};
use crate::model::{AuthSession, BookSummary};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LikeState {
    pub book_id: String,
    pub count: u64,
    pub liked_by_current_user: bool,
}

impl LikeState {
    pub fn new(book_id: &str) -> Self {
        Self {
            book_id: book_id.to_string(),
            ..Default::default()
        }
    }
}

/// Outcome of `refresh`: the response either landed or arrived for a book
/// (or request) that is no longer current and was dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Refresh {
    Applied(LikeState),
    Discarded,
}

type UnlikeListener = Box<dyn Fn(&str) + Send + Sync>;

struct Inner {
    state: LikeState,
    // Bumped by every refresh and every confirmed toggle; a response whose
    // captured generation no longer matches is stale.
    generation: u64,
    // Generation of the last refresh whose response was applied.
    applied: u64,
}

/// Like count and like/unlike toggle for the book currently shown in one UI
/// cell. State changes are published on a watch channel.
pub struct LikeStateController {
    api: Arc<dyn LikeApi>,
    inner: Mutex<Inner>,
    toggle_gate: Mutex<()>,
    tx: watch::Sender<LikeState>,
    on_unlike: Option<UnlikeListener>,
}

impl LikeStateController {
    pub fn new(api: Arc<dyn LikeApi>, book_id: &str) -> Self {
        Self::with_state(api, LikeState::new(book_id))
    }

    /// Start from a known state instead of zero.
    pub fn with_state(api: Arc<dyn LikeApi>, state: LikeState) -> Self {
        let (tx, _rx) = watch::channel(state.clone());
        Self {
            api,
            inner: Mutex::new(Inner {
                state,
                generation: 0,
                applied: 0,
            }),
            toggle_gate: Mutex::new(()),
            tx,
            on_unlike: None,
        }
    }

    /// Register the listener told about every confirmed unlike.
    pub fn on_unlike(mut self, listener: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_unlike = Some(Box::new(listener));
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<LikeState> {
        self.tx.subscribe()
    }

    pub async fn state(&self) -> LikeState {
        self.inner.lock().await.state.clone()
    }

    /// Fetch the like count and, when signed in, whether the user likes the
    /// book. Switching to a new `book_id` resets the state immediately;
    /// responses for a superseded request are discarded.
    #[instrument(skip(self, session))]
    pub async fn refresh(&self, book_id: &str, session: &AuthSession) -> Result<Refresh> {
        let generation = {
            let mut inner = self.inner.lock().await;
            if inner.state.book_id != book_id {
                inner.state = LikeState::new(book_id);
                self.tx.send_replace(inner.state.clone());
            }
            inner.generation += 1;
            inner.generation
        };

        let count = self.api.like_count(book_id).await;
        let liked = match (&count, session.credentials()) {
            (Ok(_), Some((_, token))) => match self.api.liked_books(token).await {
                Ok(ids) => ids.iter().any(|id| id == book_id),
                Err(err) => {
                    warn!(%err, "could not fetch liked books; showing as not liked");
                    false
                }
            },
            _ => false,
        };

        let mut inner = self.inner.lock().await;
        if inner.generation != generation || inner.state.book_id != book_id {
            debug!(book_id, current = %inner.state.book_id, "discarding stale like refresh");
            return Ok(Refresh::Discarded);
        }
        let count = count?;
        inner.applied = generation;
        inner.state.count = count;
        inner.state.liked_by_current_user = liked;
        self.tx.send_replace(inner.state.clone());
        Ok(Refresh::Applied(inner.state.clone()))
    }

    /// Like or unlike the current book. Local state changes only after the
    /// backend confirms; on failure it is left untouched.
    #[instrument(skip_all)]
    pub async fn toggle(&self, session: &AuthSession) -> Result<LikeState> {
        let Some((_, token)) = session.credentials() else {
            return Err(Error::Unauthenticated);
        };
        let _serialized = self.toggle_gate.lock().await;

        let (book_id, liked, started) = {
            let inner = self.inner.lock().await;
            (
                inner.state.book_id.clone(),
                inner.state.liked_by_current_user,
                inner.generation,
            )
        };

        let outcome = if liked {
            self.api.unlike(&book_id, token).await
        } else {
            self.api.like(&book_id, token).await
        };
        if let Err(err) = outcome {
            warn!(%err, %book_id, "like action failed");
            return Err(Error::LikeActionFailed(err));
        }

        let state = {
            let mut inner = self.inner.lock().await;
            if inner.state.book_id != book_id {
                debug!(%book_id, "book changed while toggling; not applying");
                return Ok(inner.state.clone());
            }
            inner.generation += 1;
            let target = !liked;
            // A refresh issued after this action and applied while it was in
            // flight already carries the server's post-action count.
            let reported = inner.applied > started || inner.state.liked_by_current_user == target;
            if reported {
                debug!(%book_id, "count already reflects this action");
            } else if liked {
                inner.state.count = inner.state.count.saturating_sub(1);
            } else {
                inner.state.count += 1;
            }
            inner.state.liked_by_current_user = target;
            self.tx.send_replace(inner.state.clone());
            inner.state.clone()
        };
        info!(%book_id, liked = state.liked_by_current_user, count = state.count, "like toggled");

        if liked {
            if let Some(listener) = &self.on_unlike {
                listener(&book_id);
            }
        }
        Ok(state)
    }
}

/// The signed-in user's liked books, shown on the personal dashboard.
/// Books leave the collection when one of its controllers confirms an unlike.
#[derive(Clone, Default)]
pub struct LikedBooks {
    books: Arc<std::sync::Mutex<Vec<BookSummary>>>,
}

impl LikedBooks {
    pub fn new(books: Vec<BookSummary>) -> Self {
        Self {
            books: Arc::new(std::sync::Mutex::new(books)),
        }
    }

    /// Resolve every liked id through the catalog. Ids the catalog cannot
    /// resolve are skipped.
    #[instrument(skip_all)]
    pub async fn load(
        likes: &dyn LikeApi,
        catalog: &dyn BookCatalog,
        session: &AuthSession,
    ) -> Result<Self> {
        let Some((_, token)) = session.credentials() else {
            return Err(Error::Unauthenticated);
        };
        let ids = likes.liked_books(token).await?;
        let mut books = Vec::with_capacity(ids.len());
        for id in ids {
            match catalog.volume(&id).await {
                Ok(detail) => books.push(detail.summary()),
                Err(err) => warn!(%err, book_id = %id, "liked book not found in catalog"),
            }
        }
        Ok(Self::new(books))
    }

    pub fn books(&self) -> Vec<BookSummary> {
        self.books
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.books.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn remove(&self, book_id: &str) {
        self.books
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|b| b.id != book_id);
    }

    /// A like controller for one listed book, refreshed from the backend and
    /// wired to drop the book from this collection on unlike.
    pub async fn controller_for(
        &self,
        api: Arc<dyn LikeApi>,
        book_id: &str,
        session: &AuthSession,
    ) -> Result<LikeStateController> {
        let books = self.clone();
        let state = LikeState {
            book_id: book_id.to_string(),
            count: 0,
            liked_by_current_user: true,
        };
        let controller =
            LikeStateController::with_state(api, state).on_unlike(move |id| books.remove(id));
        controller.refresh(book_id, session).await?;
        Ok(controller)
    }
}
