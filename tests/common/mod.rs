#![allow(dead_code)]

use async_trait::async_trait;
use bookshelf::backend::{AuthApi, LikeApi, ReviewApi};
use bookshelf::catalog::BookCatalog;
use bookshelf::model::{
    AuthResponse, AuthSession, BookDetail, ImageLinks, LoginCredentials, NewReview, Registration,
    Review, ReviewAck, ReviewAuthor, ReviewPatch, Role, SearchPage, User,
};
use bookshelf::store::{self, Pool};
use bookshelf::ApiError;
use chrono::{TimeZone, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};

pub async fn setup_pool() -> Pool {
    let pool = store::init_pool("sqlite::memory:").await.unwrap();
    store::run_migrations(&pool).await.unwrap();
    pool
}

pub fn user(id: &str, role: Role) -> User {
    User {
        id: id.into(),
        email: format!("{id}@example.com"),
        firstname: id.to_uppercase(),
        lastname: "Tester".into(),
        role,
    }
}

pub fn signed_in(id: &str, role: Role) -> AuthSession {
    AuthSession::signed_in(user(id, role), format!("token-{id}"))
}

pub fn review(id: &str, book_id: &str, author: &str, text: &str, rating: u8) -> Review {
    Review {
        id: id.into(),
        book_id: book_id.into(),
        book_title: format!("Book {book_id}"),
        author: ReviewAuthor {
            id: author.into(),
            firstname: author.to_uppercase(),
            lastname: "Tester".into(),
            email: format!("{author}@example.com"),
        },
        review_text: text.into(),
        rating,
        created_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
    }
}

pub fn detail(id: &str, title: &str) -> BookDetail {
    BookDetail {
        id: id.into(),
        title: title.into(),
        subtitle: None,
        authors: vec!["Someone".into()],
        description: None,
        publisher: None,
        published_date: None,
        page_count: None,
        language: Some("en".into()),
        categories: vec![],
        image_links: ImageLinks::default(),
    }
}

fn failure(status: u16, message: &str) -> ApiError {
    ApiError::Status {
        status,
        message: message.into(),
    }
}

#[derive(Default)]
pub struct FakeState {
    pub calls: Vec<String>,
    /// email -> (password, user)
    pub accounts: HashMap<String, (String, User)>,
    /// token -> user
    pub tokens: HashMap<String, User>,
    pub reviews: Vec<Review>,
    pub fail_review_writes: bool,
    pub fail_review_reads: bool,
    pub next_review_id: u32,
    pub like_counts: HashMap<String, u64>,
    /// token -> liked book ids
    pub liked: HashMap<String, Vec<String>>,
    pub volumes: HashMap<String, BookDetail>,
}

/// In-memory stand-in for every remote collaborator. Each call is recorded;
/// a gate registered under a call key holds that call until notified. Like
/// and unlike also consult an `ack {call}` gate after the server state has
/// changed, before answering.
#[derive(Clone, Default)]
pub struct FakeBackend {
    pub state: Arc<Mutex<FakeState>>,
    gates: Arc<Mutex<HashMap<String, Arc<Notify>>>>,
}

impl FakeBackend {
    pub async fn calls(&self) -> Vec<String> {
        self.state.lock().await.calls.clone()
    }

    pub async fn gate(&self, key: &str) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        self.gates.lock().await.insert(key.to_string(), notify.clone());
        notify
    }

    pub async fn add_account(&self, user: User, password: &str, token: &str) {
        let mut state = self.state.lock().await;
        state
            .accounts
            .insert(user.email.clone(), (password.to_string(), user.clone()));
        state.tokens.insert(token.to_string(), user);
    }

    async fn record(&self, call: String) {
        self.state.lock().await.calls.push(call.clone());
        self.hold(&call).await;
    }

    async fn hold(&self, key: &str) {
        let gate = self.gates.lock().await.get(key).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }
    }
}

#[async_trait]
impl AuthApi for FakeBackend {
    async fn login(&self, credentials: &LoginCredentials) -> Result<AuthResponse, ApiError> {
        self.record(format!("login {}", credentials.email)).await;
        let state = self.state.lock().await;
        match state.accounts.get(&credentials.email) {
            Some((password, user)) if *password == credentials.password => {
                let token = state
                    .tokens
                    .iter()
                    .find(|(_, u)| u.id == user.id)
                    .map(|(t, _)| t.clone())
                    .unwrap_or_else(|| format!("token-{}", user.id));
                Ok(AuthResponse {
                    user: user.clone(),
                    token,
                })
            }
            _ => Err(failure(401, "Invalid email or password")),
        }
    }

    async fn register(&self, registration: &Registration) -> Result<AuthResponse, ApiError> {
        self.record(format!("register {}", registration.email)).await;
        let mut state = self.state.lock().await;
        if state.accounts.contains_key(&registration.email) {
            return Err(failure(400, "User already exists"));
        }
        let user = User {
            id: format!("u{}", state.accounts.len() + 1),
            email: registration.email.clone(),
            firstname: registration.firstname.clone(),
            lastname: registration.lastname.clone(),
            role: Role::User,
        };
        let token = format!("token-{}", user.id);
        state.accounts.insert(
            registration.email.clone(),
            (registration.password.clone(), user.clone()),
        );
        state.tokens.insert(token.clone(), user.clone());
        Ok(AuthResponse { user, token })
    }

    async fn check_token(&self, token: &str) -> Result<User, ApiError> {
        self.record("checkToken".into()).await;
        self.state
            .lock()
            .await
            .tokens
            .get(token)
            .cloned()
            .ok_or_else(|| failure(401, "Invalid token"))
    }
}

#[async_trait]
impl ReviewApi for FakeBackend {
    async fn all_reviews(&self, _token: &str) -> Result<Vec<Review>, ApiError> {
        self.record("reviews all".into()).await;
        Ok(self.state.lock().await.reviews.clone())
    }

    async fn reviews_for_book(&self, book_id: &str) -> Result<Vec<Review>, ApiError> {
        self.record(format!("reviews book {book_id}")).await;
        let state = self.state.lock().await;
        if state.fail_review_reads {
            return Err(failure(500, "database offline"));
        }
        Ok(state
            .reviews
            .iter()
            .filter(|r| r.book_id == book_id)
            .cloned()
            .collect())
    }

    async fn reviews_for_user(&self, user_id: &str, _token: &str) -> Result<Vec<Review>, ApiError> {
        self.record(format!("reviews user {user_id}")).await;
        Ok(self
            .state
            .lock()
            .await
            .reviews
            .iter()
            .filter(|r| r.author.id == user_id)
            .cloned()
            .collect())
    }

    async fn create_review(&self, review: &NewReview, token: &str) -> Result<ReviewAck, ApiError> {
        self.record(format!("create {}", review.book_id)).await;
        let mut state = self.state.lock().await;
        if state.fail_review_writes {
            return Err(failure(500, "write failed"));
        }
        let Some(author) = state.tokens.get(token).cloned() else {
            return Err(failure(401, "Invalid token"));
        };
        state.next_review_id += 1;
        let id = format!("new{}", state.next_review_id);
        let mut stored = self::review(&id, &review.book_id, &author.id, &review.review_text, review.rating);
        stored.book_title = review.book_title.clone();
        state.reviews.push(stored);
        Ok(ReviewAck {
            id,
            book_id: review.book_id.clone(),
            review_text: review.review_text.clone(),
            rating: review.rating,
        })
    }

    async fn update_review(
        &self,
        review_id: &str,
        patch: &ReviewPatch,
        _token: &str,
    ) -> Result<(), ApiError> {
        self.record(format!("update {review_id}")).await;
        let mut state = self.state.lock().await;
        if state.fail_review_writes {
            return Err(failure(500, "write failed"));
        }
        match state.reviews.iter_mut().find(|r| r.id == review_id) {
            Some(r) => {
                r.review_text = patch.review_text.clone();
                r.rating = patch.rating;
                Ok(())
            }
            None => Err(failure(404, "Review not found")),
        }
    }

    async fn delete_review(&self, review_id: &str, _token: &str) -> Result<(), ApiError> {
        self.record(format!("delete {review_id}")).await;
        let mut state = self.state.lock().await;
        if state.fail_review_writes {
            return Err(failure(500, "write failed"));
        }
        state.reviews.retain(|r| r.id != review_id);
        Ok(())
    }
}

#[async_trait]
impl LikeApi for FakeBackend {
    async fn like(&self, book_id: &str, token: &str) -> Result<(), ApiError> {
        self.record(format!("like {book_id}")).await;
        let mut state = self.state.lock().await;
        *state.like_counts.entry(book_id.to_string()).or_default() += 1;
        state
            .liked
            .entry(token.to_string())
            .or_default()
            .push(book_id.to_string());
        drop(state);
        self.hold(&format!("ack like {book_id}")).await;
        Ok(())
    }

    async fn unlike(&self, book_id: &str, token: &str) -> Result<(), ApiError> {
        self.record(format!("unlike {book_id}")).await;
        let mut state = self.state.lock().await;
        if let Some(count) = state.like_counts.get_mut(book_id) {
            *count = count.saturating_sub(1);
        }
        if let Some(ids) = state.liked.get_mut(token) {
            ids.retain(|id| id != book_id);
        }
        drop(state);
        self.hold(&format!("ack unlike {book_id}")).await;
        Ok(())
    }

    async fn like_count(&self, book_id: &str) -> Result<u64, ApiError> {
        self.record(format!("count {book_id}")).await;
        Ok(self
            .state
            .lock()
            .await
            .like_counts
            .get(book_id)
            .copied()
            .unwrap_or(0))
    }

    async fn liked_books(&self, token: &str) -> Result<Vec<String>, ApiError> {
        self.record("user-likes".into()).await;
        Ok(self
            .state
            .lock()
            .await
            .liked
            .get(token)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl BookCatalog for FakeBackend {
    async fn search(&self, terms: &str, page_index: u32) -> Result<SearchPage, ApiError> {
        self.record(format!("search {terms} {page_index}")).await;
        Ok(SearchPage::default())
    }

    async fn volume(&self, id: &str) -> Result<BookDetail, ApiError> {
        self.record(format!("volume {id}")).await;
        self.state
            .lock()
            .await
            .volumes
            .get(id)
            .cloned()
            .ok_or_else(|| failure(404, "not found"))
    }
}
