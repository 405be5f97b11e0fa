use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Url};
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tracing::{info, instrument};

use crate::error::ApiError;
use crate::http::{build_client, endpoint, ensure_success, log_request, read_json};
use crate::model::{
    AuthResponse, CheckTokenResponse, LikeCountResponse, LoginCredentials, NewReview,
    Registration, Review, ReviewAck, ReviewPatch, User, UserLikesResponse,
};

const BACKEND_API_BASE: &str = "http://localhost:5000/api/";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn login(&self, credentials: &LoginCredentials) -> Result<AuthResponse, ApiError>;

    async fn register(&self, registration: &Registration) -> Result<AuthResponse, ApiError>;

    /// Validate a stored token and return the user it belongs to.
    async fn check_token(&self, token: &str) -> Result<User, ApiError>;
}

#[async_trait]
pub trait ReviewApi: Send + Sync {
    async fn all_reviews(&self, token: &str) -> Result<Vec<Review>, ApiError>;

    async fn reviews_for_book(&self, book_id: &str) -> Result<Vec<Review>, ApiError>;

    async fn reviews_for_user(&self, user_id: &str, token: &str) -> Result<Vec<Review>, ApiError>;

    async fn create_review(&self, review: &NewReview, token: &str) -> Result<ReviewAck, ApiError>;

    async fn update_review(
        &self,
        review_id: &str,
        patch: &ReviewPatch,
        token: &str,
    ) -> Result<(), ApiError>;

    async fn delete_review(&self, review_id: &str, token: &str) -> Result<(), ApiError>;
}

#[async_trait]
pub trait LikeApi: Send + Sync {
    async fn like(&self, book_id: &str, token: &str) -> Result<(), ApiError>;

    async fn unlike(&self, book_id: &str, token: &str) -> Result<(), ApiError>;

    async fn like_count(&self, book_id: &str) -> Result<u64, ApiError>;

    /// Ids of every book the token's user has liked.
    async fn liked_books(&self, token: &str) -> Result<Vec<String>, ApiError>;
}

/// HTTP client for the auth, review and like endpoints.
#[derive(Clone)]
pub struct BackendClient {
    http: Client,
    base_url: Url,
}

impl fmt::Debug for BackendClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl BackendClient {
    pub fn new() -> Result<Self, ApiError> {
        let base_url = Url::parse(BACKEND_API_BASE).expect("valid default backend URL");
        Self::with_base_url(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_base_url(base_url: Url, timeout: Duration) -> Result<Self, ApiError> {
        Ok(Self {
            http: build_client(timeout)?,
            base_url,
        })
    }

    fn request(
        &self,
        method: Method,
        segments: &[&str],
        token: Option<&str>,
    ) -> Result<RequestBuilder, ApiError> {
        let url = endpoint(&self.base_url, segments)?;
        let builder = self.http.request(method, url);
        Ok(match token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        })
    }

    /// Build a request, attaching a JSON body when one is given.
    pub fn build_request<B: Serialize + ?Sized>(
        &self,
        method: Method,
        segments: &[&str],
        token: Option<&str>,
        body: Option<&B>,
    ) -> Result<reqwest::Request, ApiError> {
        let builder = self.request(method, segments, token)?;
        let builder = match body {
            Some(body) => builder.json(body),
            None => builder,
        };
        Ok(builder.build()?)
    }

    async fn send(&self, request: reqwest::Request) -> Result<reqwest::Response, ApiError> {
        log_request(&request);
        Ok(self.http.execute(request).await?)
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        segments: &[&str],
        token: Option<&str>,
    ) -> Result<T, ApiError> {
        let request = self.build_request::<()>(Method::GET, segments, token, None)?;
        read_json(self.send(request).await?).await
    }
}

#[async_trait]
impl AuthApi for BackendClient {
    #[instrument(skip_all)]
    async fn login(&self, credentials: &LoginCredentials) -> Result<AuthResponse, ApiError> {
        let request =
            self.build_request(Method::POST, &["auth", "login"], None, Some(credentials))?;
        read_json(self.send(request).await?).await
    }

    #[instrument(skip_all)]
    async fn register(&self, registration: &Registration) -> Result<AuthResponse, ApiError> {
        let request =
            self.build_request(Method::POST, &["auth", "register"], None, Some(registration))?;
        read_json(self.send(request).await?).await
    }

    #[instrument(skip_all)]
    async fn check_token(&self, token: &str) -> Result<User, ApiError> {
        let resp: CheckTokenResponse = self.get(&["auth", "checkToken"], Some(token)).await?;
        Ok(resp.user)
    }
}

#[async_trait]
impl ReviewApi for BackendClient {
    #[instrument(skip_all)]
    async fn all_reviews(&self, token: &str) -> Result<Vec<Review>, ApiError> {
        self.get(&["reviews"], Some(token)).await
    }

    #[instrument(skip(self))]
    async fn reviews_for_book(&self, book_id: &str) -> Result<Vec<Review>, ApiError> {
        self.get(&["reviews", "book", book_id], None).await
    }

    #[instrument(skip(self, token))]
    async fn reviews_for_user(&self, user_id: &str, token: &str) -> Result<Vec<Review>, ApiError> {
        self.get(&["reviews", "user", user_id], Some(token)).await
    }

    #[instrument(skip_all, fields(book_id = %review.book_id))]
    async fn create_review(&self, review: &NewReview, token: &str) -> Result<ReviewAck, ApiError> {
        let request = self.build_request(Method::POST, &["reviews"], Some(token), Some(review))?;
        let ack: ReviewAck = read_json(self.send(request).await?).await?;
        info!(review_id = %ack.id, "review created");
        Ok(ack)
    }

    #[instrument(skip(self, patch, token))]
    async fn update_review(
        &self,
        review_id: &str,
        patch: &ReviewPatch,
        token: &str,
    ) -> Result<(), ApiError> {
        let request =
            self.build_request(Method::PUT, &["reviews", review_id], Some(token), Some(patch))?;
        ensure_success(self.send(request).await?).await?;
        Ok(())
    }

    #[instrument(skip(self, token))]
    async fn delete_review(&self, review_id: &str, token: &str) -> Result<(), ApiError> {
        let request =
            self.build_request::<()>(Method::DELETE, &["reviews", review_id], Some(token), None)?;
        ensure_success(self.send(request).await?).await?;
        Ok(())
    }
}

#[async_trait]
impl LikeApi for BackendClient {
    #[instrument(skip(self, token))]
    async fn like(&self, book_id: &str, token: &str) -> Result<(), ApiError> {
        let request =
            self.build_request::<()>(Method::POST, &["book-likes", book_id], Some(token), None)?;
        ensure_success(self.send(request).await?).await?;
        Ok(())
    }

    #[instrument(skip(self, token))]
    async fn unlike(&self, book_id: &str, token: &str) -> Result<(), ApiError> {
        let request =
            self.build_request::<()>(Method::DELETE, &["book-likes", book_id], Some(token), None)?;
        ensure_success(self.send(request).await?).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn like_count(&self, book_id: &str) -> Result<u64, ApiError> {
        let resp: LikeCountResponse = self.get(&["book-likes", book_id], None).await?;
        Ok(resp.likes)
    }

    #[instrument(skip_all)]
    async fn liked_books(&self, token: &str) -> Result<Vec<String>, ApiError> {
        let resp: UserLikesResponse = self.get(&["book-likes", "user-likes"], Some(token)).await?;
        Ok(resp.liked_books)
    }
}
