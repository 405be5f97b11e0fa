use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fixed page size agreed with the book search collaborator.
pub const PAGE_SIZE: u32 = 12;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BookSummary {
    pub id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub thumbnail_url: Option<String>,
}

impl BookSummary {
    pub fn authors_line(&self) -> String {
        if self.authors.is_empty() {
            "Unknown author".to_string()
        } else {
            self.authors.join(", ")
        }
    }
}

/// One fetched page of search results.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SearchPage {
    pub items: Vec<BookSummary>,
    pub total_available: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ImageLinks {
    pub thumbnail: Option<String>,
    pub small: Option<String>,
    pub medium: Option<String>,
    pub large: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BookDetail {
    pub id: String,
    pub title: String,
    pub subtitle: Option<String>,
    pub authors: Vec<String>,
    pub description: Option<String>,
    pub publisher: Option<String>,
    pub published_date: Option<String>,
    pub page_count: Option<u32>,
    pub language: Option<String>,
    pub categories: Vec<String>,
    pub image_links: ImageLinks,
}

impl BookDetail {
    /// Largest available cover, served over https.
    pub fn cover_url(&self) -> Option<String> {
        let links = &self.image_links;
        links
            .medium
            .as_deref()
            .or(links.large.as_deref())
            .or(links.small.as_deref())
            .or(links.thumbnail.as_deref())
            .filter(|url| !url.is_empty())
            .map(|url| url.replacen("http://", "https://", 1))
    }

    pub fn summary(&self) -> BookSummary {
        BookSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            authors: self.authors.clone(),
            thumbnail_url: self.image_links.thumbnail.clone(),
        }
    }
}

/// Volume as returned by the search collaborator.
#[derive(Debug, Clone, Deserialize)]
pub struct Volume {
    pub id: String,
    #[serde(rename = "volumeInfo", default)]
    pub volume_info: VolumeInfo,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct VolumeInfo {
    #[serde(default)]
    pub title: String,
    pub subtitle: Option<String>,
    #[serde(default)]
    pub authors: Vec<String>,
    pub description: Option<String>,
    pub publisher: Option<String>,
    pub published_date: Option<String>,
    pub page_count: Option<u32>,
    pub language: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub image_links: ImageLinks,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumesResponse {
    pub items: Option<Vec<Volume>>,
    #[serde(default)]
    pub total_items: u64,
}

impl From<Volume> for BookSummary {
    fn from(v: Volume) -> Self {
        BookSummary {
            id: v.id,
            title: v.volume_info.title,
            authors: v.volume_info.authors,
            thumbnail_url: v.volume_info.image_links.thumbnail,
        }
    }
}

impl From<Volume> for BookDetail {
    fn from(v: Volume) -> Self {
        let info = v.volume_info;
        BookDetail {
            id: v.id,
            title: info.title,
            subtitle: info.subtitle,
            authors: info.authors,
            description: info.description,
            publisher: info.publisher,
            published_date: info.published_date,
            page_count: info.page_count,
            language: info.language,
            categories: info.categories,
            image_links: info.image_links,
        }
    }
}

impl From<VolumesResponse> for SearchPage {
    fn from(resp: VolumesResponse) -> Self {
        SearchPage {
            items: resp
                .items
                .unwrap_or_default()
                .into_iter()
                .map(BookSummary::from)
                .collect(),
            total_available: resp.total_items,
        }
    }
}

/// Subject filters offered next to the search box, as (value, label).
const CATEGORIES: &[(&str, &str)] = &[
    ("fiction", "Fiction"),
    ("crime", "Crime"),
    ("thriller", "Thriller"),
    ("children", "Children"),
    ("biography", "Biographies"),
    ("nonfiction", "Non-fiction"),
    ("fantasy", "Fantasy"),
    ("scifi", "Science Fiction"),
    ("adventure", "Adventure"),
    ("horror", "Horror"),
    ("poetry", "Poetry"),
    ("history", "History"),
    ("psychology", "Psychology"),
    ("religion", "Religion"),
    ("romantik", "Romance"),
    ("society", "Society"),
    ("politics", "Politics"),
    ("other", "Other"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Category {
    pub value: &'static str,
    pub label: &'static str,
}

impl Category {
    /// All categories, sorted by label.
    pub fn all() -> Vec<Category> {
        let mut all: Vec<Category> = CATEGORIES
            .iter()
            .map(|&(value, label)| Category { value, label })
            .collect();
        all.sort_by(|a, b| a.label.cmp(b.label));
        all
    }

    pub fn parse(value: &str) -> Option<Category> {
        let value = value.trim();
        CATEGORIES
            .iter()
            .find(|(v, _)| v.eq_ignore_ascii_case(value))
            .map(|&(value, label)| Category { value, label })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub firstname: String,
    #[serde(default)]
    pub lastname: String,
    #[serde(default)]
    pub role: Role,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn display_name(&self) -> String {
        format!("{} {}", self.firstname, self.lastname).trim().to_string()
    }
}

/// Process-wide authentication state. Controllers receive it by reference at
/// the moment of each action and never cache it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthSession {
    pub user: Option<User>,
    pub token: Option<String>,
}

impl AuthSession {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn signed_in(user: User, token: String) -> Self {
        Self {
            user: Some(user),
            token: Some(token),
        }
    }

    /// User and bearer token, only when both are present.
    pub fn credentials(&self) -> Option<(&User, &str)> {
        match (&self.user, &self.token) {
            (Some(user), Some(token)) if !token.is_empty() => Some((user, token.as_str())),
            _ => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.credentials().is_some()
    }

    pub fn clear(&mut self) {
        self.user = None;
        self.token = None;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReviewAuthor {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    #[serde(default)]
    pub firstname: String,
    #[serde(default)]
    pub lastname: String,
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    pub book_id: String,
    #[serde(default)]
    pub book_title: String,
    #[serde(rename = "userId", alias = "author")]
    pub author: ReviewAuthor,
    pub review_text: String,
    pub rating: u8,
    pub created_at: DateTime<Utc>,
}

/// Body of `POST /reviews`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NewReview {
    pub book_id: String,
    pub book_title: String,
    pub review_text: String,
    pub rating: u8,
}

/// Server-confirmed subset returned by `POST /reviews`; not a full `Review`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReviewAck {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    #[serde(default)]
    pub book_id: String,
    #[serde(default)]
    pub review_text: String,
    #[serde(default)]
    pub rating: u8,
}

/// Body of `PUT /reviews/{id}`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReviewPatch {
    pub review_text: String,
    pub rating: u8,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginCredentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    pub firstname: String,
    pub lastname: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    pub user: User,
    pub token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckTokenResponse {
    pub user: User,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LikeCountResponse {
    #[serde(default)]
    pub likes: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserLikesResponse {
    #[serde(default)]
    pub liked_books: Vec<String>,
}

/// Error body shape used by the backend for 4xx responses.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageBody {
    pub message: String,
}
