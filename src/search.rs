//! Paginated search aggregation: successive catalog pages are merged into one
//! deduplicated list that keeps first-seen order.
use std::collections::HashMap;
use tracing::{debug, info, instrument, warn};

use crate::catalog::BookCatalog;
use crate::error::Result;
use crate::model::{BookSummary, SearchPage, PAGE_SIZE};

/// Build catalog search terms from the free-text query and an optional
/// category, which becomes a `subject:` filter token.
pub fn compose_terms(query: &str, category: &str) -> String {
    let query = query.trim();
    let category = category.trim();
    match (query.is_empty(), category.is_empty()) {
        (true, true) => String::new(),
        (false, true) => query.to_string(),
        (true, false) => format!("subject:{category}"),
        (false, false) => format!("{query} subject:{category}"),
    }
}

/// Books unique by id, in the order they were first seen.
#[derive(Debug, Clone, Default)]
pub struct SearchResultSet {
    items: Vec<BookSummary>,
    positions: HashMap<String, usize>,
    total_available: u64,
    next_page_index: u32,
    exhausted: bool,
}

impl SearchResultSet {
    pub fn items(&self) -> &[BookSummary] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&BookSummary> {
        self.positions.get(id).map(|&pos| &self.items[pos])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.positions.contains_key(id)
    }

    pub fn total_available(&self) -> u64 {
        self.total_available
    }

    pub fn next_page_index(&self) -> u32 {
        self.next_page_index
    }

    /// More pages remain while the pages consumed so far do not cover
    /// `total_available`. An empty page ends the listing early.
    pub fn has_more(&self) -> bool {
        if self.exhausted {
            return false;
        }
        u64::from(self.next_page_index) * u64::from(PAGE_SIZE) < self.total_available
    }

    /// Merge a page; ids already present keep their position. Returns how
    /// many new books were added.
    fn merge(&mut self, page: SearchPage) -> usize {
        let before = self.items.len();
        let had_items = !page.items.is_empty();
        for book in page.items {
            if self.positions.contains_key(&book.id) {
                continue;
            }
            self.positions.insert(book.id.clone(), self.items.len());
            self.items.push(book);
        }
        self.total_available = page.total_available;
        if had_items {
            self.next_page_index += 1;
        } else {
            self.exhausted = true;
        }
        self.items.len() - before
    }
}

/// Result of one `load_page` call.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SearchSnapshot {
    pub items: Vec<BookSummary>,
    pub has_more: bool,
}

/// Holds the current query/category and the growing result set.
///
/// `load_page` takes `&mut self`, so one instance never has two page
/// requests in flight.
#[derive(Debug, Default)]
pub struct SearchResultAggregator {
    query: String,
    category: String,
    results: SearchResultSet,
}

impl SearchResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn results(&self) -> &SearchResultSet {
        &self.results
    }

    pub fn has_more(&self) -> bool {
        self.results.has_more()
    }

    pub fn snapshot(&self) -> SearchSnapshot {
        SearchSnapshot {
            items: self.results.items.clone(),
            has_more: self.results.has_more(),
        }
    }

    /// Start over with new parameters; page numbering restarts at 0.
    pub fn reset(&mut self, query: &str, category: &str) {
        debug!(query, category, "search reset");
        self.query = query.trim().to_string();
        self.category = category.trim().to_string();
        self.results = SearchResultSet::default();
    }

    /// Fetch page `next_page_index` and merge it. A failed fetch leaves the
    /// result set exactly as it was so the caller can retry.
    #[instrument(skip_all, fields(page = self.results.next_page_index))]
    pub async fn load_page(&mut self, catalog: &dyn BookCatalog) -> Result<SearchSnapshot> {
        let terms = compose_terms(&self.query, &self.category);
        if terms.is_empty() {
            return Ok(SearchSnapshot::default());
        }

        let page_index = self.results.next_page_index;
        let page = catalog.search(&terms, page_index).await.map_err(|err| {
            warn!(%err, page_index, "search page failed; keeping previous results");
            err
        })?;

        let added = self.results.merge(page);
        info!(
            page_index,
            added,
            total = self.results.total_available,
            has_more = self.results.has_more(),
            "search page merged"
        );
        Ok(self.snapshot())
    }

    /// Fresh search: reset, then load the first page.
    pub async fn search(
        &mut self,
        query: &str,
        category: &str,
        catalog: &dyn BookCatalog,
    ) -> Result<SearchSnapshot> {
        self.reset(query, category);
        self.load_page(catalog).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ApiError, Error};
    use crate::model::BookDetail;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    fn book(id: &str) -> BookSummary {
        BookSummary {
            id: id.into(),
            title: format!("Title {id}"),
            authors: vec![],
            thumbnail_url: None,
        }
    }

    fn page(ids: &[&str], total: u64) -> SearchPage {
        SearchPage {
            items: ids.iter().map(|id| book(id)).collect(),
            total_available: total,
        }
    }

    fn ids(snapshot: &SearchSnapshot) -> Vec<&str> {
        snapshot.items.iter().map(|b| b.id.as_str()).collect()
    }

    #[derive(Clone, Default)]
    struct RecordingCatalog {
        responses: Arc<Mutex<VecDeque<Result<SearchPage, ApiError>>>>,
        calls: Arc<Mutex<Vec<(String, u32)>>>,
    }

    impl RecordingCatalog {
        fn with_responses(responses: Vec<Result<SearchPage, ApiError>>) -> Self {
            Self {
                responses: Arc::new(Mutex::new(VecDeque::from(responses))),
                ..Default::default()
            }
        }

        async fn calls(&self) -> Vec<(String, u32)> {
            self.calls.lock().await.clone()
        }
    }

    #[async_trait]
    impl BookCatalog for RecordingCatalog {
        async fn search(&self, terms: &str, page_index: u32) -> Result<SearchPage, ApiError> {
            self.calls.lock().await.push((terms.to_string(), page_index));
            self.responses
                .lock()
                .await
                .pop_front()
                .unwrap_or_else(|| Ok(SearchPage::default()))
        }

        async fn volume(&self, id: &str) -> Result<BookDetail, ApiError> {
            Err(ApiError::Status {
                status: 404,
                message: format!("no volume {id}"),
            })
        }
    }

    #[test]
    fn terms_composition() {
        assert_eq!(compose_terms("", ""), "");
        assert_eq!(compose_terms("  dune ", ""), "dune");
        assert_eq!(compose_terms("", "fantasy"), "subject:fantasy");
        assert_eq!(compose_terms("tolkien", "fantasy"), "tolkien subject:fantasy");
    }

    #[tokio::test]
    async fn empty_query_and_category_skip_the_network() {
        let catalog = RecordingCatalog::default();
        let mut agg = SearchResultAggregator::new();
        agg.reset("", "");
        let snap = agg.load_page(&catalog).await.unwrap();
        assert!(snap.items.is_empty());
        assert!(!snap.has_more);
        assert!(catalog.calls().await.is_empty());
    }

    #[tokio::test]
    async fn disjoint_pages_append_in_order() {
        let catalog = RecordingCatalog::with_responses(vec![
            Ok(page(&["a", "b", "c"], 30)),
            Ok(page(&["d", "e"], 30)),
        ]);
        let mut agg = SearchResultAggregator::new();
        agg.reset("dune", "scifi");
        agg.load_page(&catalog).await.unwrap();
        let snap = agg.load_page(&catalog).await.unwrap();
        assert_eq!(ids(&snap), vec!["a", "b", "c", "d", "e"]);
        assert_eq!(
            catalog.calls().await,
            vec![
                ("dune subject:scifi".to_string(), 0),
                ("dune subject:scifi".to_string(), 1)
            ]
        );
    }

    #[tokio::test]
    async fn repeated_page_does_not_duplicate_or_reorder() {
        let catalog = RecordingCatalog::with_responses(vec![
            Ok(page(&["a", "b", "c"], 30)),
            Ok(page(&["a", "b", "c"], 30)),
        ]);
        let mut agg = SearchResultAggregator::new();
        agg.reset("dune", "");
        let once = agg.load_page(&catalog).await.unwrap();
        let twice = agg.load_page(&catalog).await.unwrap();
        assert_eq!(ids(&once), ids(&twice));
    }

    #[tokio::test]
    async fn overlapping_page_keeps_first_seen_position() {
        let catalog = RecordingCatalog::with_responses(vec![
            Ok(page(&["a", "b", "c"], 30)),
            Ok(page(&["c", "x", "a", "y", "x"], 30)),
        ]);
        let mut agg = SearchResultAggregator::new();
        agg.reset("q", "");
        agg.load_page(&catalog).await.unwrap();
        let snap = agg.load_page(&catalog).await.unwrap();
        assert_eq!(ids(&snap), vec!["a", "b", "c", "x", "y"]);
        assert_eq!(agg.results().get("x").map(|b| b.title.as_str()), Some("Title x"));
    }

    #[tokio::test]
    async fn has_more_tracks_total_available() {
        let numbered = |prefix: &str| SearchPage {
            items: (0..12).map(|i| book(&format!("{prefix}-{i}"))).collect(),
            total_available: 25,
        };
        let catalog = RecordingCatalog::with_responses(vec![
            Ok(numbered("p0")),
            Ok(numbered("p1")),
            Ok(page(&["last"], 25)),
        ]);
        let mut agg = SearchResultAggregator::new();
        agg.reset("rust", "");

        assert!(agg.load_page(&catalog).await.unwrap().has_more);
        let snap = agg.load_page(&catalog).await.unwrap();
        assert_eq!(snap.items.len(), 24);
        assert!(snap.has_more);
        let snap = agg.load_page(&catalog).await.unwrap();
        assert_eq!(snap.items.len(), 25);
        assert!(!snap.has_more);
        assert_eq!(agg.results().next_page_index(), 3);
    }

    #[tokio::test]
    async fn empty_page_does_not_advance_and_ends_listing() {
        let catalog = RecordingCatalog::with_responses(vec![
            Ok(page(&["a"], 100)),
            Ok(page(&[], 100)),
        ]);
        let mut agg = SearchResultAggregator::new();
        agg.reset("q", "");
        agg.load_page(&catalog).await.unwrap();
        let snap = agg.load_page(&catalog).await.unwrap();
        assert_eq!(agg.results().next_page_index(), 1);
        assert!(!snap.has_more);
        assert_eq!(ids(&snap), vec!["a"]);
    }

    #[tokio::test]
    async fn failed_page_leaves_results_untouched() {
        let catalog = RecordingCatalog::with_responses(vec![
            Ok(page(&["a", "b"], 40)),
            Err(ApiError::Status {
                status: 503,
                message: "unavailable".into(),
            }),
            Ok(page(&["c"], 40)),
        ]);
        let mut agg = SearchResultAggregator::new();
        agg.reset("q", "");
        agg.load_page(&catalog).await.unwrap();

        let err = agg.load_page(&catalog).await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert_eq!(agg.results().len(), 2);
        assert_eq!(agg.results().next_page_index(), 1);
        assert!(agg.has_more());

        // Retry asks for the same page again.
        let snap = agg.load_page(&catalog).await.unwrap();
        assert_eq!(ids(&snap), vec!["a", "b", "c"]);
        let pages: Vec<u32> = catalog.calls().await.into_iter().map(|(_, p)| p).collect();
        assert_eq!(pages, vec![0, 1, 1]);
    }

    #[tokio::test]
    async fn new_search_replaces_previous_results() {
        let catalog = RecordingCatalog::with_responses(vec![
            Ok(page(&["a", "b"], 40)),
            Ok(page(&["a", "z"], 2)),
        ]);
        let mut agg = SearchResultAggregator::new();
        agg.search("first", "", &catalog).await.unwrap();
        let snap = agg.search("second", "history", &catalog).await.unwrap();
        assert_eq!(ids(&snap), vec!["a", "z"]);
        assert!(!snap.has_more);
        assert_eq!(agg.category(), "history");
        let calls = catalog.calls().await;
        assert_eq!(calls[1], ("second subject:history".to_string(), 0));
    }
}
