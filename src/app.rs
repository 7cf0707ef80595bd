//! Central feed state and the session that drives it.
//!
//! [`FeedState`] is the pure state machine: it owns the article list, the
//! favorites set, and the two view filters, and derives the visible list on
//! demand. It performs no I/O, so every transition is unit-testable.
//!
//! [`App`] wraps a `FeedState` together with the HTTP client and the
//! favorites store, and sequences the async operations: fetch-and-apply,
//! toggle-and-persist.

use crate::feed::{sort_by_recency, Article, Category, FeedError, HeadlinesClient};
use crate::storage::{FavoritesStore, StorageError};
use std::collections::HashSet;
use std::sync::Arc;

// ============================================================================
// Fetch Lifecycle Types
// ============================================================================

/// Screen-level loading phase for the current fetch.
///
/// `Loading` is entered by [`FeedState::begin_fetch`] and left when the
/// matching outcome is applied. A stale outcome does not leave `Loading` —
/// the newer fetch it lost to is still in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchPhase {
    #[default]
    Idle,
    Loading,
}

/// Terminal result of one fetch, fed back into the state machine.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// Articles for the requested category, already sorted newest-first.
    Success(Vec<Article>),
    /// Human-readable failure description; the previous articles stay up.
    Failure(String),
}

// ============================================================================
// Feed State Machine
// ============================================================================

/// Authoritative feed state: articles for the current category, the favorites
/// set, and the active filters.
///
/// The visible list is always derived via [`filtered_articles`]; it is never
/// stored, so it cannot drift from its inputs.
///
/// Every fetch is tagged with a generation number. Outcomes carrying a stale
/// generation are discarded, so two overlapping fetches (rapid category
/// switching) can never let the older response overwrite the newer one: the
/// displayed feed always reflects the most recently requested category.
///
/// [`filtered_articles`]: FeedState::filtered_articles
pub struct FeedState {
    /// Articles for the current category, sorted newest-first.
    /// Arc so views and caches can hold the list without cloning it.
    pub articles: Arc<Vec<Article>>,
    /// URLs of favorited articles. Replaced wholesale, never patched.
    pub favorites: HashSet<String>,
    pub category: Category,
    pub search_input: String,
    pub favorites_only: bool,
    pub phase: FetchPhase,
    /// Message from the most recent failed fetch, cleared by the next success.
    pub last_error: Option<String>,

    /// Latest issued fetch generation; outcomes must match it to be applied.
    fetch_generation: u64,
    clear_search_on_category_change: bool,
}

impl FeedState {
    pub fn new(favorites: HashSet<String>, clear_search_on_category_change: bool) -> Self {
        Self {
            articles: Arc::new(Vec::new()),
            favorites,
            category: Category::default(),
            search_input: String::new(),
            favorites_only: false,
            phase: FetchPhase::Idle,
            last_error: None,
            fetch_generation: 0,
            clear_search_on_category_change,
        }
    }

    // ========================================================================
    // Derived View
    // ========================================================================

    /// The visible article list: favorites filter first, then title search.
    ///
    /// Both filters are pure predicates over the recency-sorted list, so the
    /// result is always an order-preserving subsequence of `articles`. The
    /// search is a case-insensitive substring match on the title — no
    /// tokenization, no ranking.
    pub fn filtered_articles(&self) -> Vec<&Article> {
        let needle = self.search_input.to_lowercase();
        self.articles
            .iter()
            .filter(|article| !self.favorites_only || self.favorites.contains(&article.url))
            .filter(|article| {
                needle.is_empty() || article.title.to_lowercase().contains(&needle)
            })
            .collect()
    }

    pub fn is_favorite(&self, url: &str) -> bool {
        self.favorites.contains(url)
    }

    // ========================================================================
    // Filter Mutations
    // ========================================================================

    pub fn set_search(&mut self, text: impl Into<String>) {
        self.search_input = text.into();
    }

    pub fn toggle_favorites_only(&mut self) {
        self.favorites_only = !self.favorites_only;
    }

    /// Flip favorite membership for a URL. Returns the new membership state.
    ///
    /// Toggling the same URL twice restores the original set. Persistence is
    /// the caller's job ([`App::toggle_favorite`] saves after every flip).
    pub fn toggle_favorite(&mut self, url: &str) -> bool {
        if self.favorites.remove(url) {
            false
        } else {
            self.favorites.insert(url.to_string());
            true
        }
    }

    // ========================================================================
    // Category and Fetch Transitions
    // ========================================================================

    /// Switch category. Clears the search text when configured to; the
    /// article list itself is only replaced once the follow-up fetch lands.
    pub fn change_category(&mut self, category: Category) {
        self.category = category;
        if self.clear_search_on_category_change {
            self.search_input.clear();
        }
    }

    /// Start a fetch: enter `Loading` and issue a new generation tag.
    ///
    /// The returned generation must be passed back to [`apply_fetch`] with
    /// the outcome. Calling `begin_fetch` again before the outcome arrives
    /// invalidates the older generation.
    ///
    /// [`apply_fetch`]: FeedState::apply_fetch
    pub fn begin_fetch(&mut self) -> u64 {
        self.fetch_generation += 1;
        self.phase = FetchPhase::Loading;
        self.fetch_generation
    }

    /// Apply a fetch outcome. Returns false if the outcome was stale and
    /// discarded.
    ///
    /// On success the article list is replaced (re-sorted as a cheap
    /// invariant guard — sorting a sorted list is a stable no-op) and the
    /// error flag cleared. On failure the previous articles stay untouched
    /// and the message is recorded. Either way the loading phase ends.
    pub fn apply_fetch(&mut self, generation: u64, outcome: FetchOutcome) -> bool {
        if generation != self.fetch_generation {
            tracing::debug!(
                stale = generation,
                current = self.fetch_generation,
                "Discarding stale fetch outcome"
            );
            return false;
        }

        self.phase = FetchPhase::Idle;
        match outcome {
            FetchOutcome::Success(mut articles) => {
                sort_by_recency(&mut articles);
                self.articles = Arc::new(articles);
                self.last_error = None;
            }
            FetchOutcome::Failure(message) => {
                self.last_error = Some(message);
            }
        }
        true
    }
}

// ============================================================================
// Session
// ============================================================================

/// A feed session: state machine plus its external collaborators.
///
/// All methods run on the caller's task; there is one fetch in flight per
/// `refresh` call and the generation tag in `FeedState` arbitrates if callers
/// overlap them.
pub struct App {
    pub state: FeedState,
    client: HeadlinesClient,
    favorites_store: FavoritesStore,
}

impl App {
    /// Build a session, loading the persisted favorites into the state.
    pub async fn load(
        client: HeadlinesClient,
        favorites_store: FavoritesStore,
        clear_search_on_category_change: bool,
    ) -> Self {
        let favorites = favorites_store.load().await;
        Self {
            state: FeedState::new(favorites, clear_search_on_category_change),
            client,
            favorites_store,
        }
    }

    /// Fetch the current category and apply the outcome.
    ///
    /// On failure the error is both recorded in the state (for the view) and
    /// returned (for the caller). Never fatal; the previous articles remain.
    pub async fn refresh(&mut self) -> Result<(), FeedError> {
        let generation = self.state.begin_fetch();
        match self.client.top_headlines(self.state.category).await {
            Ok(articles) => {
                self.state
                    .apply_fetch(generation, FetchOutcome::Success(articles));
                Ok(())
            }
            Err(err) => {
                tracing::warn!(category = %self.state.category, error = %err, "Headlines fetch failed");
                self.state
                    .apply_fetch(generation, FetchOutcome::Failure(err.to_string()));
                Err(err)
            }
        }
    }

    /// Switch category and fetch it.
    pub async fn change_category(&mut self, category: Category) -> Result<(), FeedError> {
        self.state.change_category(category);
        self.refresh().await
    }

    /// Flip a favorite and persist the whole set. Returns the new membership.
    ///
    /// The in-memory flip commits before the write starts and stays committed
    /// even if the write fails — the caller gets the error and can retry the
    /// save (or warn), but the view already reflects the user's intent.
    pub async fn toggle_favorite(&mut self, url: &str) -> Result<bool, StorageError> {
        let now_favorite = self.state.toggle_favorite(url);
        self.favorites_store.save(&self.state.favorites).await?;
        Ok(now_favorite)
    }

    pub fn filtered_articles(&self) -> Vec<&Article> {
        self.state.filtered_articles()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;

    fn article(url: &str, title: &str, secs: i64) -> Article {
        Article {
            url: url.to_string(),
            title: title.to_string(),
            description: None,
            image_url: None,
            source_name: "Test Wire".to_string(),
            published_at: Some(Utc.timestamp_opt(secs, 0).unwrap()),
        }
    }

    fn state_with(articles: Vec<Article>) -> FeedState {
        let mut state = FeedState::new(HashSet::new(), false);
        let generation = state.begin_fetch();
        state.apply_fetch(generation, FetchOutcome::Success(articles));
        state
    }

    // ========================================================================
    // Filtering
    // ========================================================================

    #[test]
    fn test_no_filters_shows_everything() {
        let state = state_with(vec![
            article("u1", "Alpha News", 300),
            article("u2", "Beta Report", 200),
        ]);
        assert_eq!(state.filtered_articles().len(), 2);
    }

    #[test]
    fn test_search_is_case_insensitive_substring() {
        let mut state = state_with(vec![
            article("u1", "Alpha News", 300),
            article("u2", "Beta Report", 200),
        ]);

        for query in ["alpha", "ALPHA", "Alpha", "lpha N"] {
            state.set_search(query);
            let visible = state.filtered_articles();
            assert_eq!(visible.len(), 1, "query {query:?}");
            assert_eq!(visible[0].title, "Alpha News");
        }
    }

    #[test]
    fn test_search_with_no_match_is_empty() {
        let mut state = state_with(vec![article("u1", "Alpha News", 300)]);
        state.set_search("zeta");
        assert!(state.filtered_articles().is_empty());
    }

    #[test]
    fn test_favorites_only_retains_favorited_urls() {
        let mut state = state_with(vec![
            article("u1", "Alpha News", 300),
            article("u2", "Beta Report", 200),
        ]);
        state.toggle_favorite("u1");
        state.toggle_favorites_only();

        let visible = state.filtered_articles();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].url, "u1");
    }

    #[test]
    fn test_filters_compose_favorites_then_search() {
        let mut state = state_with(vec![
            article("u1", "Rust ships a release", 400),
            article("u2", "Rust in the kernel", 300),
            article("u3", "Gardening tips", 200),
        ]);
        state.toggle_favorite("u2");
        state.toggle_favorite("u3");
        state.toggle_favorites_only();
        state.set_search("rust");

        let visible = state.filtered_articles();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].url, "u2");
    }

    #[test]
    fn test_filter_preserves_recency_order() {
        let mut state = state_with(vec![
            article("u1", "Match one", 500),
            article("u2", "Other", 400),
            article("u3", "Match two", 300),
            article("u4", "Match three", 200),
        ]);
        state.set_search("match");

        let urls: Vec<&str> = state.filtered_articles().iter().map(|a| a.url.as_str()).collect();
        assert_eq!(urls, ["u1", "u3", "u4"]);
    }

    #[test]
    fn test_empty_search_is_no_filter() {
        let mut state = state_with(vec![article("u1", "Alpha News", 300)]);
        state.set_search("alpha");
        state.set_search("");
        assert_eq!(state.filtered_articles().len(), 1);
    }

    // ========================================================================
    // Favorites
    // ========================================================================

    #[test]
    fn test_toggle_twice_restores_original_set() {
        let mut state = FeedState::new(HashSet::new(), false);

        assert!(state.toggle_favorite("u1"));
        assert!(state.is_favorite("u1"));

        assert!(!state.toggle_favorite("u1"));
        assert!(!state.is_favorite("u1"));
        assert!(state.favorites.is_empty());
    }

    #[test]
    fn test_toggles_of_different_urls_are_independent() {
        let mut state = FeedState::new(HashSet::new(), false);
        state.toggle_favorite("u1");
        state.toggle_favorite("u2");
        state.toggle_favorite("u1");

        assert!(!state.is_favorite("u1"));
        assert!(state.is_favorite("u2"));
    }

    #[test]
    fn test_preloaded_favorites_survive_fetch() {
        let favorites: HashSet<String> = ["u2".to_string()].into_iter().collect();
        let mut state = FeedState::new(favorites, false);

        let generation = state.begin_fetch();
        state.apply_fetch(
            generation,
            FetchOutcome::Success(vec![
                article("u1", "Alpha", 300),
                article("u2", "Beta", 200),
            ]),
        );

        state.toggle_favorites_only();
        let visible = state.filtered_articles();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].url, "u2");
    }

    // ========================================================================
    // Fetch Lifecycle
    // ========================================================================

    #[test]
    fn test_begin_fetch_enters_loading() {
        let mut state = FeedState::new(HashSet::new(), false);
        assert_eq!(state.phase, FetchPhase::Idle);
        state.begin_fetch();
        assert_eq!(state.phase, FetchPhase::Loading);
    }

    #[test]
    fn test_success_populates_and_clears_error() {
        let mut state = FeedState::new(HashSet::new(), false);
        let generation = state.begin_fetch();
        state.apply_fetch(generation, FetchOutcome::Failure("boom".to_string()));
        assert_eq!(state.last_error.as_deref(), Some("boom"));

        let generation = state.begin_fetch();
        let applied = state.apply_fetch(
            generation,
            FetchOutcome::Success(vec![article("u1", "Alpha", 300)]),
        );

        assert!(applied);
        assert_eq!(state.phase, FetchPhase::Idle);
        assert_eq!(state.articles.len(), 1);
        assert_eq!(state.last_error, None);
    }

    #[test]
    fn test_failure_keeps_previous_articles() {
        let mut state = state_with(vec![article("u1", "Alpha", 300)]);

        let generation = state.begin_fetch();
        let applied =
            state.apply_fetch(generation, FetchOutcome::Failure("server said no".to_string()));

        assert!(applied);
        assert_eq!(state.phase, FetchPhase::Idle);
        assert_eq!(state.articles.len(), 1, "prior articles must survive a failed fetch");
        assert_eq!(state.last_error.as_deref(), Some("server said no"));
    }

    #[test]
    fn test_stale_outcome_is_discarded() {
        let mut state = FeedState::new(HashSet::new(), false);

        // Two overlapping fetches: the first resolves after the second began.
        let first = state.begin_fetch();
        let second = state.begin_fetch();

        let applied = state.apply_fetch(
            first,
            FetchOutcome::Success(vec![article("stale", "Old category", 100)]),
        );
        assert!(!applied);
        assert!(state.articles.is_empty(), "stale articles must not land");
        assert_eq!(state.phase, FetchPhase::Loading, "newer fetch is still in flight");

        let applied = state.apply_fetch(
            second,
            FetchOutcome::Success(vec![article("fresh", "New category", 200)]),
        );
        assert!(applied);
        assert_eq!(state.articles[0].url, "fresh");
        assert_eq!(state.phase, FetchPhase::Idle);
    }

    #[test]
    fn test_stale_failure_does_not_clobber_fresh_success() {
        let mut state = FeedState::new(HashSet::new(), false);

        let first = state.begin_fetch();
        let second = state.begin_fetch();
        state.apply_fetch(second, FetchOutcome::Success(vec![article("u1", "A", 1)]));
        state.apply_fetch(first, FetchOutcome::Failure("timeout".to_string()));

        assert_eq!(state.last_error, None);
        assert_eq!(state.articles.len(), 1);
    }

    #[test]
    fn test_apply_fetch_restores_sort_invariant() {
        let mut state = FeedState::new(HashSet::new(), false);
        let generation = state.begin_fetch();
        // Outcome arrives unsorted (contract violation by the producer)
        state.apply_fetch(
            generation,
            FetchOutcome::Success(vec![
                article("old", "Old", 100),
                article("new", "New", 900),
            ]),
        );
        assert_eq!(state.articles[0].url, "new");
    }

    // ========================================================================
    // Category Changes
    // ========================================================================

    #[test]
    fn test_change_category_preserves_search_by_default() {
        let mut state = FeedState::new(HashSet::new(), false);
        state.set_search("rust");
        state.change_category(Category::Technology);

        assert_eq!(state.category, Category::Technology);
        assert_eq!(state.search_input, "rust");
    }

    #[test]
    fn test_change_category_clears_search_when_configured() {
        let mut state = FeedState::new(HashSet::new(), true);
        state.set_search("rust");
        state.change_category(Category::Sports);

        assert_eq!(state.category, Category::Sports);
        assert_eq!(state.search_input, "");
    }

    // ========================================================================
    // Properties
    // ========================================================================

    fn arb_article() -> impl Strategy<Value = Article> {
        ("[a-z]{1,8}", "[ a-zA-Z]{0,20}", 0i64..2_000_000_000).prop_map(|(url, title, secs)| {
            Article {
                url,
                title,
                description: None,
                image_url: None,
                source_name: String::new(),
                published_at: Some(Utc.timestamp_opt(secs, 0).unwrap()),
            }
        })
    }

    proptest! {
        #[test]
        fn prop_sort_is_idempotent(mut articles in proptest::collection::vec(arb_article(), 0..32)) {
            sort_by_recency(&mut articles);
            let once = articles.clone();
            sort_by_recency(&mut articles);
            prop_assert_eq!(once, articles);
        }

        #[test]
        fn prop_filtered_is_order_preserving_subsequence(
            articles in proptest::collection::vec(arb_article(), 0..32),
            query in "[a-zA-Z]{0,4}",
            favorites_only in any::<bool>(),
            favorite_mask in proptest::collection::vec(any::<bool>(), 32),
        ) {
            let mut state = state_with(articles);
            state.set_search(query);
            state.favorites_only = favorites_only;
            let snapshot = Arc::clone(&state.articles);
            for (i, a) in snapshot.iter().enumerate() {
                if favorite_mask[i % favorite_mask.len()] {
                    state.favorites.insert(a.url.clone());
                }
            }

            let visible = state.filtered_articles();

            // Subsequence check: walk the full list, consuming visible items
            // in order. Every visible item must be found, in order.
            let mut remaining = visible.iter();
            let mut next = remaining.next();
            for a in state.articles.iter() {
                if let Some(v) = next {
                    if std::ptr::eq(*v, a) {
                        next = remaining.next();
                    }
                }
            }
            prop_assert!(next.is_none(), "filtered view is not a subsequence");
        }

        #[test]
        fn prop_toggle_twice_is_identity(urls in proptest::collection::vec("[a-z]{1,8}", 1..8)) {
            let mut state = FeedState::new(HashSet::new(), false);
            for url in &urls {
                state.toggle_favorite(url);
            }
            let snapshot = state.favorites.clone();
            state.toggle_favorite(&urls[0]);
            state.toggle_favorite(&urls[0]);
            prop_assert_eq!(snapshot, state.favorites);
        }
    }
}
