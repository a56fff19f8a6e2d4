// src/services/traverse.rs

//! Rate-limited traversal of the term × age query space.
//!
//! A [`Traversal`] is a lazy iterator: it issues the next query only once the
//! previous query's items have been consumed, sleeping for the configured
//! delay between queries (never between items of one query). The first error
//! from the search API ends the iteration; there is no cursor to resume from.

use std::collections::VecDeque;
use std::time::Duration;

use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::{Config, MatchedPost, RawPost, RetryConfig, parse_cutoff};
use crate::services::dedup::Deduplicator;
use crate::services::query::QuerySynthesizer;
use crate::services::search::{SearchApi, SearchRequest};

/// Blocking pause between queries.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

/// Sleeps the current thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

impl<T: Sleeper + ?Sized> Sleeper for &T {
    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

/// Everything one traversal needs besides its collaborators.
#[derive(Debug, Clone)]
pub struct TraversalPlan {
    pub terms: Vec<String>,
    pub ages: Vec<String>,
    pub forum_set: String,
    pub limit_per_query: usize,
    /// Inclusive lower bound on `created_at`
    pub cutoff: f64,
    pub query_delay: Duration,
    pub retry: RetryConfig,
}

impl TraversalPlan {
    /// Build a plan from validated configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        let plan = Self {
            terms: config.vocabulary.terms.clone(),
            ages: config.vocabulary.ages.clone(),
            forum_set: config.search.forum_set.clone(),
            limit_per_query: config.search.limit_per_query,
            cutoff: parse_cutoff(&config.search.cutoff_date)?,
            query_delay: config.search.query_delay(),
            retry: config.search.retry.clone(),
        };
        plan.validate()?;
        Ok(plan)
    }

    pub fn validate(&self) -> Result<()> {
        if self.terms.is_empty() {
            return Err(AppError::validation("term vocabulary is empty"));
        }
        if self.ages.is_empty() {
            return Err(AppError::validation("age vocabulary is empty"));
        }
        if self.limit_per_query == 0 {
            return Err(AppError::validation("per-query limit must be > 0"));
        }
        Ok(())
    }

    /// Number of (term, age) cells.
    pub fn cell_count(&self) -> usize {
        self.terms.len() * self.ages.len()
    }

    /// Cell at `index` in term-major order.
    fn cell(&self, index: usize) -> Option<(&str, &str)> {
        if index >= self.cell_count() {
            return None;
        }
        let ages = self.ages.len();
        Some((&self.terms[index / ages], &self.ages[index % ages]))
    }

    /// All cells in term-major order.
    pub fn cells(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        (0..self.cell_count()).filter_map(move |i| self.cell(i))
    }
}

/// Counters for one traversal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraversalStats {
    pub queries_issued: usize,
    pub retries: usize,
    pub items_seen: usize,
    pub dropped_before_cutoff: usize,
    pub dropped_duplicates: usize,
    pub malformed_skipped: usize,
    pub yielded: usize,
}

/// Drives a [`SearchApi`] across every query cell of a plan.
pub struct SearchTraverser<A, S = ThreadSleeper> {
    api: A,
    sleeper: S,
    synthesizer: QuerySynthesizer,
    plan: TraversalPlan,
}

impl<A: SearchApi> SearchTraverser<A, ThreadSleeper> {
    pub fn new(api: A, synthesizer: QuerySynthesizer, plan: TraversalPlan) -> Self {
        Self::with_sleeper(api, synthesizer, plan, ThreadSleeper)
    }
}

impl<A: SearchApi, S: Sleeper> SearchTraverser<A, S> {
    pub fn with_sleeper(
        api: A,
        synthesizer: QuerySynthesizer,
        plan: TraversalPlan,
        sleeper: S,
    ) -> Self {
        Self {
            api,
            sleeper,
            synthesizer,
            plan,
        }
    }

    pub fn plan(&self) -> &TraversalPlan {
        &self.plan
    }

    /// Start a fresh traversal with its own duplicate set.
    pub fn traverse(&self) -> Traversal<'_, A, S> {
        Traversal {
            traverser: self,
            next_cell: 0,
            current: None,
            pending: VecDeque::new(),
            dedup: Deduplicator::new(),
            stats: TraversalStats::default(),
            finished: false,
        }
    }

    /// Run one query, retrying transient failures per the retry policy.
    fn run_query(&self, query: &str, stats: &mut TraversalStats) -> Result<Vec<Value>> {
        let request = SearchRequest {
            query,
            scope: &self.plan.forum_set,
            limit: self.plan.limit_per_query,
        };
        let retry = &self.plan.retry;
        let mut attempt = 1;

        loop {
            match self.api.search(&request) {
                Ok(items) => return Ok(items),
                Err(e) if attempt < retry.max_attempts && e.is_transient() => {
                    let backoff = retry.backoff_for_attempt(attempt);
                    log::warn!(
                        "Query failed (attempt {}/{}): {}. Retrying in {:?}",
                        attempt,
                        retry.max_attempts,
                        e,
                        backoff
                    );
                    stats.retries += 1;
                    self.sleeper.sleep(backoff);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// A single pass over the query space, yielding each post at most once.
pub struct Traversal<'a, A, S> {
    traverser: &'a SearchTraverser<A, S>,
    next_cell: usize,
    current: Option<(&'a str, &'a str)>,
    pending: VecDeque<Value>,
    dedup: Deduplicator,
    stats: TraversalStats,
    finished: bool,
}

impl<A: SearchApi, S: Sleeper> Traversal<'_, A, S> {
    pub fn stats(&self) -> &TraversalStats {
        &self.stats
    }

    /// Take the next item of the current page that survives the filters.
    fn next_from_page(&mut self) -> Option<MatchedPost> {
        let (term, age) = self.current?;
        let cutoff = self.traverser.plan.cutoff;

        while let Some(item) = self.pending.pop_front() {
            self.stats.items_seen += 1;

            let post = match RawPost::from_value(item) {
                Ok(post) => post,
                Err(e) => {
                    self.stats.malformed_skipped += 1;
                    log::warn!("Skipping malformed item for ({term}, {age}): {e}");
                    continue;
                }
            };

            if post.created_at < cutoff {
                self.stats.dropped_before_cutoff += 1;
                continue;
            }
            if self.dedup.seen(&post.id) {
                self.stats.dropped_duplicates += 1;
                continue;
            }

            self.stats.yielded += 1;
            return Some(MatchedPost {
                post,
                matched_term: term.to_string(),
                matched_age_token: age.to_string(),
            });
        }
        None
    }

    /// Issue the query for the next cell; `Ok(false)` once every cell is done.
    fn advance(&mut self) -> Result<bool> {
        let traverser = self.traverser;
        let Some((term, age)) = traverser.plan.cell(self.next_cell) else {
            return Ok(false);
        };
        self.next_cell += 1;

        if self.stats.queries_issued > 0 {
            traverser.sleeper.sleep(traverser.plan.query_delay);
        }

        let query = traverser.synthesizer.build(term, age)?;
        self.stats.queries_issued += 1;
        log::debug!(
            "Query {}/{}: {}",
            self.next_cell,
            traverser.plan.cell_count(),
            query
        );

        let items = traverser.run_query(&query, &mut self.stats)?;
        self.pending = items
            .into_iter()
            .take(traverser.plan.limit_per_query)
            .collect();
        self.current = Some((term, age));
        Ok(true)
    }
}

impl<A: SearchApi, S: Sleeper> Iterator for Traversal<'_, A, S> {
    type Item = Result<MatchedPost>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        loop {
            if let Some(matched) = self.next_from_page() {
                return Some(Ok(matched));
            }
            match self.advance() {
                Ok(true) => continue,
                Ok(false) => {
                    self.finished = true;
                    return None;
                }
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;

    use serde_json::json;

    /// In-memory search API keyed by query string. Returns every stored item
    /// regardless of the requested limit.
    #[derive(Default)]
    pub(crate) struct FakeSearch {
        pub pages: HashMap<String, Vec<Value>>,
        pub failures: RefCell<HashMap<String, usize>>,
        pub calls: RefCell<Vec<String>>,
    }

    impl FakeSearch {
        pub(crate) fn with_page(mut self, query: String, items: Vec<Value>) -> Self {
            self.pages.insert(query, items);
            self
        }

        pub(crate) fn failing(self, query: String, times: usize) -> Self {
            self.failures.borrow_mut().insert(query, times);
            self
        }
    }

    impl SearchApi for FakeSearch {
        fn search(&self, request: &SearchRequest<'_>) -> Result<Vec<Value>> {
            self.calls.borrow_mut().push(request.query.to_string());
            if let Some(left) = self.failures.borrow_mut().get_mut(request.query) {
                if *left > 0 {
                    *left -= 1;
                    return Err(AppError::search_status(request.query, 503, "HTTP 503"));
                }
            }
            Ok(self.pages.get(request.query).cloned().unwrap_or_default())
        }
    }

    /// Records requested sleeps instead of sleeping.
    #[derive(Default)]
    pub(crate) struct RecordingSleeper {
        pub slept: RefCell<Vec<Duration>>,
    }

    impl Sleeper for RecordingSleeper {
        fn sleep(&self, duration: Duration) {
            self.slept.borrow_mut().push(duration);
        }
    }

    pub(crate) fn post(id: &str, created_at: f64) -> Value {
        json!({
            "id": id,
            "title": format!("title {id}"),
            "body": "body",
            "created_at": created_at,
            "permalink": format!("/r/Parenting/comments/{id}/"),
            "forum": "Parenting",
            "score": 1,
            "reply_count": 0
        })
    }

    const CUTOFF: f64 = 1_704_067_200.0; // 2024-01-01

    fn plan(terms: &[&str], ages: &[&str], limit: usize) -> TraversalPlan {
        TraversalPlan {
            terms: terms.iter().map(|s| s.to_string()).collect(),
            ages: ages.iter().map(|s| s.to_string()).collect(),
            forum_set: "Parenting".into(),
            limit_per_query: limit,
            cutoff: CUTOFF,
            query_delay: Duration::from_millis(1100),
            retry: RetryConfig::default(),
        }
    }

    fn q(term: &str, age: &str) -> String {
        QuerySynthesizer::default().build(term, age).unwrap()
    }

    #[test]
    fn test_cells_are_term_major() {
        let plan = plan(&["fell", "burn"], &["baby", "toddler"], 5);
        let cells: Vec<_> = plan.cells().collect();
        assert_eq!(
            cells,
            vec![
                ("fell", "baby"),
                ("fell", "toddler"),
                ("burn", "baby"),
                ("burn", "toddler")
            ]
        );
    }

    #[test]
    fn test_duplicate_ids_yielded_once() {
        let api = FakeSearch::default()
            .with_page(q("fell", "baby"), vec![post("a", CUTOFF), post("b", CUTOFF)])
            .with_page(q("fell", "toddler"), vec![post("b", CUTOFF), post("c", CUTOFF)])
            .with_page(q("burn", "baby"), vec![post("a", CUTOFF)]);
        let sleeper = RecordingSleeper::default();
        let traverser = SearchTraverser::with_sleeper(
            &api,
            QuerySynthesizer::default(),
            plan(&["fell", "burn"], &["baby", "toddler"], 10),
            &sleeper,
        );

        let mut traversal = traverser.traverse();
        let ids: Vec<_> = traversal
            .by_ref()
            .map(|r| r.unwrap().post.id)
            .collect();

        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(traversal.stats().dropped_duplicates, 2);
        assert_eq!(traversal.stats().queries_issued, 4);
    }

    #[test]
    fn test_first_match_keeps_its_cell() {
        let api = FakeSearch::default()
            .with_page(q("fell", "baby"), vec![post("a", CUTOFF)])
            .with_page(q("fell", "toddler"), vec![post("a", CUTOFF)]);
        let traverser = SearchTraverser::with_sleeper(
            &api,
            QuerySynthesizer::default(),
            plan(&["fell"], &["baby", "toddler"], 10),
            RecordingSleeper::default(),
        );
        let posts: Vec<_> = traverser.traverse().map(|r| r.unwrap()).collect();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].matched_age_token, "baby");
    }

    #[test]
    fn test_cutoff_boundary_is_inclusive() {
        let api = FakeSearch::default().with_page(
            q("fell", "baby"),
            vec![
                post("before", CUTOFF - 1.0),
                post("at", CUTOFF),
                post("after", CUTOFF + 1.0),
            ],
        );
        let traverser = SearchTraverser::with_sleeper(
            &api,
            QuerySynthesizer::default(),
            plan(&["fell"], &["baby"], 10),
            RecordingSleeper::default(),
        );
        let mut traversal = traverser.traverse();
        let ids: Vec<_> = traversal.by_ref().map(|r| r.unwrap().post.id).collect();
        assert_eq!(ids, vec!["at", "after"]);
        assert_eq!(traversal.stats().dropped_before_cutoff, 1);
    }

    #[test]
    fn test_delay_only_between_queries() {
        let api = FakeSearch::default()
            .with_page(q("fell", "baby"), vec![post("a", CUTOFF), post("b", CUTOFF)])
            .with_page(q("fell", "toddler"), vec![post("c", CUTOFF), post("d", CUTOFF)]);
        let sleeper = RecordingSleeper::default();
        let traverser = SearchTraverser::with_sleeper(
            &api,
            QuerySynthesizer::default(),
            plan(&["fell", "burn"], &["baby", "toddler"], 10),
            &sleeper,
        );

        let mut traversal = traverser.traverse();
        traversal.next().unwrap().unwrap();
        traversal.next().unwrap().unwrap();
        assert!(sleeper.slept.borrow().is_empty());

        assert_eq!(traversal.count(), 2);
        let slept = sleeper.slept.borrow();
        assert_eq!(slept.len(), 3);
        assert!(slept.iter().all(|d| *d >= Duration::from_millis(1100)));
    }

    #[test]
    fn test_results_capped_per_query() {
        // The API hands back more items than the requested limit.
        let api = FakeSearch::default()
            .with_page(
                q("fell", "baby"),
                (0..5).map(|i| post(&format!("p{i}"), CUTOFF)).collect(),
            )
            .with_page(
                q("burn", "baby"),
                (5..10).map(|i| post(&format!("p{i}"), CUTOFF)).collect(),
            );
        let traverser = SearchTraverser::with_sleeper(
            &api,
            QuerySynthesizer::default(),
            plan(&["fell", "burn"], &["baby"], 2),
            RecordingSleeper::default(),
        );

        let mut traversal = traverser.traverse();
        let ids: Vec<_> = traversal.by_ref().map(|r| r.unwrap().post.id).collect();
        assert_eq!(ids, vec!["p0", "p1", "p5", "p6"]);
        assert_eq!(traversal.stats().items_seen, 4);
    }

    #[test]
    fn test_api_failure_aborts_traversal() {
        let api = FakeSearch::default()
            .with_page(q("fell", "baby"), vec![post("a", CUTOFF)])
            .with_page(q("burn", "baby"), vec![post("z", CUTOFF)])
            .failing(q("fell", "toddler"), 1);
        let traverser = SearchTraverser::with_sleeper(
            &api,
            QuerySynthesizer::default(),
            plan(&["fell", "burn"], &["baby", "toddler"], 10),
            RecordingSleeper::default(),
        );

        let results: Vec<_> = traverser.traverse().collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(AppError::Search { .. })));
        assert_eq!(api.calls.borrow().len(), 2);
    }

    #[test]
    fn test_retry_recovers_transient_failure() {
        let api = FakeSearch::default()
            .with_page(q("fell", "baby"), vec![post("a", CUTOFF)])
            .failing(q("fell", "baby"), 2);
        let sleeper = RecordingSleeper::default();
        let mut plan = plan(&["fell"], &["baby"], 10);
        plan.retry = RetryConfig {
            max_attempts: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 1000,
        };
        let traverser =
            SearchTraverser::with_sleeper(&api, QuerySynthesizer::default(), plan, &sleeper);

        let mut traversal = traverser.traverse();
        let ids: Vec<_> = traversal.by_ref().map(|r| r.unwrap().post.id).collect();
        assert_eq!(ids, vec!["a"]);
        assert_eq!(traversal.stats().retries, 2);
        assert_eq!(
            *sleeper.slept.borrow(),
            vec![Duration::from_millis(100), Duration::from_millis(200)]
        );
    }

    #[test]
    fn test_malformed_items_skipped_and_counted() {
        let api = FakeSearch::default().with_page(
            q("fell", "baby"),
            vec![json!({"title": "no id"}), post("ok", CUTOFF)],
        );
        let traverser = SearchTraverser::with_sleeper(
            &api,
            QuerySynthesizer::default(),
            plan(&["fell"], &["baby"], 10),
            RecordingSleeper::default(),
        );
        let mut traversal = traverser.traverse();
        let ids: Vec<_> = traversal.by_ref().map(|r| r.unwrap().post.id).collect();
        assert_eq!(ids, vec!["ok"]);
        assert_eq!(traversal.stats().malformed_skipped, 1);
    }

    #[test]
    fn test_each_traversal_starts_fresh() {
        let api = FakeSearch::default().with_page(q("fell", "baby"), vec![post("a", CUTOFF)]);
        let traverser = SearchTraverser::with_sleeper(
            &api,
            QuerySynthesizer::default(),
            plan(&["fell"], &["baby"], 10),
            RecordingSleeper::default(),
        );
        assert_eq!(traverser.traverse().count(), 1);
        assert_eq!(traverser.traverse().count(), 1);
        assert_eq!(api.calls.borrow().len(), 2);
    }

    #[test]
    fn test_plan_rejects_empty_vocabulary() {
        assert!(plan(&[], &["baby"], 1).validate().is_err());
        assert!(plan(&["fell"], &[], 1).validate().is_err());
        assert!(plan(&["fell"], &["baby"], 0).validate().is_err());
    }
}
