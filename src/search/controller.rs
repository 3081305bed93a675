use std::collections::HashMap;
use std::ops::RangeInclusive;
use std::sync::Arc;

use tokio::sync::watch;

use crate::category::FoodCategory;
use crate::client::{RecipeClient, RecipeSummary, RequestPolicy, SearchRequest};
use crate::config::{Config, PagingConfig};
use crate::error::{AppError, AppResult};
use crate::fetch::{FetchEngine, FetchEvent};
use crate::session::{SessionState, StateStore};

use super::view::{Notice, SearchView};

/// Transitions accepted at the dispatch boundary. Each one owns a single
/// fetch slot in the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchEvent {
    NewSearch,
    NextPage,
    Restore,
}

/// Result of fetching a run of pages. Fetching stops at the first empty page
/// or the first error; only non-empty pages are kept.
#[derive(Debug, Default)]
pub(crate) struct PageLoad {
    batches: Vec<Vec<RecipeSummary>>,
    /// Last page that answered successfully, empty or not.
    through: u32,
    ended_empty: bool,
    error: Option<AppError>,
}

impl PageLoad {
    fn failed(through: u32, error: AppError) -> Self {
        Self {
            through,
            error: Some(error),
            ..Self::default()
        }
    }

    fn received(&self) -> usize {
        self.batches.iter().map(Vec::len).sum()
    }
}

/// Owns the search session: query, category, page counter, merged results
/// and the loading flag.
///
/// Operations never block. Fetches run on the [`FetchEngine`] and their
/// results are applied by [`poll`](Self::poll) or [`settle`](Self::settle) on
/// the thread that owns the controller. Restorable fields are written to the
/// [`StateStore`] as they change.
pub struct SearchPaginationController {
    client: Arc<dyn RecipeClient>,
    token: String,
    policy: RequestPolicy,
    paging: PagingConfig,
    store: Box<dyn StateStore>,
    engine: FetchEngine<SearchEvent, PageLoad>,
    awaiting: HashMap<SearchEvent, u64>,
    /// Pages `1..=loaded_through` have been answered. Anything between this
    /// and `state.page` is still owed by a queued, in-flight or failed fetch.
    loaded_through: u32,
    exhausted: bool,
    state: SearchView,
    view_tx: watch::Sender<SearchView>,
}

impl SearchPaginationController {
    /// Builds the controller, restores whatever the store holds and starts
    /// either the restore transition (non-zero list position) or a new
    /// search.
    pub fn new(
        client: Arc<dyn RecipeClient>,
        token: impl Into<String>,
        config: &Config,
        store: Box<dyn StateStore>,
    ) -> AppResult<Self> {
        let (view_tx, _) = watch::channel(SearchView::default());
        let mut controller = Self {
            client,
            token: token.into(),
            policy: RequestPolicy::from_config(&config.api),
            paging: config.paging.clone(),
            store,
            engine: FetchEngine::new()?,
            awaiting: HashMap::new(),
            loaded_through: 0,
            exhausted: false,
            state: SearchView::default(),
            view_tx,
        };
        controller.restore_session();
        Ok(controller)
    }

    pub fn view(&self) -> &SearchView {
        &self.state
    }

    pub fn subscribe(&self) -> watch::Receiver<SearchView> {
        self.view_tx.subscribe()
    }

    /// True once a next page came back empty while `stop_on_empty_page` is
    /// enabled. Reset by a new search.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn set_query(&mut self, text: impl Into<String>) {
        self.apply_query(text.into());
        self.publish();
    }

    /// Selects a category by its canonical value and mirrors it into the
    /// query. `None` clears the selection and leaves the query alone.
    ///
    /// Unknown values change nothing and return
    /// [`AppError::UnknownCategory`].
    pub fn select_category(&mut self, value: Option<&str>) -> AppResult<()> {
        match value {
            None => self.write_selected_category(None),
            Some(value) => {
                let Some(category) = FoodCategory::from_value(value) else {
                    tracing::warn!(category = value, "ignoring unknown category");
                    return Err(AppError::unknown_category(value));
                };
                self.write_selected_category(Some(category));
                self.apply_query(category.value().to_string());
            }
        }
        self.publish();
        Ok(())
    }

    pub fn trigger_new_search(&mut self) {
        self.on_trigger_event(SearchEvent::NewSearch);
    }

    pub fn trigger_next_page(&mut self) {
        self.on_trigger_event(SearchEvent::NextPage);
    }

    pub fn trigger_restore(&mut self) {
        self.on_trigger_event(SearchEvent::Restore);
    }

    /// Dispatch boundary. A failure here is logged and leaves the controller
    /// idle and usable.
    pub fn on_trigger_event(&mut self, event: SearchEvent) {
        let result = match event {
            SearchEvent::NewSearch => self.new_search(),
            SearchEvent::NextPage => self.next_page(),
            SearchEvent::Restore => self.restore_state(),
        };

        if let Err(err) = result {
            tracing::error!(?event, error = %err, "search event failed");
            self.engine.cancel_all();
            self.awaiting.clear();
            self.state.loading = false;
        }
        self.publish();
    }

    /// Records the list position and requests the next page once the last
    /// loaded row is reached. After a failed page the threshold stays at the
    /// rows actually loaded, so scrolling retries the owed page.
    pub fn on_list_position_changed(&mut self, index: usize) {
        self.write_list_position(index);

        let loaded_rows = usize::try_from(self.loaded_through.min(self.state.page))
            .unwrap_or(usize::MAX)
            .saturating_mul(self.paging.page_size);
        if index.saturating_add(1) >= loaded_rows && !self.state.loading && !self.exhausted {
            self.on_trigger_event(SearchEvent::NextPage);
        } else {
            self.publish();
        }
    }

    pub fn on_category_scroll_changed(&mut self, offset: f32) {
        self.state.category_scroll_position = offset;
        self.save_session();
        self.publish();
    }

    pub fn dismiss_error(&mut self) {
        if self.state.notice.take().is_some() {
            self.publish();
        }
    }

    /// Applies every finished fetch without waiting. Returns whether the
    /// view changed.
    pub fn poll(&mut self) -> bool {
        let mut changed = false;
        for event in self.engine.drain_events() {
            changed |= self.apply(event);
        }
        if changed {
            self.publish();
        }
        changed
    }

    /// Waits until no fetch is in flight, applying results as they land.
    pub async fn settle(&mut self) {
        while let Some(event) = self.engine.next_event().await {
            if self.apply(event) {
                self.publish();
            }
        }
    }

    /// Cancels outstanding fetches. Later transitions fail at the dispatch
    /// boundary.
    pub fn close(&mut self) {
        self.engine.shutdown();
        self.awaiting.clear();
        self.state.loading = false;
        self.publish();
    }

    fn restore_session(&mut self) {
        let restored = SessionState::load(self.store.as_ref());
        if let Some(page) = restored.page {
            tracing::debug!(page, "restoring page");
            self.state.page = page;
        }
        if let Some(query) = restored.query {
            self.state.query = query;
        }
        if let Some(position) = restored.list_scroll_position {
            tracing::debug!(position, "restoring list position");
            self.state.list_scroll_position = position;
        }
        self.state.selected_category = restored.selected_category;
        if let Some(offset) = restored.category_scroll_position {
            self.state.category_scroll_position = offset;
        }

        if self.state.list_scroll_position != 0 {
            self.on_trigger_event(SearchEvent::Restore);
        } else {
            self.on_trigger_event(SearchEvent::NewSearch);
        }
    }

    fn new_search(&mut self) -> AppResult<()> {
        let canceled = self.engine.cancel_all();
        self.awaiting.clear();
        self.reset_search_state();
        self.state.loading = true;
        tracing::debug!(query = %self.state.query, canceled, "new search");
        self.submit(SearchEvent::NewSearch, 1..=1)
    }

    /// Pages are appended strictly in order. While the list is being rebuilt
    /// the request is dropped; while another page is in flight it is queued
    /// and fetched once that page lands. If an earlier page failed, the owed
    /// pages are fetched again before the counter moves.
    fn next_page(&mut self) -> AppResult<()> {
        if self.awaiting.contains_key(&SearchEvent::NewSearch)
            || self.awaiting.contains_key(&SearchEvent::Restore)
        {
            tracing::debug!("ignoring next page while results are rebuilt");
            return Ok(());
        }

        self.state.loading = true;
        if self.awaiting.contains_key(&SearchEvent::NextPage) {
            self.write_page(self.state.page.saturating_add(1));
            tracing::debug!(page = self.state.page, "next page queued");
            return Ok(());
        }

        if self.loaded_through >= self.state.page {
            self.write_page(self.state.page.saturating_add(1));
        }
        tracing::debug!(
            from = self.loaded_through.saturating_add(1),
            page = self.state.page,
            query = %self.state.query,
            "next page"
        );
        self.submit_owed_pages()
    }

    /// Rebuilds the list by refetching pages `1..=page` in order.
    fn restore_state(&mut self) -> AppResult<()> {
        let canceled = self.engine.cancel_all();
        self.awaiting.clear();
        self.state.recipes.clear();
        self.loaded_through = 0;
        self.exhausted = false;
        self.state.loading = true;
        let last_page = self.state.page.max(1);
        tracing::debug!(last_page, query = %self.state.query, canceled, "restoring results");
        self.submit(SearchEvent::Restore, 1..=last_page)
    }

    fn reset_search_state(&mut self) {
        self.state.recipes.clear();
        self.state.notice = None;
        self.loaded_through = 0;
        self.exhausted = false;
        self.write_page(1);
        self.write_list_position(0);
        if self
            .state
            .selected_category
            .is_some_and(|category| category.value() != self.state.query)
        {
            self.write_selected_category(None);
        }
    }

    fn submit_owed_pages(&mut self) -> AppResult<()> {
        let first = self.loaded_through.saturating_add(1);
        self.submit(SearchEvent::NextPage, first..=self.state.page)
    }

    fn submit(&mut self, kind: SearchEvent, pages: RangeInclusive<u32>) -> AppResult<()> {
        let fetch = fetch_pages(
            Arc::clone(&self.client),
            self.policy,
            self.token.clone(),
            self.state.query.clone(),
            pages,
        );
        let generation = self.engine.submit(kind, fetch)?;
        self.awaiting.insert(kind, generation);
        Ok(())
    }

    fn apply(&mut self, event: FetchEvent<SearchEvent, PageLoad>) -> bool {
        let FetchEvent {
            generation,
            kind,
            output,
        } = event;
        if self.awaiting.get(&kind) != Some(&generation) {
            tracing::debug!(?kind, generation, "dropping stale fetch result");
            return false;
        }
        self.awaiting.remove(&kind);

        let load = output.unwrap_or_else(|err| PageLoad::failed(self.loaded_through, err));
        let received = load.received();
        let PageLoad {
            batches,
            through,
            ended_empty,
            error,
        } = load;
        let failed = error.is_some();

        match kind {
            SearchEvent::NewSearch => {
                self.loaded_through = through;
                self.state.recipes = batches.into_iter().flatten().collect();
            }
            SearchEvent::NextPage => {
                self.loaded_through = through;
                if ended_empty && self.paging.stop_on_empty_page {
                    tracing::debug!(page = through, "pagination exhausted");
                    self.exhausted = true;
                }
                self.state.recipes.extend(batches.into_iter().flatten());
            }
            SearchEvent::Restore => {
                let loaded = u32::try_from(batches.len()).unwrap_or(u32::MAX).max(1);
                if loaded < self.state.page {
                    tracing::debug!(
                        requested = self.state.page,
                        loaded,
                        "restore stopped early"
                    );
                    self.write_page(loaded);
                }
                self.loaded_through = through.min(self.state.page);
                self.state.recipes = batches.into_iter().flatten().collect();
            }
        }
        tracing::debug!(
            ?kind,
            received,
            total = self.state.recipes.len(),
            "applied fetch result"
        );

        if let Some(err) = error {
            tracing::error!(?kind, error = %err, "fetch failed");
            self.state.notice = Some(Notice::error(err.to_string()));
        }

        if kind == SearchEvent::NextPage
            && !failed
            && !self.exhausted
            && self.loaded_through < self.state.page
            && let Err(err) = self.submit_owed_pages()
        {
            tracing::error!(error = %err, "failed to fetch queued pages");
            self.engine.cancel_all();
            self.awaiting.clear();
        }
        self.state.loading = !self.awaiting.is_empty();
        true
    }

    fn apply_query(&mut self, query: String) {
        self.write_query(query);
        if self
            .state
            .selected_category
            .is_some_and(|category| category.value() != self.state.query)
        {
            self.write_selected_category(None);
        }
    }

    fn write_page(&mut self, page: u32) {
        self.state.page = page;
        self.save_session();
    }

    fn write_query(&mut self, query: String) {
        self.state.query = query;
        self.save_session();
    }

    fn write_list_position(&mut self, position: usize) {
        self.state.list_scroll_position = position;
        self.save_session();
    }

    fn write_selected_category(&mut self, category: Option<FoodCategory>) {
        self.state.selected_category = category;
        self.save_session();
    }

    /// Writes the restorable fields. Stores skip values that did not change.
    fn save_session(&mut self) {
        let session = SessionState {
            page: Some(self.state.page),
            query: Some(self.state.query.clone()),
            list_scroll_position: Some(self.state.list_scroll_position),
            selected_category: self.state.selected_category,
            category_scroll_position: Some(self.state.category_scroll_position),
        };
        if let Err(err) = session.save(self.store.as_mut()) {
            tracing::warn!(error = %err, "failed to persist session state");
        }
    }

    fn publish(&self) {
        self.view_tx.send_replace(self.state.clone());
    }
}

async fn fetch_pages(
    client: Arc<dyn RecipeClient>,
    policy: RequestPolicy,
    token: String,
    query: String,
    pages: RangeInclusive<u32>,
) -> AppResult<PageLoad> {
    let mut load = PageLoad {
        through: pages.start().saturating_sub(1),
        ..PageLoad::default()
    };
    for page in pages {
        let request = SearchRequest {
            token: token.clone(),
            query: query.clone(),
            page,
        };
        match policy.run("search", || client.search(request.clone())).await {
            Ok(batch) if batch.is_empty() => {
                load.through = page;
                load.ended_empty = true;
                break;
            }
            Ok(batch) => {
                load.through = page;
                load.batches.push(batch);
            }
            Err(err) => {
                load.error = Some(err);
                break;
            }
        }
    }
    Ok(load)
}
