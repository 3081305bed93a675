
use std::sync::Arc;

use crate::client::testing::ScriptedClient;
use crate::config::Config;
use crate::session::MemoryStore;

use super::SearchPaginationController;

fn test_config(page_size: usize) -> Config {
    let mut config = Config::default();
    config.paging.page_size = page_size;
    config.api.max_retries = 0;
    config.api.retry_backoff_ms = 0;
    config
}

fn start(
    client: &Arc<ScriptedClient>,
    store: &MemoryStore,
    config: &Config,
) -> SearchPaginationController {
    SearchPaginationController::new(
        Arc::clone(client) as Arc<dyn crate::client::RecipeClient>,
        "test-token",
        config,
        Box::new(store.clone()),
    )
    .expect("controller should start")
}

fn ids(controller: &SearchPaginationController) -> Vec<u64> {
    controller
        .view()
        .recipes
        .iter()
        .map(|recipe| recipe.id)
        .collect()
}

fn calls_for(client: &ScriptedClient, query: &str) -> Vec<u32> {
    client
        .search_calls()
        .into_iter()
        .filter(|(called, _)| called == query)
        .map(|(_, page)| page)
        .collect()
}
