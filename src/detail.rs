//! Single-recipe screen: fetches one recipe by id and remembers which id was
//! open so a restart can show it again.

use std::sync::Arc;

use tokio::sync::watch;

use crate::client::{Recipe, RecipeClient, RecipeRequest, RequestPolicy};
use crate::config::Config;
use crate::error::AppResult;
use crate::fetch::{FetchEngine, FetchEvent};
use crate::search::Notice;
use crate::session::{StateStore, keys, persist, read};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetailEvent {
    Load(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct RecipeFetch;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetailView {
    pub recipe: Option<Recipe>,
    pub recipe_id: Option<u64>,
    pub loading: bool,
    pub notice: Option<Notice>,
}

pub struct RecipeDetailController {
    client: Arc<dyn RecipeClient>,
    token: String,
    policy: RequestPolicy,
    store: Box<dyn StateStore>,
    engine: FetchEngine<RecipeFetch, Recipe>,
    awaiting: Option<u64>,
    state: DetailView,
    view_tx: watch::Sender<DetailView>,
}

impl RecipeDetailController {
    /// Builds the controller and, if the store remembers a recipe id, loads
    /// that recipe straight away.
    pub fn new(
        client: Arc<dyn RecipeClient>,
        token: impl Into<String>,
        config: &Config,
        store: Box<dyn StateStore>,
    ) -> AppResult<Self> {
        let (view_tx, _) = watch::channel(DetailView::default());
        let mut controller = Self {
            client,
            token: token.into(),
            policy: RequestPolicy::from_config(&config.api),
            store,
            engine: FetchEngine::new()?,
            awaiting: None,
            state: DetailView::default(),
            view_tx,
        };

        if let Some(id) = read::<u64>(controller.store.as_ref(), keys::RECIPE_ID) {
            tracing::debug!(id, "restoring recipe id");
            controller.on_trigger_event(DetailEvent::Load(id));
        }
        Ok(controller)
    }

    pub fn view(&self) -> &DetailView {
        &self.state
    }

    pub fn subscribe(&self) -> watch::Receiver<DetailView> {
        self.view_tx.subscribe()
    }

    pub fn on_trigger_event(&mut self, event: DetailEvent) {
        let DetailEvent::Load(id) = event;
        if let Err(err) = self.load(id) {
            tracing::error!(id, error = %err, "recipe event failed");
            self.engine.cancel_all();
            self.awaiting = None;
            self.state.loading = false;
        }
        self.publish();
    }

    pub fn dismiss_error(&mut self) {
        if self.state.notice.take().is_some() {
            self.publish();
        }
    }

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

    pub async fn settle(&mut self) {
        while let Some(event) = self.engine.next_event().await {
            if self.apply(event) {
                self.publish();
            }
        }
    }

    pub fn close(&mut self) {
        self.engine.shutdown();
        self.awaiting = None;
        self.state.loading = false;
        self.publish();
    }

    fn load(&mut self, id: u64) -> AppResult<()> {
        self.state.recipe_id = Some(id);

        // Already showing this recipe.
        if self.state.recipe.as_ref().is_some_and(|recipe| recipe.id == id) {
            return Ok(());
        }
        self.state.recipe = None;
        self.state.loading = true;

        let client = Arc::clone(&self.client);
        let policy = self.policy;
        let request = RecipeRequest {
            token: self.token.clone(),
            id,
        };
        let generation = self.engine.submit(RecipeFetch, async move {
            policy.run("get", || client.get(request.clone())).await
        })?;
        self.awaiting = Some(generation);
        Ok(())
    }

    fn apply(&mut self, event: FetchEvent<RecipeFetch, Recipe>) -> bool {
        if self.awaiting != Some(event.generation) {
            tracing::debug!(generation = event.generation, "dropping stale recipe");
            return false;
        }
        self.awaiting = None;
        self.state.loading = false;

        match event.output {
            Ok(recipe) => {
                tracing::debug!(id = recipe.id, title = %recipe.title, "recipe loaded");
                persist(self.store.as_mut(), keys::RECIPE_ID, &recipe.id);
                self.state.recipe = Some(recipe);
            }
            Err(err) => {
                tracing::error!(id = ?self.state.recipe_id, error = %err, "recipe fetch failed");
                self.state.notice = Some(Notice::error(err.to_string()));
            }
        }
        true
    }

    fn publish(&self) {
        self.view_tx.send_replace(self.state.clone());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::{DetailEvent, RecipeDetailController};
    use crate::client::RecipeClient;
    use crate::client::testing::{ScriptedClient, recipe};
    use crate::config::Config;
    use crate::session::{MemoryStore, StateStore, keys};

    fn start(client: &Arc<ScriptedClient>, store: &MemoryStore) -> RecipeDetailController {
        let mut config = Config::default();
        config.api.max_retries = 0;
        RecipeDetailController::new(
            Arc::clone(client) as Arc<dyn RecipeClient>,
            "test-token",
            &config,
            Box::new(store.clone()),
        )
        .expect("detail controller should start")
    }

    #[tokio::test]
    async fn load_fetches_recipe_and_persists_id() {
        let client = Arc::new(ScriptedClient::new());
        client.add_recipe(recipe(583, "Pizza Potato Skins"));
        let store = MemoryStore::new();

        let mut controller = start(&client, &store);
        assert!(!controller.view().loading);
        controller.on_trigger_event(DetailEvent::Load(583));
        assert!(controller.view().loading);
        controller.settle().await;

        let loaded = controller.view().recipe.as_ref().expect("recipe loaded");
        assert_eq!(loaded.title, "Pizza Potato Skins");
        assert!(!controller.view().loading);
        assert_eq!(store.get(keys::RECIPE_ID), Some(json!(583)));
    }

    #[tokio::test]
    async fn failed_load_keeps_previous_persisted_id() {
        let client = Arc::new(ScriptedClient::new());
        client.add_recipe(recipe(5, "Vegetarian Chili"));
        let store = MemoryStore::new();
        let mut controller = start(&client, &store);

        controller.on_trigger_event(DetailEvent::Load(5));
        controller.settle().await;
        controller.on_trigger_event(DetailEvent::Load(6));
        controller.settle().await;

        assert_eq!(store.get(keys::RECIPE_ID), Some(json!(5)));
        assert!(controller.view().notice.is_some());
    }

    #[tokio::test]
    async fn loading_the_shown_recipe_again_skips_the_fetch() {
        let client = Arc::new(ScriptedClient::new());
        client.add_recipe(recipe(7, "Soup"));
        let mut controller = start(&client, &MemoryStore::new());

        controller.on_trigger_event(DetailEvent::Load(7));
        controller.settle().await;
        controller.on_trigger_event(DetailEvent::Load(7));
        controller.settle().await;

        assert_eq!(client.get_calls(), vec![7]);
        assert!(!controller.view().loading);
    }

    #[tokio::test]
    async fn persisted_id_is_loaded_on_start() {
        let client = Arc::new(ScriptedClient::new());
        client.add_recipe(recipe(42, "Beef Stew"));
        let mut store = MemoryStore::new();
        store.set(keys::RECIPE_ID, json!(42)).expect("seed id");

        let mut controller = start(&client, &store);
        assert_eq!(controller.view().recipe_id, Some(42));
        controller.settle().await;

        assert_eq!(client.get_calls(), vec![42]);
        assert_eq!(
            controller.view().recipe.as_ref().map(|recipe| recipe.id),
            Some(42)
        );
    }

    #[tokio::test]
    async fn missing_recipe_raises_notice() {
        let client = Arc::new(ScriptedClient::new());
        let mut controller = start(&client, &MemoryStore::new());

        controller.on_trigger_event(DetailEvent::Load(9));
        controller.settle().await;

        assert!(controller.view().recipe.is_none());
        assert!(!controller.view().loading);
        let notice = controller.view().notice.clone().expect("notice");
        assert!(notice.message.contains("404"));

        controller.dismiss_error();
        assert!(controller.view().notice.is_none());
    }

    #[tokio::test]
    async fn loading_after_close_resets_loading() {
        let client = Arc::new(ScriptedClient::new());
        client.add_recipe(recipe(1, "Donut"));
        let mut controller = start(&client, &MemoryStore::new());

        controller.close();
        controller.on_trigger_event(DetailEvent::Load(1));

        assert!(!controller.view().loading);
        assert!(client.get_calls().is_empty());
    }
}
