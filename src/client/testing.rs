use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;

use crate::error::{AppError, AppResult};

use super::traits::{Recipe, RecipeClient, RecipeRequest, RecipeSummary, SearchRequest};

#[derive(Debug, Clone)]
pub(crate) enum Reply {
    Batch(Vec<RecipeSummary>),
    Network(&'static str),
    Server(u16),
    Delayed(Duration, Box<Reply>),
}

impl Reply {
    async fn resolve(self) -> AppResult<Vec<RecipeSummary>> {
        let mut reply = self;
        loop {
            match reply {
                Self::Batch(batch) => return Ok(batch),
                Self::Network(message) => return Err(AppError::network(message)),
                Self::Server(status) => return Err(AppError::server(status, "scripted failure")),
                Self::Delayed(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    reply = *inner;
                }
            }
        }
    }
}

/// In-memory `RecipeClient` answering from scripted pages. Unscripted pages
/// come back empty.
#[derive(Debug, Default)]
pub(crate) struct ScriptedClient {
    pages: Mutex<HashMap<(String, u32), Reply>>,
    recipes: Mutex<HashMap<u64, Recipe>>,
    search_calls: Mutex<Vec<(String, u32)>>,
    get_calls: Mutex<Vec<u64>>,
}

impl ScriptedClient {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn script(&self, query: &str, page: u32, reply: Reply) {
        self.pages
            .lock()
            .expect("script lock should not be poisoned")
            .insert((query.to_string(), page), reply);
    }

    pub(crate) fn script_page(&self, query: &str, page: u32, batch: Vec<RecipeSummary>) {
        self.script(query, page, Reply::Batch(batch));
    }

    pub(crate) fn add_recipe(&self, recipe: Recipe) {
        self.recipes
            .lock()
            .expect("recipe lock should not be poisoned")
            .insert(recipe.id, recipe);
    }

    pub(crate) fn search_calls(&self) -> Vec<(String, u32)> {
        self.search_calls
            .lock()
            .expect("call lock should not be poisoned")
            .clone()
    }

    pub(crate) fn get_calls(&self) -> Vec<u64> {
        self.get_calls
            .lock()
            .expect("call lock should not be poisoned")
            .clone()
    }
}

impl RecipeClient for ScriptedClient {
    fn search(&self, request: SearchRequest) -> BoxFuture<'_, AppResult<Vec<RecipeSummary>>> {
        self.search_calls
            .lock()
            .expect("call lock should not be poisoned")
            .push((request.query.clone(), request.page));
        let reply = self
            .pages
            .lock()
            .expect("script lock should not be poisoned")
            .get(&(request.query, request.page))
            .cloned()
            .unwrap_or(Reply::Batch(Vec::new()));
        reply.resolve().boxed()
    }

    fn get(&self, request: RecipeRequest) -> BoxFuture<'_, AppResult<Recipe>> {
        self.get_calls
            .lock()
            .expect("call lock should not be poisoned")
            .push(request.id);
        let recipe = self
            .recipes
            .lock()
            .expect("recipe lock should not be poisoned")
            .get(&request.id)
            .cloned();
        async move { recipe.ok_or_else(|| AppError::server(404, "recipe not found")) }.boxed()
    }
}

pub(crate) fn summaries(prefix: &str, ids: std::ops::Range<u64>) -> Vec<RecipeSummary> {
    ids.map(|id| RecipeSummary {
        id,
        title: format!("{prefix} {id}"),
        publisher: "test-kitchen".to_string(),
        featured_image: format!("https://img.test/{id}.png"),
        rating: (id % 50) as u32,
    })
    .collect()
}

pub(crate) fn recipe(id: u64, title: &str) -> Recipe {
    Recipe {
        id,
        title: title.to_string(),
        publisher: "test-kitchen".to_string(),
        featured_image: format!("https://img.test/{id}.png"),
        rating: 10,
        source_url: format!("https://recipes.test/{id}"),
        description: String::new(),
        cooking_instructions: None,
        ingredients: vec!["salt".to_string(), "pepper".to_string()],
        date_added: None,
        date_updated: None,
    }
}
