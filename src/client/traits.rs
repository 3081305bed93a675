use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::error::AppResult;

/// One row of a search result page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeSummary {
    pub id: u64,
    pub title: String,
    pub publisher: String,
    pub featured_image: String,
    pub rating: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipe {
    pub id: u64,
    pub title: String,
    pub publisher: String,
    pub featured_image: String,
    pub rating: u32,
    pub source_url: String,
    pub description: String,
    pub cooking_instructions: Option<String>,
    pub ingredients: Vec<String>,
    pub date_added: Option<String>,
    pub date_updated: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub token: String,
    pub query: String,
    /// 1-based.
    pub page: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipeRequest {
    pub token: String,
    pub id: u64,
}

/// Remote recipe API.
///
/// Futures are boxed so controllers can hold the client as
/// `Arc<dyn RecipeClient>` and move calls onto spawned tasks.
pub trait RecipeClient: Send + Sync {
    fn search(&self, request: SearchRequest) -> BoxFuture<'_, AppResult<Vec<RecipeSummary>>>;
    fn get(&self, request: RecipeRequest) -> BoxFuture<'_, AppResult<Recipe>>;
}
