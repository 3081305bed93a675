use std::sync::Arc;

use crate::config::ApiConfig;
use crate::error::AppResult;

mod http;
mod policy;
#[cfg(test)]
pub(crate) mod testing;
mod traits;

pub use http::HttpRecipeClient;
pub use policy::RequestPolicy;
pub use traits::{Recipe, RecipeClient, RecipeRequest, RecipeSummary, SearchRequest};

pub fn open_default_client(api: &ApiConfig) -> AppResult<Arc<dyn RecipeClient>> {
    let client = HttpRecipeClient::new(api)?;
    tracing::debug!(base_url = client.base_url(), "recipe client ready");
    Ok(Arc::new(client))
}
