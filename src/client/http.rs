use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::config::ApiConfig;
use crate::error::{AppError, AppResult};

use super::traits::{Recipe, RecipeClient, RecipeRequest, RecipeSummary, SearchRequest};

/// Longest server error body carried into an error message.
const ERROR_BODY_LIMIT: usize = 200;

#[derive(Debug, Deserialize)]
struct SearchPageDto {
    #[serde(default)]
    results: Vec<RecipeDto>,
}

#[derive(Debug, Deserialize)]
struct RecipeDto {
    pk: u64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    publisher: String,
    #[serde(default)]
    featured_image: String,
    #[serde(default)]
    rating: u32,
    #[serde(default)]
    source_url: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    cooking_instructions: Option<String>,
    #[serde(default)]
    ingredients: Vec<String>,
    #[serde(default)]
    date_added: Option<String>,
    #[serde(default)]
    date_updated: Option<String>,
}

impl From<RecipeDto> for Recipe {
    fn from(dto: RecipeDto) -> Self {
        Self {
            id: dto.pk,
            title: dto.title,
            publisher: dto.publisher,
            featured_image: dto.featured_image,
            rating: dto.rating,
            source_url: dto.source_url,
            description: dto.description,
            cooking_instructions: dto.cooking_instructions,
            ingredients: dto.ingredients,
            date_added: dto.date_added,
            date_updated: dto.date_updated,
        }
    }
}

impl From<RecipeDto> for RecipeSummary {
    fn from(dto: RecipeDto) -> Self {
        Self {
            id: dto.pk,
            title: dto.title,
            publisher: dto.publisher,
            featured_image: dto.featured_image,
            rating: dto.rating,
        }
    }
}

/// `RecipeClient` backed by the recipe REST API.
#[derive(Debug, Clone)]
pub struct HttpRecipeClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRecipeClient {
    pub fn new(api: &ApiConfig) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(api.timeout())
            .build()
            .map_err(|err| AppError::internal(format!("failed to build http client: {err}")))?;
        Ok(Self {
            client,
            base_url: api.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn fetch_json<T: DeserializeOwned>(
        &self,
        path: &str,
        token: &str,
        params: &[(&str, String)],
    ) -> AppResult<T> {
        let url = format!("{}/{path}/", self.base_url);
        tracing::debug!(%url, ?params, "http request");

        let response = self
            .client
            .get(&url)
            .header(AUTHORIZATION, format!("Token {token}"))
            .query(params)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::server(status.as_u16(), truncate(&body)));
        }

        let bytes = response.bytes().await.map_err(transport_error)?;
        decode(&bytes)
    }
}

impl RecipeClient for HttpRecipeClient {
    fn search(&self, request: SearchRequest) -> BoxFuture<'_, AppResult<Vec<RecipeSummary>>> {
        async move {
            let params = [
                ("page", request.page.to_string()),
                ("query", request.query),
            ];
            let page: SearchPageDto = self.fetch_json("search", &request.token, &params).await?;
            Ok(summaries_from_page(page))
        }
        .boxed()
    }

    fn get(&self, request: RecipeRequest) -> BoxFuture<'_, AppResult<Recipe>> {
        async move {
            let params = [("id", request.id.to_string())];
            let dto: RecipeDto = self.fetch_json("get", &request.token, &params).await?;
            Ok(Recipe::from(dto))
        }
        .boxed()
    }
}

fn summaries_from_page(page: SearchPageDto) -> Vec<RecipeSummary> {
    page.results.into_iter().map(RecipeSummary::from).collect()
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> AppResult<T> {
    serde_json::from_slice(bytes).map_err(|err| AppError::decode(err.to_string()))
}

fn transport_error(err: reqwest::Error) -> AppError {
    if err.is_decode() {
        return AppError::decode(err.to_string());
    }
    if let Some(status) = err.status() {
        return AppError::server(status.as_u16(), err.to_string());
    }
    AppError::network(err.to_string())
}

fn truncate(body: &str) -> String {
    let body = body.trim();
    match body.char_indices().nth(ERROR_BODY_LIMIT) {
        Some((cut, _)) => format!("{}...", &body[..cut]),
        None => body.to_string(),
    }
}
