use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::category::FoodCategory;
use crate::error::{AppError, AppResult};

use super::store::StateStore;

pub mod keys {
    pub const PAGE: &str = "search.page";
    pub const QUERY: &str = "search.query";
    pub const LIST_POSITION: &str = "search.list_position";
    pub const SELECTED_CATEGORY: &str = "search.selected_category";
    pub const CATEGORY_POSITION: &str = "search.category_position";
    pub const RECIPE_ID: &str = "detail.recipe_id";
}

/// The part of a search session that survives a restart.
///
/// Every field is restored on its own: a missing or malformed key leaves
/// that field `None` without affecting the others.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub page: Option<u32>,
    pub query: Option<String>,
    pub list_scroll_position: Option<usize>,
    pub selected_category: Option<FoodCategory>,
    pub category_scroll_position: Option<f32>,
}

impl SessionState {
    pub fn load(store: &dyn StateStore) -> Self {
        let page = read::<u32>(store, keys::PAGE).filter(|page| {
            if *page == 0 {
                tracing::warn!(key = keys::PAGE, "ignoring persisted page 0");
            }
            *page >= 1
        });

        let state = Self {
            page,
            query: read(store, keys::QUERY),
            list_scroll_position: read(store, keys::LIST_POSITION),
            selected_category: read::<Option<FoodCategory>>(store, keys::SELECTED_CATEGORY)
                .flatten(),
            category_scroll_position: read::<f32>(store, keys::CATEGORY_POSITION)
                .filter(|offset| offset.is_finite()),
        };
        tracing::debug!(?state, "loaded session state");
        state
    }

    /// Writes every present field. Absent fields are left untouched, except
    /// the selected category which is written as `null` when cleared.
    pub fn save(&self, store: &mut dyn StateStore) -> AppResult<()> {
        if let Some(page) = self.page {
            store.set(keys::PAGE, encode(&page)?)?;
        }
        if let Some(query) = &self.query {
            store.set(keys::QUERY, encode(query)?)?;
        }
        if let Some(position) = self.list_scroll_position {
            store.set(keys::LIST_POSITION, encode(&position)?)?;
        }
        store.set(keys::SELECTED_CATEGORY, encode(&self.selected_category)?)?;
        if let Some(offset) = self.category_scroll_position {
            store.set(keys::CATEGORY_POSITION, encode(&offset)?)?;
        }
        Ok(())
    }
}

pub(crate) fn read<T: DeserializeOwned>(store: &dyn StateStore, key: &str) -> Option<T> {
    let value = store.get(key)?;
    match serde_json::from_value(value) {
        Ok(parsed) => Some(parsed),
        Err(err) => {
            tracing::warn!(key, error = %err, "skipping unreadable persisted value");
            None
        }
    }
}

/// Stores one field; failures are logged and otherwise ignored so a broken
/// store never blocks the UI.
pub(crate) fn persist<T: Serialize>(store: &mut dyn StateStore, key: &str, value: &T) {
    let result = encode(value).and_then(|value| store.set(key, value));
    if let Err(err) = result {
        tracing::warn!(key, error = %err, "failed to persist session field");
    }
}

fn encode<T: Serialize>(value: &T) -> AppResult<Value> {
    serde_json::to_value(value)
        .map_err(|err| AppError::internal(format!("failed to encode session field: {err}")))
}
