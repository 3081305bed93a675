use crate::category::FoodCategory;
use crate::client::RecipeSummary;

/// Dismissible message raised when a fetch fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub title: String,
    pub message: String,
}

impl Notice {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            title: "Error".to_string(),
            message: message.into(),
        }
    }
}

/// Read-only snapshot handed to the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchView {
    pub recipes: Vec<RecipeSummary>,
    pub loading: bool,
    pub query: String,
    pub selected_category: Option<FoodCategory>,
    /// 1-based.
    pub page: u32,
    pub list_scroll_position: usize,
    pub category_scroll_position: f32,
    pub notice: Option<Notice>,
}

impl Default for SearchView {
    fn default() -> Self {
        Self {
            recipes: Vec::new(),
            loading: false,
            query: String::new(),
            selected_category: None,
            page: 1,
            list_scroll_position: 0,
            category_scroll_position: 0.0,
            notice: None,
        }
    }
}
