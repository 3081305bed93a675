pub mod category;
pub mod client;
pub mod config;
pub mod detail;
pub mod error;
pub mod fetch;
pub mod logging;
pub mod search;
pub mod session;

pub use category::FoodCategory;
pub use config::Config;
pub use detail::{DetailEvent, DetailView, RecipeDetailController};
pub use error::{AppError, AppResult};
pub use search::{Notice, SearchEvent, SearchPaginationController, SearchView};
