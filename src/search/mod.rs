pub mod controller;
pub mod view;

#[cfg(test)]
mod tests;

pub use controller::{SearchEvent, SearchPaginationController};
pub use view::{Notice, SearchView};
