mod state;
mod store;

pub(crate) use state::{persist, read};
pub use state::{SessionState, keys};
pub use store::{JsonFileStore, MemoryStore, StateStore};
