mod engine;

pub use engine::{FetchEngine, FetchEvent};
