mod store;

pub use store::{CacheEntry, TtlCache};
