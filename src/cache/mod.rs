pub mod paper_cache;

pub use paper_cache::PaperCache;
