pub mod cache;
pub mod normalize;
pub mod sources;
pub mod types;
