pub mod handlers;
pub mod normalizer;
