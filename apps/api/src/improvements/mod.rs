//! Improvements: accept / reject / revert over AI-proposed resume edits, with a
//! categorized change log and serialized rescoring.
//!
//! Dependency order (leaves first): categorize + summary → history → persistence →
//! gate + rescore → lifecycle → registry → handlers.

pub mod categorize;
pub mod error;
pub mod gate;
pub mod handlers;
pub mod history;
pub mod lifecycle;
pub mod models;
pub mod persistence;
pub mod registry;
pub mod rescore;
pub mod summary;
