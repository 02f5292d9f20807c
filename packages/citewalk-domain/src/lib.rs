//! Pure helpers shared by the discovery engine and its provider clients.

pub mod paper_id;
pub mod queries;
