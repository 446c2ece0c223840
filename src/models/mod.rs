// Data models and request/response payloads

pub mod user_profile;
pub mod exercise;
pub mod routine;
pub mod relationship;
pub mod pagination;
pub mod validation;

pub use user_profile::*;
pub use exercise::*;
pub use routine::*;
pub use relationship::*;
pub use pagination::*;
pub use validation::*;
