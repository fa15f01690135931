//! Concrete generation backends.
pub mod openai;
pub mod scripted;
