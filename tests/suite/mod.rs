//! Integration test suites

mod chat_stream;
mod context_mode;
mod gating;
mod upload;
