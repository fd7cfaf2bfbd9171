//! Core type definitions: models and capabilities, conversation state, chat
//! history entries, normalized actions and tool specifications.

pub mod action;
pub mod message;
pub mod model;
pub mod state;
pub mod tool;
