//! Valet is a terminal-first assistant that routes free-text requests to
//! a language model or to pluggable capability providers.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`providers`] defines the capability contract, the registry that
//!   addresses providers by name, and the Gmail/Slack implementations.
//! - [`core`] owns the intent router, the response formatter, the session
//!   state machine, and configuration.
//! - [`api`] defines the message payloads and the non-streaming client
//!   used to talk to the model.
//! - [`ui`] renders the terminal interface and runs the interactive event
//!   loop that drives input and display updates.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`crate::cli::main`], which initializes providers and
//! dispatches into [`ui::run_chat`] for interactive sessions.

pub mod api;
pub mod cli;
pub mod core;
pub mod providers;
pub mod ui;
pub mod utils;
