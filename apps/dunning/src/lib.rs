//! # dunning
//!
//! The service shell around `dunning-core`: HTTP API, CLI, configuration and
//! the mail webhook. The binary in `main.rs` only sets up logging and hands
//! off to [`cli::execute`].

pub mod api;
pub mod cli;
pub mod config;
pub mod mailer;
