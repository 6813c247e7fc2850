#![deny(clippy::all)]
#![warn(nonstandard_style, rust_2018_idioms)]

//! Serverless functions hosted on `functions-runtime`:
//!
//! * [`answer`] forwards a programming question to `howdoi` and replies in plain text;
//! * [`airports`] loads an uploaded airports CSV into a warehouse table;
//! * [`greet`] says hello.
//!
//! Each binary under `src/bin` reads its configuration once, installs logging
//! with [`logging::init`], and passes both into the function it hosts.
pub mod airports;
pub mod answer;
pub mod config;
pub mod greet;
pub mod logging;
