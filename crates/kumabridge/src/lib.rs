//! HTTP front end and process wiring for the kumabridge server.

pub mod cli;
pub mod error;
pub mod http;
