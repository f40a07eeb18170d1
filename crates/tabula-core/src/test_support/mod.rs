//! Shared fixtures for unit tests: mapping models and a recording port.

mod fixtures;
mod port;

pub(crate) use fixtures::*;
pub(crate) use port::{RecordedStatement, RecordingPort};
