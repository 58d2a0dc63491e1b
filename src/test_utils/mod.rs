//! the test_utils folder here will share graph builders and callback
//! recorders between unit tests
mod common;

pub use common::*;
