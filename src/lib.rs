#![deny(clippy::implicit_return)]
#![allow(clippy::needless_return)]

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
