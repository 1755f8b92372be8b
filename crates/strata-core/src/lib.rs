//! Core types and trait definitions for the Strata memory engine.
//!
//! Strata keeps three kinds of knowledge apart: authoritative facts
//! ([`fact`]), advisory lessons ([`episode`]) and document evidence
//! ([`chunk`]). Storage backends implement the traits in [`store`]; the
//! [`resolver`] composes them into one precedence-ordered answer.
//!
//! This crate is deliberately free of database and filesystem code.

#![allow(async_fn_in_trait)]

pub mod chunk;
pub mod context;
pub mod embed;
pub mod episode;
pub mod error;
pub mod fact;
pub mod lifecycle;
pub mod project;
pub mod resolver;
pub mod store;

pub use error::{Error, Result};
