//! Core types and trait definitions for pricescout.
//!
//! Everything here is pure: listing normalisation, product matching, the
//! catalog/tracking record types and the [`store::CatalogStore`] abstraction.
//! Runtime, database and HTTP concerns live in the other workspace crates.

// Native `async fn` in traits; the store trait spells out `Send` futures.
#![allow(async_fn_in_trait)]

pub mod catalog;
pub mod currency;
pub mod error;
pub mod listing;
pub mod matcher;
pub mod normalize;
pub mod store;
pub mod tracking;

pub use error::{Error, Result};
