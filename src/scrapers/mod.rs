//! Article acquisition: fetching pages and extracting what the dataset needs.
//!
//! # Submodules
//!
//! | Module | Role |
//! |--------|------|
//! | [`fetcher`] | Paced, disguised, retried HTTP GETs |
//! | [`article`] | Paragraph text extraction |
//! | [`dates`] | Publication date fallback chain |
//!
//! Failures here never abort a run: a failed fetch is a [`FetchResult`]
//! value and an unparseable page simply has no text or date.
//!
//! [`FetchResult`]: crate::models::FetchResult

pub mod article;
pub mod dates;
pub mod fetcher;
