//! Media Catalog Service
//!
//! REST backend for a movie catalog: CRUD over media records, reviews nested
//! under each media, poster uploads to S3 and on-demand PDF export.
//!
//! ## Architecture
//!
//! ```text
//!  HTTP request
//!       │
//!       ▼
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ Origin check │──▶│ Request      │──▶│ Validation   │
//! │ + CORS       │   │ context      │   │ (ValidJson)  │
//! └──────────────┘   └──────────────┘   └──────────────┘
//!                                              │
//!                                              ▼
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ S3 poster    │◀──│ Media/Review │──▶│ JSON store   │
//! │ uploader     │   │ handlers     │   │ medias.json  │
//! └──────────────┘   └──────────────┘   │ reviews.json │
//!                           │           └──────────────┘
//!                           ▼
//!                    ┌──────────────┐
//!                    │ PDF export   │
//!                    └──────────────┘
//! ```
//!
//! Each collection is a single JSON array document that is loaded, mutated
//! in memory and rewritten whole. Writers on the same collection are
//! serialized through [`json_store::JsonCollection::lock`]; there are no
//! transactions across collections.

pub mod api;
pub mod config;
pub mod error;
pub mod json_store;
pub mod media_handlers;
pub mod models;
pub mod pdf;
pub mod review_handlers;
pub mod s3_uploader;
pub mod validation;

pub use api::{create_router, start_api_server, AppState, RequestContext};
pub use config::Config;
pub use error::ApiError;
pub use json_store::{CatalogStore, JsonCollection};
pub use models::{Media, Review};
pub use pdf::{PosterFetcher, PosterImage};
pub use s3_uploader::{PosterStore, PosterUpload, S3Uploader};
pub use validation::{FieldRule, FieldViolation, RuleKind};
