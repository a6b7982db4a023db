//! Fetch-and-cache pipeline for an upstream work-report grid.
//!
//! `reportcache` pulls every page of a legacy server-side grid through an
//! [`UpstreamClient`](upstream::UpstreamClient), drops dispatch-ticket rows,
//! keeps the result as one immutable in-memory snapshot and answers list,
//! category and statistics queries from it:
//!
//! - [`Collector`](collector::Collector) paginates, filters, retries and stops.
//! - [`CacheStore`](cache::CacheStore) holds the snapshot and judges staleness.
//! - [`aggregate`] derives statistics on every call.
//! - [`ReportService`](service::ReportService) is the query layer and makes
//!   sure only one refresh runs at a time.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use reportcache::{
//!     cache::CacheStore, collector::Collector, config::ReportConfig,
//!     models::Credential, service::{Freshness, ReportService},
//!     upstream::UpstreamClient,
//! };
//!
//! async fn first_page(client: Arc<dyn UpstreamClient>) -> anyhow::Result<()> {
//!     let config = ReportConfig::default();
//!     let collector = Arc::new(Collector::from_config(client, &config)?);
//!     let service = ReportService::new(
//!         collector,
//!         Arc::new(CacheStore::new()),
//!         Credential::new("PHPSESSID=..."),
//!         config.query.clone(),
//!     );
//!     let page = service.list_page(0, 10, Freshness::IfStale).await?;
//!     println!("{} of {}", page.rows.len(), page.total);
//!     Ok(())
//! }
//! ```

pub mod aggregate;
pub mod cache;
pub mod collector;
pub mod config;
pub mod errors;
pub mod filter;
pub mod models;
pub mod service;
pub mod upstream;

pub use crate::cache::CacheStore;
pub use crate::collector::Collector;
pub use crate::config::ReportConfig;
pub use crate::service::{CategoryCriterion, Freshness, ReportService};
