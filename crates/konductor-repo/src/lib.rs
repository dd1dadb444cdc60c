//! Konductor Version Resolution
//!
//! This crate decides which software version each module deploys:
//!
//! - **Version cascade**: explicit source, stack-named file, local default
//!   file, remote channel file, in that order
//! - **Run cache**: the resolved table is persisted so repeated runs skip the
//!   network entirely until a refresh is requested
//! - **Helm indexes**: latest stable chart version lookup for modules that
//!   track upstream charts
//!
//! ## Example
//!
//! ```rust,no_run
//! use konductor_repo::{HttpFetcher, VersionResolver, VersionsConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let resolver = VersionResolver::new(VersionsConfig::default(), "dev", HttpFetcher::new()?);
//! let versions = resolver.resolve(false).await?;
//! println!("cert_manager -> {:?}", versions.get("cert_manager"));
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod http;
pub mod index;
pub mod versions;

pub use cache::VersionCache;
pub use config::VersionsConfig;
pub use error::{RepoError, Result};
pub use http::{Fetcher, HttpFetcher, is_url};
pub use index::{
    CHART_NOT_FOUND, ChartEntry, ChartIndex, ChartVersionLookup, is_stable_version,
    latest_stable_chart_version,
};
pub use versions::{VersionResolver, VersionSource, VersionTable};
