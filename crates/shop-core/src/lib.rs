//! # shop-core: Records and Validation for the Shop Schema
//!
//! This crate holds every type that crosses the database boundary, with
//! zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Shop Persistence Layers                          │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 Binaries (seed, demo)                           │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    shop-db (Repositories)                       │   │
//! │  │        users() products() orders() reports() + seeding          │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ shop-core (THIS CRATE) ★                        │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │  report   │  │  filter   │  │ validation│  │   │
//! │  │   │   User    │  │ OrderTotal│  │UserFilter │  │   rules   │  │   │
//! │  │   │   Order   │  │ PriceStats│  │ProductOrd │  │   checks  │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Entity records and insert payloads
//! - [`report`] - Rows produced by joined aggregates
//! - [`filter`] - Scan filters and whitelisted orderings
//! - [`error`] - Validation error type
//! - [`validation`] - Input rules checked before SQL is issued
//!
//! ## Example Usage
//!
//! ```rust
//! use shop_core::NewUser;
//!
//! let user = NewUser::new(1, "John Doe", "en").username("johnny");
//! assert!(user.validate().is_ok());
//! ```

pub mod error;
pub mod filter;
pub mod report;
pub mod types;
pub mod validation;

pub use error::ValidationError;
pub use filter::{ProductFilter, ProductOrder, UserFilter, UserOrder};
pub use report::*;
pub use types::*;

/// Maximum length of any free-text column (mirrors `VARCHAR(255)`).
pub const MAX_TEXT_LEN: usize = 255;

/// Upper bound for the `limit` of any scan.
pub const MAX_SCAN_LIMIT: u32 = 1000;
