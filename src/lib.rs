// Wedding Registry - Core Library
// Shared by the admin CLI, the API server, and tests

pub mod config;
pub mod db;
pub mod error;
pub mod ledger;
pub mod models;
pub mod parser;
pub mod rsvp;
pub mod seed;

#[cfg(feature = "server")]
pub mod api;

// Re-export commonly used types
pub use config::Config;
pub use db::{setup_database, Store};
pub use error::{LedgerError, LedgerResult};
pub use ledger::{build_registry, Ledger};
pub use models::{
    derive_item_id, format_timestamp, parse_timestamp,
    BulkLoadSummary, Contribution, ContributionCreate, GiftItem, Rsvp, RsvpCreate,
};
pub use parser::{
    read_registry_list_rows, read_registry_rows,
    write_contributions_csv, write_registry_csv, write_rsvps_csv,
    RegistryListRow, RegistryRow,
};
pub use rsvp::{create_rsvp, list_rsvps};

#[cfg(feature = "server")]
pub use api::{build_router, AppState};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
