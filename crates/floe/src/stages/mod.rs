//! Transform stages.
//!
//! - `catalog`: catalog records to the items and creators tables
//! - `events`: event records to the users, time and activity facts tables
//!
//! Stages run one after the other on the same engine session. Each one
//! loads its inputs into named views, runs its queries and hands every
//! result to the [`TableSink`](crate::sink::TableSink).

pub mod catalog;
pub mod events;

pub use catalog::{CatalogReport, process_catalog};
pub use events::{EventsReport, JoinStats, process_events};
