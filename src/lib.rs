//! # Climatizar
//!
//! Central air-conditioning plant scheduler. A shared plant of three
//! serving seats is multiplexed over an arbitrary number of guest rooms
//! under a priority-plus-time-slice discipline, while per-room temperature
//! dynamics and billing are simulated tick by tick and every step is
//! persisted to an append-only audit trail.
//!
//! ## Features
//!
//! - **Multi-queue scheduler**: serving prefix, priority-ordered buffer,
//!   and warming region over one owned arena of control blocks
//! - **Strict priority preemption** across speed classes and round-robin
//!   rotation within a contested class
//! - **Simulated thermodynamics**: speed-paced movement toward target while
//!   serving, drift toward ambient while warming
//! - **Deterministic billing**: one unit of temperature change costs one
//!   unit of money; per-tick detail rows feed the invoice on checkout
//! - **Long-poll status**: change-detection with a bounded wait
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use climatizar::config::Config;
//! use climatizar::intake::Intake;
//! use climatizar::metrics::MetricsCollector;
//! use climatizar::scheduler::{Scheduler, SchedulerConfig};
//! use climatizar::store::FleetStore;
//!
//! let config = Config::default();
//! let store = Arc::new(FleetStore::in_memory());
//! store.provision_ac(101, 250).unwrap();
//! store.check_in(101).unwrap();
//!
//! let metrics = Arc::new(MetricsCollector::new());
//! let scheduler = Arc::new(Scheduler::new(
//!     SchedulerConfig::from(&config),
//!     Arc::clone(&store),
//!     Arc::clone(&metrics),
//! ));
//! let intake = Intake::new(Arc::clone(&store), Arc::clone(&scheduler), config);
//!
//! intake.power_on(101, None, None, None).unwrap();
//! scheduler.tick();
//! assert_eq!(scheduler.tracked_count(), 1);
//! ```

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_panics_doc)]

pub mod api;
pub mod billing;
pub mod config;
pub mod error;
pub mod intake;
pub mod metrics;
pub mod scheduler;
pub mod status;
pub mod store;

// Re-exports for convenience
pub use error::{ClimatizarError, Result};
pub use scheduler::Scheduler;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
