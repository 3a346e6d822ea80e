//! # study-rooms
//!
//! Client for the study-room scheduling API. Fetches rooms, reconciles them
//! with what this device knows locally (joined rooms, edited times and
//! places, creator hints), and renders the result as lists, a month
//! calendar, and an upcoming-schedule widget.
//!
//! The pipeline, bottom-up:
//!
//! - [`client`] fetches raw records and merges per-room details.
//! - [`normalize`] folds one record, its [`metadata`] overlay, and the
//!   membership [`ledger`] into a [`normalize::RoomView`].
//! - [`ownership`] decides whether the current user owns, joined, or is a
//!   stranger to each room.
//! - [`dashboard`] publishes the reconciled list and applies mutations.
//! - [`calendar`], [`listing`], [`roster`], and [`render`] shape it for display.

pub mod calendar;
pub mod cli;
pub mod client;
pub mod config;
pub mod dashboard;
pub mod discussion;
pub mod error;
pub mod ledger;
pub mod listing;
pub mod metadata;
pub mod model;
pub mod normalize;
pub mod observability;
pub mod ownership;
pub mod render;
pub mod roster;
pub mod session;
pub mod storage;

pub use client::RoomApi;
pub use dashboard::{Dashboard, DashboardState, LoadStatus, RoomEntry};
pub use error::{Result, StudyRoomError};
pub use normalize::RoomView;
pub use storage::{KeyValueStore, MemoryStore, SqliteStore};
