//! Job-search mail tracker: links a Gmail/Outlook account through a popup
//! OAuth handshake, pulls a bounded window of recent messages, classifies
//! them into lifecycle stages and scores tracked job applications.

pub mod accounts;
pub mod api;
pub mod auth;
pub mod clock;
pub mod config;
pub mod connect;
pub mod correlate;
pub mod domain;
pub mod error;
pub mod mail;
pub mod notifier;
pub mod service;
pub mod store;

pub use error::{Result, TrackerError};
