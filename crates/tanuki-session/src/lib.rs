//! Session management for Tanuki.
//!
//! Ties settings, credentials, and the GitLab API together: the
//! registry of signed-in accounts, the controller that runs login
//! attempts as background jobs, and the service container a UI embeds.

pub mod controller;
pub mod error;
pub mod registry;
pub mod services;

pub use controller::{RedirectDisposition, SessionController, SessionEvent};
pub use error::SessionError;
pub use registry::{session_id_for, Account, SessionRegistry};
pub use services::SessionServices;
