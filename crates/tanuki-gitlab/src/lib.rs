pub mod client;
pub mod error;
pub mod images;
pub mod types;

pub use client::GitlabClient;
pub use error::GitlabError;
pub use images::{request_fetch, ImageMessage, RemoteImageCache};
pub use types::{CurrentUser, Project, User};
