//! Adapters for the external publishing surfaces.
//!
//! One adapter per platform, each implementing the `Publisher` capability.
//! Credentials are injected at construction (loaded from the environment in
//! the composition root), never read inside pipeline logic.

pub mod blog;
pub mod social_image;
pub mod social_video;

pub use blog::{BlogCredentials, BlogPublisher};
pub use social_image::{SocialImageCredentials, SocialImagePublisher};
pub use social_video::{SocialVideoCredentials, SocialVideoPublisher};
