//! infraflow Container Image Build functionality
//!
//! This crate resolves registry-qualified image references for a stack,
//! packs build contexts, builds images with the Docker API and pushes
//! them to Artifact Registry.

pub mod builder;
pub mod context;
pub mod error;
pub mod image;
pub mod progress;
pub mod pusher;
pub mod version;

pub use builder::ImageBuilder;
pub use context::ContextBuilder;
pub use error::{BuildError, BuildResult};
pub use image::{ImageRef, StackImage, stack_images, validate_tag};
pub use progress::BuildProgress;
pub use pusher::{ImagePusher, artifact_registry_credentials, split_image_tag};
pub use version::{git_short_hash, read_version};
