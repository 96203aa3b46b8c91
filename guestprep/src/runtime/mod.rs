//! Shared configuration, layout and collaborators.

pub mod constants;
pub mod context;
pub mod layout;
pub mod options;

pub use context::PrepContext;
pub use layout::FilesystemLayout;
pub use options::PrepOptions;
