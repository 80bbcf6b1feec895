//! Image references and image identity


mod digest;
mod reference;
mod repository;
mod tag;
mod version;

pub use digest::ContentDigest;
pub use reference::ImageReference;
pub use repository::Repository;
pub use tag::Tag;
pub use version::ImageVersion;
