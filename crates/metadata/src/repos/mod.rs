//! Repository traits for metadata operations.

pub mod dependencies;
pub mod packages;
pub mod resources;
pub mod tags;
pub mod users;

pub use dependencies::DependencyRepo;
pub use packages::PackageRepo;
pub use resources::ResourceRepo;
pub use tags::TagRepo;
pub use users::UserRepo;
