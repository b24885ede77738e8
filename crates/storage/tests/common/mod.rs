pub mod fixtures;

#[allow(unused_imports)]
pub use fixtures::{blob_store, seeded_bytes, stream_of};
