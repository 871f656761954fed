pub mod hash;
pub mod local_store;

pub use hash::HashUtils;
pub use local_store::LocalStore;
