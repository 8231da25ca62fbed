// Object store adapters behind `app::ports::ObjectStorePort`

pub mod fs_object_store;
pub mod http_object_store;
pub mod memory_object_store;

pub use fs_object_store::FsObjectStore;
pub use http_object_store::HttpObjectStore;
pub use memory_object_store::InMemoryObjectStore;
