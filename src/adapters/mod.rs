// Adapters layer: concrete implementations for external systems (storage, secrets, service APIs)

pub mod arr;
pub mod descriptors;
pub mod patcher;
pub mod qbittorrent;
pub mod secrets;
pub mod storage;
