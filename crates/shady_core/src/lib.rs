pub mod backup;
pub mod cancel;
pub mod container;
pub mod core_api;
pub mod document;
pub mod marketeer;
pub mod pipeline;
