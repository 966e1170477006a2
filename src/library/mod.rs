pub mod export;
pub mod service;

pub use service::{LibraryService, Resumable, ServiceError, ServiceResult};
