pub mod service;

pub use service::{ServiceHandle, ServiceStatus, SpecWriterService};
