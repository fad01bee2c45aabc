pub mod metadata;
pub mod walker;

pub use metadata::{ExtraRegisters, GcMetadata, GcMetadataTable, IncomingArguments};
