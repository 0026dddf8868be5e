pub mod ingest;
pub mod inventory;
pub mod parse;
pub mod status;
