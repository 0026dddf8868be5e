//! MEDLINE flat-file records: tags, the streaming parser and the
//! post-parse field derivations.

pub mod date;
pub mod derive;
pub mod parser;
pub mod pool;
pub mod record;
pub mod tags;

pub use parser::{ParseError, RecordParser};
pub use pool::RecordPool;
pub use record::Record;
