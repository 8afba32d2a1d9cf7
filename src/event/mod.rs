pub mod flatten;
pub mod key;
pub mod parser;

pub use flatten::flatten;
pub use key::extract_dedup_key;
pub use parser::parse_event;
