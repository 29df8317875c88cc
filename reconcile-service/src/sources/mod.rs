pub mod memory;
pub mod ndjson_file;

pub use memory::VecSource;
pub use ndjson_file::NdjsonFileSource;
