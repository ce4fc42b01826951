pub mod reader;

pub use reader::parse_module;
