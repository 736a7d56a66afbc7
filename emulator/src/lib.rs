pub mod constants;
pub mod loader;
pub mod runtime;

pub use self::loader::parse_listing;
pub use self::runtime::Machine;
