//! Input loaders: flat JSON stand-ins for the out-of-scope
//! process/resource XML parsers, plus the release-times CSV reader.

pub mod parser;
pub mod process;
pub mod release_times;
pub mod resources;

pub use parser::parse_json_file;
pub use process::{build_instances, load_process_fixture};
pub use release_times::load_release_times;
pub use resources::load_resource_catalog;
