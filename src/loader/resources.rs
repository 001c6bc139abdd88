//! Loads the resource catalog (the CLI's `<resources.xml>` argument) —
//! here a flat JSON array of resource ids, standing in for
//! the out-of-scope XML resource-profile parser, same as
//! [`crate::model::RaPstFixture`] stands in for the process parser.

use std::collections::BTreeSet;

use crate::loader::parser::parse_json_file;
use crate::model::ResourceId;
use crate::error::Result;

pub fn load_resource_catalog(path: &str) -> Result<BTreeSet<ResourceId>> {
    let ids: Vec<String> = parse_json_file(path)?;
    Ok(ids.into_iter().map(ResourceId::new).collect())
}
