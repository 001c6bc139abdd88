//! Loads the process template (the CLI's `<process.xml>` argument) and
//! expands it into one [`Instance`] per release-times row, each holding
//! its own deep copy of the template's RA-PST — `RaPstFixture::build` is
//! called once per row, so every instance gets an independently keyed
//! arena from the same fixture.

use std::collections::BTreeSet;

use crate::error::Result;
use crate::loader::parser::parse_json_file;
use crate::model::{Instance, InstanceId, RaPstFixture, ResourceId};

pub fn load_process_fixture(path: &str) -> Result<RaPstFixture> {
    parse_json_file(path)
}

/// Builds one [`Instance`] per `(id, release_time)` row, applying
/// `resource_catalog` to each instance's RA-PST.
pub fn build_instances(fixture: &RaPstFixture, resource_catalog: &BTreeSet<ResourceId>, rows: &[(InstanceId, i64)]) -> Result<Vec<Instance>> {
    let mut instances = Vec::with_capacity(rows.len());
    for (id, release_time) in rows {
        let mut ra_pst = fixture.build(id.clone(), *release_time)?;
        ra_pst.set_resource_catalog(resource_catalog.iter().cloned());
        instances.push(Instance::new(id.clone(), *release_time, ra_pst));
    }
    Ok(instances)
}
