//! Hierarchical group (cgroup) lookup
//!
//! Group ids are advisory metadata attached to each record. A resolver never
//! fails; a task whose group linkage is absent resolves to `0` ("unresolved /
//! root").

use crate::analyzer::TaskInfo;

pub trait GroupResolver {
    fn resolve_group_id(&self, task: &TaskInfo) -> u64;
}

/// Resolver for environments without group information
#[derive(Debug, Clone, Copy, Default)]
pub struct NoGroups;

impl GroupResolver for NoGroups {
    fn resolve_group_id(&self, _task: &TaskInfo) -> u64 {
        0
    }
}

impl<G: GroupResolver + ?Sized> GroupResolver for &G {
    fn resolve_group_id(&self, task: &TaskInfo) -> u64 {
        (**self).resolve_group_id(task)
    }
}
