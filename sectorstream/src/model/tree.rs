//! Immutable sector-tree arena with construction-time validation.

use std::collections::{HashMap, HashSet, VecDeque};

use thiserror::Error;

use super::metadata::SectorMetadata;
use super::types::SectorId;

/// Why a sector list does not form a valid tree.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TreeError {
    #[error("duplicate sector id {0}")]
    DuplicateSector(SectorId),
    #[error("sector {sector} references missing parent {parent}")]
    MissingParent { sector: SectorId, parent: SectorId },
    #[error("multiple root sectors: {first} and {second}")]
    MultipleRoots { first: SectorId, second: SectorId },
    #[error("tree with {0} sectors has no root")]
    NoRoot(usize),
    #[error("sector {parent} lists child {child} which is missing or does not point back")]
    InconsistentChild { parent: SectorId, child: SectorId },
    #[error("sector {0} is not reachable from the root")]
    UnreachableSector(SectorId),
}

/// Flat arena of a model's sectors, validated once at build time.
///
/// Iteration order is the insertion order of the input list, which keeps
/// planning passes deterministic.
#[derive(Debug, Clone, PartialEq)]
pub struct SectorTree {
    sectors: HashMap<SectorId, SectorMetadata>,
    order: Vec<SectorId>,
    root: Option<SectorId>,
}

impl SectorTree {
    /// Validate a flat sector list and build the arena.
    ///
    /// An empty list is a valid tree with no root. Otherwise exactly one
    /// sector must lack a parent, every parent reference must resolve,
    /// children lists must agree with parent pointers, and every sector must
    /// be reachable from the root.
    pub fn build(list: Vec<SectorMetadata>) -> Result<Self, TreeError> {
        let mut sectors = HashMap::with_capacity(list.len());
        let mut order = Vec::with_capacity(list.len());
        let mut root = None;

        for sector in list {
            let id = sector.id;
            if sector.parent_id.is_none() {
                match root {
                    None => root = Some(id),
                    Some(first) => {
                        return Err(TreeError::MultipleRoots { first, second: id });
                    }
                }
            }
            if sectors.insert(id, sector).is_some() {
                return Err(TreeError::DuplicateSector(id));
            }
            order.push(id);
        }

        if root.is_none() && !order.is_empty() {
            return Err(TreeError::NoRoot(order.len()));
        }

        for id in &order {
            let sector = &sectors[id];
            if let Some(parent) = sector.parent_id {
                if !sectors.contains_key(&parent) {
                    return Err(TreeError::MissingParent {
                        sector: *id,
                        parent,
                    });
                }
            }
            for child in &sector.children {
                let points_back = sectors
                    .get(child)
                    .is_some_and(|c| c.parent_id == Some(*id));
                if !points_back {
                    return Err(TreeError::InconsistentChild {
                        parent: *id,
                        child: *child,
                    });
                }
            }
        }

        if let Some(root_id) = root {
            let mut visited = HashSet::with_capacity(order.len());
            let mut queue = VecDeque::from([root_id]);
            while let Some(id) = queue.pop_front() {
                if visited.insert(id) {
                    if let Some(sector) = sectors.get(&id) {
                        queue.extend(sector.children.iter().copied());
                    }
                }
            }
            if let Some(missing) = order.iter().find(|id| !visited.contains(id)) {
                return Err(TreeError::UnreachableSector(*missing));
            }
        }

        Ok(Self {
            sectors,
            order,
            root,
        })
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn root_id(&self) -> Option<SectorId> {
        self.root
    }

    pub fn root(&self) -> Option<&SectorMetadata> {
        self.root.and_then(|id| self.sectors.get(&id))
    }

    pub fn get(&self, id: SectorId) -> Option<&SectorMetadata> {
        self.sectors.get(&id)
    }

    pub fn contains(&self, id: SectorId) -> bool {
        self.sectors.contains_key(&id)
    }

    /// Sectors in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &SectorMetadata> {
        self.order.iter().filter_map(|id| self.sectors.get(id))
    }

    /// Sector ids in insertion order.
    pub fn ids(&self) -> impl Iterator<Item = SectorId> + '_ {
        self.order.iter().copied()
    }

    /// Direct children of `id`, in the order the metadata lists them.
    pub fn children_of(&self, id: SectorId) -> impl Iterator<Item = &SectorMetadata> {
        self.sectors
            .get(&id)
            .into_iter()
            .flat_map(|sector| sector.children.iter())
            .filter_map(|child| self.sectors.get(child))
    }

    /// Walk from `id`'s parent up to the root.
    pub fn ancestors(&self, id: SectorId) -> Ancestors<'_> {
        Ancestors {
            tree: self,
            next: self.sectors.get(&id).and_then(|s| s.parent_id),
        }
    }
}

/// Iterator over a sector's ancestors, nearest first.
pub struct Ancestors<'a> {
    tree: &'a SectorTree,
    next: Option<SectorId>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = &'a SectorMetadata;

    fn next(&mut self) -> Option<Self::Item> {
        let sector = self.tree.get(self.next?)?;
        self.next = sector.parent_id;
        Some(sector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::metadata::{CoverageFactors, DetailedFile, SimpleFile};
    use crate::math::Aabb;
    use glam::Vec3;

    fn sector(id: u64, parent: Option<u64>, children: &[u64]) -> SectorMetadata {
        SectorMetadata {
            id: SectorId(id),
            parent_id: parent.map(SectorId),
            children: children.iter().copied().map(SectorId).collect(),
            depth: u32::from(parent.is_some()),
            path: "0/".to_string(),
            bounds: Aabb::new(Vec3::ZERO, Vec3::ONE),
            simple: SimpleFile {
                file_name: format!("sector_{id}.f3d"),
                download_size: 10,
                estimated_draw_calls: 1,
                coverage_factors: CoverageFactors {
                    xy: 0.1,
                    yz: 0.1,
                    xz: 0.1,
                },
            },
            detailed: DetailedFile {
                file_name: format!("sector_{id}.i3d"),
                peripheral_files: Vec::new(),
                download_size: 100,
                estimated_draw_calls: 5,
            },
        }
    }

    #[test]
    fn test_build_valid_tree() {
        let tree = SectorTree::build(vec![
            sector(0, None, &[1, 2]),
            sector(1, Some(0), &[]),
            sector(2, Some(0), &[]),
        ])
        .unwrap();

        assert_eq!(tree.len(), 3);
        assert_eq!(tree.root_id(), Some(SectorId(0)));
        assert!(tree.contains(SectorId(2)));
        let ids: Vec<_> = tree.ids().collect();
        assert_eq!(ids, vec![SectorId(0), SectorId(1), SectorId(2)]);
    }

    #[test]
    fn test_build_empty_tree() {
        let tree = SectorTree::build(Vec::new()).unwrap();
        assert!(tree.is_empty());
        assert_eq!(tree.root_id(), None);
        assert!(tree.root().is_none());
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let err = SectorTree::build(vec![
            sector(0, None, &[1]),
            sector(1, Some(0), &[]),
            sector(1, Some(0), &[]),
        ])
        .unwrap_err();
        assert_eq!(err, TreeError::DuplicateSector(SectorId(1)));
    }

    #[test]
    fn test_missing_parent_rejected() {
        let err =
            SectorTree::build(vec![sector(0, None, &[]), sector(1, Some(99), &[])]).unwrap_err();
        assert_eq!(
            err,
            TreeError::MissingParent {
                sector: SectorId(1),
                parent: SectorId(99),
            }
        );
    }

    #[test]
    fn test_multiple_roots_rejected() {
        let err = SectorTree::build(vec![sector(0, None, &[]), sector(1, None, &[])]).unwrap_err();
        assert_eq!(
            err,
            TreeError::MultipleRoots {
                first: SectorId(0),
                second: SectorId(1),
            }
        );
    }

    #[test]
    fn test_cycle_has_no_root() {
        let err =
            SectorTree::build(vec![sector(0, Some(1), &[]), sector(1, Some(0), &[])]).unwrap_err();
        assert_eq!(err, TreeError::NoRoot(2));
    }

    #[test]
    fn test_inconsistent_child_rejected() {
        // Root lists child 5 which does not exist.
        let err = SectorTree::build(vec![sector(0, None, &[5])]).unwrap_err();
        assert_eq!(
            err,
            TreeError::InconsistentChild {
                parent: SectorId(0),
                child: SectorId(5),
            }
        );
    }

    #[test]
    fn test_unreachable_sector_rejected() {
        // Sector 2 points at the root but the root does not list it.
        let err = SectorTree::build(vec![
            sector(0, None, &[1]),
            sector(1, Some(0), &[]),
            sector(2, Some(0), &[]),
        ])
        .unwrap_err();
        assert_eq!(err, TreeError::UnreachableSector(SectorId(2)));
    }

    #[test]
    fn test_children_of() {
        let tree = SectorTree::build(vec![
            sector(0, None, &[1, 2]),
            sector(1, Some(0), &[]),
            sector(2, Some(0), &[]),
        ])
        .unwrap();
        let children: Vec<_> = tree.children_of(SectorId(0)).map(|s| s.id).collect();
        assert_eq!(children, vec![SectorId(1), SectorId(2)]);
        assert_eq!(tree.children_of(SectorId(1)).count(), 0);
    }

    #[test]
    fn test_ancestors_walk_to_root() {
        let tree = SectorTree::build(vec![
            sector(0, None, &[1]),
            sector(1, Some(0), &[2]),
            sector(2, Some(1), &[]),
        ])
        .unwrap();
        let path: Vec<_> = tree.ancestors(SectorId(2)).map(|s| s.id).collect();
        assert_eq!(path, vec![SectorId(1), SectorId(0)]);
        assert_eq!(tree.ancestors(SectorId(0)).count(), 0);
    }
}
