//! Derived relationship views returned by the engine

use serde::{Deserialize, Serialize};

use crate::family::Union;
use crate::id::{IndividualId, UnionId};
use crate::individual::Individual;

/// Resolved parents of an individual
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Parents {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub father: Option<Individual>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mother: Option<Individual>,
}

impl Parents {
    pub fn is_empty(&self) -> bool {
        self.father.is_none() && self.mother.is_none()
    }

    /// Father then mother, skipping unknown ones
    pub fn into_vec(self) -> Vec<Individual> {
        self.father.into_iter().chain(self.mother).collect()
    }
}

/// The other party of a union, annotated with that union's order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spouse {
    pub individual: Individual,
    pub union_id: UnionId,
    pub marriage_order: u32,
}

/// One node of a materialized family tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeNode {
    pub individual: Individual,

    /// First spouse by marriage order
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spouse: Option<Individual>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parents: Vec<Individual>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    pub fn leaf(individual: Individual) -> Self {
        Self {
            individual,
            spouse: None,
            parents: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Number of nodes in this subtree, including itself
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(TreeNode::size).sum::<usize>()
    }

    /// Deepest child level below this node (0 for a leaf)
    pub fn depth(&self) -> u32 {
        self.children
            .iter()
            .map(|c| c.depth() + 1)
            .max()
            .unwrap_or(0)
    }

    pub fn find(&self, id: IndividualId) -> Option<&TreeNode> {
        if self.individual.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(id))
    }
}

/// A materialized tree together with the generation count it was built for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilyTree {
    pub generations: u32,
    pub root: TreeNode,
}

/// One page of search results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

impl<T> Page<T> {
    /// Slice one page out of a full match list
    pub fn from_matches(matches: Vec<T>, limit: usize, offset: usize) -> Self {
        let total = matches.len();
        let items = matches.into_iter().skip(offset).take(limit).collect();
        Self {
            items,
            total,
            limit,
            offset,
        }
    }
}

/// A sibling whose re-parenting failed during `add_parent`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReparentFailure {
    pub individual_id: IndividualId,
    pub full_name: String,
    pub reason: String,
}

/// Outcome of adding a missing parent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddParentOutcome {
    /// The newly created parent
    pub parent: Individual,

    /// Individuals now pointing at the new parent, the requested child first
    pub reparented: Vec<IndividualId>,

    /// Siblings that could not be updated; already-applied updates are kept
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<ReparentFailure>,

    /// Union between the two known parents, if both are known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub union: Option<Union>,

    /// Why the parents' union could not be ensured, if it could not
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub union_error: Option<String>,
}

impl AddParentOutcome {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.union_error.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::individual::{Gender, NewIndividual};

    fn person(id: i64) -> Individual {
        Individual::from_draft(IndividualId(id), &NewIndividual::new(format!("P{}", id), Gender::Unknown))
    }

    #[test]
    fn test_tree_size_and_depth() {
        let mut root = TreeNode::leaf(person(1));
        let mut child = TreeNode::leaf(person(2));
        child.children.push(TreeNode::leaf(person(3)));
        root.children.push(child);
        root.children.push(TreeNode::leaf(person(4)));

        assert_eq!(root.size(), 4);
        assert_eq!(root.depth(), 2);
        assert!(root.find(IndividualId(3)).is_some());
        assert!(root.find(IndividualId(9)).is_none());
    }

    #[test]
    fn test_page_slicing() {
        let page = Page::from_matches((1..=25).collect::<Vec<_>>(), 10, 20);
        assert_eq!(page.items, vec![21, 22, 23, 24, 25]);
        assert_eq!(page.total, 25);

        let empty = Page::from_matches(vec![1, 2], 10, 5);
        assert!(empty.items.is_empty());
        assert_eq!(empty.total, 2);
    }
}
