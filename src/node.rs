//! Indexed node tree built from the node table.
//!
//! Parent links are resolved to indices once, up front, so the ancestor walk
//! used by the effect composer is a bounds-checked loop over small integers
//! instead of repeated name lookups.

use std::collections::HashMap;

use crate::tables::NodeRow;
use crate::SimError;

#[derive(Debug, Clone)]
pub struct NodeTree {
    names: Vec<String>,
    parent: Vec<Option<usize>>,
    index: HashMap<String, usize>,
}

impl NodeTree {
    /// Build and validate the tree: unique names, existing parents, exactly
    /// one root, no cycles. A parent with a single child is legal but almost
    /// always a configuration mistake (it would refit the same location
    /// twice downstream), so it is warned about.
    pub fn from_rows(rows: &[NodeRow]) -> Result<Self, SimError> {
        const TABLE: &str = "node";

        let mut names = Vec::with_capacity(rows.len());
        let mut index = HashMap::with_capacity(rows.len());
        for (i, row) in rows.iter().enumerate() {
            if index.insert(row.node_name.clone(), i).is_some() {
                return Err(SimError::TableRow {
                    table: TABLE,
                    row: i + 1,
                    message: format!("node_name {} appears twice", row.node_name),
                });
            }
            names.push(row.node_name.clone());
        }

        let mut parent = Vec::with_capacity(rows.len());
        let mut child_count = vec![0_usize; rows.len()];
        let mut root_count = 0_usize;
        for (i, row) in rows.iter().enumerate() {
            if row.parent_name.is_empty() {
                parent.push(None);
                root_count += 1;
                continue;
            }
            let p = *index.get(&row.parent_name).ok_or_else(|| SimError::TableRow {
                table: TABLE,
                row: i + 1,
                message: format!("parent_name {} is not a valid node_name", row.parent_name),
            })?;
            parent.push(Some(p));
            child_count[p] += 1;
        }

        if root_count != 1 {
            return Err(SimError::Table {
                table: TABLE,
                message: format!(
                    "expected exactly one node with an empty parent_name, found {root_count}"
                ),
            });
        }

        for (i, &count) in child_count.iter().enumerate() {
            if count == 1 {
                log::warn!("node.csv: the parent {} has only one child", names[i]);
            }
        }

        // every node has at most one parent, so a cycle is the only way a
        // walk can exceed the node count
        for start in 0..parent.len() {
            let mut steps = 0;
            let mut at = start;
            while let Some(p) = parent[at] {
                at = p;
                steps += 1;
                if steps > parent.len() {
                    return Err(SimError::Table {
                        table: TABLE,
                        message: format!("the parent links of {} form a cycle", names[start]),
                    });
                }
            }
        }

        Ok(NodeTree {
            names,
            parent,
            index,
        })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn name(&self, id: usize) -> &str {
        &self.names[id]
    }

    pub fn id(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn parent(&self, id: usize) -> Option<usize> {
        self.parent[id]
    }

    /// The node itself followed by its strict ancestors, root included.
    pub fn lineage(&self, id: usize) -> impl Iterator<Item = usize> + '_ {
        std::iter::successors(Some(id), move |&at| self.parent(at))
    }
}
