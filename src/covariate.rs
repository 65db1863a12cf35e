//! Per-(node, sex) covariate surfaces and reference averages.
//!
//! Every (node, sex) group of the covariate table must be its own
//! rectangular age x time grid; one surface is built per covariate plus one
//! for omega. The reference average of a covariate for a (node, sex) pair is
//! the plain mean over that pair's sample rows, and is what covariate
//! effects are centered against.

use crate::node::NodeTree;
use crate::surface::{build_surfaces, SamplePoint, Surface};
use crate::tables::{CovariateAvgRow, CovariateTable, Sex};
use crate::SimError;

const TABLE: &str = "covariate";

/// Sexes that can carry covariate data, in output order.
const SEXES: [Sex; 2] = [Sex::Female, Sex::Male];

fn sex_slot(sex: Sex) -> Option<usize> {
    match sex {
        Sex::Female => Some(0),
        Sex::Male => Some(1),
        Sex::Both => None,
    }
}

/// The interpolants for one (node, sex) pair.
#[derive(Debug, Clone)]
pub struct NodeSexSurfaces {
    pub omega: Surface,
    /// Aligned with the covariate name list.
    pub covariates: Vec<Surface>,
}

#[derive(Debug, Clone)]
pub struct CovariateData {
    names: Vec<String>,
    // both indexed [node id][sex slot]
    surfaces: Vec<[Option<NodeSexSurfaces>; 2]>,
    averages: Vec<[Option<Vec<f64>>; 2]>,
}

impl CovariateData {
    pub fn build(table: &CovariateTable, tree: &NodeTree) -> Result<Self, SimError> {
        let n_cov = table.covariate_names.len();

        // group rows by (node, sex), keeping table order within a group
        let mut groups: Vec<[Vec<SamplePoint>; 2]> = (0..tree.len()).map(|_| [vec![], vec![]]).collect();
        for (index, row) in table.rows.iter().enumerate() {
            let node = tree.id(&row.node_name).ok_or_else(|| SimError::TableRow {
                table: TABLE,
                row: index + 1,
                message: format!("node_name {} is not in node.csv", row.node_name),
            })?;
            // read_covariate_table already rejected sex = both
            let slot = sex_slot(row.sex).unwrap_or(0);
            let mut z = Vec::with_capacity(n_cov + 1);
            z.push(row.omega);
            z.extend_from_slice(&row.covariates);
            groups[node][slot].push(SamplePoint {
                x: row.age,
                y: row.time,
                z,
            });
        }

        let mut surfaces: Vec<[Option<NodeSexSurfaces>; 2]> =
            (0..tree.len()).map(|_| [None, None]).collect();
        let mut averages: Vec<[Option<Vec<f64>>; 2]> = vec![[None, None]; tree.len()];

        for (node, by_sex) in groups.iter().enumerate() {
            for (slot, points) in by_sex.iter().enumerate() {
                if points.is_empty() {
                    continue;
                }
                let (_, _, mut built) =
                    build_surfaces(points, n_cov + 1).map_err(|e| SimError::NonRectangular {
                        table: TABLE,
                        group: format!(
                            "node_name = {}, sex = {}",
                            tree.name(node),
                            SEXES[slot].as_str()
                        ),
                        x_name: "age",
                        y_name: "time",
                        x_grid: e.x_grid,
                        y_grid: e.y_grid,
                    })?;

                let omega = built.remove(0);
                surfaces[node][slot] = Some(NodeSexSurfaces {
                    omega,
                    covariates: built,
                });

                let count = points.len() as f64;
                let means: Vec<f64> = (0..n_cov)
                    .map(|k| points.iter().map(|p| p.z[k + 1]).sum::<f64>() / count)
                    .collect();
                averages[node][slot] = Some(means);
            }
        }

        // within a sex, every node with covariate data must contribute the
        // same number of rows, else the averages are not comparable
        for (slot, sex) in SEXES.iter().enumerate() {
            let mut previous: Option<(usize, usize)> = None;
            for (node, by_sex) in groups.iter().enumerate() {
                let count = by_sex[slot].len();
                if count == 0 {
                    continue;
                }
                if let Some((prev_node, prev_count)) = previous {
                    if count != prev_count {
                        return Err(SimError::Table {
                            table: TABLE,
                            message: format!(
                                "number of covariate rows depends on node\n\
                                 sex = {}, node_name = {}, count = {}\n\
                                 sex = {}, node_name = {}, count = {}",
                                sex.as_str(),
                                tree.name(node),
                                count,
                                sex.as_str(),
                                tree.name(prev_node),
                                prev_count,
                            ),
                        });
                    }
                }
                previous = Some((node, count));
            }
        }

        Ok(CovariateData {
            names: table.covariate_names.clone(),
            surfaces,
            averages,
        })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn surfaces(&self, node: usize, sex: Sex) -> Option<&NodeSexSurfaces> {
        let slot = sex_slot(sex)?;
        self.surfaces[node][slot].as_ref()
    }

    pub fn averages(&self, node: usize, sex: Sex) -> Option<&[f64]> {
        let slot = sex_slot(sex)?;
        self.averages[node][slot].as_deref()
    }

    /// Rows of the covariate-average output table, in (sex, node id) order.
    pub fn average_rows(&self, tree: &NodeTree) -> Vec<CovariateAvgRow> {
        let mut rows = Vec::new();
        for (slot, sex) in SEXES.iter().enumerate() {
            for node in 0..tree.len() {
                if let Some(means) = self.averages[node][slot].as_ref() {
                    rows.push(CovariateAvgRow {
                        node_name: tree.name(node).to_string(),
                        sex: *sex,
                        averages: means.clone(),
                    });
                }
            }
        }
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::CovariateData;
    use crate::node::NodeTree;
    use crate::tables::{CovariateRow, CovariateTable, NodeRow, Sex};

    fn tree() -> NodeTree {
        let rows = vec![
            NodeRow {
                node_name: "n0".to_string(),
                parent_name: String::new(),
            },
            NodeRow {
                node_name: "n1".to_string(),
                parent_name: "n0".to_string(),
            },
            NodeRow {
                node_name: "n2".to_string(),
                parent_name: "n0".to_string(),
            },
        ];
        NodeTree::from_rows(&rows).unwrap()
    }

    fn cov_row(node: &str, sex: Sex, age: f64, time: f64, haqi: f64) -> CovariateRow {
        CovariateRow {
            node_name: node.to_string(),
            sex,
            age,
            time,
            omega: 0.02,
            covariates: vec![haqi],
        }
    }

    fn table_for(rows: Vec<CovariateRow>) -> CovariateTable {
        CovariateTable {
            covariate_names: vec!["haqi".to_string()],
            rows,
        }
    }

    #[test]
    fn averages_are_per_node_and_sex() {
        let rows = vec![
            cov_row("n1", Sex::Female, 0.0, 2000.0, 0.2),
            cov_row("n1", Sex::Female, 50.0, 2000.0, 0.4),
            cov_row("n2", Sex::Female, 0.0, 2000.0, 1.0),
            cov_row("n2", Sex::Female, 50.0, 2000.0, 2.0),
        ];
        let data = CovariateData::build(&table_for(rows), &tree()).unwrap();
        let n1 = tree().id("n1").unwrap();
        let n2 = tree().id("n2").unwrap();
        assert!((data.averages(n1, Sex::Female).unwrap()[0] - 0.3).abs() < 1e-12);
        assert!((data.averages(n2, Sex::Female).unwrap()[0] - 1.5).abs() < 1e-12);
        assert!(data.averages(n1, Sex::Male).is_none());
    }

    #[test]
    fn covariate_surfaces_interpolate_over_age() {
        let rows = vec![
            cov_row("n1", Sex::Female, 0.0, 2000.0, 0.2),
            cov_row("n1", Sex::Female, 50.0, 2000.0, 0.4),
        ];
        let data = CovariateData::build(&table_for(rows), &tree()).unwrap();
        let surfaces = data.surfaces(1, Sex::Female).unwrap();
        assert!((surfaces.covariates[0].eval(25.0, 2000.0) - 0.3).abs() < 1e-12);
        assert_eq!(surfaces.omega.eval(25.0, 2000.0), 0.02);
    }

    #[test]
    fn rejects_uneven_row_counts_within_a_sex() {
        let rows = vec![
            cov_row("n1", Sex::Female, 0.0, 2000.0, 0.2),
            cov_row("n1", Sex::Female, 50.0, 2000.0, 0.4),
            cov_row("n2", Sex::Female, 0.0, 2000.0, 1.0),
        ];
        let err = CovariateData::build(&table_for(rows), &tree()).unwrap_err();
        assert!(err.to_string().contains("depends on node"));
    }

    #[test]
    fn rejects_an_unknown_node() {
        let rows = vec![cov_row("n9", Sex::Female, 0.0, 2000.0, 0.2)];
        assert!(CovariateData::build(&table_for(rows), &tree()).is_err());
    }

    #[test]
    fn rejects_a_non_rectangular_group() {
        let rows = vec![
            cov_row("n1", Sex::Female, 0.0, 1990.0, 0.2),
            cov_row("n1", Sex::Female, 0.0, 2000.0, 0.2),
            cov_row("n1", Sex::Female, 50.0, 1990.0, 0.4),
        ];
        let err = CovariateData::build(&table_for(rows), &tree()).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("rectangular"));
        assert!(message.contains("n1"));
    }

    #[test]
    fn average_rows_come_out_in_sex_then_node_order() {
        let rows = vec![
            cov_row("n2", Sex::Male, 0.0, 2000.0, 0.5),
            cov_row("n1", Sex::Female, 0.0, 2000.0, 0.2),
            cov_row("n2", Sex::Female, 0.0, 2000.0, 1.0),
            cov_row("n1", Sex::Male, 0.0, 2000.0, 0.6),
        ];
        let tree = tree();
        let data = CovariateData::build(&table_for(rows), &tree).unwrap();
        let out = data.average_rows(&tree);
        let keys: Vec<(String, Sex)> = out
            .iter()
            .map(|r| (r.node_name.clone(), r.sex))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("n1".to_string(), Sex::Female),
                ("n2".to_string(), Sex::Female),
                ("n1".to_string(), Sex::Male),
                ("n2".to_string(), Sex::Male),
            ]
        );
    }
}
