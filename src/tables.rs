//! Typed rows and CSV I/O for the input and output tables.
//!
//! Fixed-schema tables deserialize through serde; the covariate table has a
//! caller-defined set of covariate columns and is read through its header
//! instead. All readers and writers are keyed off the simulation directory,
//! one file per table.

use std::fs::File;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, Writer};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::SimError;

/// Sex vocabulary of the input tables. `Both` is valid in the simulate
/// table only; the covariate table must be sex-specific.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sex {
    Female,
    Male,
    Both,
}

impl Sex {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "female" => Some(Sex::Female),
            "male" => Some(Sex::Male),
            "both" => Some(Sex::Both),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Sex::Female => "female",
            Sex::Male => "male",
            Sex::Both => "both",
        }
    }
}

/// The four modeled rates. Rates absent from the no-effect-rate table are
/// identically zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rate {
    Pini,
    Iota,
    Rho,
    Chi,
}

impl Rate {
    pub const ALL: [Rate; 4] = [Rate::Pini, Rate::Iota, Rate::Rho, Rate::Chi];

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pini" => Some(Rate::Pini),
            "iota" => Some(Rate::Iota),
            "rho" => Some(Rate::Rho),
            "chi" => Some(Rate::Chi),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Rate::Pini => "pini",
            Rate::Iota => "iota",
            Rate::Rho => "rho",
            Rate::Chi => "chi",
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OptionRow {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeRow {
    pub node_name: String,
    pub parent_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateTruthRow {
    pub rate_name: String,
    pub age: f64,
    pub time: f64,
    pub rate_truth: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MultiplierRow {
    pub multiplier_id: usize,
    pub rate_name: String,
    pub covariate_or_sex: String,
    pub multiplier_truth: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimulateRow {
    pub simulate_id: usize,
    pub integrand_name: String,
    pub node_name: String,
    pub sex: String,
    pub age_lower: f64,
    pub age_upper: f64,
    pub time_lower: f64,
    pub time_upper: f64,
    pub percent_cv: f64,
}

/// One row of the covariate table with its dynamic columns resolved:
/// omega first, then one value per covariate name.
#[derive(Debug, Clone)]
pub struct CovariateRow {
    pub node_name: String,
    pub sex: Sex,
    pub age: f64,
    pub time: f64,
    pub omega: f64,
    pub covariates: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct CovariateTable {
    pub covariate_names: Vec<String>,
    pub rows: Vec<CovariateRow>,
}

/// Validated option table.
#[derive(Debug, Clone)]
pub struct Options {
    pub std_random_effects: f64,
    pub integrand_step_size: f64,
    pub random_seed: Option<u64>,
}

impl Options {
    pub fn from_rows(rows: &[OptionRow]) -> Result<Self, SimError> {
        const VALID: [&str; 3] = ["std_random_effects", "integrand_step_size", "random_seed"];

        let mut std_random_effects = None;
        let mut integrand_step_size = None;
        let mut random_seed = None;

        for (index, row) in rows.iter().enumerate() {
            let line = index + 1;
            if !VALID.contains(&row.name.as_str()) {
                return Err(SimError::InvalidOption(format!(
                    "row {line}: {} is not a valid option name",
                    row.name
                )));
            }
            let slot = match row.name.as_str() {
                "std_random_effects" => &mut std_random_effects,
                "integrand_step_size" => &mut integrand_step_size,
                _ => &mut random_seed,
            };
            if slot.is_some() {
                return Err(SimError::InvalidOption(format!(
                    "row {line}: the name {} appears twice",
                    row.name
                )));
            }
            *slot = Some(row.value.clone());
        }

        let positive = |name: &str, value: Option<String>| -> Result<f64, SimError> {
            let raw = value
                .ok_or_else(|| SimError::InvalidOption(format!("the name {name} does not appear")))?;
            let parsed: f64 = raw
                .trim()
                .parse()
                .map_err(|_| SimError::InvalidOption(format!("{name} = {raw} is not a number")))?;
            if parsed <= 0.0 {
                return Err(SimError::InvalidOption(format!("{name} = {parsed} <= 0")));
            }
            Ok(parsed)
        };

        let random_seed = match random_seed {
            None => None,
            Some(raw) => Some(raw.trim().parse().map_err(|_| {
                SimError::InvalidOption(format!("random_seed = {raw} is not an integer"))
            })?),
        };

        Ok(Options {
            std_random_effects: positive("std_random_effects", std_random_effects)?,
            integrand_step_size: positive("integrand_step_size", integrand_step_size)?,
            random_seed,
        })
    }
}

fn table_path(dir: &Path, table: &str) -> PathBuf {
    dir.join(format!("{table}.csv"))
}

fn read_rows<T: DeserializeOwned>(dir: &Path, table: &'static str) -> Result<Vec<T>, SimError> {
    let path = table_path(dir, table);
    let file = File::open(&path).map_err(|e| SimError::Table {
        table,
        message: format!("cannot open {}: {e}", path.display()),
    })?;
    let mut reader = ReaderBuilder::new().from_reader(file);
    let mut rows = Vec::new();
    for (index, record) in reader.deserialize().enumerate() {
        let row: T = record.map_err(|e| SimError::TableRow {
            table,
            row: index + 1,
            message: e.to_string(),
        })?;
        rows.push(row);
    }
    Ok(rows)
}

pub fn read_option_table(dir: &Path) -> Result<Vec<OptionRow>, SimError> {
    read_rows(dir, "option")
}

pub fn read_node_table(dir: &Path) -> Result<Vec<NodeRow>, SimError> {
    read_rows(dir, "node")
}

pub fn read_rate_table(dir: &Path) -> Result<Vec<RateTruthRow>, SimError> {
    read_rows(dir, "no_effect_rate")
}

pub fn read_multiplier_table(dir: &Path) -> Result<Vec<MultiplierRow>, SimError> {
    read_rows(dir, "multiplier_sim")
}

pub fn read_simulate_table(dir: &Path) -> Result<Vec<SimulateRow>, SimError> {
    read_rows(dir, "simulate")
}

pub fn read_covariate_table(dir: &Path) -> Result<CovariateTable, SimError> {
    const TABLE: &str = "covariate";
    const FIXED: [&str; 5] = ["node_name", "sex", "age", "time", "omega"];

    let path = table_path(dir, TABLE);
    let file = File::open(&path).map_err(|e| SimError::Table {
        table: TABLE,
        message: format!("cannot open {}: {e}", path.display()),
    })?;
    let mut reader = ReaderBuilder::new().from_reader(file);

    let headers = reader.headers()?.clone();
    let column = |name: &str| -> Result<usize, SimError> {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| SimError::Table {
                table: TABLE,
                message: format!("missing required column {name}"),
            })
    };
    let node_col = column("node_name")?;
    let sex_col = column("sex")?;
    let age_col = column("age")?;
    let time_col = column("time")?;
    let omega_col = column("omega")?;

    // every remaining column is a covariate, in header order
    let covariate_cols: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .filter(|(_, h)| !FIXED.contains(h))
        .map(|(i, h)| (i, h.to_string()))
        .collect();

    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record?;
        let row = index + 1;
        let field = |col: usize| record.get(col).unwrap_or("").trim();
        let float = |col: usize| -> Result<f64, SimError> {
            field(col).parse().map_err(|_| SimError::TableRow {
                table: TABLE,
                row,
                message: format!("{} is not a number", field(col)),
            })
        };

        let sex_raw = field(sex_col);
        let sex = match Sex::parse(sex_raw) {
            Some(Sex::Both) | None => {
                return Err(SimError::TableRow {
                    table: TABLE,
                    row,
                    message: format!("sex = {sex_raw} is not male or female"),
                })
            }
            Some(sex) => sex,
        };

        let covariates = covariate_cols
            .iter()
            .map(|(col, _)| float(*col))
            .collect::<Result<Vec<f64>, SimError>>()?;

        rows.push(CovariateRow {
            node_name: field(node_col).to_string(),
            sex,
            age: float(age_col)?,
            time: float(time_col)?,
            omega: float(omega_col)?,
            covariates,
        });
    }

    Ok(CovariateTable {
        covariate_names: covariate_cols.into_iter().map(|(_, name)| name).collect(),
        rows,
    })
}

fn fmt_f64(value: f64) -> String {
    format!("{value:.10}")
}

pub fn write_option_table(dir: &Path, rows: &[OptionRow]) -> Result<(), SimError> {
    let mut writer = Writer::from_path(table_path(dir, "option"))?;
    writer.write_record(["name", "value"])?;
    for row in rows {
        writer.write_record([row.name.as_str(), row.value.as_str()])?;
    }
    writer.flush()?;
    Ok(())
}

/// One row of the simulated-data output table.
#[derive(Debug, Clone)]
pub struct DataRow {
    pub simulate_id: usize,
    pub meas_mean: f64,
    pub meas_value: f64,
    pub meas_std: f64,
    /// Midpoint covariate values, aligned with the covariate name list.
    pub covariates: Vec<f64>,
}

pub fn write_data_table(
    dir: &Path,
    covariate_names: &[String],
    rows: &[DataRow],
) -> Result<(), SimError> {
    let mut writer = Writer::from_path(table_path(dir, "data_sim"))?;

    let mut header = vec![
        "simulate_id".to_string(),
        "meas_mean".to_string(),
        "meas_value".to_string(),
        "meas_std".to_string(),
    ];
    header.extend(covariate_names.iter().cloned());
    writer.write_record(&header)?;

    for row in rows {
        let mut record = vec![
            row.simulate_id.to_string(),
            fmt_f64(row.meas_mean),
            fmt_f64(row.meas_value),
            fmt_f64(row.meas_std),
        ];
        record.extend(row.covariates.iter().map(|&v| fmt_f64(v)));
        writer.write_record(&record)?;
    }

    writer.flush()?;
    Ok(())
}

/// One row of the covariate-average output table.
#[derive(Debug, Clone)]
pub struct CovariateAvgRow {
    pub node_name: String,
    pub sex: Sex,
    pub averages: Vec<f64>,
}

pub fn write_covariate_avg_table(
    dir: &Path,
    covariate_names: &[String],
    rows: &[CovariateAvgRow],
) -> Result<(), SimError> {
    let mut writer = Writer::from_path(table_path(dir, "covariate_avg"))?;

    let mut header = vec!["node_name".to_string(), "sex".to_string()];
    header.extend(covariate_names.iter().cloned());
    writer.write_record(&header)?;

    for row in rows {
        let mut record = vec![row.node_name.clone(), row.sex.as_str().to_string()];
        record.extend(row.averages.iter().map(|&v| fmt_f64(v)));
        writer.write_record(&record)?;
    }

    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{OptionRow, Options};

    fn option(name: &str, value: &str) -> OptionRow {
        OptionRow {
            name: name.to_string(),
            value: value.to_string(),
        }
    }

    #[test]
    fn parses_a_complete_option_table() {
        let rows = vec![
            option("std_random_effects", "0.2"),
            option("integrand_step_size", "5.0"),
            option("random_seed", "12345"),
        ];
        let options = Options::from_rows(&rows).unwrap();
        assert_eq!(options.std_random_effects, 0.2);
        assert_eq!(options.integrand_step_size, 5.0);
        assert_eq!(options.random_seed, Some(12345));
    }

    #[test]
    fn random_seed_is_optional() {
        let rows = vec![
            option("std_random_effects", "0.2"),
            option("integrand_step_size", "5.0"),
        ];
        assert_eq!(Options::from_rows(&rows).unwrap().random_seed, None);
    }

    #[test]
    fn rejects_duplicate_option_names() {
        let rows = vec![
            option("std_random_effects", "0.2"),
            option("std_random_effects", "0.3"),
            option("integrand_step_size", "5.0"),
        ];
        assert!(Options::from_rows(&rows).is_err());
    }

    #[test]
    fn rejects_unknown_option_names() {
        let rows = vec![option("step_size", "5.0")];
        assert!(Options::from_rows(&rows).is_err());
    }

    #[test]
    fn rejects_non_positive_step_size() {
        let rows = vec![
            option("std_random_effects", "0.2"),
            option("integrand_step_size", "0.0"),
        ];
        assert!(Options::from_rows(&rows).is_err());
    }
}
