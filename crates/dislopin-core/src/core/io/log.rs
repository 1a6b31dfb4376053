use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LogParseError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Engine log contains no thermo output")]
    NoThermoData,
    #[error("Engine log contains no minimization statistics")]
    MissingMinimizationStats,
    #[error("Parse error on line {line}: {message}")]
    Parse { line: usize, message: String },
}

/// A block of thermodynamic output, from its `Step ...` header to `Loop time`.
#[derive(Debug, Clone, PartialEq)]
pub struct ThermoTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

impl ThermoTable {
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let index = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(|row| row[index]).collect())
    }

    pub fn last_step(&self) -> Option<u64> {
        self.column("Step")?.last().map(|s| *s as u64)
    }

    /// Writes the table with a header row.
    pub fn write_csv(&self, path: impl AsRef<Path>) -> Result<(), LogParseError> {
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(&self.columns)?;
        for row in &self.rows {
            writer.write_record(row.iter().map(|v| v.to_string()))?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Concatenates consecutive tables that share a header.
    pub fn merge(tables: &[ThermoTable]) -> Option<ThermoTable> {
        let first = tables.first()?;
        let mut merged = ThermoTable {
            columns: first.columns.clone(),
            rows: Vec::new(),
        };
        for table in tables.iter().filter(|t| t.columns == first.columns) {
            merged.rows.extend(table.rows.iter().cloned());
        }
        Some(merged)
    }
}

/// Why the minimizer stopped, as reported in the `Minimization stats` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoppingCriterion {
    EnergyTolerance,
    ForceTolerance,
    MaxIterations,
    MaxForceEvaluations,
    ForcesZero,
    LinesearchAlphaZero,
    QuadraticFactorsZero,
    Other(String),
}

impl StoppingCriterion {
    fn from_log(text: &str) -> Self {
        match text.trim() {
            "energy tolerance" => Self::EnergyTolerance,
            "force tolerance" => Self::ForceTolerance,
            "max iterations" => Self::MaxIterations,
            "max force evaluations" => Self::MaxForceEvaluations,
            "forces are zero" => Self::ForcesZero,
            "linesearch alpha is zero" => Self::LinesearchAlphaZero,
            "quadratic factors are zero" => Self::QuadraticFactorsZero,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for StoppingCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::EnergyTolerance => "energy tolerance",
            Self::ForceTolerance => "force tolerance",
            Self::MaxIterations => "max iterations",
            Self::MaxForceEvaluations => "max force evaluations",
            Self::ForcesZero => "forces are zero",
            Self::LinesearchAlphaZero => "linesearch alpha is zero",
            Self::QuadraticFactorsZero => "quadratic factors are zero",
            Self::Other(text) => text,
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MinimizationStats {
    pub criterion: StoppingCriterion,
    /// Energy at start, next-to-last and final iteration (eV).
    pub energies: [f64; 3],
    pub iterations: u64,
    pub force_evaluations: u64,
}

/// Text of an engine log file with accessors for the blocks the workflows consume.
#[derive(Debug, Clone)]
pub struct EngineLog {
    text: String,
}

impl EngineLog {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn read(path: impl AsRef<Path>) -> Result<Self, LogParseError> {
        Ok(Self::new(fs::read_to_string(path)?))
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Every thermo table in the log, in order of appearance.
    ///
    /// Lines inside a table that do not parse as a full numeric row (warnings printed by the
    /// engine mid-run) are skipped.
    pub fn thermo_tables(&self) -> Vec<ThermoTable> {
        let mut tables = Vec::new();
        let mut current: Option<ThermoTable> = None;
        for line in self.text.lines() {
            let trimmed = line.trim();
            if trimmed.starts_with("Step ") || trimmed == "Step" {
                if let Some(table) = current.take() {
                    tables.push(table);
                }
                current = Some(ThermoTable {
                    columns: trimmed.split_whitespace().map(str::to_string).collect(),
                    rows: Vec::new(),
                });
                continue;
            }
            if current.is_some() && trimmed.starts_with("Loop time") {
                tables.extend(current.take());
                continue;
            }
            let Some(table) = current.as_mut() else {
                continue;
            };
            let values: Option<Vec<f64>> = trimmed
                .split_whitespace()
                .map(|t| t.parse::<f64>().ok())
                .collect();
            if let Some(values) = values.filter(|v| v.len() == table.columns.len()) {
                table.rows.push(values);
            }
        }
        if let Some(table) = current {
            tables.push(table);
        }
        tables
    }

    /// The last complete `Minimization stats` block.
    pub fn minimization_stats(&self) -> Result<MinimizationStats, LogParseError> {
        let lines: Vec<&str> = self.text.lines().collect();
        let start = lines
            .iter()
            .rposition(|l| l.trim_start().starts_with("Minimization stats"))
            .ok_or(LogParseError::MissingMinimizationStats)?;

        let mut criterion = None;
        let mut energies = None;
        let mut counts = None;
        let mut i = start + 1;
        while i < lines.len() {
            let line = lines[i].trim();
            if let Some(rest) = line.strip_prefix("Stopping criterion =") {
                criterion = Some(StoppingCriterion::from_log(rest));
            } else if line.starts_with("Energy initial, next-to-last, final =") {
                let values_line = lines.get(i + 1).copied().unwrap_or_default();
                energies = Some(parse_floats::<3>(values_line, i + 2)?);
                i += 1;
            } else if let Some(rest) = line.strip_prefix("Iterations, force evaluations =") {
                let [iterations, evaluations] = parse_floats::<2>(rest, i + 1)?;
                counts = Some((iterations as u64, evaluations as u64));
                break;
            }
            i += 1;
        }

        match (criterion, energies, counts) {
            (Some(criterion), Some(energies), Some((iterations, force_evaluations))) => {
                Ok(MinimizationStats {
                    criterion,
                    energies,
                    iterations,
                    force_evaluations,
                })
            }
            _ => Err(LogParseError::MissingMinimizationStats),
        }
    }

    /// Lines the engine prefixes with `ERROR`.
    pub fn error_lines(&self) -> Vec<&str> {
        self.text
            .lines()
            .map(str::trim)
            .filter(|l| l.starts_with("ERROR"))
            .collect()
    }

    /// Numeric records emitted by `print "<prefix> key v1 v2 ..."` directives.
    ///
    /// Later records with the same key replace earlier ones.
    pub fn print_records(&self, prefix: &str) -> Result<BTreeMap<String, Vec<f64>>, LogParseError> {
        let mut records = BTreeMap::new();
        for (index, line) in self.text.lines().enumerate() {
            let Some(rest) = line.trim().strip_prefix(prefix) else {
                continue;
            };
            if !rest.starts_with(' ') {
                continue;
            }
            let mut tokens = rest.split_whitespace();
            let Some(key) = tokens.next() else { continue };
            let values = tokens
                .map(|t| {
                    t.parse::<f64>().map_err(|_| LogParseError::Parse {
                        line: index + 1,
                        message: format!("invalid value '{}' in '{}' record", t, key),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            records.insert(key.to_string(), values);
        }
        Ok(records)
    }
}

fn parse_floats<const N: usize>(text: &str, line: usize) -> Result<[f64; N], LogParseError> {
    let error = || LogParseError::Parse {
        line,
        message: format!("expected {} numbers in '{}'", N, text.trim()),
    };
    let values: Vec<f64> = text
        .split_whitespace()
        .map(|t| t.parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|_| error())?;
    values.try_into().map_err(|_| error())
}
