use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DumpError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Parse error on line {line}: {message}")]
    Parse { line: usize, message: String },
    #[error("Dump frame at timestep {timestep} declares {expected} atoms but lists {found}")]
    CountMismatch {
        timestep: u64,
        expected: usize,
        found: usize,
    },
    #[error("Dump file contains no frames")]
    Empty,
    #[error("Dump frame has no '{0}' column")]
    MissingColumn(String),
}

/// One snapshot of a LAMMPS `custom` dump.
#[derive(Debug, Clone, PartialEq)]
pub struct DumpFrame {
    pub timestep: u64,
    /// `[lo, hi]` per axis as written by the engine (bounding box for triclinic cells).
    pub bounds: [[f64; 2]; 3],
    pub tilt: Option<[f64; 3]>,
    /// Boundary flags as printed after `BOX BOUNDS`, e.g. `["pp", "ff", "pp"]`.
    pub boundary: [String; 3],
    pub columns: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

impl DumpFrame {
    pub fn new(timestep: u64, bounds: [[f64; 2]; 3], columns: &[&str]) -> Self {
        Self {
            timestep,
            bounds,
            tilt: None,
            boundary: ["pp".to_string(), "pp".to_string(), "pp".to_string()],
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// All values of one column, in row order.
    pub fn column(&self, name: &str) -> Result<Vec<f64>, DumpError> {
        let index = self
            .column_index(name)
            .ok_or_else(|| DumpError::MissingColumn(name.to_string()))?;
        Ok(self.rows.iter().map(|row| row[index]).collect())
    }

    pub fn ids(&self) -> Result<Vec<u64>, DumpError> {
        Ok(self.column("id")?.into_iter().map(|v| v as u64).collect())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

struct NumberedLines<R> {
    inner: io::Lines<R>,
    line: usize,
}

impl<R: BufRead> NumberedLines<R> {
    fn next_line(&mut self) -> Result<Option<String>, DumpError> {
        loop {
            match self.inner.next() {
                Some(line) => {
                    self.line += 1;
                    let line = line?;
                    if !line.trim().is_empty() {
                        return Ok(Some(line));
                    }
                }
                None => return Ok(None),
            }
        }
    }

    fn expect_line(&mut self, what: &str) -> Result<String, DumpError> {
        self.next_line()?.ok_or_else(|| DumpError::Parse {
            line: self.line,
            message: format!("unexpected end of file, expected {}", what),
        })
    }

    fn expect_item(&mut self, item: &str) -> Result<String, DumpError> {
        let line = self.expect_line(item)?;
        let rest = line
            .trim()
            .strip_prefix("ITEM:")
            .map(str::trim)
            .filter(|rest| rest.starts_with(item))
            .ok_or_else(|| self.error(format!("expected 'ITEM: {}', found '{}'", item, line.trim())))?;
        Ok(rest[item.len()..].trim().to_string())
    }

    fn error(&self, message: impl Into<String>) -> DumpError {
        DumpError::Parse {
            line: self.line,
            message: message.into(),
        }
    }

    fn parse<T: std::str::FromStr>(&self, token: &str, what: &str) -> Result<T, DumpError> {
        token
            .parse()
            .map_err(|_| self.error(format!("invalid {} '{}'", what, token)))
    }
}

fn read_frame<R: BufRead>(lines: &mut NumberedLines<R>, header: String) -> Result<DumpFrame, DumpError> {
    if header.trim() != "ITEM: TIMESTEP" {
        return Err(lines.error(format!("expected 'ITEM: TIMESTEP', found '{}'", header.trim())));
    }
    let timestep_line = lines.expect_line("timestep")?;
    let timestep: u64 = lines.parse(timestep_line.trim(), "timestep")?;

    lines.expect_item("NUMBER OF ATOMS")?;
    let count_line = lines.expect_line("atom count")?;
    let expected: usize = lines.parse(count_line.trim(), "atom count")?;

    let bounds_spec = lines.expect_item("BOX BOUNDS")?;
    let spec_tokens: Vec<&str> = bounds_spec.split_whitespace().collect();
    let triclinic = spec_tokens.first() == Some(&"xy");
    let flags: Vec<&str> = if triclinic {
        spec_tokens.iter().skip(3).copied().collect()
    } else {
        spec_tokens
    };
    let boundary = match flags[..] {
        [a, b, c] => [a.to_string(), b.to_string(), c.to_string()],
        _ => ["pp".to_string(), "pp".to_string(), "pp".to_string()],
    };

    let mut bounds = [[0.0; 2]; 3];
    let mut tilt = [0.0; 3];
    for (i, slot) in bounds.iter_mut().enumerate() {
        let line = lines.expect_line("box bounds")?;
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let needed = if triclinic { 3 } else { 2 };
        if tokens.len() < needed {
            return Err(lines.error(format!("expected {} box bound values", needed)));
        }
        slot[0] = lines.parse(tokens[0], "box bound")?;
        slot[1] = lines.parse(tokens[1], "box bound")?;
        if triclinic {
            tilt[i] = lines.parse(tokens[2], "tilt factor")?;
        }
    }

    let columns_spec = lines.expect_item("ATOMS")?;
    let columns: Vec<String> = columns_spec.split_whitespace().map(str::to_string).collect();

    let mut rows = Vec::with_capacity(expected);
    for _ in 0..expected {
        let line = match lines.next_line()? {
            Some(line) if !line.starts_with("ITEM:") => line,
            _ => {
                return Err(DumpError::CountMismatch {
                    timestep,
                    expected,
                    found: rows.len(),
                });
            }
        };
        let values = line
            .split_whitespace()
            .map(|token| lines.parse::<f64>(token, "value"))
            .collect::<Result<Vec<_>, _>>()?;
        if values.len() != columns.len() {
            return Err(lines.error(format!(
                "expected {} columns, found {}",
                columns.len(),
                values.len()
            )));
        }
        rows.push(values);
    }

    Ok(DumpFrame {
        timestep,
        bounds,
        tilt: triclinic.then_some(tilt),
        boundary,
        columns,
        rows,
    })
}

/// Reads every frame of a custom dump, in file order.
pub fn read_frames(reader: impl BufRead) -> Result<Vec<DumpFrame>, DumpError> {
    let mut lines = NumberedLines {
        inner: reader.lines(),
        line: 0,
    };
    let mut frames = Vec::new();
    while let Some(header) = lines.next_line()? {
        frames.push(read_frame(&mut lines, header)?);
    }
    Ok(frames)
}

/// Reads the last frame of a dump file; single-snapshot dumps are the common case.
pub fn read_last_frame(path: impl AsRef<Path>) -> Result<DumpFrame, DumpError> {
    let reader = BufReader::new(File::open(path)?);
    read_frames(reader)?.pop().ok_or(DumpError::Empty)
}

pub fn write_frame(frame: &DumpFrame, writer: &mut impl Write) -> Result<(), DumpError> {
    writeln!(writer, "ITEM: TIMESTEP")?;
    writeln!(writer, "{}", frame.timestep)?;
    writeln!(writer, "ITEM: NUMBER OF ATOMS")?;
    writeln!(writer, "{}", frame.rows.len())?;
    let [bx, by, bz] = &frame.boundary;
    match frame.tilt {
        Some(tilt) => {
            writeln!(writer, "ITEM: BOX BOUNDS xy xz yz {} {} {}", bx, by, bz)?;
            for (bound, t) in frame.bounds.iter().zip(tilt) {
                writeln!(writer, "{} {} {}", bound[0], bound[1], t)?;
            }
        }
        None => {
            writeln!(writer, "ITEM: BOX BOUNDS {} {} {}", bx, by, bz)?;
            for bound in &frame.bounds {
                writeln!(writer, "{} {}", bound[0], bound[1])?;
            }
        }
    }
    writeln!(writer, "ITEM: ATOMS {}", frame.columns.join(" "))?;
    for row in &frame.rows {
        let line: Vec<String> = row.iter().map(|v| v.to_string()).collect();
        writeln!(writer, "{}", line.join(" "))?;
    }
    Ok(())
}

/// Replaces the engine's `*` step wildcard in an output file template.
pub fn expand_step_template(template: &str, step: u64) -> String {
    template.replacen('*', &step.to_string(), 1)
}

/// Files named `<prefix><step>` in `dir`, sorted by step.
///
/// Used to locate the periodic trajectory dumps and restart checkpoints the engine writes
/// from a `dump_*` / `restart_*` template.
pub fn list_step_files(dir: impl AsRef<Path>, prefix: &str) -> io::Result<Vec<(u64, PathBuf)>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let Some(step) = name.strip_prefix(prefix) else { continue };
        if let Ok(step) = step.parse::<u64>() {
            files.push((step, entry.path()));
        }
    }
    files.sort_by_key(|(step, _)| *step);
    Ok(files)
}
