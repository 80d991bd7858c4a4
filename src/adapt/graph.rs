use super::controller::{AdaptivityObserver, StepReport};
#[cfg(feature = "json_export")]
use json::{object, JsonValue};
use log::warn;
use std::fs::{create_dir_all, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// A convergence history: one `(x, y)` point per adaptivity step
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConvergenceGraph {
    points: Vec<(f64, f64)>,
}

impl ConvergenceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_values(&mut self, x: f64, y: f64) {
        self.points.push((x, y));
    }

    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Write the points as whitespace separated `x y` lines
    pub fn save(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let f = File::create(path.as_ref())?;
        let mut w = BufWriter::new(&f);

        for (x, y) in self.points.iter() {
            writeln!(w, "{} {}", x, y)?;
        }

        w.flush()
    }

    #[cfg(feature = "json_export")]
    pub fn to_json(&self) -> JsonValue {
        object! {
            "x": self.points.iter().map(|(x, _)| *x).collect::<Vec<_>>(),
            "y": self.points.iter().map(|(_, y)| *y).collect::<Vec<_>>(),
        }
    }
}

/// Records error against DoFs and wall time, rewriting the graph files after every step
///
/// Files: `conv_dof_est.dat`, `conv_cpu_est.dat`, and (with exact solutions) `conv_dof_exact.dat`, `conv_cpu_exact.dat`.
/// Write failures are logged and otherwise ignored.
#[derive(Clone, Debug)]
pub struct ConvergenceLogger {
    dir: PathBuf,
    pub dof_est: ConvergenceGraph,
    pub cpu_est: ConvergenceGraph,
    pub dof_exact: ConvergenceGraph,
    pub cpu_exact: ConvergenceGraph,
}

impl ConvergenceLogger {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            dof_est: ConvergenceGraph::new(),
            cpu_est: ConvergenceGraph::new(),
            dof_exact: ConvergenceGraph::new(),
            cpu_exact: ConvergenceGraph::new(),
        }
    }

    fn save_all(&self) -> std::io::Result<()> {
        create_dir_all(&self.dir)?;
        self.dof_est.save(self.dir.join("conv_dof_est.dat"))?;
        self.cpu_est.save(self.dir.join("conv_cpu_est.dat"))?;
        if !self.dof_exact.is_empty() {
            self.dof_exact.save(self.dir.join("conv_dof_exact.dat"))?;
            self.cpu_exact.save(self.dir.join("conv_cpu_exact.dat"))?;
        }
        Ok(())
    }
}

impl AdaptivityObserver for ConvergenceLogger {
    fn on_step(&mut self, report: &StepReport) {
        let cpu = report.elapsed.as_secs_f64();
        self.dof_est
            .add_values(report.ndof_coarse as f64, report.error_estimate_percent);
        self.cpu_est.add_values(cpu, report.error_estimate_percent);
        if let Some(exact) = report.exact_error_percent {
            self.dof_exact.add_values(report.ndof_coarse as f64, exact);
            self.cpu_exact.add_values(cpu, exact);
        }

        if let Err(err) = self.save_all() {
            warn!(
                "Failed to write convergence graphs to {}: {}",
                self.dir.display(),
                err
            );
        }
    }
}
