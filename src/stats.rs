use std::path::Path;

use crate::domain::Cost;
use crate::error::Result;

/// One recorded incumbent improvement.
#[derive(Debug, Clone)]
pub struct DataPoint {
    pub iteration: usize,
    pub elapsed_secs: f64,
    pub cost: Cost,
    pub num_feasible: usize,
    pub num_infeasible: usize,
}

/// Runtime statistics: a row per new best solution, exportable as CSV.
#[derive(Debug, Default)]
pub struct Statistics {
    points: Vec<DataPoint>,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, point: DataPoint) {
        self.points.push(point);
    }

    pub fn points(&self) -> &[DataPoint] {
        &self.points
    }

    pub fn write_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        let io_err = |err: csv::Error| std::io::Error::new(std::io::ErrorKind::Other, err);
        let mut writer = csv::Writer::from_path(path).map_err(io_err)?;

        writer
            .write_record([
                "iteration",
                "elapsed_secs",
                "cost",
                "feasible",
                "infeasible",
            ])
            .map_err(io_err)?;

        for point in &self.points {
            writer
                .write_record([
                    point.iteration.to_string(),
                    point.elapsed_secs.to_string(),
                    point.cost.to_string(),
                    point.num_feasible.to_string(),
                    point.num_infeasible.to_string(),
                ])
                .map_err(io_err)?;
        }

        writer.flush()?;
        Ok(())
    }
}
