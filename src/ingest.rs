use std::path::Path;

use serde::de::DeserializeOwned;

use crate::models::{AttendanceRow, IntakeRow, SaleRow};
use crate::pipeline::PipelineError;

fn load_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, PipelineError> {
    let file = std::fs::File::open(path)?;
    let mut reader = csv::Reader::from_reader(file);
    let mut rows = Vec::new();
    for result in reader.deserialize::<T>() {
        rows.push(result?);
    }
    Ok(rows)
}

pub fn load_intake(path: &Path) -> Result<Vec<IntakeRow>, PipelineError> {
    load_rows(path)
}

pub fn load_attendance(path: &Path) -> Result<Vec<AttendanceRow>, PipelineError> {
    load_rows(path)
}

pub fn load_sales(path: &Path) -> Result<Vec<SaleRow>, PipelineError> {
    load_rows(path)
}
