/*!
# I/O utilities for sample output

Functions to hand a finished [`SampleOutput`](crate::sampler::SampleOutput)
to downstream analysis tools:

- **CSV** via [`save_csv`] (feature `csv`),
- **Arrow IPC** via [`save_arrow`] (feature `arrow`),
- **Parquet** via [`save_parquet`] (feature `parquet`).

All writers emit one record per stored chain state with the columns
`chain (u32)`, `iteration (u32)` and one `f64` column per flattened
parameter name, the trailing `"acceptance"` and `"lp"` columns included.
Rows before the burnin cutoff are skipped; they were never written by the
sampler.

```rust
use demc::core::RunStatus;
use demc::io::save_csv;
use demc::sampler::SampleOutput;
use ndarray::Array3;

let output = SampleOutput {
    samples: Array3::zeros((4, 3, 2)),
    names: vec!["x".to_string(), "acceptance".to_string(), "lp".to_string()],
    burnin: 2,
    n_initial: 0,
    status: RunStatus::Completed,
};
save_csv(&output, "/tmp/demc_doc_samples.csv")?;
# Ok::<(), Box<dyn std::error::Error>>(())
```
*/

use std::error::Error;
use std::path::Path;

use crate::sampler::SampleOutput;

#[cfg(feature = "csv")]
use csv::Writer;

#[cfg(feature = "arrow")]
use arrow::{
    array::{ArrayRef, Float64Builder, UInt32Builder},
    datatypes::{DataType, Field, Schema},
    record_batch::RecordBatch,
};

#[cfg(feature = "parquet")]
use parquet::{arrow::ArrowWriter, file::properties::WriterProperties};

/// First tensor row worth exporting: everything from the burnin cutoff on.
fn export_start(output: &SampleOutput) -> usize {
    output.burnin.min(output.samples.shape()[0])
}

#[cfg(feature = "csv")]
/// Saves the stored chain states as a CSV file with a header row.
///
/// # Errors
///
/// Returns any underlying I/O or CSV formatting error.
pub fn save_csv<P: AsRef<Path>>(output: &SampleOutput, path: P) -> Result<(), Box<dyn Error>> {
    let mut writer = Writer::from_path(path)?;

    let mut header = vec!["chain".to_string(), "iteration".to_string()];
    header.extend(output.names.iter().cloned());
    writer.write_record(&header)?;

    let rows = output.samples.shape()[0];
    let n_cols = output.names.len();
    for chain in 0..output.n_chains() {
        for row in export_start(output)..rows {
            let mut record = Vec::with_capacity(n_cols + 2);
            record.push(chain.to_string());
            record.push(row.to_string());
            for col in 0..n_cols {
                record.push(output.samples[[row, col, chain]].to_string());
            }
            writer.write_record(&record)?;
        }
    }
    writer.flush()?;
    Ok(())
}

#[cfg(feature = "arrow")]
/// Builds the Arrow record batch shared by the Arrow and Parquet writers.
fn record_batch(output: &SampleOutput) -> Result<RecordBatch, Box<dyn Error>> {
    use std::sync::Arc;

    let mut fields = vec![
        Field::new("chain", DataType::UInt32, false),
        Field::new("iteration", DataType::UInt32, false),
    ];
    for name in &output.names {
        fields.push(Field::new(name.clone(), DataType::Float64, false));
    }
    let schema = Arc::new(Schema::new(fields));

    let rows = output.samples.shape()[0];
    let start = export_start(output);
    let n_records = (rows - start) * output.n_chains();

    let mut chain_builder = UInt32Builder::with_capacity(n_records);
    let mut iter_builder = UInt32Builder::with_capacity(n_records);
    let mut value_builders: Vec<Float64Builder> = output
        .names
        .iter()
        .map(|_| Float64Builder::with_capacity(n_records))
        .collect();

    for chain in 0..output.n_chains() {
        for row in start..rows {
            chain_builder.append_value(chain as u32);
            iter_builder.append_value(row as u32);
            for (col, builder) in value_builders.iter_mut().enumerate() {
                builder.append_value(output.samples[[row, col, chain]]);
            }
        }
    }

    let mut arrays: Vec<ArrayRef> = vec![
        Arc::new(chain_builder.finish()),
        Arc::new(iter_builder.finish()),
    ];
    for mut builder in value_builders {
        arrays.push(Arc::new(builder.finish()));
    }

    Ok(RecordBatch::try_new(schema, arrays)?)
}

#[cfg(feature = "arrow")]
/// Saves the stored chain states as a single-record-batch Arrow IPC file.
///
/// # Errors
///
/// Returns any underlying I/O or Arrow serialization error.
pub fn save_arrow<P: AsRef<Path>>(output: &SampleOutput, path: P) -> Result<(), Box<dyn Error>> {
    use arrow::ipc::writer::FileWriter;
    use std::fs::File;

    let batch = record_batch(output)?;
    let file = File::create(path)?;
    let mut writer = FileWriter::try_new(file, batch.schema().as_ref())?;
    writer.write(&batch)?;
    writer.finish()?;
    Ok(())
}

#[cfg(feature = "parquet")]
/// Saves the stored chain states as a Parquet file.
///
/// # Errors
///
/// Returns any underlying I/O or Parquet serialization error.
pub fn save_parquet<P: AsRef<Path>>(output: &SampleOutput, path: P) -> Result<(), Box<dyn Error>> {
    use std::fs::File;

    let batch = record_batch(output)?;
    let file = File::create(path)?;
    let props = WriterProperties::builder().build();
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::RunStatus;
    use ndarray::Array3;

    fn output() -> SampleOutput {
        let mut samples = Array3::zeros((4, 3, 2));
        for row in 0..4 {
            for chain in 0..2 {
                samples[[row, 0, chain]] = row as f64 + 10.0 * chain as f64;
                samples[[row, 1, chain]] = 1.0;
                samples[[row, 2, chain]] = -0.5 * row as f64;
            }
        }
        SampleOutput {
            samples,
            names: vec![
                "x".to_string(),
                "acceptance".to_string(),
                "lp".to_string(),
            ],
            burnin: 1,
            n_initial: 0,
            status: RunStatus::Completed,
        }
    }

    #[cfg(feature = "csv")]
    #[test]
    fn test_save_csv_skips_burnin_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("samples.csv");
        save_csv(&output(), &path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "chain,iteration,x,acceptance,lp");
        // 2 chains x 3 post-burnin rows.
        assert_eq!(lines.len(), 1 + 6);
        assert!(lines[1].starts_with("0,1,"));
    }

    #[cfg(feature = "arrow")]
    #[test]
    fn test_save_arrow_roundtrip_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("samples.arrow");
        save_arrow(&output(), &path).unwrap();
        assert!(std::fs::metadata(&path).unwrap().len() > 0);

        let batch = record_batch(&output()).unwrap();
        assert_eq!(batch.num_rows(), 6);
        assert_eq!(batch.num_columns(), 5);
    }

    #[cfg(feature = "parquet")]
    #[test]
    fn test_save_parquet_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("samples.parquet");
        save_parquet(&output(), &path).unwrap();
        assert!(std::fs::metadata(&path).unwrap().len() > 0);
    }
}
