use crate::error::PipelineError;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::error::Error;
use std::fmt;

/// One labeled (specimen, inhibitor) pair from the AUC table. The table is
/// sparse: most pairs have no recorded value.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AucRecord {
    pub specimen: String,
    pub inhibitor: String,
    pub auc: f64,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct Data {
    pub X: Vec<f64>, // specimens × genes, row-major
    pub specimens: Vec<String>,
    pub genes: Vec<String>,
    pub aucs: Vec<AucRecord>,
    pub specimen_len: usize,
    pub gene_len: usize,
}

impl Data {
    /// Create a new `Data` instance with default values
    pub fn new() -> Data {
        Data {
            X: Vec::new(),
            specimens: Vec::new(),
            genes: Vec::new(),
            aucs: Vec::new(),
            specimen_len: 0,
            gene_len: 0,
        }
    }

    /// Load the expression matrix from `rnaseq.csv` (genes in rows, specimens in
    /// columns) and transpose it to specimen-major orientation.
    pub fn load_expression(&mut self, path: &str) -> Result<(), Box<dyn Error>> {
        info!("Loading expression matrix {}...", path);
        let mut reader = csv::Reader::from_path(path)?;

        self.specimens = reader
            .headers()?
            .iter()
            .skip(1)
            .map(String::from)
            .collect();
        self.specimen_len = self.specimens.len();
        if self.specimen_len == 0 {
            return Err(Box::new(PipelineError::MalformedInput {
                file: path.to_string(),
                line: 1,
                reason: "header holds no specimen columns".to_string(),
            }));
        }

        // Gene-major on disk; collected column-wise into the row-major X.
        let mut columns: Vec<Vec<f64>> = vec![Vec::new(); self.specimen_len];
        for (i, record) in reader.records().enumerate() {
            let line = i + 2;
            let record = record?;
            if record.len() != self.specimen_len + 1 {
                return Err(Box::new(PipelineError::MalformedInput {
                    file: path.to_string(),
                    line,
                    reason: format!(
                        "expected {} fields, found {}",
                        self.specimen_len + 1,
                        record.len()
                    ),
                }));
            }
            self.genes.push(record[0].to_string());
            for (s, value) in record.iter().skip(1).enumerate() {
                let parsed: f64 = value.parse().map_err(|_| PipelineError::MalformedInput {
                    file: path.to_string(),
                    line,
                    reason: format!("unparseable expression value {:?} for gene {}", value, &record[0]),
                })?;
                columns[s].push(parsed);
            }
        }

        self.gene_len = self.genes.len();
        self.X = Vec::with_capacity(self.specimen_len * self.gene_len);
        for column in &columns {
            self.X.extend_from_slice(column);
        }

        info!(
            "Expression matrix loaded: {} specimens x {} genes",
            self.specimen_len, self.gene_len
        );
        Ok(())
    }

    /// Load the AUC response table (`lab_id,inhibitor,auc`). Rows whose
    /// specimen has no expression row are dropped with a warning.
    pub fn load_aucs(&mut self, path: &str) -> Result<(), Box<dyn Error>> {
        info!("Loading AUC table {}...", path);
        let known: HashMap<&str, usize> = self
            .specimens
            .iter()
            .enumerate()
            .map(|(i, s)| (s.as_str(), i))
            .collect();

        let mut reader = csv::Reader::from_path(path)?;
        let mut dropped = 0usize;
        for (i, record) in reader.records().enumerate() {
            let line = i + 2;
            let record = record?;
            if record.len() < 3 {
                return Err(Box::new(PipelineError::MalformedInput {
                    file: path.to_string(),
                    line,
                    reason: format!("expected 3 fields (lab_id,inhibitor,auc), found {}", record.len()),
                }));
            }
            let auc: f64 = record[2].parse().map_err(|_| PipelineError::MalformedInput {
                file: path.to_string(),
                line,
                reason: format!("unparseable AUC value {:?}", &record[2]),
            })?;
            if !known.contains_key(&record[0]) {
                dropped += 1;
                continue;
            }
            self.aucs.push(AucRecord {
                specimen: record[0].to_string(),
                inhibitor: record[1].to_string(),
                auc,
            });
        }

        if dropped > 0 {
            warn!(
                "{} AUC row(s) reference specimens absent from the expression matrix and were dropped.",
                dropped
            );
        }
        info!("{} AUC records loaded", self.aucs.len());
        Ok(())
    }

    /// Expression row of one specimen.
    pub fn row(&self, specimen: usize) -> &[f64] {
        &self.X[specimen * self.gene_len..(specimen + 1) * self.gene_len]
    }

    /// Distinct inhibitor labels, in first-seen order.
    pub fn inhibitors(&self) -> Vec<String> {
        let mut seen: HashMap<&str, ()> = HashMap::new();
        let mut out = Vec::new();
        for record in &self.aucs {
            if seen.insert(record.inhibitor.as_str(), ()).is_none() {
                out.push(record.inhibitor.clone());
            }
        }
        out
    }

    /// Labeled specimens for one inhibitor: (specimen row index, AUC) pairs.
    pub fn aucs_for(&self, inhibitor: &str) -> Vec<(usize, f64)> {
        let index: HashMap<&str, usize> = self
            .specimens
            .iter()
            .enumerate()
            .map(|(i, s)| (s.as_str(), i))
            .collect();
        self.aucs
            .iter()
            .filter(|r| r.inhibitor == inhibitor)
            .filter_map(|r| index.get(r.specimen.as_str()).map(|&i| (i, r.auc)))
            .collect()
    }
}

/// Implement a custom Debug trait for Data
impl fmt::Display for Data {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Specimens: {}   Genes: {}   AUC records: {}",
            self.specimen_len,
            self.gene_len,
            self.aucs.len()
        )?;

        // char-wise truncation: gene names are not guaranteed ASCII
        let genes_string = self.genes.join("\t");
        let truncated_genes = if genes_string.chars().count() > 100 {
            format!("{}...", genes_string.chars().take(97).collect::<String>())
        } else {
            genes_string
        };
        writeln!(f, "X:                  {}", truncated_genes)?;

        // Limit to the first 20 rows
        for i in (0..self.specimen_len).take(20) {
            let row_display: String = self
                .row(i)
                .iter()
                .map(|v| format!("{:.2}", v))
                .collect::<Vec<_>>()
                .join("\t");

            let truncated_row = if row_display.chars().count() > 80 {
                format!("{}...", row_display.chars().take(77).collect::<String>())
            } else {
                row_display
            };

            writeln!(f, "{:<20} {}", self.specimens[i], truncated_row)?;
        }

        writeln!(f, "\naucs:")?;
        for record in self.aucs.iter().take(20) {
            writeln!(f, "{}\t{}\t{:.3}", record.specimen, record.inhibitor, record.auc)?;
        }

        Ok(())
    }
}

impl fmt::Debug for Data {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Reuse the Display formatter
        write!(f, "{}", self)
    }
}
