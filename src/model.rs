use crate::error::PipelineError;
use crate::normalize::Scaler;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fs;
use std::path::Path;

/// One independently trained per-inhibitor regression: a weight per selected
/// gene (in bundle gene order), an intercept, and the strength chosen by
/// leave-one-out cross-validation.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct InhibitorModel {
    pub inhibitor: String,
    pub coefficients: Vec<f64>,
    pub intercept: f64,
    /// Not carried by the legacy CSV pair; 0.0 after `load_csv`.
    pub alpha: f64,
    pub n_specimens: usize,
    pub loo_mse: f64,
}

/// Everything inference needs, serialized atomically: the selected gene order,
/// the normalization statistics and every per-inhibitor model. The gene
/// ordering of each coefficient vector is the bundle's gene ordering; breaking
/// that silently corrupts inference, so it is checked on every load.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ModelBundle {
    pub version: String,
    pub genes: Vec<String>,
    pub scaler: Scaler,
    pub models: Vec<InhibitorModel>,
}

impl ModelBundle {
    pub fn new(genes: Vec<String>, scaler: Scaler) -> ModelBundle {
        let sha = option_env!("RNARIDGE_GIT_SHA").unwrap_or("unknown");
        ModelBundle {
            version: format!("{}#{}", env!("CARGO_PKG_VERSION"), sha),
            genes,
            scaler,
            models: Vec::new(),
        }
    }

    pub fn push(&mut self, model: InhibitorModel) -> Result<(), PipelineError> {
        if model.coefficients.len() != self.genes.len() {
            return Err(PipelineError::GeneOrderMismatch {
                reason: format!(
                    "model for {} has {} coefficients but the bundle holds {} genes",
                    model.inhibitor,
                    model.coefficients.len(),
                    self.genes.len()
                ),
            });
        }
        self.models.push(model);
        Ok(())
    }

    pub fn model(&self, inhibitor: &str) -> Option<&InhibitorModel> {
        self.models.iter().find(|m| m.inhibitor == inhibitor)
    }

    /// Consistency check run after every load: the scaler and every
    /// coefficient vector must follow the bundle's gene ordering.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.scaler.genes != self.genes {
            return Err(PipelineError::GeneOrderMismatch {
                reason: "scaler gene list disagrees with the bundle gene list".to_string(),
            });
        }
        for model in &self.models {
            if model.coefficients.len() != self.genes.len() {
                return Err(PipelineError::GeneOrderMismatch {
                    reason: format!(
                        "model for {} has {} coefficients for {} genes",
                        model.inhibitor,
                        model.coefficients.len(),
                        self.genes.len()
                    ),
                });
            }
        }
        Ok(())
    }

    /// Legacy split format: `pkl_1.csv` keyed by gene (mean, std, one
    /// coefficient column per inhibitor) and `pkl_2.csv` keyed by inhibitor
    /// (intercept). External inference steps reconstruct each model by the
    /// implicit join, so the layout is preserved exactly.
    pub fn save_csv<P: AsRef<Path>>(&self, dir: P) -> Result<(), Box<dyn Error>> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let mut gene_table = csv::Writer::from_path(dir.join("pkl_1.csv"))?;
        let mut header = vec!["gene".to_string(), "gene_mean".to_string(), "gene_std".to_string()];
        header.extend(self.models.iter().map(|m| m.inhibitor.clone()));
        gene_table.write_record(&header)?;
        for (k, gene) in self.genes.iter().enumerate() {
            let mut record = vec![
                gene.clone(),
                format!("{}", self.scaler.means[k]),
                format!("{}", self.scaler.stds[k]),
            ];
            record.extend(self.models.iter().map(|m| format!("{}", m.coefficients[k])));
            gene_table.write_record(&record)?;
        }
        gene_table.flush()?;

        let mut inhibitor_table = csv::Writer::from_path(dir.join("pkl_2.csv"))?;
        inhibitor_table.write_record(["inhibitor", "intercept"])?;
        for model in &self.models {
            let intercept = format!("{}", model.intercept);
            inhibitor_table.write_record([model.inhibitor.as_str(), intercept.as_str()])?;
        }
        inhibitor_table.flush()?;

        info!(
            "Model written to {}: {} genes, {} inhibitors",
            dir.display(),
            self.genes.len(),
            self.models.len()
        );
        Ok(())
    }

    /// Rebuild a bundle from the legacy CSV pair. Each inhibitor's coefficient
    /// column must pair with an intercept row; a dangling entry on either side
    /// is a gene-order / join error, not something to patch silently.
    pub fn load_csv<P: AsRef<Path>>(dir: P) -> Result<ModelBundle, Box<dyn Error>> {
        let dir = dir.as_ref();

        let mut gene_table = csv::Reader::from_path(dir.join("pkl_1.csv"))?;
        let header = gene_table.headers()?.clone();
        if header.len() < 3 || &header[0] != "gene" || &header[1] != "gene_mean" || &header[2] != "gene_std" {
            return Err(Box::new(PipelineError::GeneOrderMismatch {
                reason: "pkl_1.csv header must start with gene,gene_mean,gene_std".to_string(),
            }));
        }
        let inhibitors: Vec<String> = header.iter().skip(3).map(String::from).collect();

        let mut genes = Vec::new();
        let mut means = Vec::new();
        let mut stds = Vec::new();
        let mut columns: Vec<Vec<f64>> = vec![Vec::new(); inhibitors.len()];
        for record in gene_table.records() {
            let record = record?;
            genes.push(record[0].to_string());
            means.push(record[1].parse::<f64>()?);
            stds.push(record[2].parse::<f64>()?);
            for (c, value) in record.iter().skip(3).enumerate() {
                columns[c].push(value.parse::<f64>()?);
            }
        }

        let mut intercepts = std::collections::HashMap::new();
        let mut inhibitor_table = csv::Reader::from_path(dir.join("pkl_2.csv"))?;
        for record in inhibitor_table.records() {
            let record = record?;
            intercepts.insert(record[0].to_string(), record[1].parse::<f64>()?);
        }

        let scaler = Scaler {
            genes: genes.clone(),
            means,
            stds,
        };
        let mut bundle = ModelBundle::new(genes, scaler);
        for (inhibitor, coefficients) in inhibitors.into_iter().zip(columns.into_iter()) {
            let intercept = *intercepts.get(&inhibitor).ok_or_else(|| PipelineError::GeneOrderMismatch {
                reason: format!("inhibitor {} has a coefficient column but no intercept row", inhibitor),
            })?;
            intercepts.remove(&inhibitor);
            bundle.push(InhibitorModel {
                inhibitor,
                coefficients,
                intercept,
                alpha: 0.0,
                n_specimens: 0,
                loo_mse: 0.0,
            })?;
        }
        if !intercepts.is_empty() {
            let mut orphans: Vec<&String> = intercepts.keys().collect();
            orphans.sort();
            return Err(Box::new(PipelineError::GeneOrderMismatch {
                reason: format!("intercept rows without coefficient columns: {:?}", orphans),
            }));
        }

        bundle.validate()?;
        Ok(bundle)
    }

    /// Saves the bundle in a suitable format based on file extension. The file
    /// is written to a temporary sibling and renamed, so readers never observe
    /// a half-written model.
    pub fn save_auto<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn Error>> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();

        let bytes = match ext.as_str() {
            "json" => serde_json::to_vec_pretty(self)?,
            "bin" | "bincode" => bincode::serialize(self)?,
            _ => {
                warn!("Unknown bundle format {:?}. Saving as JSON.", ext);
                serde_json::to_vec_pretty(self)?
            }
        };

        let tmp = path.with_extension("tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, path)?;
        info!("Model bundle written to {}", path.display());
        Ok(())
    }

    /// Loads a bundle, detecting the format from the file extension, and runs
    /// the gene-ordering consistency check.
    pub fn load_auto<P: AsRef<Path>>(path: P) -> Result<ModelBundle, Box<dyn Error>> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();

        let bytes = fs::read(path)?;
        let bundle: ModelBundle = match ext.as_str() {
            "bin" | "bincode" => bincode::deserialize(&bytes)?,
            _ => serde_json::from_slice(&bytes)?,
        };
        bundle.validate()?;
        Ok(bundle)
    }
}
