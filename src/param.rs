use log::warn;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fs::File;
use std::io::BufReader;

// Field definitions and associated default values

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Param {
    #[serde(default)]
    pub general: General,
    #[serde(default)]
    pub data: Data,
    #[serde(default)]
    pub ridge: Ridge,
    #[serde(default)]
    pub model: Model,
    #[serde(default)]
    pub evaluation: Evaluation,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct General {
    #[serde(default = "one_default")]
    pub thread_number: usize,
    #[serde(default = "log_base_default")]
    pub log_base: String,
    #[serde(default = "log_suffix_default")]
    pub log_suffix: String,
    #[serde(default = "log_level_default")]
    pub log_level: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Data {
    #[serde(default = "rnaseq_default")]
    pub rnaseq: String,
    #[serde(default = "aucs_default")]
    pub aucs: String,
    #[serde(default = "n_genes_default")]
    pub n_genes: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Ridge {
    /// log10 of the smallest candidate regularization strength
    #[serde(default = "alpha_min_log10_default")]
    pub alpha_min_log10: f64,
    /// log10 of the largest candidate regularization strength
    #[serde(default = "alpha_max_log10_default")]
    pub alpha_max_log10: f64,
    #[serde(default = "n_alphas_default")]
    pub n_alphas: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Model {
    #[serde(default = "model_dir_default")]
    pub dir: String,
    /// Optional single-record bundle next to the legacy CSV pair.
    /// Format is chosen by extension (.json, .bin); empty disables it.
    #[serde(default = "empty_string")]
    pub bundle: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Evaluation {
    /// Path of stored predictions (lab_id,inhibitor,auc); empty disables evaluation.
    #[serde(default = "empty_string")]
    pub predictions: String,
}

// Default section definitions

impl Default for General {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Default for Data {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Default for Ridge {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Default for Model {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Default for Evaluation {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Default for Param {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Param {
    pub fn new() -> Self {
        Self::default()
    }
}

pub fn get(param_file: String) -> Result<Param, Box<dyn Error>> {
    let param_file_reader = File::open(param_file)?;
    let param_reader = BufReader::new(param_file_reader);

    let mut config: Param = serde_yaml::from_reader(param_reader)?;

    validate(&mut config)?;

    Ok(config)
}

pub fn validate(param: &mut Param) -> Result<(), String> {
    if param.data.n_genes == 0 {
        return Err("Invalid n_genes=0. At least one gene must be selected.".to_string());
    }

    if param.ridge.n_alphas == 0 {
        return Err("Invalid n_alphas=0. The candidate grid must not be empty.".to_string());
    }

    if param.ridge.alpha_min_log10 > param.ridge.alpha_max_log10 {
        return Err(format!(
            "Invalid alpha grid: alpha_min_log10={:.3} > alpha_max_log10={:.3}.",
            param.ridge.alpha_min_log10, param.ridge.alpha_max_log10
        ));
    }

    if param.ridge.n_alphas == 1 && param.ridge.alpha_min_log10 != param.ridge.alpha_max_log10 {
        warn!(
            "n_alphas=1: only alpha=10^{:.1} will be tried, alpha_max_log10 is ignored.",
            param.ridge.alpha_min_log10
        );
    }

    if param.data.n_genes < 10 {
        warn!(
            "n_genes={} is very small; the model will likely underfit.",
            param.data.n_genes
        );
    }

    Ok(())
}

// Default value definitions

fn empty_string() -> String {
    "".to_string()
}
fn one_default() -> usize {
    1
}
fn log_base_default() -> String {
    "".to_string()
}
fn log_suffix_default() -> String {
    "log".to_string()
}
fn log_level_default() -> String {
    "info".to_string()
}
fn rnaseq_default() -> String {
    "training/rnaseq.csv".to_string()
}
fn aucs_default() -> String {
    "training/aucs.csv".to_string()
}
fn n_genes_default() -> usize {
    1000
}
fn alpha_min_log10_default() -> f64 {
    -1.0
}
fn alpha_max_log10_default() -> f64 {
    5.0
}
fn n_alphas_default() -> usize {
    40
}
fn model_dir_default() -> String {
    "model".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_pipeline() {
        let param = Param::default();
        assert_eq!(param.data.n_genes, 1000, "the default gene count should be the 1000 used by the reference pipeline");
        assert_eq!(param.ridge.n_alphas, 40, "the default grid should hold 40 candidate strengths");
        assert_eq!(param.ridge.alpha_min_log10, -1.0, "the default grid should start at 10^-1");
        assert_eq!(param.ridge.alpha_max_log10, 5.0, "the default grid should end at 10^5");
        assert_eq!(param.general.thread_number, 1, "training should be sequential unless asked otherwise");
        assert_eq!(param.model.dir, "model", "the legacy CSV pair should land in model/ by default");
    }

    #[test]
    fn test_validate_rejects_empty_grid() {
        let mut param = Param::default();
        param.ridge.n_alphas = 0;
        assert!(validate(&mut param).is_err(), "an empty alpha grid must be rejected");
    }

    #[test]
    fn test_validate_rejects_inverted_grid() {
        let mut param = Param::default();
        param.ridge.alpha_min_log10 = 2.0;
        param.ridge.alpha_max_log10 = -2.0;
        assert!(validate(&mut param).is_err(), "an inverted alpha grid must be rejected");
    }

    #[test]
    fn test_validate_rejects_zero_genes() {
        let mut param = Param::default();
        param.data.n_genes = 0;
        assert!(validate(&mut param).is_err(), "selecting zero genes must be rejected");
    }
}
