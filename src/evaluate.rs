use crate::error::PipelineError;
use log::{info, warn};
use std::collections::HashMap;
use std::error::Error;
use std::fmt;

/// Diagnostic comparison of stored predictions against ground truth. Nothing
/// here gates the pipeline; the numbers are logged for a human to judge.
#[derive(Clone, Debug, PartialEq)]
pub struct EvalReport {
    pub n_matched: usize,
    /// Prediction rows with no ground-truth counterpart. They are excluded
    /// from the metrics, but counted rather than silently discarded.
    pub n_unmatched_predictions: usize,
    /// Ground-truth rows the predictions file does not cover.
    pub n_uncovered_truth: usize,
    pub pearson_r: f64,
    pub rmse: f64,
    /// Unconditional standard deviation of the matched truth values; the
    /// error of always predicting the mean ("zero-skill" reference).
    pub baseline_std: f64,
}

impl fmt::Display for EvalReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Evaluation on {} matched (specimen, inhibitor) pairs", self.n_matched)?;
        writeln!(f, "  Pearson r:    {:.4}", self.pearson_r)?;
        writeln!(f, "  RMSE:         {:.4}", self.rmse)?;
        writeln!(f, "  zero-skill:   {:.4} (std of truth)", self.baseline_std)?;
        write!(
            f,
            "  unmatched predictions: {}   uncovered truth rows: {}",
            self.n_unmatched_predictions, self.n_uncovered_truth
        )
    }
}

/// Join stored predictions against ground truth on (specimen, inhibitor) and
/// summarize the agreement. Ground truth dictates the join: prediction rows
/// without a truth counterpart never enter the metrics.
pub fn evaluate(predictions_path: &str, truth_path: &str) -> Result<EvalReport, Box<dyn Error>> {
    let truth = read_auc_table(truth_path)?;
    let predictions = read_auc_table(predictions_path)?;

    let predicted: HashMap<(String, String), f64> = predictions
        .iter()
        .map(|(s, i, v)| ((s.clone(), i.clone()), *v))
        .collect();
    let truth_keys: HashMap<(String, String), f64> = truth
        .iter()
        .map(|(s, i, v)| ((s.clone(), i.clone()), *v))
        .collect();

    let mut matched_truth = Vec::new();
    let mut matched_pred = Vec::new();
    let mut uncovered = 0usize;
    for (specimen, inhibitor, value) in &truth {
        match predicted.get(&(specimen.clone(), inhibitor.clone())) {
            Some(&p) => {
                matched_truth.push(*value);
                matched_pred.push(p);
            }
            None => uncovered += 1,
        }
    }
    let unmatched = predictions
        .iter()
        .filter(|(s, i, _)| !truth_keys.contains_key(&(s.clone(), i.clone())))
        .count();

    if unmatched > 0 {
        warn!(
            "{} prediction row(s) have no ground-truth counterpart and are excluded from the metrics.",
            unmatched
        );
    }
    if matched_truth.is_empty() {
        warn!("No (specimen, inhibitor) pair is shared between predictions and ground truth.");
    }

    let report = EvalReport {
        n_matched: matched_truth.len(),
        n_unmatched_predictions: unmatched,
        n_uncovered_truth: uncovered,
        pearson_r: pearson(&matched_pred, &matched_truth),
        rmse: rmse(&matched_pred, &matched_truth),
        baseline_std: std_dev(&matched_truth),
    };
    info!("{}", report);
    Ok(report)
}

fn read_auc_table(path: &str) -> Result<Vec<(String, String, f64)>, Box<dyn Error>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut out = Vec::new();
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
        out.push((record[0].to_string(), record[1].to_string(), auc));
    }
    Ok(out)
}

fn pearson(a: &[f64], b: &[f64]) -> f64 {
    if a.len() < 2 {
        return f64::NAN;
    }
    let n = a.len() as f64;
    let ma = a.iter().sum::<f64>() / n;
    let mb = b.iter().sum::<f64>() / n;
    let cov = a.iter().zip(b).map(|(x, y)| (x - ma) * (y - mb)).sum::<f64>();
    let va = a.iter().map(|x| (x - ma).powi(2)).sum::<f64>();
    let vb = b.iter().map(|y| (y - mb).powi(2)).sum::<f64>();
    cov / (va.sqrt() * vb.sqrt())
}

fn rmse(a: &[f64], b: &[f64]) -> f64 {
    if a.is_empty() {
        return f64::NAN;
    }
    (a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum::<f64>() / a.len() as f64).sqrt()
}

fn std_dev(v: &[f64]) -> f64 {
    if v.is_empty() {
        return f64::NAN;
    }
    let m = v.iter().sum::<f64>() / v.len() as f64;
    (v.iter().map(|x| (x - m).powi(2)).sum::<f64>() / v.len() as f64).sqrt()
}
