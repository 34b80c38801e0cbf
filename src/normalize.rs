use crate::data::Data;
use crate::error::PipelineError;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const MIN_STD: f64 = 1e-12;

/// Divide each specimen's expression row by its Euclidean norm. This absorbs
/// specimen-to-specimen scale differences (sequencing depth) before any
/// per-gene statistic is computed.
pub fn row_normalize(data: &mut Data) -> Result<(), PipelineError> {
    for i in 0..data.specimen_len {
        let start = i * data.gene_len;
        let norm = data.X[start..start + data.gene_len]
            .iter()
            .map(|v| v * v)
            .sum::<f64>()
            .sqrt();
        if norm <= 0.0 {
            return Err(PipelineError::ZeroExpressionRow {
                specimen: data.specimens[i].clone(),
            });
        }
        for v in &mut data.X[start..start + data.gene_len] {
            *v /= norm;
        }
    }
    Ok(())
}

/// Per-gene standardization statistics, computed once on the training set and
/// persisted with the model. Inference must reuse these stored values; fitting
/// a new scaler on inference data would leak.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Scaler {
    pub genes: Vec<String>,
    pub means: Vec<f64>,
    pub stds: Vec<f64>,
}

impl Scaler {
    /// Compute mean and population standard deviation of each selected gene
    /// column. A zero-variance gene is a typed error, not a silent NaN.
    pub fn fit(data: &Data, genes: &[String]) -> Result<Scaler, PipelineError> {
        let columns = column_indices(data, genes)?;
        let n = data.specimen_len as f64;

        let mut means = Vec::with_capacity(genes.len());
        let mut stds = Vec::with_capacity(genes.len());
        for (&j, gene) in columns.iter().zip(genes.iter()) {
            let mean = (0..data.specimen_len).map(|i| data.row(i)[j]).sum::<f64>() / n;
            let var = (0..data.specimen_len)
                .map(|i| (data.row(i)[j] - mean).powi(2))
                .sum::<f64>()
                / n;
            let std = var.sqrt();
            if std < MIN_STD {
                return Err(PipelineError::ZeroVarianceGene { gene: gene.clone() });
            }
            means.push(mean);
            stds.push(std);
        }

        info!("Scaler fitted on {} specimens x {} genes", data.specimen_len, genes.len());
        Ok(Scaler {
            genes: genes.to_vec(),
            means,
            stds,
        })
    }

    /// Restrict the matrix to the scaler's genes (in scaler order) and z-score
    /// each column with the stored statistics. Returns a specimens x genes
    /// row-major matrix.
    pub fn transform(&self, data: &Data) -> Result<Vec<f64>, PipelineError> {
        let columns = column_indices(data, &self.genes)?;
        let mut out = Vec::with_capacity(data.specimen_len * self.genes.len());
        for i in 0..data.specimen_len {
            let row = data.row(i);
            for (k, &j) in columns.iter().enumerate() {
                out.push((row[j] - self.means[k]) / self.stds[k]);
            }
        }
        Ok(out)
    }

    pub fn gene_len(&self) -> usize {
        self.genes.len()
    }
}

fn column_indices(data: &Data, genes: &[String]) -> Result<Vec<usize>, PipelineError> {
    let index: HashMap<&str, usize> = data
        .genes
        .iter()
        .enumerate()
        .map(|(j, g)| (g.as_str(), j))
        .collect();
    genes
        .iter()
        .map(|g| {
            index
                .get(g.as_str())
                .copied()
                .ok_or_else(|| PipelineError::GeneOrderMismatch {
                    reason: format!("gene {} is absent from the expression matrix", g),
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Data;

    fn small_data() -> Data {
        Data {
            X: vec![
                3.0, 4.0, 0.0, //
                1.0, 2.0, 2.0, //
                0.0, 6.0, 8.0, //
                5.0, 0.0, 12.0, //
            ],
            specimens: vec!["A".into(), "B".into(), "C".into(), "D".into()],
            genes: vec!["g1".into(), "g2".into(), "g3".into()],
            aucs: Vec::new(),
            specimen_len: 4,
            gene_len: 3,
        }
    }

    #[test]
    fn test_row_normalize_unit_norm() {
        let mut data = small_data();
        row_normalize(&mut data).unwrap();
        for i in 0..data.specimen_len {
            let norm: f64 = data.row(i).iter().map(|v| v * v).sum::<f64>().sqrt();
            assert!((norm - 1.0).abs() < 1e-12,
            "specimen {} should have unit Euclidean norm after row normalization, got {}", data.specimens[i], norm);
        }
    }

    #[test]
    fn test_row_normalize_rejects_zero_row() {
        let mut data = small_data();
        for v in &mut data.X[0..3] {
            *v = 0.0;
        }
        let err = row_normalize(&mut data).unwrap_err();
        assert!(matches!(err, PipelineError::ZeroExpressionRow { .. }),
        "an all-zero expression row must raise ZeroExpressionRow, got {:?}", err);
    }

    #[test]
    fn test_zscored_columns_have_zero_mean_unit_std() {
        let data = small_data();
        let genes: Vec<String> = data.genes.clone();
        let scaler = Scaler::fit(&data, &genes).unwrap();
        let z = scaler.transform(&data).unwrap();

        let n = data.specimen_len as f64;
        for k in 0..genes.len() {
            let column: Vec<f64> = (0..data.specimen_len).map(|i| z[i * genes.len() + k]).collect();
            let mean = column.iter().sum::<f64>() / n;
            let std = (column.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
            assert!(mean.abs() < 1e-12,
            "z-scored training column {} should have mean 0, got {}", genes[k], mean);
            assert!((std - 1.0).abs() < 1e-12,
            "z-scored training column {} should have std 1, got {}", genes[k], std);
        }
    }

    #[test]
    fn test_fit_rejects_zero_variance_gene() {
        let mut data = small_data();
        // flatten g2 to a constant
        for i in 0..data.specimen_len {
            data.X[i * 3 + 1] = 2.5;
        }
        let err = Scaler::fit(&data, &data.genes.clone()).unwrap_err();
        assert!(matches!(err, PipelineError::ZeroVarianceGene { ref gene } if gene == "g2"),
        "a constant gene column must raise ZeroVarianceGene naming the gene, got {:?}", err);
    }

    #[test]
    fn test_transform_reuses_stored_statistics() {
        let data = small_data();
        let scaler = Scaler::fit(&data, &data.genes.clone()).unwrap();

        // shifted inference data: stored statistics must be applied unchanged,
        // so the output differs from a freshly fitted z-score
        let mut shifted = data.clone();
        for v in &mut shifted.X {
            *v += 10.0;
        }
        let z = scaler.transform(&shifted).unwrap();
        let expected = (shifted.row(0)[0] - scaler.means[0]) / scaler.stds[0];
        assert_eq!(z[0], expected,
        "transform must apply the persisted training statistics, not recompute them");
    }

    #[test]
    fn test_transform_missing_gene_is_detected() {
        let data = small_data();
        let scaler = Scaler::fit(&data, &data.genes.clone()).unwrap();

        let mut other = data.clone();
        other.genes[2] = "renamed".into();
        let err = scaler.transform(&other).unwrap_err();
        assert!(matches!(err, PipelineError::GeneOrderMismatch { .. }),
        "a gene missing at inference time must raise GeneOrderMismatch, got {:?}", err);
    }
}
