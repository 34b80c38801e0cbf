use crate::data::Data;
use crate::error::PipelineError;
use crate::model::{InhibitorModel, ModelBundle};
use crate::normalize::Scaler;
use crate::param::Param;
use crate::ridge;
use log::{info, warn};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Fit one leave-one-out cross-validated ridge model per inhibitor.
///
/// `z` is the z-scored specimens x selected-genes matrix produced by the
/// scaler; AUC labels and specimen identities come from `data`. Models are
/// independent, so inhibitors are trained in parallel under the configured
/// pool (thread_number defaults to 1, which keeps the run sequential).
///
/// If the `running` flag is cleared mid-run, already-finished inhibitors are
/// returned as a smaller but internally consistent bundle.
pub fn train(
    data: &Data,
    z: &[f64],
    scaler: &Scaler,
    param: &Param,
    running: Arc<AtomicBool>,
) -> Result<ModelBundle, PipelineError> {
    let p = scaler.gene_len();
    if z.len() != data.specimen_len * p {
        return Err(PipelineError::DimensionMismatch {
            reason: format!(
                "z-scored matrix has length {}, expected {} specimens x {} genes",
                z.len(),
                data.specimen_len,
                p
            ),
        });
    }

    let alphas = ridge::alpha_grid(
        param.ridge.alpha_min_log10,
        param.ridge.alpha_max_log10,
        param.ridge.n_alphas,
    );
    let inhibitors = data.inhibitors();
    info!(
        "Training {} inhibitor model(s) over a {}-point alpha grid...",
        inhibitors.len(),
        alphas.len()
    );

    let pool = ThreadPoolBuilder::new()
        .num_threads(param.general.thread_number)
        .build()
        .unwrap();

    let results: Vec<Result<Option<InhibitorModel>, PipelineError>> = pool.install(|| {
        inhibitors
            .par_iter()
            .map(|inhibitor| {
                if !running.load(Ordering::Relaxed) {
                    return Ok(None);
                }
                fit_inhibitor(data, z, p, inhibitor, &alphas).map(Some)
            })
            .collect()
    });

    let mut bundle = ModelBundle::new(scaler.genes.clone(), scaler.clone());
    let mut skipped = 0usize;
    for result in results {
        match result? {
            Some(model) => {
                info!(
                    "{}: n={} alpha={:.4e} loo_mse={:.6e}",
                    model.inhibitor, model.n_specimens, model.alpha, model.loo_mse
                );
                bundle.push(model)?;
            }
            None => skipped += 1,
        }
    }

    if skipped > 0 {
        warn!(
            "Training interrupted: {} of {} inhibitor(s) trained, {} skipped.",
            bundle.models.len(),
            inhibitors.len(),
            skipped
        );
    } else {
        info!("{} inhibitor model(s) trained", bundle.models.len());
    }
    Ok(bundle)
}

fn fit_inhibitor(
    data: &Data,
    z: &[f64],
    p: usize,
    inhibitor: &str,
    alphas: &[f64],
) -> Result<InhibitorModel, PipelineError> {
    let labeled = data.aucs_for(inhibitor);
    let n = labeled.len();
    if n < 2 {
        return Err(PipelineError::InsufficientSamples {
            inhibitor: inhibitor.to_string(),
            n,
        });
    }

    let mut x = Vec::with_capacity(n * p);
    let mut y = Vec::with_capacity(n);
    for &(specimen, auc) in &labeled {
        x.extend_from_slice(&z[specimen * p..(specimen + 1) * p]);
        y.push(auc);
    }

    let fit = ridge::fit(&x, n, p, &y, alphas)?;
    Ok(InhibitorModel {
        inhibitor: inhibitor.to_string(),
        coefficients: fit.coefficients,
        intercept: fit.intercept,
        alpha: fit.alpha,
        n_specimens: n,
        loo_mse: fit.loo_mse,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::AucRecord;
    use crate::normalize::{row_normalize, Scaler};
    use crate::selection::select_top_genes;

    fn labeled_data() -> Data {
        Data {
            X: vec![
                1.0, 0.0, 5.0, 0.0, 1.0, //
                1.0, 2.0, 5.0, 10.0, 2.0, //
                1.0, 4.0, 5.0, 0.0, 3.0, //
                1.0, 6.0, 6.0, 10.0, 4.0, //
            ],
            specimens: vec!["S1".into(), "S2".into(), "S3".into(), "S4".into()],
            genes: vec!["g_a".into(), "g_b".into(), "g_c".into(), "g_d".into(), "g_e".into()],
            aucs: vec![
                AucRecord { specimen: "S1".into(), inhibitor: "Inh-A".into(), auc: 0.2 },
                AucRecord { specimen: "S2".into(), inhibitor: "Inh-A".into(), auc: 0.4 },
                AucRecord { specimen: "S3".into(), inhibitor: "Inh-A".into(), auc: 0.6 },
                AucRecord { specimen: "S4".into(), inhibitor: "Inh-A".into(), auc: 0.8 },
            ],
            specimen_len: 4,
            gene_len: 5,
        }
    }

    fn prepared(data: &mut Data, n_genes: usize) -> (Scaler, Vec<f64>) {
        let genes = select_top_genes(data, n_genes);
        row_normalize(data).unwrap();
        let scaler = Scaler::fit(data, &genes).unwrap();
        let z = scaler.transform(data).unwrap();
        (scaler, z)
    }

    #[test]
    fn test_train_produces_one_model_per_inhibitor() {
        let mut data = labeled_data();
        let (scaler, z) = prepared(&mut data, 3);
        let param = Param::default();
        let running = Arc::new(AtomicBool::new(true));

        let bundle = train(&data, &z, &scaler, &param, running).unwrap();
        assert_eq!(bundle.models.len(), 1, "one inhibitor in the table, one model in the bundle");
        let model = bundle.model("Inh-A").unwrap();
        assert_eq!(model.coefficients.len(), 3,
        "the coefficient vector length must equal the selected gene count");
        assert_eq!(model.n_specimens, 4, "all four labeled specimens should be used");
        assert!(model.alpha >= 0.1 && model.alpha <= 1e5,
        "the chosen strength must come from the default grid, got {}", model.alpha);
    }

    #[test]
    fn test_cv_error_beats_zero_skill_baseline() {
        let mut data = labeled_data();
        let (scaler, z) = prepared(&mut data, 3);
        let param = Param::default();
        let running = Arc::new(AtomicBool::new(true));

        let bundle = train(&data, &z, &scaler, &param, running).unwrap();
        let model = bundle.model("Inh-A").unwrap();

        let aucs = [0.2, 0.4, 0.6, 0.8];
        let mean = aucs.iter().sum::<f64>() / 4.0;
        let baseline = aucs.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / 4.0;
        assert!(model.loo_mse < baseline,
        "cross-validated error {} should undercut the zero-skill baseline {}", model.loo_mse, baseline);
    }

    #[test]
    fn test_single_specimen_inhibitor_is_a_validation_error() {
        let mut data = labeled_data();
        data.aucs.push(AucRecord {
            specimen: "S1".into(),
            inhibitor: "Inh-lonely".into(),
            auc: 0.9,
        });
        let (scaler, z) = prepared(&mut data, 3);
        let param = Param::default();
        let running = Arc::new(AtomicBool::new(true));

        let err = train(&data, &z, &scaler, &param, running).unwrap_err();
        match err {
            PipelineError::InsufficientSamples { ref inhibitor, n } => {
                assert_eq!(inhibitor, "Inh-lonely", "the error must name the offending inhibitor");
                assert_eq!(n, 1, "the error must report the labeled specimen count");
            }
            other => panic!("expected InsufficientSamples, got {:?}", other),
        }
    }

    #[test]
    fn test_cleared_running_flag_yields_partial_bundle() {
        let mut data = labeled_data();
        let (scaler, z) = prepared(&mut data, 3);
        let param = Param::default();
        let running = Arc::new(AtomicBool::new(false));

        let bundle = train(&data, &z, &scaler, &param, running).unwrap();
        assert!(bundle.models.is_empty(),
        "with the flag already cleared nothing should be trained, but the bundle must still be valid");
        assert!(bundle.validate().is_ok(), "a partial bundle must remain internally consistent");
    }
}
