#![allow(non_snake_case)]

pub mod data;
pub mod error;
pub mod evaluate;
pub mod model;
pub mod normalize;
pub mod param;
pub mod ridge;
pub mod selection;
pub mod train;

use data::Data;
use log::{debug, info};
use model::ModelBundle;
use normalize::{row_normalize, Scaler};
use param::Param;
use selection::select_top_genes;
use std::error::Error;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Run the full training pipeline: load the cohort, select the high-variance
/// genes on the raw matrix, row-normalize, fit the scaler on the training
/// set, train one LOOCV-ridge model per inhibitor, and persist the result
/// (legacy CSV pair, plus the single-record bundle when configured).
pub fn run(param: &Param, running: Arc<AtomicBool>) -> Result<ModelBundle, Box<dyn Error>> {
    let start = std::time::Instant::now();

    let mut data = Data::new();
    data.load_expression(&param.data.rnaseq)?;
    data.load_aucs(&param.data.aucs)?;
    debug!("{:?}", data);

    // Variance ranking runs on raw expression; row normalization rescales
    // each specimen by a different factor and would change the ranking.
    let genes = select_top_genes(&data, param.data.n_genes);
    row_normalize(&mut data)?;
    let scaler = Scaler::fit(&data, &genes)?;
    let z = scaler.transform(&data)?;

    let bundle = train::train(&data, &z, &scaler, param, running)?;

    bundle.save_csv(&param.model.dir)?;
    if !param.model.bundle.is_empty() {
        bundle.save_auto(&param.model.bundle)?;
    }

    info!("Pipeline completed in {:.2}s", start.elapsed().as_secs_f64());
    Ok(bundle)
}
