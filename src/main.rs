use chrono::Local;
use flexi_logger::{FileSpec, Logger};
use log::{info, warn};
use rnaridge::{evaluate, param, run};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use std::error::Error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

fn main() -> Result<(), Box<dyn Error>> {
    let param_path = std::env::args().nth(1).unwrap_or_else(|| "param.yaml".to_string());
    let param = param::get(param_path)?;

    // the handle must outlive the run or buffered log lines are lost
    let _logger = if param.general.log_base.is_empty() {
        Logger::try_with_str(&param.general.log_level)?.start()?
    } else {
        Logger::try_with_str(&param.general.log_level)?
            .log_to_file(
                FileSpec::default()
                    .basename(&param.general.log_base)
                    .suffix(&param.general.log_suffix),
            )
            .start()?
    };

    info!(
        "rnaridge {} starting at {}",
        env!("CARGO_PKG_VERSION"),
        Local::now().format("%Y-%m-%d_%H-%M-%S")
    );

    let running = Arc::new(AtomicBool::new(true));
    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    {
        let running = Arc::clone(&running);
        std::thread::spawn(move || {
            if signals.forever().next().is_some() {
                warn!("Interrupt received, finishing current inhibitors and saving what is done...");
                running.store(false, Ordering::Relaxed);
            }
        });
    }

    let bundle = run(&param, running)?;
    info!(
        "{} model(s) saved to {}",
        bundle.models.len(),
        param.model.dir
    );

    if !param.evaluation.predictions.is_empty() {
        evaluate::evaluate(&param.evaluation.predictions, &param.data.aucs)?;
    }

    Ok(())
}
