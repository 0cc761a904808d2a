use npomsort::config::ParticleSize;
use npomsort::output::write_batch_result;
use npomsort::{
    AnalysisConfig,
    BatchInput,
    BatchOptions,
    SpectrumAnalyser,
    run_batch,
};
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::time::Instant;
use tracing::{
    info,
    instrument,
    warn,
};

use crate::cli::{
    AnalyseArgs,
    WriteTemplateArgs,
};
use crate::error::CliError;
use crate::processing::{
    BarProgress,
    summary_table,
};

fn load_config(path: Option<&Path>, np_size: Option<u32>) -> Result<AnalysisConfig, CliError> {
    let mut config: AnalysisConfig = match path {
        Some(path) => {
            info!("Loading analysis config from {}", path.display());
            serde_json::from_str(&std::fs::read_to_string(path)?)?
        }
        None => AnalysisConfig::default(),
    };
    if let Some(size) = np_size {
        config = config.with_particle_size(ParticleSize::try_from(size)?);
    }
    Ok(config)
}

/// Main function for the 'analyse' subcommand.
#[instrument]
pub fn main_analyse(args: AnalyseArgs) -> Result<(), CliError> {
    let config = load_config(args.config.as_deref(), args.np_size)?;
    let analyser = SpectrumAnalyser::new(config)?;
    info!("Using config: {:#?}", analyser.config());

    info!("Reading spectra from {}", args.input.display());
    let input = BatchInput::from_file(&args.input)?;
    info!(
        "Loaded {} spectra over {} wavelengths",
        input.len(),
        input.wavelengths.len()
    );

    let start = Instant::now();
    let progress = BarProgress::new();
    let cancel = AtomicBool::new(false);
    let options = BatchOptions {
        histograms: !args.no_histograms,
    };
    let result = run_batch(input, &analyser, &progress, &cancel, options)?;
    let elapsed = start.elapsed();
    info!(
        "Analysed {} spectra in {:?} ({:.2} ms/spectrum)",
        result.records.len(),
        elapsed,
        elapsed.as_secs_f64() * 1000.0 / result.records.len().max(1) as f64
    );
    if result.cancelled {
        warn!("Batch did not finish; writing partial results");
    }

    println!("{}", summary_table(&result));
    write_batch_result(&result, &args.output_dir)?;
    println!("Wrote results to {}", args.output_dir.display());
    Ok(())
}

pub fn main_write_template(args: WriteTemplateArgs) -> Result<(), CliError> {
    if let Some(parent) = args.output_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let template = serde_json::to_string_pretty(&AnalysisConfig::default())?;
    std::fs::write(&args.output_path, template)?;
    println!(
        "Wrote analysis config template to: {}",
        args.output_path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_np_size_presets() {
        let config = load_config(None, Some(60)).unwrap();
        assert_eq!(config.peak_find_midpoint_nm, 580.0);
        assert_eq!(config.cm_low_limit_nm, 540.0);
    }

    #[test]
    fn test_unknown_np_size() {
        let err = load_config(None, Some(100)).unwrap_err();
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_template_round_trips() {
        let path = std::env::temp_dir().join(format!(
            "npomsort_template_{}.json",
            std::process::id()
        ));
        main_write_template(WriteTemplateArgs {
            output_path: path.clone(),
        })
        .unwrap();
        let config = load_config(Some(&path), None).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(config, AnalysisConfig::default());
    }
}
