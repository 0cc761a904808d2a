use clap::{
    Parser,
    Subcommand,
};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Classify a batch of dark-field spectra and build the bucket histograms.
    Analyse(AnalyseArgs),
    /// Write the default analysis configuration as JSON.
    WriteTemplate(WriteTemplateArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct AnalyseArgs {
    /// Batch file (.json, .ndjson[.zst], .msgpack[.zst] or .csv).
    pub input: PathBuf,

    /// The path to the json file with the analysis configuration.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory for records.parquet, buckets.json and histograms.json.
    #[arg(short, long, default_value = "npomsort_results")]
    pub output_dir: PathBuf,

    /// Particle diameter in nm; applies the matching peak-finding presets.
    #[arg(long)]
    pub np_size: Option<u32>,

    /// Skip the per-bucket histograms.
    #[arg(long, default_value_t = false)]
    pub no_histograms: bool,
}

#[derive(Parser, Debug)]
pub struct WriteTemplateArgs {
    /// Where to write the configuration template.
    #[arg(short, long)]
    pub output_path: PathBuf,
}
