use std::path::Path;

use surge_core::{ProgressFn, RunReport};

use crate::cli::OutputFormat;
use crate::config_file::LoadedConfig;

mod human;
mod json;
mod view;

pub(crate) trait OutputFormatter: Send + Sync {
    fn print_header(&self, config_path: &Path, config: &LoadedConfig);
    fn progress(&self) -> Option<ProgressFn>;
    fn print_summary(&self, report: &RunReport) -> anyhow::Result<()>;
}

pub(crate) fn formatter(format: OutputFormat) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::HumanReadable => Box::new(human::HumanReadableOutput::new()),
        OutputFormat::Json => Box::new(json::JsonOutput),
    }
}
