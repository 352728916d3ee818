use std::path::Path;
use std::sync::Arc;

mod format;
mod progress;
mod summary;

use format::{format_bytes, format_duration, format_ms_opt, format_rate};
use progress::HumanProgress;
use summary::render;
use surge_core::{ProgressFn, RunReport};

use super::OutputFormatter;
use crate::config_file::LoadedConfig;

pub(crate) struct HumanReadableOutput {
    progress: Arc<HumanProgress>,
}

impl HumanReadableOutput {
    pub(crate) fn new() -> Self {
        Self {
            progress: Arc::new(HumanProgress::new()),
        }
    }
}

impl OutputFormatter for HumanReadableOutput {
    fn print_header(&self, config_path: &Path, config: &LoadedConfig) {
        println!("config: {}", config_path.display());
        println!("target: {}", config.target.base_url);
        let endpoints = config
            .target
            .endpoints
            .iter()
            .map(|e| format!("{} {} (w={})", e.method, e.path, e.weight))
            .collect::<Vec<_>>()
            .join(", ");
        println!("endpoints: {endpoints}");
        println!(
            "stages: {} duration={} start_vus={} max_vus={}",
            config.run.stages.len(),
            format_duration(config.run.total_duration()),
            config.run.start_vus,
            config
                .run
                .max_vus
                .map_or_else(|| "unlimited".to_string(), |v| v.to_string())
        );
        println!();
    }

    fn progress(&self) -> Option<ProgressFn> {
        let progress = self.progress.clone();

        Some(Arc::new(move |u| {
            let m = &u.metrics;
            let throughput_per_sec = m
                .bytes_received_per_sec_now
                .saturating_add(m.bytes_sent_per_sec_now);

            let stage = u.stage.as_ref().map_or_else(String::new, |s| {
                format!(
                    "stage={}/{} stage_remaining={} ",
                    s.stage,
                    s.stages,
                    format_duration(s.stage_remaining)
                )
            });

            let message = format!(
                "{stage}vus={}/{} elapsed={} iters/s={} rps={} tps={}/s errors={:.2}% p95={}",
                u.vus,
                u.vus_target,
                format_duration(u.elapsed),
                format_rate(m.iterations_per_sec_now),
                format_rate(m.rps_now),
                format_bytes(throughput_per_sec),
                m.error_rate_now * 100.0,
                format_ms_opt(m.latency_p95_ms),
            );

            progress.update(u.total_duration, u.elapsed, message);
        }))
    }

    fn print_summary(&self, report: &RunReport) -> anyhow::Result<()> {
        self.progress.finish();
        print!("{}", render(report));

        if !report.result.failed_thresholds.is_empty() {
            eprintln!("thresholds failed:");
            for f in &report.result.failed_thresholds {
                match f.observed {
                    Some(obs) => eprintln!("  {}: {} (observed {obs})", f.metric, f.expression),
                    None => eprintln!("  {}: {} ({})", f.metric, f.expression, f.reason),
                }
            }
        }

        Ok(())
    }
}
