use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::Context as _;
use serde::Deserialize;
use surge_core::{
    Check, DEFAULT_GRACEFUL_STOP, DEFAULT_THRESHOLD_CHECK_INTERVAL, DEFAULT_TICK, Endpoint,
    HttpTarget, RunConfig, Stage, ThinkTime, ThresholdSet,
};

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Run configuration as written in YAML.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct RunConfigYaml {
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(rename = "startVUs", default)]
    pub start_vus: u64,

    #[serde(default)]
    pub stages: Vec<StageYaml>,

    #[serde(default)]
    pub thresholds: BTreeMap<String, ThresholdYaml>,

    #[serde(default)]
    pub think_time: Option<ThinkTimeYaml>,

    #[serde(rename = "maxVUs", default)]
    pub max_vus: Option<u64>,

    #[serde(default)]
    pub graceful_stop: Option<YamlDuration>,

    #[serde(default)]
    pub tick: Option<YamlDuration>,

    #[serde(default)]
    pub threshold_check_interval: Option<YamlDuration>,

    /// Per-request timeout.
    #[serde(default)]
    pub timeout: Option<YamlDuration>,

    /// `None` keeps the default `/data` + `/job` mix.
    #[serde(default)]
    pub endpoints: Option<Vec<EndpointYaml>>,

    /// `None` keeps the default status and latency checks.
    #[serde(default)]
    pub checks: Option<Vec<CheckYaml>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct StageYaml {
    pub target: u64,
    pub duration: YamlDuration,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum ThresholdYaml {
    One(String),
    Many(Vec<String>),
    Detailed(ThresholdDetailYaml),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct ThresholdDetailYaml {
    pub thresholds: Vec<String>,
    #[serde(default)]
    pub abort_on_fail: bool,
    #[serde(default)]
    pub allow_empty: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum ThinkTimeYaml {
    Fixed(YamlDuration),
    Range { min: YamlDuration, max: YamlDuration },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct EndpointYaml {
    pub path: String,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default = "default_weight")]
    pub weight: u32,
}

fn default_weight() -> u32 {
    1
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct CheckYaml {
    pub name: String,
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub max_duration: Option<YamlDuration>,
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct YamlDuration(Duration);

impl YamlDuration {
    fn into_inner(self) -> Duration {
        self.0
    }
}

impl<'de> Deserialize<'de> for YamlDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct V;

        impl serde::de::Visitor<'_> for V {
            type Value = YamlDuration;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("duration as string (e.g. 30s, 3m), integer seconds, or float seconds")
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(YamlDuration(Duration::from_secs(v)))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                u64::try_from(v)
                    .map(|v| YamlDuration(Duration::from_secs(v)))
                    .map_err(|_| E::custom("duration must not be negative"))
            }

            fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if !v.is_finite() || v < 0.0 {
                    return Err(E::custom("duration must be a non-negative, finite number"));
                }
                Ok(YamlDuration(Duration::from_secs_f64(v)))
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                humantime::parse_duration(v.trim())
                    .map(YamlDuration)
                    .map_err(E::custom)
            }
        }

        deserializer.deserialize_any(V)
    }
}

/// CLI values that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub(crate) struct Overrides {
    pub base_url: Option<String>,
    pub vus_cap: Option<u64>,
    pub graceful_stop: Option<Duration>,
}

#[derive(Debug, Clone)]
pub(crate) struct LoadedConfig {
    pub run: RunConfig,
    pub target: HttpTarget,
}

pub(crate) async fn load(path: &Path, overrides: &Overrides) -> anyhow::Result<LoadedConfig> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read run config: {}", path.display()))?;

    let doc: RunConfigYaml = serde_yaml::from_slice(&bytes)
        .with_context(|| format!("failed to parse YAML: {}", path.display()))?;

    doc.into_config(overrides)
        .with_context(|| format!("invalid run config: {}", path.display()))
}

impl RunConfigYaml {
    pub(crate) fn into_config(self, overrides: &Overrides) -> anyhow::Result<LoadedConfig> {
        let RunConfigYaml {
            base_url,
            start_vus,
            stages,
            thresholds,
            think_time,
            max_vus,
            graceful_stop,
            tick,
            threshold_check_interval,
            timeout,
            endpoints,
            checks,
        } = self;

        let stages = stages
            .into_iter()
            .map(|s| Stage::new(s.duration.into_inner(), s.target))
            .collect();

        let mut run = RunConfig::new(stages);
        run.start_vus = start_vus;
        run.thresholds = thresholds
            .into_iter()
            .map(|(metric, t)| threshold_set(metric, t))
            .collect();
        run.think_time = think_time.map(|t| match t {
            ThinkTimeYaml::Fixed(d) => ThinkTime::fixed(d.into_inner()),
            ThinkTimeYaml::Range { min, max } => ThinkTime {
                min: min.into_inner(),
                max: max.into_inner(),
            },
        });
        run.max_vus = overrides.vus_cap.or(max_vus);
        run.graceful_stop = overrides
            .graceful_stop
            .or(graceful_stop.map(YamlDuration::into_inner))
            .unwrap_or(DEFAULT_GRACEFUL_STOP);
        run.tick = tick.map_or(DEFAULT_TICK, YamlDuration::into_inner);
        run.threshold_check_interval = threshold_check_interval
            .map_or(DEFAULT_THRESHOLD_CHECK_INTERVAL, YamlDuration::into_inner);
        run.validate()?;

        let base_url = overrides
            .base_url
            .clone()
            .or(base_url)
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let mut target = HttpTarget::new(base_url);
        target.timeout = timeout.map(YamlDuration::into_inner);

        if let Some(endpoints) = endpoints {
            target.endpoints = endpoints
                .into_iter()
                .map(endpoint)
                .collect::<anyhow::Result<Vec<_>>>()?;
        }
        if let Some(checks) = checks {
            target.checks = checks
                .into_iter()
                .map(check)
                .collect::<anyhow::Result<Vec<_>>>()?;
        }
        target.validate()?;

        Ok(LoadedConfig { run, target })
    }
}

fn threshold_set(metric: String, yaml: ThresholdYaml) -> ThresholdSet {
    match yaml {
        ThresholdYaml::One(expr) => ThresholdSet::new(metric, [expr]),
        ThresholdYaml::Many(exprs) => ThresholdSet::new(metric, exprs),
        ThresholdYaml::Detailed(d) => ThresholdSet::new(metric, d.thresholds)
            .with_abort_on_fail(d.abort_on_fail)
            .with_allow_empty(d.allow_empty),
    }
}

fn endpoint(yaml: EndpointYaml) -> anyhow::Result<Endpoint> {
    let method = match yaml.method.as_deref() {
        None => http::Method::GET,
        Some(m) => http::Method::from_bytes(m.trim().to_ascii_uppercase().as_bytes())
            .with_context(|| format!("invalid method `{m}` for endpoint {}", yaml.path))?,
    };
    Ok(Endpoint {
        method,
        path: yaml.path,
        weight: yaml.weight,
    })
}

fn check(yaml: CheckYaml) -> anyhow::Result<Check> {
    match (yaml.status, yaml.max_duration) {
        (Some(code), None) => Ok(Check::status(yaml.name, code)),
        (None, Some(limit)) => Ok(Check::duration_below(yaml.name, limit.into_inner())),
        _ => anyhow::bail!(
            "check `{}` must set exactly one of `status` or `maxDuration`",
            yaml.name
        ),
    }
}
