use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::annotate::{ConfidenceFloors, Thresholds};

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");
const ENVIRONMENT_VAR: &str = "LLM_OCR_ENV";
const DEFAULT_ACCEPTED_MIME_TYPES: &[&str] = &[
    "image/png",
    "image/jpeg",
    "image/webp",
    "image/gif",
    "image/bmp",
    "image/heic",
    "image/heif",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Production,
    Development,
}

impl Environment {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "production" | "prod" => Some(Environment::Production),
            "development" | "dev" | "local" => Some(Environment::Development),
            _ => None,
        }
    }
}

/// Process-wide configuration. Built once at startup and shared read-only.
#[derive(Debug, Clone)]
pub struct Settings {
    pub addr: String,
    pub environment: Environment,
    pub request_timeout: Duration,
    pub read_timeout: Duration,
    pub max_payload_bytes: usize,
    pub accepted_mime_types: Vec<String>,
    pub model: Option<String>,
    pub max_concurrent: usize,
    pub confidence: ConfidenceFloors,
    pub thresholds: Thresholds,
    pub stroke_complexity_ceiling: f64,
    pub structure_anomaly_weight: f64,
    pub min_quality_score: f64,
    pub low_quality_min_side: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:3000".to_string(),
            environment: Environment::Production,
            request_timeout: Duration::from_secs(60),
            read_timeout: Duration::from_secs(30),
            max_payload_bytes: 10 * 1024 * 1024,
            accepted_mime_types: DEFAULT_ACCEPTED_MIME_TYPES
                .iter()
                .map(|value| value.to_string())
                .collect(),
            model: None,
            max_concurrent: 5,
            confidence: ConfidenceFloors {
                printed: 0.8,
                handwritten: 0.6,
            },
            thresholds: Thresholds {
                base: 0.6,
                image_quality_factor: 0.3,
                content_type_factor: 0.2,
            },
            stroke_complexity_ceiling: 2.0,
            structure_anomaly_weight: 0.3,
            min_quality_score: 0.7,
            low_quality_min_side: 800,
        }
    }
}

impl Settings {
    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    pub fn accepts_mime(&self, mime: &str) -> bool {
        let lower = mime.trim().to_lowercase();
        self.accepted_mime_types.iter().any(|value| *value == lower)
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    server: Option<ServerSettings>,
    provider: Option<ProviderSettings>,
    scheduler: Option<SchedulerSettings>,
    confidence: Option<ConfidenceSettings>,
    threshold: Option<ThresholdSettings>,
    annotate: Option<AnnotateSettings>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerSettings {
    addr: Option<String>,
    environment: Option<String>,
    request_timeout_secs: Option<u64>,
    read_timeout_secs: Option<u64>,
    max_payload_bytes: Option<usize>,
    accepted_mime_types: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct ProviderSettings {
    model: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SchedulerSettings {
    max_concurrent: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct ConfidenceSettings {
    printed: Option<f64>,
    handwritten: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct ThresholdSettings {
    base: Option<f64>,
    image_quality_factor: Option<f64>,
    content_type_factor: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct AnnotateSettings {
    stroke_complexity_ceiling: Option<f64>,
    structure_anomaly_weight: Option<f64>,
    min_quality_score: Option<f64>,
    low_quality_min_side: Option<u32>,
}

pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::default();
    settings.merge_str(DEFAULT_SETTINGS_TOML, "built-in settings")?;

    let mut ordered_paths = Vec::new();
    ordered_paths.push(PathBuf::from("settings.toml"));
    ordered_paths.push(PathBuf::from("settings.local.toml"));

    if let Some(home) = home_dir() {
        ordered_paths.push(home.join("settings.toml"));
        ordered_paths.push(home.join("settings.local.toml"));
    }

    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    for path in ordered_paths {
        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed to read settings: {}", path.display()))?;
            settings.merge_str(&content, &path.display().to_string())?;
        }
    }

    if let Some(environment) = std::env::var(ENVIRONMENT_VAR)
        .ok()
        .and_then(|value| Environment::parse(&value))
    {
        settings.environment = environment;
    }

    Ok(settings)
}

impl Settings {
    fn merge_str(&mut self, content: &str, origin: &str) -> Result<()> {
        let parsed: SettingsFile = toml::from_str(content)
            .with_context(|| format!("failed to parse settings: {}", origin))?;
        self.merge(parsed);
        Ok(())
    }

    fn merge(&mut self, incoming: SettingsFile) {
        if let Some(server) = incoming.server {
            if let Some(addr) = server.addr
                && !addr.trim().is_empty()
            {
                self.addr = addr;
            }
            if let Some(environment) = server.environment.as_deref().and_then(Environment::parse) {
                self.environment = environment;
            }
            if let Some(secs) = server.request_timeout_secs
                && secs > 0
            {
                self.request_timeout = Duration::from_secs(secs);
            }
            if let Some(secs) = server.read_timeout_secs
                && secs > 0
            {
                self.read_timeout = Duration::from_secs(secs);
            }
            if let Some(limit) = server.max_payload_bytes
                && limit > 0
            {
                self.max_payload_bytes = limit;
            }
            if let Some(types) = server.accepted_mime_types {
                self.accepted_mime_types = types
                    .into_iter()
                    .map(|value| value.trim().to_lowercase())
                    .filter(|value| !value.is_empty())
                    .collect();
            }
        }
        if let Some(provider) = incoming.provider
            && let Some(model) = provider.model
            && !model.trim().is_empty()
        {
            self.model = Some(model);
        }
        if let Some(scheduler) = incoming.scheduler
            && let Some(limit) = scheduler.max_concurrent
            && limit > 0
        {
            self.max_concurrent = limit;
        }
        if let Some(confidence) = incoming.confidence {
            if let Some(value) = confidence.printed {
                self.confidence.printed = value;
            }
            if let Some(value) = confidence.handwritten {
                self.confidence.handwritten = value;
            }
        }
        if let Some(threshold) = incoming.threshold {
            if let Some(value) = threshold.base {
                self.thresholds.base = value;
            }
            if let Some(value) = threshold.image_quality_factor {
                self.thresholds.image_quality_factor = value;
            }
            if let Some(value) = threshold.content_type_factor {
                self.thresholds.content_type_factor = value;
            }
        }
        if let Some(annotate) = incoming.annotate {
            if let Some(value) = annotate.stroke_complexity_ceiling
                && value > 0.0
            {
                self.stroke_complexity_ceiling = value;
            }
            if let Some(value) = annotate.structure_anomaly_weight {
                self.structure_anomaly_weight = value;
            }
            if let Some(value) = annotate.min_quality_score {
                self.min_quality_score = value;
            }
            if let Some(value) = annotate.low_quality_min_side {
                self.low_quality_min_side = value;
            }
        }
    }
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().and_then(|home| {
        let home = home.trim();
        if home.is_empty() {
            None
        } else {
            Some(Path::new(home).join(".llm-ocr-rust"))
        }
    })
}
