use crate::domain::aggregation::QualifyingFraction;
use crate::domain::classification::{
    NumericScale, ThresholdPolicy, ThresholdStep, DEFAULT_ABOVE_COLOR, DEFAULT_BELOW_COLOR,
};
use crate::domain::widget::{WidgetMode, WidgetSpec, DEFAULT_BUCKET_COUNT};
use crate::infrastructure::error::ConfigError;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;

const ENV_PREFIX: &str = "HISTORY_STRIP";

#[derive(Debug, Deserialize, Clone)]
pub struct HostConfig {
    pub host: HostSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HostSettings {
    pub url: String,
    pub token: String,
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_history_path")]
    pub history_path: String,
    #[serde(default = "default_state_path")]
    pub state_path: String,
}

impl HostSettings {
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.listen
            .parse()
            .map_err(|_| ConfigError::ListenAddress(self.listen.clone()))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct WidgetsConfig {
    #[serde(default)]
    pub widgets: Vec<WidgetConfig>,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ModeConfig {
    Numeric,
    Uptime,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WidgetConfig {
    pub id: String,
    pub entity: String,
    #[serde(default = "default_hours")]
    pub hours: f64,
    #[serde(default = "default_bucket_count")]
    pub bucket_count: usize,
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
    pub mode: ModeConfig,
    pub min: Option<f64>,
    pub max: Option<f64>,
    #[serde(default = "default_plot_width")]
    pub plot_width: f64,
    #[serde(default = "default_plot_height")]
    pub plot_height: f64,
    #[serde(default = "default_ok_states")]
    pub ok_states: Vec<String>,
    #[serde(default)]
    pub thresholds: Vec<ThresholdConfig>,
    #[serde(default)]
    pub fallback_colors: FallbackColors,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ThresholdConfig {
    pub value: f64,
    pub color: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FallbackColors {
    #[serde(default = "default_above_color")]
    pub above: String,
    #[serde(default = "default_below_color")]
    pub below: String,
}

impl Default for FallbackColors {
    fn default() -> Self {
        Self {
            above: default_above_color(),
            below: default_below_color(),
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_history_path() -> String {
    "api/history/period/${start}?filter_entity_id=${entity}&end_time=${end}&minimal_response".to_string()
}

fn default_state_path() -> String {
    "api/states/${entity}".to_string()
}

fn default_hours() -> f64 {
    24.0
}

fn default_bucket_count() -> usize {
    DEFAULT_BUCKET_COUNT
}

fn default_refresh_interval_secs() -> u64 {
    60
}

fn default_plot_width() -> f64 {
    500.0
}

fn default_plot_height() -> f64 {
    100.0
}

fn default_ok_states() -> Vec<String> {
    vec!["on".to_string()]
}

fn default_above_color() -> String {
    DEFAULT_ABOVE_COLOR.to_string()
}

fn default_below_color() -> String {
    DEFAULT_BELOW_COLOR.to_string()
}

/// Longest window a widget may show. Keeps `now - span` representable.
const MAX_WINDOW_HOURS: f64 = 87_600.0;

fn window_span(hours: f64) -> Option<chrono::TimeDelta> {
    if !(hours.is_finite() && hours <= MAX_WINDOW_HOURS) {
        return None;
    }
    let ms = (hours * 3_600_000.0).round();
    if ms < 1.0 {
        return None;
    }
    chrono::TimeDelta::try_milliseconds(ms as i64)
}

impl WidgetConfig {
    pub fn into_spec(self) -> Result<WidgetSpec, ConfigError> {
        let invalid = |field, requirement| ConfigError::Invalid {
            widget: self.id.clone(),
            field,
            requirement,
        };

        if self.entity.trim().is_empty() {
            return Err(invalid("entity", "non-empty"));
        }
        let span = window_span(self.hours).ok_or_else(|| invalid("hours", "between 1 ms and 10 years"))?;
        if self.bucket_count == 0 {
            return Err(invalid("bucket_count", "at least 1"));
        }
        if self.refresh_interval_secs == 0 {
            return Err(invalid("refresh_interval_secs", "at least 1"));
        }
        if let (Some(min), Some(max)) = (self.min, self.max) {
            if min >= max {
                return Err(ConfigError::InvertedRange {
                    widget: self.id.clone(),
                    min,
                    max,
                });
            }
        }

        let mode = match self.mode {
            ModeConfig::Numeric => {
                if !(self.plot_height > 0.0 && self.plot_width > 0.0) {
                    return Err(invalid("plot_width and plot_height", "positive"));
                }
                WidgetMode::Numeric {
                    scale: NumericScale::new(self.min, self.max, self.plot_height),
                    plot_width: self.plot_width,
                }
            }
            ModeConfig::Uptime => WidgetMode::Uptime {
                fraction: QualifyingFraction::new(self.ok_states),
                thresholds: ThresholdPolicy::new(
                    self.thresholds
                        .into_iter()
                        .map(|t| ThresholdStep {
                            value: t.value,
                            color: t.color,
                        })
                        .collect(),
                    self.fallback_colors.above,
                    self.fallback_colors.below,
                ),
            },
        };

        Ok(WidgetSpec {
            id: self.id,
            entity: self.entity,
            span,
            bucket_count: self.bucket_count,
            refresh_interval: std::time::Duration::from_secs(self.refresh_interval_secs),
            mode,
        })
    }
}

impl WidgetsConfig {
    pub fn into_specs(self) -> Result<Vec<WidgetSpec>, ConfigError> {
        let mut seen = HashSet::new();
        self.widgets
            .into_iter()
            .map(|widget| {
                if !seen.insert(widget.id.clone()) {
                    return Err(ConfigError::DuplicateId(widget.id));
                }
                widget.into_spec()
            })
            .collect()
    }
}

pub fn load_host_config() -> anyhow::Result<HostConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/host"))
        .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()?;

    Ok(settings.try_deserialize()?)
}

pub fn load_widgets_config() -> anyhow::Result<WidgetsConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/widgets"))
        .build()?;

    Ok(settings.try_deserialize()?)
}

/// Replace `${name}` placeholders in a template
pub fn render_template(template: &str, vars: &HashMap<&str, String>) -> String {
    let mut result = template.to_string();
    for (key, value) in vars {
        let placeholder = format!("${{{}}}", key);
        result = result.replace(&placeholder, value);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::classification::Category;

    fn parse_widgets(toml: &str) -> WidgetsConfig {
        config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_render_template() {
        let mut vars = HashMap::new();
        vars.insert("entity", "sensor.outdoor".to_string());
        vars.insert("start", "2024-05-01T10:00:00Z".to_string());

        let path = "api/history/period/${start}?filter_entity_id=${entity}";
        let result = render_template(path, &vars);

        assert_eq!(result, "api/history/period/2024-05-01T10:00:00Z?filter_entity_id=sensor.outdoor");
    }

    #[test]
    fn test_widget_defaults() {
        let config = parse_widgets(
            r#"
            [[widgets]]
            id = "outdoor"
            entity = "sensor.outdoor_temperature"
            mode = "numeric"
            "#,
        );
        let specs = config.into_specs().unwrap();

        assert_eq!(specs.len(), 1);
        let spec = &specs[0];
        assert_eq!(spec.bucket_count, 50);
        assert_eq!(spec.span, chrono::Duration::hours(24));
        assert_eq!(spec.refresh_interval, std::time::Duration::from_secs(60));
        assert_eq!(
            spec.mode,
            WidgetMode::Numeric {
                scale: NumericScale::new(None, None, 100.0),
                plot_width: 500.0,
            }
        );
    }

    #[test]
    fn test_uptime_widget() {
        let config = parse_widgets(
            r##"
            [[widgets]]
            id = "router"
            entity = "binary_sensor.router"
            mode = "uptime"
            hours = 1.5
            bucket_count = 30
            ok_states = ["on", "home"]

            [[widgets.thresholds]]
            value = 99.0
            color = "#ff9800"

            [[widgets.thresholds]]
            value = 50.0
            color = "#f44336"
            "##,
        );
        let spec = config.into_specs().unwrap().remove(0);

        assert_eq!(spec.span, chrono::Duration::minutes(90));
        let WidgetMode::Uptime { fraction, thresholds } = &spec.mode else {
            panic!("expected uptime mode");
        };
        assert!(fraction.qualifies("home"));
        assert!(!fraction.qualifies("off"));
        assert_eq!(thresholds.steps()[0].value, 50.0);
        assert_eq!(thresholds.color_for(75.0), "#ff9800");

        let mut buckets = vec![crate::domain::aggregation::Bucket {
            index: 0,
            start: chrono::Utc::now(),
            end: chrono::Utc::now(),
            aggregate: Some(10.0),
            category: None,
        }];
        thresholds.classify(&mut buckets);
        assert_eq!(buckets[0].category, Some(Category::Color("#f44336".to_string())));
    }

    #[test]
    fn test_validation_errors() {
        let base = WidgetConfig {
            id: "w".to_string(),
            entity: "sensor.w".to_string(),
            hours: 24.0,
            bucket_count: 50,
            refresh_interval_secs: 60,
            mode: ModeConfig::Numeric,
            min: None,
            max: None,
            plot_width: 500.0,
            plot_height: 100.0,
            ok_states: default_ok_states(),
            thresholds: Vec::new(),
            fallback_colors: FallbackColors::default(),
        };

        let zero_buckets = WidgetConfig { bucket_count: 0, ..base.clone() };
        assert!(matches!(
            zero_buckets.into_spec(),
            Err(ConfigError::Invalid { field: "bucket_count", .. })
        ));

        for hours in [0.0, -1.0, 1e-9, 1e10, f64::NAN, f64::INFINITY] {
            let bad_hours = WidgetConfig { hours, ..base.clone() };
            assert!(
                matches!(bad_hours.into_spec(), Err(ConfigError::Invalid { field: "hours", .. })),
                "hours = {hours}"
            );
        }

        let longest = WidgetConfig { hours: MAX_WINDOW_HOURS, ..base.clone() }.into_spec().unwrap();
        assert!(!longest.window_ending_at(chrono::Utc::now()).is_empty());
        let shortest = WidgetConfig { hours: 1.0 / 3_600_000.0, ..base.clone() }.into_spec().unwrap();
        assert_eq!(shortest.span, chrono::Duration::milliseconds(1));

        let blank_entity = WidgetConfig { entity: " ".to_string(), ..base.clone() };
        assert!(matches!(blank_entity.into_spec(), Err(ConfigError::Invalid { field: "entity", .. })));

        let inverted = WidgetConfig { min: Some(10.0), max: Some(5.0), ..base.clone() };
        assert_eq!(
            inverted.into_spec().unwrap_err(),
            ConfigError::InvertedRange { widget: "w".to_string(), min: 10.0, max: 5.0 }
        );

        let duplicated = WidgetsConfig { widgets: vec![base.clone(), base] };
        assert_eq!(duplicated.into_specs().unwrap_err(), ConfigError::DuplicateId("w".to_string()));
    }

    #[test]
    fn test_listen_addr() {
        let settings = HostSettings {
            url: "http://homeassistant.local:8123".to_string(),
            token: "secret".to_string(),
            listen: default_listen(),
            request_timeout_secs: default_request_timeout_secs(),
            history_path: default_history_path(),
            state_path: default_state_path(),
        };
        assert_eq!(settings.listen_addr().unwrap().port(), 8080);

        let bad = HostSettings { listen: "nowhere".to_string(), ..settings };
        assert_eq!(bad.listen_addr().unwrap_err(), ConfigError::ListenAddress("nowhere".to_string()));
    }
}
