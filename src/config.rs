use crate::core::metric::Metric;
use crate::core::network::FrequencyBand;
use crate::core::settings::ConnectivitySettings;
use crate::core::taper::TaperKind;
use crate::core::trial::Trial;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TaperSetting {
    #[default]
    Dpss,
    Hann,
    Rectangular,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "AnalysisConfig::default_sampling_rate")]
    pub sampling_rate: f64,
    /// 0 = trial sample count
    #[serde(default)]
    pub fft_len: usize,
    #[serde(default)]
    pub taper: TaperSetting,
    #[serde(default = "AnalysisConfig::default_half_bandwidth")]
    pub half_bandwidth: f64,
    #[serde(default = "AnalysisConfig::default_low_bias")]
    pub low_bias: bool,
    /// 0 = available parallelism
    #[serde(default)]
    pub workers: usize,
    #[serde(default)]
    pub metric: Metric,
}

impl AnalysisConfig {
    fn default_sampling_rate() -> f64 {
        256.0
    }
    fn default_half_bandwidth() -> f64 {
        4.0
    }
    fn default_low_bias() -> bool {
        true
    }

    pub fn taper_kind(&self) -> TaperKind {
        match self.taper {
            TaperSetting::Dpss => TaperKind::Dpss {
                half_bandwidth: self.half_bandwidth,
                low_bias: self.low_bias,
            },
            TaperSetting::Hann => TaperKind::Hann,
            TaperSetting::Rectangular => TaperKind::Rectangular,
        }
    }

    pub fn to_settings(&self, trials: Vec<Trial>) -> ConnectivitySettings {
        let mut settings = ConnectivitySettings::new(trials, self.sampling_rate)
            .with_taper(self.taper_kind())
            .with_workers(self.workers);
        if self.fft_len > 0 {
            settings = settings.with_fft_len(self.fft_len);
        }
        settings
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            sampling_rate: Self::default_sampling_rate(),
            fft_len: 0,
            taper: TaperSetting::default(),
            half_bandwidth: Self::default_half_bandwidth(),
            low_bias: Self::default_low_bias(),
            workers: 0,
            metric: Metric::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "OutputConfig::default_band_min_hz")]
    pub band_min_hz: f64,
    #[serde(default = "OutputConfig::default_band_max_hz")]
    pub band_max_hz: f64,
    #[serde(default = "OutputConfig::default_threshold")]
    pub threshold: f64,
}

impl OutputConfig {
    fn default_band_min_hz() -> f64 {
        8.0
    }
    fn default_band_max_hz() -> f64 {
        12.0
    }
    fn default_threshold() -> f64 {
        0.5
    }

    /// Reporting band; an empty or inverted range means the whole spectrum.
    pub fn band(&self) -> Option<FrequencyBand> {
        (self.band_max_hz > self.band_min_hz).then(|| FrequencyBand::new(self.band_min_hz, self.band_max_hz))
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            band_min_hz: Self::default_band_min_hz(),
            band_max_hz: Self::default_band_max_hz(),
            threshold: Self::default_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl AppConfig {
    fn round_f64(x: f64) -> f64 {
        (x * 1_000_000.0).round() / 1_000_000.0
    }

    fn format_f64_compact(x: f64) -> String {
        let mut s = format!("{:.6}", x);
        while s.contains('.') && s.ends_with('0') {
            s.pop();
        }
        if s.ends_with('.') {
            s.pop();
        }
        if s.is_empty() { "0".to_string() } else { s }
    }

    fn rounded(mut self) -> Self {
        self.analysis.sampling_rate = Self::round_f64(self.analysis.sampling_rate);
        self.analysis.half_bandwidth = Self::round_f64(self.analysis.half_bandwidth);
        self.output.band_min_hz = Self::round_f64(self.output.band_min_hz);
        self.output.band_max_hz = Self::round_f64(self.output.band_max_hz);
        self.output.threshold = Self::round_f64(self.output.threshold);
        self
    }

    /// Comment out every key so the written file documents defaults
    /// without pinning them.
    fn commented_defaults(text: &str) -> String {
        let mut commented = String::new();
        for line in text.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                commented.push('\n');
            } else if trimmed.starts_with('[') && trimmed.ends_with(']') {
                commented.push_str(line);
                commented.push('\n');
            } else {
                let mut out_line = line.to_string();
                if let Some((lhs, rhs)) = line.split_once('=') {
                    let rhs_trim = rhs.trim();
                    let has_decimal = rhs_trim.contains('.');
                    if (has_decimal || rhs_trim.contains('e') || rhs_trim.contains('E'))
                        && !rhs_trim.contains('"')
                        && rhs_trim != "true"
                        && rhs_trim != "false"
                    {
                        if let Ok(val) = rhs_trim.parse::<f64>() {
                            let mut formatted = Self::format_f64_compact(val);
                            if has_decimal && !formatted.contains('.') {
                                formatted.push_str(".0");
                            }
                            out_line = format!("{} = {}", lhs.trim(), formatted);
                        }
                    }
                }
                commented.push_str("# ");
                commented.push_str(&out_line);
                commented.push('\n');
            }
        }
        commented
    }

    pub fn load_or_default(path: &str) -> Self {
        let path_obj = Path::new(path);
        if path_obj.exists() {
            match fs::read_to_string(path_obj) {
                Ok(contents) => match toml::from_str(&contents) {
                    Ok(cfg) => return cfg,
                    Err(err) => {
                        warn!("Failed to parse config {path}: {err}. Using defaults.");
                    }
                },
                Err(err) => {
                    warn!("Failed to read config {path}: {err}. Using defaults.");
                }
            }
            return Self::default();
        }

        // File does not exist: write defaults and return them.
        let default_cfg = Self::default().rounded();
        match toml::to_string_pretty(&default_cfg) {
            Ok(text) => {
                if let Err(err) = fs::write(path_obj, Self::commented_defaults(&text)) {
                    warn!("Failed to write default config to {path}: {err}");
                }
            }
            Err(err) => warn!("Failed to serialize default config: {err}; continuing with defaults"),
        }
        default_cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn unique_path(name: &str) -> std::path::PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!(
            "lagnet_config_test_{}_{}",
            name,
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        p
    }

    #[test]
    fn load_or_default_writes_defaults_cleanly() {
        let path = unique_path("defaults.toml");
        let path_str = path.to_string_lossy().to_string();
        let _ = fs::remove_file(&path);

        let cfg = AppConfig::load_or_default(&path_str);
        assert!(path.exists(), "config file should be created");
        assert_eq!(cfg.analysis.sampling_rate, 256.0);
        assert_eq!(cfg.analysis.fft_len, 0);
        assert_eq!(cfg.analysis.taper, TaperSetting::Dpss);
        assert_eq!(cfg.analysis.metric, Metric::DebiasedSquaredWpli);
        assert_eq!(cfg.output.threshold, 0.5);

        let contents = fs::read_to_string(&path).expect("read written config");
        assert!(contents.contains("[analysis]"), "section headers stay live");
        assert!(
            contents.contains("# half_bandwidth = 4.0"),
            "should write commented half_bandwidth"
        );
        assert!(
            contents.contains("# taper = \"dpss\""),
            "should write commented taper"
        );
        assert!(
            contents.contains("# metric = \"debiased-squared-wpli\""),
            "should write commented metric"
        );
        assert!(
            contents.contains("# low_bias = true"),
            "should write commented low_bias"
        );

        // The commented file parses back to defaults.
        let reread = AppConfig::load_or_default(&path_str);
        assert_eq!(reread.analysis.half_bandwidth, 4.0);
        assert_eq!(reread.output.band_max_hz, 12.0);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn load_or_default_reads_existing() {
        let path = unique_path("custom.toml");
        let path_str = path.to_string_lossy().to_string();
        let custom = AppConfig {
            analysis: AnalysisConfig {
                sampling_rate: 500.0,
                fft_len: 1024,
                taper: TaperSetting::Hann,
                half_bandwidth: 2.5,
                low_bias: false,
                workers: 3,
                metric: Metric::Wpli,
            },
            output: OutputConfig {
                band_min_hz: 30.0,
                band_max_hz: 45.0,
                threshold: 0.25,
            },
        };
        let text = toml::to_string_pretty(&custom).unwrap();
        fs::write(&path, text).unwrap();

        let cfg = AppConfig::load_or_default(&path_str);
        assert_eq!(cfg.analysis.sampling_rate, 500.0);
        assert_eq!(cfg.analysis.fft_len, 1024);
        assert_eq!(cfg.analysis.taper, TaperSetting::Hann);
        assert_eq!(cfg.analysis.half_bandwidth, 2.5);
        assert!(!cfg.analysis.low_bias);
        assert_eq!(cfg.analysis.workers, 3);
        assert_eq!(cfg.analysis.metric, Metric::Wpli);
        assert_eq!(cfg.output.band(), Some(FrequencyBand::new(30.0, 45.0)));
        assert_eq!(cfg.output.threshold, 0.25);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn unparsable_file_falls_back_to_defaults() {
        let path = unique_path("broken.toml");
        let path_str = path.to_string_lossy().to_string();
        fs::write(&path, "[analysis\nsampling_rate = ").unwrap();

        let cfg = AppConfig::load_or_default(&path_str);
        assert_eq!(cfg.analysis.sampling_rate, 256.0);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn partial_sections_keep_field_defaults() {
        let cfg: AppConfig = toml::from_str("[analysis]\ntaper = \"rectangular\"\n").unwrap();
        assert_eq!(cfg.analysis.taper, TaperSetting::Rectangular);
        assert_eq!(cfg.analysis.half_bandwidth, 4.0);
        assert!(cfg.analysis.low_bias);
        assert_eq!(cfg.output.band_min_hz, 8.0);
    }

    #[test]
    fn to_settings_maps_zero_to_automatic() {
        let trial = Trial::from_rows(&[vec![0.0; 16], vec![1.0; 16]]).unwrap();
        let auto = AnalysisConfig::default().to_settings(vec![trial.clone()]);
        assert_eq!(auto.fft_len, None);
        assert_eq!(auto.workers, None);
        assert_eq!(
            auto.taper,
            TaperKind::Dpss {
                half_bandwidth: 4.0,
                low_bias: true
            }
        );

        let fixed = AnalysisConfig {
            fft_len: 32,
            workers: 2,
            taper: TaperSetting::Hann,
            ..AnalysisConfig::default()
        }
        .to_settings(vec![trial]);
        assert_eq!(fixed.fft_len, Some(32));
        assert_eq!(fixed.workers.map(|w| w.get()), Some(2));
        assert_eq!(fixed.taper, TaperKind::Hann);
        assert_eq!(fixed.n_trials(), 1);
    }

    #[test]
    fn inverted_band_means_whole_spectrum() {
        let out = OutputConfig {
            band_min_hz: 10.0,
            band_max_hz: 0.0,
            threshold: 0.0,
        };
        assert_eq!(out.band(), None);
    }
}
