use crate::Result;
use camino::{Utf8Path, Utf8PathBuf};
use ohno::{IntoAppError, app_err, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;

/// The default configuration YAML content, embedded from `default_config.yml`
pub const DEFAULT_CONFIG_YAML: &str = include_str!("../../default_config.yml");

/// GitHub's search API never returns more than this many results per query
const GITHUB_SEARCH_RESULT_LIMIT: usize = 100;

fn default_source_directory() -> Utf8PathBuf {
    Utf8PathBuf::from(".")
}

fn default_records_directory() -> Utf8PathBuf {
    Utf8PathBuf::from("software")
}

const fn default_commit_history_fetch_months() -> u32 {
    3
}

const fn default_commit_history_clean_months() -> u32 {
    12
}

const fn default_sleep_time() -> f64 {
    5.0
}

const fn default_batch_size_github() -> usize {
    25
}

const fn default_batch_size_gitlab() -> usize {
    10
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_request_timeout() -> u64 {
    60
}

const fn default_last_updated_info_days() -> u32 {
    186
}

const fn default_last_updated_warning_days() -> u32 {
    365
}

const fn default_last_updated_error_days() -> u32 {
    3650
}

fn default_github_api_url() -> String {
    "https://api.github.com/graphql".to_string()
}

fn default_gitlab_api_url() -> String {
    "https://gitlab.com/api/graphql".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Root directory of the catalog
    #[serde(default = "default_source_directory")]
    pub source_directory: Utf8PathBuf,

    /// Directory holding the record files, relative to `source_directory`
    #[serde(default = "default_records_directory")]
    pub records_directory: Utf8PathBuf,

    /// Only query repositories whose records lack at least one metadata field
    #[serde(default)]
    pub metadata_only_missing: bool,

    /// Number of trailing months of commit counts fetched per run
    #[serde(default = "default_commit_history_fetch_months")]
    pub commit_history_fetch_months: u32,

    /// Number of trailing months of commit history retained in a record
    #[serde(default = "default_commit_history_clean_months")]
    pub commit_history_clean_months: u32,

    /// Seconds between batches, and the base delay for backoff
    #[serde(default = "default_sleep_time")]
    pub sleep_time: f64,

    #[serde(default = "default_batch_size_github")]
    pub batch_size_github: usize,

    #[serde(default = "default_batch_size_gitlab")]
    pub batch_size_gitlab: usize,

    /// Attempts per batch before a transient failure becomes permanent
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,

    /// Days without a commit after which `stale` lists a record as aging
    #[serde(default = "default_last_updated_info_days")]
    pub last_updated_info_days: u32,

    /// Days without a commit after which `stale` lists a record as stale
    #[serde(default = "default_last_updated_warning_days")]
    pub last_updated_warning_days: u32,

    /// Days without a commit after which `stale` lists a record as abandoned
    #[serde(default = "default_last_updated_error_days")]
    pub last_updated_error_days: u32,

    #[serde(default = "default_github_api_url")]
    pub github_api_url: String,

    #[serde(default = "default_gitlab_api_url")]
    pub gitlab_api_url: String,
}

impl Config {
    /// Load configuration from a file or use defaults
    ///
    /// Returns the configuration along with any non-fatal warnings.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if a setting is unusable
    pub fn load(base_dir: &Utf8Path, config_path: Option<&Utf8PathBuf>) -> Result<(Self, Vec<String>)> {
        let (final_path, text) = if let Some(path) = config_path {
            let text = fs::read_to_string(path).into_app_err_with(|| format!("reading catalog-meta configuration from {path}"))?;
            (path.clone(), text)
        } else {
            let candidates = [
                base_dir.join("catalog.toml"),
                base_dir.join("catalog.yml"),
                base_dir.join("catalog.yaml"),
                base_dir.join("catalog.json"),
            ];

            let mut found = None;
            for path in &candidates {
                match fs::read_to_string(path) {
                    Ok(text) => {
                        found = Some((path.clone(), text));
                        break;
                    }
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e).into_app_err_with(|| format!("reading catalog-meta configuration from {path}")),
                }
            }

            let Some(result) = found else {
                let config = Self::default();
                let mut warnings = Vec::new();
                config.validate(&mut warnings)?;
                return Ok((config, warnings));
            };
            result
        };

        let config = Self::parse(&final_path, &text)?;
        let mut warnings = Vec::new();
        config
            .validate(&mut warnings)
            .into_app_err_with(|| format!("validating configuration from {final_path}"))?;
        Ok((config, warnings))
    }

    fn parse(path: &Utf8Path, text: &str) -> Result<Self> {
        let extension = path.extension().unwrap_or_default();
        let config = match extension {
            "toml" => toml::from_str(text).into_app_err_with(|| format!("parsing TOML configuration from {path}"))?,
            "yml" | "yaml" => serde_yaml::from_str(text).into_app_err_with(|| format!("parsing YAML configuration from {path}"))?,
            "json" => serde_json::from_str(text).into_app_err_with(|| format!("parsing JSON configuration from {path}"))?,
            _ => bail!("unsupported configuration file extension: {extension}"),
        };
        Ok(config)
    }

    /// Save configuration to a file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or serialization fails
    pub fn save(&self, output_path: &Utf8Path) -> Result<()> {
        let extension = output_path.extension().unwrap_or_default();
        let text = match extension {
            "toml" => toml::to_string_pretty(self)
                .into_app_err_with(|| format!("serializing configuration to TOML for saving to {output_path}"))?,
            "yml" | "yaml" => serde_yaml::to_string(self)
                .into_app_err_with(|| format!("serializing configuration to YAML for saving to {output_path}"))?,
            "json" => serde_json::to_string_pretty(self)
                .into_app_err_with(|| format!("serializing configuration to JSON for saving to {output_path}"))?,
            _ => return Err(app_err!("unsupported configuration file extension: {extension}")),
        };

        fs::write(output_path, text).into_app_err_with(|| format!("writing configuration to {output_path}"))?;
        Ok(())
    }

    /// Save the default configuration to a file, preserving comments for YAML and TOML
    ///
    /// YAML output is the embedded `default_config.yml` verbatim. TOML output keeps its comment
    /// lines and rewrites each `key: value` line as a TOML assignment. JSON has no comments, so the
    /// configuration is simply serialized.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written
    pub fn save_default_with_comments(&self, output_path: &Utf8Path) -> Result<()> {
        let extension = output_path.extension().unwrap_or_default();

        if matches!(extension, "yml" | "yaml") {
            fs::write(output_path, DEFAULT_CONFIG_YAML).into_app_err_with(|| format!("writing default configuration to {output_path}"))?;
        } else if extension == "toml" {
            let toml_content = self.to_commented_toml(DEFAULT_CONFIG_YAML)?;
            fs::write(output_path, toml_content).into_app_err_with(|| format!("writing default configuration to {output_path}"))?;
        } else {
            self.save(output_path)?;
        }

        Ok(())
    }

    /// Rewrite a flat, commented YAML document as TOML using this configuration's values
    fn to_commented_toml(&self, yaml_content: &str) -> Result<String> {
        let toml::Value::Table(values) = toml::Value::try_from(self).into_app_err("converting configuration to TOML")? else {
            bail!("configuration did not serialize to a TOML table");
        };

        let mut out = String::new();
        for line in yaml_content.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                out.push_str(line);
            } else if let Some((key, _)) = trimmed.split_once(':') {
                let key = key.trim();
                let value = values.get(key).ok_or_else(|| app_err!("unknown configuration key '{key}' in default configuration"))?;
                out.push_str(&format!("{key} = {value}"));
            }
            out.push('\n');
        }

        Ok(out)
    }

    /// Directory holding the record files
    #[must_use]
    pub fn records_path(&self) -> Utf8PathBuf {
        self.source_directory.join(&self.records_directory)
    }

    /// Check the configuration for unusable values and suspicious combinations
    ///
    /// Unusable values are errors; suspicious ones are appended to `warnings`.
    fn validate(&self, warnings: &mut Vec<String>) -> Result<()> {
        if self.batch_size_github == 0 {
            bail!("batch_size_github must be at least 1");
        }

        if self.batch_size_gitlab == 0 {
            bail!("batch_size_gitlab must be at least 1");
        }

        if !self.sleep_time.is_finite() || self.sleep_time < 0.0 {
            bail!("sleep_time must be a non-negative number of seconds, got {}", self.sleep_time);
        }

        if self.request_timeout == 0 {
            bail!("request_timeout must be at least 1 second");
        }

        if self.last_updated_info_days >= self.last_updated_warning_days || self.last_updated_warning_days >= self.last_updated_error_days {
            bail!(
                "staleness thresholds must increase, got last_updated_info_days ({}), last_updated_warning_days ({}), last_updated_error_days ({})",
                self.last_updated_info_days,
                self.last_updated_warning_days,
                self.last_updated_error_days
            );
        }

        for (name, value) in [("github_api_url", &self.github_api_url), ("gitlab_api_url", &self.gitlab_api_url)] {
            let _ = url::Url::parse(value).into_app_err_with(|| format!("{name} is not a valid URL: '{value}'"))?;
        }

        if self.batch_size_github > GITHUB_SEARCH_RESULT_LIMIT {
            warnings.push(format!(
                "batch_size_github is {} but GitHub search returns at most {GITHUB_SEARCH_RESULT_LIMIT} results per query",
                self.batch_size_github
            ));
        }

        if self.commit_history_clean_months < self.commit_history_fetch_months {
            warnings.push(format!(
                "commit_history_clean_months ({}) is smaller than commit_history_fetch_months ({}), fetched months will be pruned immediately",
                self.commit_history_clean_months, self.commit_history_fetch_months
            ));
        }

        if self.max_retries == 0 {
            warnings.push("max_retries is 0, transient failures will never be retried".to_string());
        }

        if self.sleep_time == 0.0 {
            warnings.push("sleep_time is 0, requests will not be paced and backoff is disabled".to_string());
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        serde_yaml::from_str(DEFAULT_CONFIG_YAML).expect("default_config.yml should be valid YAML that deserializes to Config")
    }
}
