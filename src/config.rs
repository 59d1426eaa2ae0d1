use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::writers::{GlobalAttributes, Window};

/// 変換の設定
///
/// YAMLファイルから読み込む。記録されていない項目は既定値を使用する。
///
/// ```yaml
/// input: ../CD_data/output.txt
/// output: output_formatted.nc
/// window: { lon_min: 134.5, lon_max: 136.5, lat_min: 34.0, lat_max: 36.0 }
/// attributes:
///   title: Radar AMeDAS Analysis data
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Txt2NcConfig {
    /// 解析雨量テキストファイルのパス
    pub input: PathBuf,

    /// 出力するNetCDFファイルのパス
    pub output: PathBuf,

    /// 抽出する経度と緯度の範囲
    pub window: Window,

    /// 大域属性
    pub attributes: GlobalAttributes,
}

impl Default for Txt2NcConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::from("../CD_data/output.txt"),
            output: PathBuf::from("output_formatted.nc"),
            window: Window::default(),
            attributes: GlobalAttributes::default(),
        }
    }
}

impl Txt2NcConfig {
    /// YAMLファイルから設定を読み込む。
    ///
    /// # 引数
    ///
    /// * `path` - 設定ファイルのパス
    ///
    /// # 戻り値
    ///
    /// 変換の設定
    pub fn load<P>(path: P) -> ConfigResult<Self>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(format!("{}: {e}", path.display())))?;

        Self::from_yaml(&content)
    }

    /// YAML文字列から設定を読み込む。
    pub fn from_yaml(content: &str) -> ConfigResult<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;

        Ok(config)
    }

    /// 抽出する範囲が正しいか確認する。
    pub fn validate(&self) -> ConfigResult<()> {
        let w = &self.window;
        let ranges = [("経度", w.lon_min, w.lon_max), ("緯度", w.lat_min, w.lat_max)];
        for (axis, min, max) in ranges {
            if !min.is_finite() || !max.is_finite() || max < min {
                return Err(ConfigError::InvalidWindow(format!(
                    "{axis}の範囲`{min}`〜`{max}`が不正です。"
                )));
            }
        }

        Ok(())
    }
}

/// 設定エラー型
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 設定ファイルの読み込みエラー
    #[error("設定ファイルを読み込めませんでした。{0}")]
    Read(String),

    /// YAMLの解析エラー
    #[error("設定ファイルを解析できませんでした。{0}")]
    Parse(#[from] serde_yaml::Error),

    /// 抽出する範囲が不正
    #[error("{0}")]
    InvalidWindow(String),
}

/// 設定結果型
pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_yaml_uses_defaults() {
        let config = Txt2NcConfig::from_yaml("{}").unwrap();
        assert_eq!(config, Txt2NcConfig::default());
        assert_eq!(config.window, Window::new((134.5, 136.5), (34.0, 36.0)));
    }

    #[test]
    fn partial_yaml_overrides_fields() {
        let yaml = r#"
output: out/precip.nc
window: { lon_min: 139.0, lon_max: 140.5, lat_min: 35.0, lat_max: 36.0 }
attributes:
  title: Kanto precipitation
"#;
        let config = Txt2NcConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.output, PathBuf::from("out/precip.nc"));
        assert_eq!(config.input, Txt2NcConfig::default().input);
        assert_eq!(config.window.lon_min, 139.0);
        assert_eq!(config.attributes.title, "Kanto precipitation");
        assert_eq!(config.attributes.conventions, "CF-1.6");
    }

    #[test]
    fn inverted_window_is_rejected() {
        let yaml = "window: { lon_min: 137.0, lon_max: 136.0, lat_min: 34.0, lat_max: 36.0 }";
        assert!(matches!(
            Txt2NcConfig::from_yaml(yaml),
            Err(ConfigError::InvalidWindow(_))
        ));
    }

    #[test]
    fn malformed_yaml_is_parse_error() {
        assert!(matches!(
            Txt2NcConfig::from_yaml("window: [1, 2"),
            Err(ConfigError::Parse(_))
        ));
    }
}
