#[cfg(unix)]
use std::fs::Permissions;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use time::format_description::FormatItem;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};
use tracing::{debug, info, warn};

use crate::readers::Series;

/// 経度の尺度（度）
pub const LON_SCALE: f64 = 0.0125;
/// 経度のオフセット（度）
pub const LON_OFFSET: f64 = 137.0;

/// 緯度の尺度（度）
pub const LAT_SCALE: f64 = 0.00833333333333333;
/// 緯度のオフセット（度）
pub const LAT_OFFSET: f64 = 35.0;

/// 降水強度の尺度（mm/h）
pub const PRECIP_SCALE: f64 = 0.1;

/// 時刻の単位
pub const TIME_UNITS: &str = "seconds since 1970-01-01 00:00:00 +0:00";

/// 座標と時刻の圧縮レベル
const COORDINATE_DEFLATE_LEVEL: i32 = 4;

/// 出力ファイルを作成するときのパーミッション（umaskが適用される）
#[cfg(unix)]
const OUTPUT_MODE: u32 = 0o666;

/// 降水強度の圧縮レベル
const PRECIP_DEFLATE_LEVEL: i32 = 9;

/// 履歴属性に記録する日時の書式
const HISTORY_FMT: &[FormatItem<'_>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

/// 抽出する経度と緯度の範囲（度）
///
/// 範囲の両端を含む。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Window {
    /// 経度の最小値
    pub lon_min: f64,
    /// 経度の最大値
    pub lon_max: f64,
    /// 緯度の最小値
    pub lat_min: f64,
    /// 緯度の最大値
    pub lat_max: f64,
}

impl Window {
    /// 経度と緯度の`(最小値, 最大値)`から範囲を構築する。
    pub fn new(lon_range: (f64, f64), lat_range: (f64, f64)) -> Self {
        Self {
            lon_min: lon_range.0,
            lon_max: lon_range.1,
            lat_min: lat_range.0,
            lat_max: lat_range.1,
        }
    }
}

impl Default for Window {
    fn default() -> Self {
        Self::new((134.5, 136.5), (34.0, 36.0))
    }
}

/// NetCDFファイルに記録する大域属性
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalAttributes {
    /// 準拠する規約（`Conventions`属性）
    pub conventions: String,
    /// 表題
    pub title: String,
    /// 作成機関
    pub institution: String,
    /// データの出典
    pub source: String,
    /// 参考文献
    pub references: String,
    /// 備考
    pub comment: String,
}

impl Default for GlobalAttributes {
    fn default() -> Self {
        Self {
            conventions: "CF-1.6".to_string(),
            title: "Radar AMeDAS Analysis data".to_string(),
            institution: "Tokyo (RSMC), Japan Meteorological Agency".to_string(),
            source: "JMA GPV".to_string(),
            references: "JMA GPV".to_string(),
            comment: "Converted from Radar/AMeDAS analysis text reports".to_string(),
        }
    }
}

/// 範囲を抽出した時系列の格子データ
#[derive(Debug, Clone, PartialEq)]
pub struct Subset {
    /// 抽出した経度のインデックス
    pub lon_indices: Vec<usize>,
    /// 抽出した緯度のインデックス
    pub lat_indices: Vec<usize>,
    /// 経度（度）
    pub lons: Vec<f64>,
    /// 緯度（度）
    pub lats: Vec<f64>,
    /// 観測日時
    pub times: Vec<PrimitiveDateTime>,
    /// 降水強度（mm/h）
    ///
    /// 時刻、緯度、経度の順に行優先で記録する。
    pub values: Vec<f64>,
}

impl Subset {
    /// (時刻, 緯度, 経度)の格子数を返す。
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.times.len(), self.lats.len(), self.lons.len())
    }
}

/// 整数に変換した変数
#[derive(Debug, Clone, PartialEq)]
struct Encoded {
    lon: Vec<i16>,
    lat: Vec<i16>,
    time: Vec<i32>,
    precip: Vec<i16>,
}

/// NcWriterエラー型
#[derive(Debug, thiserror::Error)]
pub enum NcWriterError {
    /// 書き込む格子データがない
    #[error("書き込む格子データがありません。")]
    EmptySeries,

    /// 抽出範囲に格子が含まれない
    #[error("{axis}の範囲`{min}`〜`{max}`に含まれる格子がありません。")]
    EmptySelection {
        axis: &'static str,
        min: f64,
        max: f64,
    },

    /// 整数の範囲を超える値
    #[error("{variable}の値`{value}`は整数の範囲を超えています。")]
    QuantizationOverflow {
        variable: &'static str,
        value: String,
    },

    /// 作成日時の書式化エラー
    #[error("作成日時を書式化できませんでした。{0}")]
    Format(String),

    /// 一時ファイル・エラー
    #[error("一時ファイルを作成できませんでした。{0}")]
    TempFile(String),

    /// 出力ファイルの保存エラー
    #[error("出力ファイルを保存できませんでした。{0}")]
    Persist(String),

    /// NetCDFライブラリのエラー
    #[error("NetCDFファイルの書き込みに失敗しました。{0}")]
    NetCdf(#[from] netcdf::Error),
}

/// NcWriter結果型
pub type NcWriterResult<T> = Result<T, NcWriterError>;

/// 時系列の格子データを範囲で抽出して、NetCDFファイルに書き込む。
///
/// 一時ファイルに書き込んでから出力ファイルのパスに移動するため、
/// 書き込みに失敗した場合に出力ファイルは作成されない。
///
/// # 引数
///
/// * `series` - 時系列の格子データ
/// * `path` - 出力ファイルのパス
/// * `window` - 抽出する経度と緯度の範囲
/// * `attributes` - 大域属性
/// * `generated_at` - 履歴属性に記録する作成日時
pub fn write_netcdf<P>(
    series: &Series,
    path: P,
    window: &Window,
    attributes: &GlobalAttributes,
    generated_at: OffsetDateTime,
) -> NcWriterResult<()>
where
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let subset = extract(series, window)?;
    let encoded = encode(&subset)?;
    let history = history(generated_at)?;

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut builder = tempfile::Builder::new();
    builder.prefix(".txt2nc-").suffix(".nc");
    // tempfileの既定(0600)では所有者以外が読めない
    #[cfg(unix)]
    builder.permissions(Permissions::from_mode(OUTPUT_MODE));
    let temp_path = builder
        .tempfile_in(dir)
        .map_err(|e| NcWriterError::TempFile(format!("{}: {e}", dir.display())))?
        .into_temp_path();
    write_file(&temp_path, &encoded, attributes, &history)?;
    temp_path
        .persist(path)
        .map_err(|e| NcWriterError::Persist(format!("{}: {e}", path.display())))?;

    let (nt, ny, nx) = subset.shape();
    info!(path = %path.display(), time = nt, lat = ny, lon = nx, "NetCDFファイルを保存しました。");

    Ok(())
}

/// 時系列の格子データから、範囲に含まれる格子を抽出する。
///
/// # 引数
///
/// * `series` - 時系列の格子データ
/// * `window` - 抽出する経度と緯度の範囲
///
/// # 戻り値
///
/// 範囲を抽出した時系列の格子データ
pub fn extract(series: &Series, window: &Window) -> NcWriterResult<Subset> {
    if series.frames().is_empty() {
        return Err(NcWriterError::EmptySeries);
    }
    let lon_indices = select_indices(series.lons(), window.lon_min, window.lon_max);
    if lon_indices.is_empty() {
        return Err(NcWriterError::EmptySelection {
            axis: "経度",
            min: window.lon_min,
            max: window.lon_max,
        });
    }
    let lat_indices = select_indices(series.lats(), window.lat_min, window.lat_max);
    if lat_indices.is_empty() {
        return Err(NcWriterError::EmptySelection {
            axis: "緯度",
            min: window.lat_min,
            max: window.lat_max,
        });
    }

    let mut values =
        Vec::with_capacity(series.frames().len() * lat_indices.len() * lon_indices.len());
    for frame in series.frames() {
        for &row in lat_indices.iter() {
            values.extend(lon_indices.iter().map(|&col| frame.grid.value(row, col)));
        }
    }
    debug!(
        lon = ?(lon_indices.first(), lon_indices.last()),
        lat = ?(lat_indices.first(), lat_indices.last()),
        "抽出する格子のインデックスを決定しました。"
    );

    Ok(Subset {
        lons: lon_indices.iter().map(|&i| series.lons()[i]).collect(),
        lats: lat_indices.iter().map(|&i| series.lats()[i]).collect(),
        times: series.times().collect(),
        lon_indices,
        lat_indices,
        values,
    })
}

/// 座標軸から、`min`以上`max`以下の座標のインデックスを返す。
pub fn select_indices(axis: &[f64], min: f64, max: f64) -> Vec<usize> {
    axis.iter()
        .enumerate()
        .filter(|&(_, &v)| min <= v && v <= max)
        .map(|(i, _)| i)
        .collect()
}

/// `round((value - offset) / scale)`を計算する。
///
/// 端数がちょうど0.5の場合は偶数に丸める。
pub fn quantize(value: f64, scale: f64, offset: f64) -> f64 {
    ((value - offset) / scale).round_ties_even()
}

fn to_i16(variable: &'static str, value: f64, quantized: f64) -> NcWriterResult<i16> {
    if !(i16::MIN as f64..=i16::MAX as f64).contains(&quantized) {
        return Err(NcWriterError::QuantizationOverflow {
            variable,
            value: value.to_string(),
        });
    }

    Ok(quantized as i16)
}

/// 経度を整数に変換する。
///
/// 整数の範囲を超える場合はエラーを返す。
pub fn quantize_lon(lon: f64) -> NcWriterResult<i16> {
    to_i16("lon", lon, quantize(lon, LON_SCALE, LON_OFFSET))
}

/// 緯度を整数に変換する。
///
/// 整数の範囲を超える場合はエラーを返す。
pub fn quantize_lat(lat: f64) -> NcWriterResult<i16> {
    to_i16("lat", lat, quantize(lat, LAT_SCALE, LAT_OFFSET))
}

/// 観測日時をUTCとみなして、1970-01-01T00:00:00Zからの経過秒数に変換する。
pub fn quantize_time(dt: PrimitiveDateTime) -> NcWriterResult<i32> {
    let seconds = dt.assume_utc().unix_timestamp();
    i32::try_from(seconds).map_err(|_| NcWriterError::QuantizationOverflow {
        variable: "time",
        value: dt.to_string(),
    })
}

/// 降水強度を0.1mm/h単位の整数に変換する。
///
/// 負の値はそのまま変換する。
/// 整数の範囲を超える値は範囲の端に飽和させ（NaNは0）、2番目の要素に`true`を返す。
pub fn quantize_precip(value: f64) -> (i16, bool) {
    let quantized = (value * 10.0).round_ties_even();
    let saturated = !(i16::MIN as f64..=i16::MAX as f64).contains(&quantized);

    (quantized as i16, saturated)
}

fn encode(subset: &Subset) -> NcWriterResult<Encoded> {
    let lon = subset
        .lons
        .iter()
        .map(|&v| quantize_lon(v))
        .collect::<NcWriterResult<Vec<_>>>()?;
    let lat = subset
        .lats
        .iter()
        .map(|&v| quantize_lat(v))
        .collect::<NcWriterResult<Vec<_>>>()?;
    let time = subset
        .times
        .iter()
        .map(|&dt| quantize_time(dt))
        .collect::<NcWriterResult<Vec<_>>>()?;
    let mut saturated = 0usize;
    let precip = subset
        .values
        .iter()
        .map(|&v| {
            let (q, s) = quantize_precip(v);
            saturated += s as usize;
            q
        })
        .collect();
    if 0 < saturated {
        warn!(saturated, "整数の範囲を超えた降水強度を飽和させました。");
    }

    Ok(Encoded {
        lon,
        lat,
        time,
        precip,
    })
}

fn history(generated_at: OffsetDateTime) -> NcWriterResult<String> {
    let dt = generated_at
        .format(HISTORY_FMT)
        .map_err(|e| NcWriterError::Format(format!("{e}")))?;

    Ok(format!("{dt} Converted"))
}

fn write_file(
    path: &Path,
    encoded: &Encoded,
    attributes: &GlobalAttributes,
    history: &str,
) -> NcWriterResult<()> {
    let mut file = netcdf::create(path)?;
    file.add_dimension("lon", encoded.lon.len())?;
    file.add_dimension("lat", encoded.lat.len())?;
    file.add_dimension("time", encoded.time.len())?;

    {
        let mut var = file.add_variable::<i16>("lon", &["lon"])?;
        var.set_compression(COORDINATE_DEFLATE_LEVEL, true)?;
        var.set_endianness(netcdf::Endianness::Little)?;
        var.put_attribute("long_name", "longitude")?;
        var.put_attribute("units", "degrees_east")?;
        var.put_attribute("scale_factor", LON_SCALE)?;
        var.put_attribute("add_offset", LON_OFFSET)?;
        var.put_values(&encoded.lon, ..)?;
    }
    {
        let mut var = file.add_variable::<i16>("lat", &["lat"])?;
        var.set_compression(COORDINATE_DEFLATE_LEVEL, true)?;
        var.set_endianness(netcdf::Endianness::Little)?;
        var.put_attribute("long_name", "latitude")?;
        var.put_attribute("units", "degrees_north")?;
        var.put_attribute("scale_factor", LAT_SCALE)?;
        var.put_attribute("add_offset", LAT_OFFSET)?;
        var.put_values(&encoded.lat, ..)?;
    }
    {
        let mut var = file.add_variable::<i32>("time", &["time"])?;
        var.set_compression(COORDINATE_DEFLATE_LEVEL, true)?;
        var.set_endianness(netcdf::Endianness::Little)?;
        var.put_attribute("long_name", "time")?;
        var.put_attribute("units", TIME_UNITS)?;
        var.put_values(&encoded.time, ..)?;
    }
    {
        let mut var = file.add_variable::<i16>("precip", &["time", "lat", "lon"])?;
        var.set_chunking(&[1, encoded.lat.len(), encoded.lon.len()])?;
        var.set_compression(PRECIP_DEFLATE_LEVEL, true)?;
        var.set_endianness(netcdf::Endianness::Little)?;
        var.put_attribute("long_name", "precipitation")?;
        var.put_attribute("units", "mm/h")?;
        var.put_attribute("valid_min", 0i16)?;
        var.put_attribute("scale_factor", PRECIP_SCALE)?;
        var.put_values(&encoded.precip, ..)?;
    }

    file.add_attribute("Conventions", attributes.conventions.as_str())?;
    file.add_attribute("title", attributes.title.as_str())?;
    file.add_attribute("institution", attributes.institution.as_str())?;
    file.add_attribute("source", attributes.source.as_str())?;
    file.add_attribute("history", history)?;
    file.add_attribute("references", attributes.references.as_str())?;
    file.add_attribute("comment", attributes.comment.as_str())?;

    Ok(())
}
