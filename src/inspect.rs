use std::io::Write;
use std::path::Path;

use time::OffsetDateTime;

/// NetCDFファイルの構造と降水強度を出力する。
///
/// 次元、変数と属性、大域属性、復元した座標と時刻を出力した後、
/// 整数のままの降水強度を時刻ごとに出力する。
///
/// # 引数
///
/// * `path` - NetCDFファイルのパス
/// * `writer` - 出力先
pub fn inspect<P, W>(path: P, writer: &mut W) -> InspectResult<()>
where
    P: AsRef<Path>,
    W: Write,
{
    let path = path.as_ref();
    let file = netcdf::open(path)?;

    writeln!(writer, "{}", path.display())?;
    writeln!(writer, "Dimensions:")?;
    for dim in file.dimensions() {
        writeln!(writer, "    {}: {}", dim.name(), dim.len())?;
    }

    writeln!(writer, "Variables:")?;
    for var in file.variables() {
        let dims = var
            .dimensions()
            .iter()
            .map(|d| d.name())
            .collect::<Vec<_>>()
            .join(", ");
        writeln!(writer, "    {}({dims})", var.name())?;
        for attr in var.attributes() {
            writeln!(writer, "        {}: {:?}", attr.name(), attr.value()?)?;
        }
    }

    writeln!(writer, "Attributes:")?;
    for attr in file.attributes() {
        writeln!(writer, "    {}: {:?}", attr.name(), attr.value()?)?;
    }

    let lons = decode_coordinate(&file, "lon")?;
    writeln!(writer, "lon: {lons:?}")?;
    let lats = decode_coordinate(&file, "lat")?;
    writeln!(writer, "lat: {lats:?}")?;
    let times = read_times(&file)?;
    let labels = times
        .iter()
        .map(|&t| {
            OffsetDateTime::from_unix_timestamp(t as i64)
                .map(|dt| dt.to_string())
                .unwrap_or_else(|_| t.to_string())
        })
        .collect::<Vec<_>>();
    writeln!(writer, "time: {labels:?}")?;

    let precip = file
        .variable("precip")
        .ok_or(InspectError::MissingVariable("precip"))?;
    let raw: Vec<i16> = precip.get_values(..)?;
    let cells = lats.len() * lons.len();
    writeln!(writer, "precip:")?;
    for (label, frame) in labels.iter().zip(raw.chunks(cells.max(1))) {
        writeln!(writer, "  [{label}]")?;
        for row in frame.chunks(lons.len().max(1)) {
            writeln!(writer, "    {row:?}")?;
        }
    }

    Ok(())
}

/// 座標変数を読み込み、`raw * scale_factor + add_offset`で度に復元する。
pub fn decode_coordinate(file: &netcdf::File, name: &'static str) -> InspectResult<Vec<f64>> {
    let var = file
        .variable(name)
        .ok_or(InspectError::MissingVariable(name))?;
    let scale = get_f64_attr(&var, "scale_factor").unwrap_or(1.0);
    let offset = get_f64_attr(&var, "add_offset").unwrap_or(0.0);
    let raw: Vec<i16> = var.get_values(..)?;

    Ok(raw.iter().map(|&v| v as f64 * scale + offset).collect())
}

/// 時刻変数を1970-01-01T00:00:00Zからの経過秒数で読み込む。
pub fn read_times(file: &netcdf::File) -> InspectResult<Vec<i32>> {
    let var = file
        .variable("time")
        .ok_or(InspectError::MissingVariable("time"))?;
    let raw: Vec<i32> = var.get_values(..)?;

    Ok(raw)
}

fn get_f64_attr(var: &netcdf::Variable, name: &str) -> Option<f64> {
    let attr_value = var.attribute_value(name)?.ok()?;
    f64::try_from(attr_value).ok()
}

/// Inspectエラー型
#[derive(Debug, thiserror::Error)]
pub enum InspectError {
    /// NetCDFライブラリのエラー
    #[error("NetCDFファイルの読み込みに失敗しました。{0}")]
    NetCdf(#[from] netcdf::Error),

    /// 変数が見つからない
    #[error("変数`{0}`が見つかりません。")]
    MissingVariable(&'static str),

    /// 出力エラー
    #[error("出力に失敗しました。{0}")]
    Io(#[from] std::io::Error),
}

/// Inspect結果型
pub type InspectResult<T> = Result<T, InspectError>;
