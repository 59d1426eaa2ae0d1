use std::fs::OpenOptions;
use std::io::{BufRead, BufReader};
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use time::{Date, Month, PrimitiveDateTime, Time};
use tracing::{debug, info, warn};

/// 読み飛ばす行の接頭辞
///
/// 解析に利用したアメダスやレーダーの情報を記録した行で、格子データを含まない。
const SKIP_TAGS: [&str; 2] = ["AMeDAS:", "Radar:"];

/// ヘッダ行で格子数`(NNxMM)`を記録しているフィールドの位置
const GRID_SIZE_FIELD: usize = 4;

/// ヘッダ行で最初の格子の経度を記録しているフィールドの位置
const LONGITUDE_FIELD: usize = 5;

/// ヘッダ行で最初の格子の緯度を記録しているフィールドの位置
const LATITUDE_FIELD: usize = 6;

/// 1つの格子データに含められる格子点の最大数
///
/// 全国合成の1km格子(2560x3360)を収められる大きさ。
pub const MAX_GRID_CELLS: usize = 1 << 24;

/// ヘッダ行の先頭に記録されている日時`YYYY/M/D HH:MM`
static DATE_TIME_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{4})/\s*(\d{1,2})/\s*(\d{1,2})\s+(\d{2}):(\d{2})")
        .expect("日時の正規表現が不正です。")
});

/// 座標`<値><E|W|N|S><+|-><格子間隔>`
static COORDINATE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d+\.\d+)([EWNS])([+-])(\d+\.\d+)").expect("座標の正規表現が不正です。")
});

/// 解析雨量テキストファイルを読み込む。
///
/// # 引数
///
/// * `path` - 読み込むテキストファイルのパス
///
/// # 戻り値
///
/// 時系列の格子データ
pub fn read_report<P>(path: P) -> ReportReaderResult<Series>
where
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let file = OpenOptions::new()
        .read(true)
        .open(path)
        .map_err(|e| ReportReaderError::Open(format!("{}: {e}", path.display())))?;
    let series = parse_report(BufReader::new(file))?;
    info!(
        path = %path.display(),
        frames = series.frames().len(),
        nx = series.lons().len(),
        ny = series.lats().len(),
        skipped = series.issues().len(),
        "解析雨量テキストを読み込みました。"
    );

    Ok(series)
}

/// 解析雨量テキストをリーダーから読み込む。
///
/// 解析できない行は、行番号と内容をログに出力して読み飛ばし、`Series::issues`に記録する。
/// 日時、格子数、座標及びデータ行がすべて正常なヘッダ・ブロックだけが`Frame`になるため、
/// 日時と格子データの数は常に一致する。
///
/// # 引数
///
/// * `reader` - 解析雨量テキストを読み込むリーダー
///
/// # 戻り値
///
/// 時系列の格子データ
pub fn parse_report<R>(reader: R) -> ReportReaderResult<Series>
where
    R: BufRead,
{
    let mut parser = ReportParser::default();
    for (index, line) in reader.lines().enumerate() {
        let line_number = index + 1;
        let line = line.map_err(|e| {
            ReportReaderError::Read(format!("{line_number}行目の読み込みに失敗しました。{e}"))
        })?;
        parser.consume(line_number, line.trim());
    }

    parser.finish()
}

/// 時系列の格子データ
#[derive(Debug, Clone)]
pub struct Series {
    /// 観測日時と格子データの組
    frames: Vec<Frame>,

    /// 経度と緯度の座標軸
    axes: Axes,

    /// 読み飛ばした行
    issues: Vec<ParseIssue>,
}

impl Series {
    /// 座標軸と格子データから時系列を構築する。
    ///
    /// すべての格子データの大きさが、座標軸の長さと一致していなければならない。
    pub fn new(axes: Axes, frames: Vec<Frame>) -> ReportReaderResult<Self> {
        for frame in frames.iter() {
            axes.check_grid(&frame.grid)?;
        }

        Ok(Self {
            frames,
            axes,
            issues: vec![],
        })
    }

    /// 観測日時と格子データの組を格納したスライスを返す。
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// 座標軸を返す。
    pub fn axes(&self) -> &Axes {
        &self.axes
    }

    /// 経度（度）を返す。
    pub fn lons(&self) -> &[f64] {
        &self.axes.lons
    }

    /// 緯度（度）を返す。
    pub fn lats(&self) -> &[f64] {
        &self.axes.lats
    }

    /// 観測日時を記録順に返すイテレーターを返す。
    pub fn times(&self) -> impl Iterator<Item = PrimitiveDateTime> + '_ {
        self.frames.iter().map(|f| f.observation_date_time)
    }

    /// 読み飛ばした行を返す。
    pub fn issues(&self) -> &[ParseIssue] {
        &self.issues
    }
}

/// 観測日時と格子データ
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// 観測日時
    pub observation_date_time: PrimitiveDateTime,

    /// 格子データ
    pub grid: Grid,
}

/// 経度と緯度の座標軸
///
/// 経度はインデックスとともに東へ増加し、緯度はインデックスとともに南へ減少する。
#[derive(Debug, Clone, PartialEq)]
pub struct Axes {
    /// 経度（度）
    pub lons: Vec<f64>,

    /// 緯度（度）
    pub lats: Vec<f64>,
}

impl Axes {
    /// 最初の格子の座標と格子間隔から座標軸を構築する。
    ///
    /// 緯度の格子間隔は符号に関わらず、南に向かって減少するように扱う。
    ///
    /// # 引数
    ///
    /// * `lon` - 最初の格子の経度（度）
    /// * `lon_step` - 経度方向の格子間隔（度）
    /// * `nx` - 経度方向の格子数
    /// * `lat` - 最初の格子の緯度（度）
    /// * `lat_step` - 緯度方向の格子間隔（度）
    /// * `ny` - 緯度方向の格子数
    pub fn from_origin(
        lon: f64,
        lon_step: f64,
        nx: usize,
        lat: f64,
        lat_step: f64,
        ny: usize,
    ) -> Self {
        let lons = (0..nx).map(|i| lon + lon_step * i as f64).collect();
        let lats = (0..ny).map(|i| lat - lat_step.abs() * i as f64).collect();

        Self { lons, lats }
    }

    /// 経度方向の格子数を返す。
    pub fn nx(&self) -> usize {
        self.lons.len()
    }

    /// 緯度方向の格子数を返す。
    pub fn ny(&self) -> usize {
        self.lats.len()
    }

    fn check_grid(&self, grid: &Grid) -> ReportReaderResult<()> {
        if grid.nx() != self.nx() || grid.ny() != self.ny() {
            return Err(ReportReaderError::GridShape(format!(
                "格子数({}x{})が座標軸の格子数({}x{})と一致しません。",
                grid.nx(),
                grid.ny(),
                self.nx(),
                self.ny()
            )));
        }

        Ok(())
    }
}

/// 格子データ
///
/// 北西端から経度方向に、行優先で値を記録する。
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    /// 緯度方向の格子数
    ny: usize,

    /// 経度方向の格子数
    nx: usize,

    /// 値（mm/h）
    values: Vec<f64>,
}

impl Grid {
    /// すべての値が0の格子データを構築する。
    pub fn zeros(ny: usize, nx: usize) -> Self {
        Self {
            ny,
            nx,
            values: vec![0.0; ny * nx],
        }
    }

    /// データ行から格子データを構築する。
    ///
    /// データ行は読み込んだ順に先頭の行から、それぞれ0列目から格納する。
    /// `nx`より短いデータ行の残りは0で埋める。
    /// `ny`より多いデータ行、または`nx`より長いデータ行がある場合はエラーを返す。
    ///
    /// # 引数
    ///
    /// * `ny` - 緯度方向の格子数
    /// * `nx` - 経度方向の格子数
    /// * `rows` - データ行
    pub fn from_rows(ny: usize, nx: usize, rows: &[Vec<f64>]) -> ReportReaderResult<Self> {
        if ny < rows.len() {
            return Err(ReportReaderError::GridShape(format!(
                "データ行の数({})が緯度方向の格子数({ny})を超えています。",
                rows.len()
            )));
        }
        let mut grid = Self::zeros(ny, nx);
        for (i, row) in rows.iter().enumerate() {
            if nx < row.len() {
                return Err(ReportReaderError::GridShape(format!(
                    "{}番目のデータ行の値の数({})が経度方向の格子数({nx})を超えています。",
                    i + 1,
                    row.len()
                )));
            }
            grid.values[i * nx..i * nx + row.len()].copy_from_slice(row);
        }

        Ok(grid)
    }

    /// 緯度方向の格子数を返す。
    pub fn ny(&self) -> usize {
        self.ny
    }

    /// 経度方向の格子数を返す。
    pub fn nx(&self) -> usize {
        self.nx
    }

    /// 指定した行と列の値を返す。
    pub fn value(&self, row: usize, col: usize) -> f64 {
        self.values[row * self.nx + col]
    }

    /// 指定した行の値を返す。
    pub fn row(&self, row: usize) -> &[f64] {
        &self.values[row * self.nx..(row + 1) * self.nx]
    }

    /// すべての値を行優先で返す。
    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

/// 読み飛ばした行
#[derive(Debug, Clone, PartialEq)]
pub struct ParseIssue {
    /// 行番号（1始まり）
    pub line_number: usize,

    /// 行の内容
    pub line: String,

    /// 読み飛ばした理由
    pub error: ReportReaderError,
}

/// ReportReaderエラー型
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReportReaderError {
    /// ファイル・オープン・エラー
    #[error("ファイルを開くときにエラーが発生しました。{0}")]
    Open(String),

    /// 読み込みエラー
    #[error("ファイルの読み込みに失敗しました。{0}")]
    Read(String),

    /// 日時を解析できない
    #[error("日時を解析できません。{0}")]
    DateParse(String),

    /// 格子数または座標を解析できない
    #[error("格子数または座標を解析できません。{0}")]
    GridHeader(String),

    /// 数値に変換できない値を含むデータ行
    #[error("データ行に数値に変換できない値が含まれています。`{0}`")]
    NumericRow(String),

    /// 格子数と一致しないデータ
    #[error("{0}")]
    GridShape(String),

    /// 座標を定義したヘッダ行が見つからない
    #[error("格子数と座標を解析できるヘッダ行が見つかりません。")]
    GridUndefined,
}

/// ReportReader結果型
pub type ReportReaderResult<T> = Result<T, ReportReaderError>;

/// ヘッダ行から始まり、次のヘッダ行の直前までの行
#[derive(Debug)]
struct HeaderBlock {
    /// ヘッダ行の行番号
    line_number: usize,

    /// ヘッダ行の内容
    header: String,

    /// 観測日時
    ///
    /// 日時を解析できなかった場合は`None`で、ブロックのデータ行は破棄する。
    observation_date_time: Option<PrimitiveDateTime>,

    /// データ行
    rows: Vec<Vec<f64>>,
}

#[derive(Debug, Default)]
struct ReportParser {
    /// 最後に解析できた格子数(nx, ny)
    grid_size: Option<(usize, usize)>,

    /// 最初に解析できたヘッダ行から構築した座標軸
    axes: Option<Axes>,

    /// 読み込み中のヘッダ・ブロック
    block: Option<HeaderBlock>,

    frames: Vec<Frame>,
    issues: Vec<ParseIssue>,
}

impl ReportParser {
    fn consume(&mut self, line_number: usize, line: &str) {
        if line.is_empty() {
            return;
        }

        if line.contains('/') {
            self.flush();
            self.open_block(line_number, line);
        } else if SKIP_TAGS.iter().any(|tag| line.starts_with(tag)) {
            // 格子データを含まない行
        } else {
            match parse_data_row(line) {
                Ok(row) => self.push_row(line_number, line, row),
                Err(e) => self.record(line_number, line, e),
            }
        }
    }

    fn open_block(&mut self, line_number: usize, line: &str) {
        let observation_date_time = match parse_date_time(line) {
            Ok(dt) => {
                if let Err(e) = self.update_grid_definition(line) {
                    self.record(line_number, line, e);
                }
                Some(dt)
            }
            Err(e) => {
                self.record(line_number, line, e);
                None
            }
        };
        self.block = Some(HeaderBlock {
            line_number,
            header: line.to_string(),
            observation_date_time,
            rows: vec![],
        });
    }

    /// ヘッダ行から格子数を、座標軸が未定義であれば座標も解析する。
    ///
    /// 解析に失敗した場合は、直前に解析できた格子数と座標軸を維持する。
    fn update_grid_definition(&mut self, line: &str) -> ReportReaderResult<()> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let field = |index: usize, name: &str| {
            fields.get(index).copied().ok_or_else(|| {
                ReportReaderError::GridHeader(format!("{name}のフィールドがありません。"))
            })
        };
        let (nx, ny) = parse_grid_size(field(GRID_SIZE_FIELD, "格子数")?)?;
        if self.axes.is_none() {
            let (lon, lon_step) = parse_coordinate(field(LONGITUDE_FIELD, "経度")?)?;
            let (lat, lat_step) = parse_coordinate(field(LATITUDE_FIELD, "緯度")?)?;
            let axes = Axes::from_origin(lon, lon_step, nx, lat, lat_step, ny);
            debug!(lon, lon_step, lat, lat_step, nx, ny, "座標軸を構築しました。");
            self.axes = Some(axes);
        }
        self.grid_size = Some((nx, ny));

        Ok(())
    }

    fn push_row(&mut self, line_number: usize, line: &str, row: Vec<f64>) {
        match self.block.as_mut() {
            Some(block) => block.rows.push(row),
            None => self.record(
                line_number,
                line,
                ReportReaderError::GridShape("ヘッダ行より前にデータ行があります。".to_string()),
            ),
        }
    }

    /// 読み込み中のヘッダ・ブロックを閉じて、正常であれば`Frame`に追加する。
    fn flush(&mut self) {
        let Some(block) = self.block.take() else {
            return;
        };
        let Some(observation_date_time) = block.observation_date_time else {
            if !block.rows.is_empty() {
                warn!(
                    line_number = block.line_number,
                    rows = block.rows.len(),
                    "日時を解析できなかったヘッダ行に続くデータ行を破棄しました。"
                );
            }
            return;
        };
        if block.rows.is_empty() {
            debug!(
                line_number = block.line_number,
                "データ行がないヘッダ行を読み飛ばしました。"
            );
            return;
        }
        match self.build_grid(&block.rows) {
            Ok(grid) => {
                debug!(%observation_date_time, rows = block.rows.len(), "格子データを読み込みました。");
                self.frames.push(Frame {
                    observation_date_time,
                    grid,
                });
            }
            Err(e) => self.record(block.line_number, &block.header, e),
        }
    }

    fn build_grid(&self, rows: &[Vec<f64>]) -> ReportReaderResult<Grid> {
        let (nx, ny) = self.grid_size.ok_or_else(|| {
            ReportReaderError::GridShape("格子数が定義されていません。".to_string())
        })?;
        let axes = self.axes.as_ref().ok_or_else(|| {
            ReportReaderError::GridShape("座標が定義されていません。".to_string())
        })?;
        let grid = Grid::from_rows(ny, nx, rows)?;
        axes.check_grid(&grid)?;

        Ok(grid)
    }

    fn record(&mut self, line_number: usize, line: &str, error: ReportReaderError) {
        warn!(line_number, line, %error, "行を読み飛ばしました。");
        self.issues.push(ParseIssue {
            line_number,
            line: line.to_string(),
            error,
        });
    }

    fn finish(mut self) -> ReportReaderResult<Series> {
        self.flush();
        let axes = self.axes.ok_or(ReportReaderError::GridUndefined)?;

        Ok(Series {
            frames: self.frames,
            axes,
            issues: self.issues,
        })
    }
}

/// 文字列の先頭から日時を解析する。
///
/// `YYYY/M/D HH:MM`形式で、月と日は1桁または2桁で、その前に空白文字を含んでもよい。
/// 分より後の文字列は無視する。
///
/// # 引数
///
/// * `s` - 日時を解析する文字列
///
/// # 戻り値
///
/// 観測日時
pub fn parse_date_time(s: &str) -> ReportReaderResult<PrimitiveDateTime> {
    let caps = DATE_TIME_PATTERN
        .captures(s)
        .ok_or_else(|| ReportReaderError::DateParse(format!("`{s}`")))?;
    let number = |index: usize, name: &str| {
        caps[index].parse::<u16>().map_err(|e| {
            ReportReaderError::DateParse(format!("{name}`{}`が不正です。{e}", &caps[index]))
        })
    };
    let year = number(1, "年")?;
    let month = number(2, "月")?;
    let day = number(3, "日")?;
    let hour = number(4, "時")?;
    let minute = number(5, "分")?;

    let month = Month::try_from(month as u8)
        .map_err(|e| ReportReaderError::DateParse(format!("月({month})が不正です。{e}")))?;
    let date = Date::from_calendar_date(year as i32, month, day as u8).map_err(|e| {
        ReportReaderError::DateParse(format!("年月日から日付を構築できませんでした。{e}"))
    })?;
    let time = Time::from_hms(hour as u8, minute as u8, 0).map_err(|e| {
        ReportReaderError::DateParse(format!("時分から時刻を構築できませんでした。{e}"))
    })?;

    Ok(PrimitiveDateTime::new(date, time))
}

/// 座標を解析する。
///
/// 座標は`<値><E|W|N|S><+|-><格子間隔>`形式で、値と格子間隔は`123.45`のような小数で記録されている。
/// 方位が`W`または`S`の場合は値を、符号が`-`の場合は格子間隔を負にする。
///
/// # 引数
///
/// * `s` - 座標を解析する文字列
///
/// # 戻り値
///
/// 最初の格子の座標と格子間隔（度）
pub fn parse_coordinate(s: &str) -> ReportReaderResult<(f64, f64)> {
    let unmatched = || ReportReaderError::GridHeader(format!("座標`{s}`を解析できません。"));
    let caps = COORDINATE_PATTERN.captures(s).ok_or_else(unmatched)?;
    let value = caps[1].parse::<f64>().map_err(|_| unmatched())?;
    let step = caps[4].parse::<f64>().map_err(|_| unmatched())?;

    let value = match &caps[2] {
        "W" | "S" => -value,
        _ => value,
    };
    let step = match &caps[3] {
        "-" => -step,
        _ => step,
    };

    Ok((value, step))
}

/// 格子数`(NNxMM)`を解析して、経度方向と緯度方向の格子数を返す。
///
/// 格子数が0、または格子点の数が`MAX_GRID_CELLS`を超える場合はエラーを返す。
fn parse_grid_size(s: &str) -> ReportReaderResult<(usize, usize)> {
    let unmatched = || ReportReaderError::GridHeader(format!("格子数`{s}`を解析できません。"));
    let (nx, ny) = s
        .trim_matches(|c| c == '(' || c == ')')
        .split_once('x')
        .ok_or_else(unmatched)?;
    let nx = nx.parse::<usize>().map_err(|_| unmatched())?;
    let ny = ny.parse::<usize>().map_err(|_| unmatched())?;
    if nx == 0 || ny == 0 {
        return Err(unmatched());
    }
    match nx.checked_mul(ny) {
        Some(cells) if cells <= MAX_GRID_CELLS => Ok((nx, ny)),
        _ => Err(ReportReaderError::GridHeader(format!(
            "格子数`{s}`が上限({MAX_GRID_CELLS})を超えています。"
        ))),
    }
}

/// データ行を解析する。
///
/// 1つでも数値に変換できない値があれば、データ行全体をエラーにする。
fn parse_data_row(line: &str) -> ReportReaderResult<Vec<f64>> {
    line.split_whitespace()
        .map(|token| {
            token
                .parse::<f64>()
                .map_err(|_| ReportReaderError::NumericRow(token.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    const HEADER: &str = "2023/08/05 14:30 JST RAP (2x2) 135.00E+0.0125 35.00N-0.0083";

    fn parse(text: &str) -> Series {
        parse_report(text.as_bytes()).unwrap()
    }

    #[test]
    fn parse_coordinate_east_and_north() {
        assert_eq!(parse_coordinate("135.00E+0.0125").unwrap(), (135.0, 0.0125));
        assert_eq!(parse_coordinate("35.00N-0.0083").unwrap(), (35.0, -0.0083));
    }

    #[test]
    fn parse_coordinate_west_and_south_negate_value() {
        assert_eq!(parse_coordinate("70.50W+0.25").unwrap(), (-70.5, 0.25));
        assert_eq!(parse_coordinate("12.00S-0.50").unwrap(), (-12.0, -0.5));
    }

    #[test]
    fn parse_coordinate_rejects_malformed() {
        for s in ["135E+0.0125", "135.00X+0.0125", "135.00E0.0125", "135.00E+", ""] {
            assert!(
                matches!(parse_coordinate(s), Err(ReportReaderError::GridHeader(_))),
                "{s}"
            );
        }
    }

    #[test]
    fn parse_date_time_with_padded_month_and_day() {
        assert_eq!(
            parse_date_time("2023/ 8/ 5 14:30").unwrap(),
            datetime!(2023-08-05 14:30)
        );
        assert_eq!(
            parse_date_time("2023/08/05 14:30 JST (2x2)").unwrap(),
            datetime!(2023-08-05 14:30)
        );
    }

    #[test]
    fn parse_date_time_rejects_malformed() {
        for s in [
            "23/08/05 14:30",
            "2023/08/05 4:30",
            "2023/08/0514:30",
            "2023-08-05 14:30",
            "2023/13/05 14:30",
            "2023/02/30 14:30",
            "2023/08/05 25:00",
        ] {
            assert!(
                matches!(parse_date_time(s), Err(ReportReaderError::DateParse(_))),
                "{s}"
            );
        }
    }

    #[test]
    fn parse_grid_size_reads_nx_and_ny() {
        assert_eq!(parse_grid_size("(3x2)").unwrap(), (3, 2));
        assert!(parse_grid_size("(3*2)").is_err());
        assert!(parse_grid_size("(0x2)").is_err());
    }

    #[test]
    fn parse_grid_size_rejects_oversized_grid() {
        for s in ["(99999999999x99999999999)", "(4097x4096)"] {
            assert!(
                matches!(parse_grid_size(s), Err(ReportReaderError::GridHeader(_))),
                "{s}"
            );
        }
        assert_eq!(parse_grid_size("(2560x3360)").unwrap(), (2560, 3360));
    }

    #[test]
    fn oversized_header_is_recorded_instead_of_allocated() {
        let text = "2023/08/05 14:30 JST RAP (99999999999x99999999999) 135.00E+0.0125 35.00N-0.0083\n1 2\n";
        let result = parse_report(text.as_bytes());
        assert!(matches!(result, Err(ReportReaderError::GridUndefined)));
    }

    #[test]
    fn axes_latitude_always_decreases() {
        let axes = Axes::from_origin(135.0, 0.5, 3, 35.0, 0.25, 2);
        assert_eq!(axes.lons, vec![135.0, 135.5, 136.0]);
        assert_eq!(axes.lats, vec![35.0, 34.75]);

        let axes = Axes::from_origin(135.0, 0.5, 1, 35.0, -0.25, 3);
        assert_eq!(axes.lats, vec![35.0, 34.75, 34.5]);
    }

    #[test]
    fn short_rows_are_zero_padded() {
        let grid = Grid::from_rows(3, 4, &[vec![1.0, 2.0], vec![3.0, 4.0, 5.0, 6.0]]).unwrap();
        assert_eq!(grid.row(0), &[1.0, 2.0, 0.0, 0.0]);
        assert_eq!(grid.row(1), &[3.0, 4.0, 5.0, 6.0]);
        assert_eq!(grid.row(2), &[0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn excess_rows_and_columns_are_rejected() {
        let rows = vec![vec![1.0], vec![2.0], vec![3.0]];
        assert!(matches!(
            Grid::from_rows(2, 2, &rows),
            Err(ReportReaderError::GridShape(_))
        ));
        assert!(matches!(
            Grid::from_rows(2, 2, &[vec![1.0, 2.0, 3.0]]),
            Err(ReportReaderError::GridShape(_))
        ));
    }

    #[test]
    fn single_block_with_tag_lines() {
        let text = format!(
            "{HEADER}\nAMeDAS: 1300\nRadar: 20\n0.5 1.0\n\n2.0 3.5\n2023/08/05 14:40 JST RAP (2x2)\n"
        );
        let series = parse(&text);

        assert_eq!(series.frames().len(), 1);
        assert_eq!(series.times().count(), 1);
        let frame = &series.frames()[0];
        assert_eq!(frame.observation_date_time, datetime!(2023-08-05 14:30));
        assert_eq!(frame.grid.values(), &[0.5, 1.0, 2.0, 3.5]);
        assert_eq!(series.lons(), &[135.0, 135.0 + 0.0125]);
        assert_eq!(series.lats(), &[35.0, 35.0 - 0.0083]);
        assert!(series.issues().is_empty());
    }

    #[test]
    fn later_headers_reuse_first_axes() {
        let text = format!(
            "{HEADER}\n1 2\n3 4\n2023/08/05 14:40 JST RAP (2x2) 100.00E+1.0000 10.00N-1.0000\n5 6\n7 8\n"
        );
        let series = parse(&text);

        assert_eq!(series.frames().len(), 2);
        assert_eq!(series.lons(), &[135.0, 135.0 + 0.0125]);
        assert_eq!(series.frames()[1].grid.values(), &[5.0, 6.0, 7.0, 8.0]);
    }

    #[test]
    fn date_failure_drops_whole_block() {
        let text = format!("{HEADER}\n1 2\n2023/xx/05 14:40 (2x2)\n5 6\n{HEADER}\n7 8\n");
        let series = parse(&text);

        assert_eq!(series.frames().len(), 2);
        assert_eq!(series.frames()[0].grid.values(), &[1.0, 2.0, 0.0, 0.0]);
        assert_eq!(series.frames()[1].grid.values(), &[7.0, 8.0, 0.0, 0.0]);
        assert_eq!(series.issues().len(), 1);
        assert_eq!(series.issues()[0].line_number, 3);
        assert!(matches!(
            series.issues()[0].error,
            ReportReaderError::DateParse(_)
        ));
    }

    #[test]
    fn grid_header_failure_keeps_previous_grid_size() {
        let text = format!("{HEADER}\n1 2\n2023/08/05 14:40 JST RAP (2y2)\n5 6\n");
        let series = parse(&text);

        assert_eq!(series.frames().len(), 2);
        assert_eq!(
            series.frames()[1].observation_date_time,
            datetime!(2023-08-05 14:40)
        );
        assert_eq!(series.frames()[1].grid.values(), &[5.0, 6.0, 0.0, 0.0]);
        assert!(matches!(
            series.issues()[0].error,
            ReportReaderError::GridHeader(_)
        ));
    }

    #[test]
    fn non_numeric_row_is_skipped_entirely() {
        let text = format!("{HEADER}\n1 2\n3 abc\n4 5\n");
        let series = parse(&text);

        assert_eq!(series.frames()[0].grid.values(), &[1.0, 2.0, 4.0, 5.0]);
        let issue = &series.issues()[0];
        assert_eq!(issue.line_number, 3);
        assert_eq!(issue.line, "3 abc");
        assert_eq!(issue.error, ReportReaderError::NumericRow("abc".to_string()));
    }

    #[test]
    fn overflowing_block_is_dropped() {
        let text = format!("{HEADER}\n1 2\n3 4\n5 6\n{HEADER}\n7 8\n");
        let series = parse(&text);

        assert_eq!(series.frames().len(), 1);
        assert_eq!(series.frames()[0].grid.values(), &[7.0, 8.0, 0.0, 0.0]);
        assert_eq!(series.issues()[0].line_number, 1);
        assert!(matches!(
            series.issues()[0].error,
            ReportReaderError::GridShape(_)
        ));
    }

    #[test]
    fn mismatched_grid_size_is_dropped() {
        let text = format!("{HEADER}\n1 2\n2023/08/05 14:40 JST RAP (3x2)\n5 6 7\n");
        let series = parse(&text);

        assert_eq!(series.frames().len(), 1);
        assert!(matches!(
            series.issues()[0].error,
            ReportReaderError::GridShape(_)
        ));
    }

    #[test]
    fn rows_before_first_header_are_rejected() {
        let text = format!("1 2\n{HEADER}\n3 4\n");
        let series = parse(&text);

        assert_eq!(series.frames().len(), 1);
        assert_eq!(series.issues()[0].line_number, 1);
    }

    #[test]
    fn report_without_coordinates_is_undefined() {
        let result = parse_report("2023/08/05 14:30 JST RAP (2x2)\n1 2\n".as_bytes());
        assert_eq!(result.unwrap_err(), ReportReaderError::GridUndefined);
    }

    #[test]
    fn series_new_checks_grid_shape() {
        let axes = Axes::from_origin(135.0, 1.0, 2, 35.0, 1.0, 2);
        let frame = Frame {
            observation_date_time: datetime!(2023-08-05 14:30),
            grid: Grid::zeros(3, 2),
        };
        assert!(Series::new(axes, vec![frame]).is_err());
    }
}
