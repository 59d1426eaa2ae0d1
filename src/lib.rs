//! 解析雨量（レーダー・アメダス解析雨量）のテキスト出力を読み込み、
//! 経度と緯度の範囲を抽出して、CF規約に従ったNetCDFファイルに変換する。
//!
//! ```no_run
//! use jma_txt2nc::readers::read_report;
//! use jma_txt2nc::writers::{write_netcdf, GlobalAttributes, Window};
//!
//! # fn main() -> anyhow::Result<()> {
//! let series = read_report("output.txt")?;
//! let window = Window::new((134.5, 136.5), (34.0, 36.0));
//! write_netcdf(
//!     &series,
//!     "output_formatted.nc",
//!     &window,
//!     &GlobalAttributes::default(),
//!     time::OffsetDateTime::now_utc(),
//! )?;
//! # Ok(())
//! # }
//! ```
pub mod config;
pub mod inspect;
pub mod readers;
pub mod writers;
