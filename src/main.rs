use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use time::OffsetDateTime;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use jma_txt2nc::config::Txt2NcConfig;
use jma_txt2nc::inspect::inspect;
use jma_txt2nc::readers::read_report;
use jma_txt2nc::writers::write_netcdf;

#[derive(Parser, Debug)]
#[command(name = "txt2nc")]
#[command(about = "解析雨量テキストをNetCDFファイルに変換する")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// ログ・レベル
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 解析雨量テキストをNetCDFファイルに変換する
    Convert {
        /// 設定ファイルのパス
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// 解析雨量テキストファイルのパス（設定ファイルより優先）
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// 出力するNetCDFファイルのパス（設定ファイルより優先）
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// NetCDFファイルの構造と降水強度を出力する
    Inspect {
        /// NetCDFファイルのパス
        path: PathBuf,
    },
}

fn main() -> ExitCode {
    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("ロガーを初期化できませんでした。{e}");
        return ExitCode::FAILURE;
    }

    match run(args.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:?}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command) -> anyhow::Result<()> {
    match command {
        Command::Convert {
            config,
            input,
            output,
        } => {
            let mut config = match config {
                Some(path) => Txt2NcConfig::load(&path)
                    .with_context(|| format!("設定ファイル`{}`", path.display()))?,
                None => Txt2NcConfig::default(),
            };
            if let Some(input) = input {
                config.input = input;
            }
            if let Some(output) = output {
                config.output = output;
            }
            convert(&config)
        }
        Command::Inspect { path } => {
            let stdout = std::io::stdout();
            inspect(&path, &mut stdout.lock())
                .with_context(|| format!("`{}`を出力できませんでした。", path.display()))
        }
    }
}

fn convert(config: &Txt2NcConfig) -> anyhow::Result<()> {
    info!(input = %config.input.display(), output = %config.output.display(), "変換を開始します。");
    let series = read_report(&config.input)
        .with_context(|| format!("`{}`を読み込めませんでした。", config.input.display()))?;
    let generated_at = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    write_netcdf(
        &series,
        &config.output,
        &config.window,
        &config.attributes,
        generated_at,
    )
    .with_context(|| format!("`{}`を書き込めませんでした。", config.output.display()))?;

    Ok(())
}
