use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use plasmaq_config::AppConfig;
use plasmaq_frontend::{
    OutputFormat, QuoteRequest, collect_drawings, extract_batch, load_app_config, quote_drawings,
    render_parse, render_quote, weigh_parsed,
};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

/// 等离子切割 DXF 几何提取与报价。
#[derive(Debug, Parser)]
#[command(name = "plasmaq", version)]
struct Cli {
    /// 配置文件路径，缺省时按 PLASMAQ_CONFIG 与 ./config/default.toml 查找
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// 以 JSON 输出
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// 提取图纸的切割长度、面积与穿孔数
    Parse {
        /// 同时给出板厚时输出毛重与净重
        #[arg(long, requires = "thickness")]
        material: Option<String>,
        /// 板厚（英寸）
        #[arg(long, requires = "material")]
        thickness: Option<f64>,
        /// DXF 文件或目录
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// 提取图纸并按材料与板厚报价
    Quote(QuoteArgs),
}

#[derive(Debug, Args)]
struct QuoteArgs {
    #[arg(long)]
    material: String,
    /// 板厚（英寸）
    #[arg(long)]
    thickness: f64,
    #[arg(long, default_value_t = 1)]
    quantity: u32,
    #[arg(required = true)]
    paths: Vec<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_app_config(cli.config.as_deref());
    init_logging(&config);
    info!("启动 plasmaq");

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };
    let output = match cli.command {
        Command::Parse {
            material,
            thickness,
            paths,
        } => {
            let sources = collect_drawings(&paths).context("无法收集图纸")?;
            let mut drawings = extract_batch(&sources, &config.extraction);
            if let (Some(material), Some(thickness)) = (material, thickness) {
                weigh_parsed(&mut drawings, &material, thickness, &config)
                    .context("无法计算重量")?;
            }
            render_parse(&drawings, format)?
        }
        Command::Quote(args) => {
            let request = QuoteRequest {
                material: args.material,
                thickness: args.thickness,
                quantity: args.quantity,
            };
            let report = quote_drawings(&args.paths, &request, &config).context("报价失败")?;
            render_quote(&report, format)?
        }
    };
    print!("{output}");
    if format == OutputFormat::Json {
        println!();
    }
    Ok(())
}

/// 日志写入 stderr，stdout 只留给报告。
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_new(config.logging.level.clone()).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if subscriber.try_init().is_err() {
        // 已初始化，忽略
    }
}
