/// 点表→ST代码生成器命令行入口
///
/// 用法:
///   stgen <点表.xlsx> [--config <config.json>] [--templates <目录>]
///         [--mapping <映射.json>] [--out <目录>]
use std::path::PathBuf;
use std::process;

use stgen_lib::{run_pipeline, AppConfig};

/// 解析后的命令行参数
struct CliArgs {
    input: PathBuf,
    config_file: Option<PathBuf>,
    template_dir: Option<PathBuf>,
    mapping_file: Option<PathBuf>,
    output_dir: Option<PathBuf>,
}

fn print_usage() {
    eprintln!("用法: stgen <点表.xlsx> [--config <config.json>] [--templates <目录>] [--mapping <映射.json>] [--out <目录>]");
}

fn parse_args() -> Option<CliArgs> {
    let mut args = std::env::args().skip(1);
    let mut input = None;
    let mut config_file = None;
    let mut template_dir = None;
    let mut mapping_file = None;
    let mut output_dir = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => config_file = args.next().map(PathBuf::from),
            "--templates" => template_dir = args.next().map(PathBuf::from),
            "--mapping" => mapping_file = args.next().map(PathBuf::from),
            "--out" => output_dir = args.next().map(PathBuf::from),
            "-h" | "--help" => return None,
            other => {
                if input.is_none() {
                    input = Some(PathBuf::from(other));
                } else {
                    eprintln!("多余的参数: {}", other);
                    return None;
                }
            }
        }
    }

    Some(CliArgs {
        input: input?,
        config_file,
        template_dir,
        mapping_file,
        output_dir,
    })
}

#[tokio::main]
async fn main() {
    // 日志初始化：默认info级别，可用RUST_LOG覆盖
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let Some(args) = parse_args() else {
        print_usage();
        process::exit(2);
    };

    let mut config = match &args.config_file {
        Some(path) => match AppConfig::load_from_file(path) {
            Ok(config) => config,
            Err(e) => {
                log::error!("加载配置失败: {}", e);
                process::exit(1);
            }
        },
        None => AppConfig::default(),
    };
    // 命令行参数覆盖配置文件
    if let Some(dir) = args.template_dir {
        config.template_dir = dir;
    }
    if let Some(file) = args.mapping_file {
        config.template_mapping_file = file;
    }
    if let Some(dir) = args.output_dir {
        config.output_dir = dir;
    }

    match run_pipeline(&args.input, &config).await {
        Ok(output) => {
            log::info!(
                "生成完成: ST文件{}个，输出目录{}",
                output.st_files.len(),
                config.output_dir.display()
            );
            if let Some(table) = &output.variable_table {
                log::info!("变量声明表: {}", table.display());
            }
            if output.summary.has_warnings() {
                log::warn!("本次运行共{}条警告:", output.summary.warnings.len());
                for warning in &output.summary.warnings {
                    log::warn!("  - {}", warning);
                }
            }
        }
        Err(e) => {
            log::error!("生成失败: {}", e);
            process::exit(1);
        }
    }
}
