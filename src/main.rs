use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Arg, Command};
use convoy_config::{AppConfig, MongoConfig};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod app;
mod shutdown;

use app::Application;
use shutdown::ShutdownManager;

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("convoy")
        .version("0.1.0")
        .about("k8s任务调度服务：接收YAML任务、按计划执行k8s资源、转换docker-compose")
        .arg(
            Arg::new("cnf")
                .short('c')
                .long("cnf")
                .value_name("FILE")
                .help("主配置文件路径（JSON）"),
        )
        .arg(
            Arg::new("mongo-cnf")
                .long("mongo-cnf")
                .value_name("FILE")
                .help("mongoDB配置文件路径（JSON）"),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("日志格式")
                .value_parser(["json", "pretty"])
                .default_value("pretty"),
        )
        .get_matches();

    let config_path = matches.get_one::<String>("cnf").map(String::as_str);
    let mongo_config_path = matches.get_one::<String>("mongo-cnf").map(String::as_str);
    let log_format = matches.get_one::<String>("log-format").expect("有默认值");

    let config = AppConfig::load(config_path).context("加载主配置失败")?;
    let mongo_config = MongoConfig::load(mongo_config_path).context("加载mongo配置失败")?;

    let _log_guard = init_logging(&config.log_level, log_format, config.log_file.as_deref())?;

    info!("启动convoy任务调度服务");

    let shutdown_manager = ShutdownManager::new();
    let app = Application::new(config, mongo_config, shutdown_manager.subscribe()).await?;

    let app_handle = {
        let shutdown_rx = shutdown_manager.subscribe();
        tokio::spawn(async move {
            if let Err(e) = app.run(shutdown_rx).await {
                error!("应用运行失败: {e}");
            }
        })
    };

    wait_for_shutdown_signal().await;
    info!("收到关闭信号，开始优雅关闭...");
    shutdown_manager.shutdown().await;

    match tokio::time::timeout(Duration::from_secs(30), app_handle).await {
        Ok(result) => {
            if let Err(e) = result {
                error!("应用关闭时发生错误: {e}");
            } else {
                info!("应用已优雅关闭");
            }
        }
        Err(_) => {
            warn!("应用关闭超时，强制退出");
        }
    }

    info!("convoy任务调度服务已退出");
    Ok(())
}

/// 初始化日志系统；配置了log_file时同时写入文件。
fn init_logging(
    log_level: &str,
    log_format: &str,
    log_file: Option<&str>,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let registry = tracing_subscriber::registry().with(env_filter);

    let guard = match log_format {
        "json" => {
            let (file_layer, guard) = build_file_layer(log_file);
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .with(file_layer)
                .try_init()
                .context("初始化JSON日志格式失败")?;
            guard
        }
        "pretty" => {
            let (file_layer, guard) = build_file_layer(log_file);
            registry
                .with(tracing_subscriber::fmt::layer().pretty())
                .with(file_layer)
                .try_init()
                .context("初始化Pretty日志格式失败")?;
            guard
        }
        _ => {
            return Err(anyhow::anyhow!("不支持的日志格式: {log_format}"));
        }
    };

    Ok(guard)
}

fn build_file_layer<S>(
    log_file: Option<&str>,
) -> (
    Option<tracing_subscriber::fmt::Layer<S, tracing_subscriber::fmt::format::DefaultFields, tracing_subscriber::fmt::format::Format, tracing_appender::non_blocking::NonBlocking>>,
    Option<tracing_appender::non_blocking::WorkerGuard>,
)
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    match log_file {
        Some(path) => {
            let path = std::path::Path::new(path);
            let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
            let file_name = path.file_name().unwrap_or_else(|| "convoy.log".as_ref());
            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    }
}

/// 等待Ctrl+C或SIGTERM。
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("安装Ctrl+C信号处理器失败: {e}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => error!("安装SIGTERM信号处理器失败: {e}"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("收到Ctrl+C信号");
        },
        _ = terminate => {
            info!("收到SIGTERM信号");
        },
    }
}
