//! kompose子进程驱动
//!
//! 转换器以独立进程运行：转换库的fatal路径被进程边界隔离，
//! 对本服务只表现为非零退出码，变成普通错误返回。

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use convoy_domain::ports::{ComposeTransformer, TransformOptions};
use convoy_errors::{ConvoyError, ConvoyResult};
use tokio::process::Command;
use tracing::info;

pub struct KomposeDriver {
    binary: PathBuf,
}

impl KomposeDriver {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl ComposeTransformer for KomposeDriver {
    async fn transform(&self, opts: &TransformOptions) -> ConvoyResult<()> {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("convert")
            .arg("-f")
            .arg(&opts.input_file)
            .arg("-o")
            .arg(&opts.out_dir)
            .arg("--provider")
            .arg(opts.provider)
            .arg("--volumes")
            .arg(opts.volumes)
            .arg("--yaml-indent")
            .arg(opts.yaml_indent.to_string())
            .arg(format!("--with-kompose-annotation={}", opts.with_annotations));
        if let Some(replicas) = opts.replicas {
            cmd.arg("--replicas").arg(replicas.to_string());
        }
        if let Some(controller) = opts.controller_flag() {
            cmd.arg("--controller").arg(controller);
        }
        if opts.wants_chart() {
            cmd.arg("--chart");
        }
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

        info!("调用kompose: {:?} {:?}", self.binary, opts.input_file);
        let output = cmd
            .output()
            .await
            .map_err(|e| ConvoyError::conversion(format!("启动kompose失败: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ConvoyError::conversion(format!(
                "kompose转换失败 退出码{:?}: {}",
                output.status.code(),
                stderr.trim()
            )));
        }
        Ok(())
    }
}
