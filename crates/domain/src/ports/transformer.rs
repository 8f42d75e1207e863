//! compose转换器端口

use std::path::PathBuf;

use async_trait::async_trait;
use convoy_errors::ConvoyResult;

use crate::entities::ControllerType;

/// 一次转换调用的选项，由配置按请求构造，不存在进程级全局可变状态。
#[derive(Debug, Clone)]
pub struct TransformOptions {
    /// 输入的docker-compose文件
    pub input_file: PathBuf,
    /// 产物输出目录
    pub out_dir: PathBuf,
    pub provider: &'static str,
    pub volumes: &'static str,
    pub yaml_indent: u32,
    pub with_annotations: bool,
    /// 覆盖生成资源的副本数
    pub replicas: Option<i32>,
    pub controller: Option<ControllerType>,
}

impl TransformOptions {
    pub fn new(input_file: PathBuf, out_dir: PathBuf) -> Self {
        Self {
            input_file,
            out_dir,
            provider: "kubernetes",
            volumes: "persistentVolumeClaim",
            yaml_indent: 2,
            with_annotations: true,
            replicas: None,
            controller: None,
        }
    }

    /// 转换器的controller参数值；Helm走chart模式，没有controller参数。
    pub fn controller_flag(&self) -> Option<&'static str> {
        match self.controller? {
            ControllerType::ReplicationController => Some("replicationcontroller"),
            ControllerType::DaemonSet => Some("daemonset"),
            ControllerType::Statefulset => Some("statefulset"),
            ControllerType::Helm => None,
        }
    }

    pub fn wants_chart(&self) -> bool {
        matches!(self.controller, Some(ControllerType::Helm))
    }
}

/// docker-compose → k8s manifest转换器。
///
/// 实现必须把转换失败作为普通错误返回，不允许终止进程；
/// 产物以文件形式写入`out_dir`，由调用方对比目录快照收集。
#[async_trait]
pub trait ComposeTransformer: Send + Sync {
    async fn transform(&self, opts: &TransformOptions) -> ConvoyResult<()>;
}
