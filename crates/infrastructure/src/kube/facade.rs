//! 集群apply/delete门面
//!
//! 解析manifest、查资源类型表、分发到namespaced或集群级操作。
//! 乐观并发冲突在门面内有界重试，其余错误原样向上传播。

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use convoy_domain::ports::DynamicApi;
use convoy_errors::{ConvoyError, ConvoyResult};
use serde_json::Value;
use tracing::{error, info, warn};

use super::manifest;
use super::resource_map::ResourceKind;

/// 冲突重试上限
const MAX_CONFLICT_ATTEMPTS: u64 = 5;

const DEFAULT_NAMESPACE: &str = "default";

/// 一次成功创建的资源
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedResource {
    pub kind: ResourceKind,
    pub name: String,
    /// 创建时使用的namespace；集群级资源为None
    pub namespace: Option<String>,
}

/// apply的结果：已创建的资源加上首个错误。
///
/// 一个任务项可能含多份文档，中途失败时调用方仍需要拿到之前
/// 已创建的资源用于回滚，所以不能用单纯的Result表达。
#[derive(Debug)]
pub struct ApplyOutcome {
    pub created: Vec<AppliedResource>,
    pub error: Option<ConvoyError>,
}

impl ApplyOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    fn failed(error: ConvoyError) -> Self {
        Self {
            created: Vec::new(),
            error: Some(error),
        }
    }
}

pub struct ClusterFacade {
    api: Arc<dyn DynamicApi>,
}

impl ClusterFacade {
    pub fn new(api: Arc<dyn DynamicApi>) -> Self {
        Self { api }
    }

    /// 按文档顺序创建manifest中的资源。
    pub async fn apply(&self, yaml: &str) -> ApplyOutcome {
        let documents = match manifest::parse_documents(yaml) {
            Ok(docs) => docs,
            Err(e) => {
                error!("创建k8s资源-转换yaml格式失败: {}", e);
                return ApplyOutcome::failed(e);
            }
        };

        let mut created = Vec::new();
        for doc in &documents {
            match self.create_one(doc).await {
                Ok(resource) => {
                    info!(
                        "创建k8s资源-{}-成功: name={}",
                        resource.kind, resource.name
                    );
                    created.push(resource);
                }
                Err(e) => {
                    error!("创建k8s资源-失败: {}", e);
                    return ApplyOutcome {
                        created,
                        error: Some(e),
                    };
                }
            }
        }
        ApplyOutcome {
            created,
            error: None,
        }
    }

    async fn create_one(&self, doc: &Value) -> ConvoyResult<AppliedResource> {
        let kind = ResourceKind::from_str(manifest::kind_of(doc)?)?;
        let meta = kind.metadata();
        let namespace = if meta.namespaced {
            Some(
                manifest::namespace_of(doc)
                    .unwrap_or(DEFAULT_NAMESPACE)
                    .to_string(),
            )
        } else {
            None
        };
        let result = self.api.create(&meta.gvr, namespace.as_deref(), doc).await?;
        let name = result
            .pointer("/metadata/name")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| manifest::name_of(doc).map(str::to_string).unwrap_or_default());
        Ok(AppliedResource {
            kind,
            name,
            namespace,
        })
    }

    /// 按kind字符串删除default namespace（或集群级）的资源。
    pub async fn delete(&self, kind: &str, name: &str) -> ConvoyResult<()> {
        let kind = ResourceKind::from_str(kind)?;
        self.delete_resource(kind, None, name).await
    }

    /// 删除指定namespace的资源，前台级联传播。
    pub async fn delete_resource(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
        name: &str,
    ) -> ConvoyResult<()> {
        let meta = kind.metadata();
        let namespace = if meta.namespaced {
            Some(namespace.unwrap_or(DEFAULT_NAMESPACE))
        } else {
            None
        };
        self.api.delete(&meta.gvr, namespace, name).await?;
        info!("删除k8s资源-{}-成功: name={}", kind, name);
        Ok(())
    }

    /// 更新deployment的replicas数量，冲突时有界重试。
    pub async fn update_replicas(&self, deployment_name: &str, n: i64) -> ConvoyResult<()> {
        info!(
            "更新deployment的replicas数量-开始: name={} replicas={}",
            deployment_name, n
        );
        let gvr = ResourceKind::Deployment.metadata().gvr;
        let mut attempt = 0u64;
        loop {
            attempt += 1;
            let mut deployment = self
                .api
                .get(&gvr, Some(DEFAULT_NAMESPACE), deployment_name)
                .await?;
            deployment["spec"]["replicas"] = Value::from(n);
            match self
                .api
                .replace(&gvr, Some(DEFAULT_NAMESPACE), deployment_name, &deployment)
                .await
            {
                Ok(_) => {
                    info!(
                        "更新deployment的replicas数量-成功: name={} replicas={}",
                        deployment_name, n
                    );
                    return Ok(());
                }
                Err(ConvoyError::ClusterConflict(msg)) if attempt < MAX_CONFLICT_ATTEMPTS => {
                    warn!(
                        "更新deployment的replicas数量-冲突重试: name={} attempt={} {}",
                        deployment_name, attempt, msg
                    );
                    tokio::time::sleep(Duration::from_millis(100 * attempt)).await;
                }
                Err(e) => {
                    error!(
                        "更新deployment的replicas数量-更新错误: name={} {}",
                        deployment_name, e
                    );
                    return Err(e);
                }
            }
        }
    }

    /// 更新deployment内各容器的镜像，images数量必须与容器数量一致。
    pub async fn update_images(
        &self,
        deployment_name: &str,
        images: &[String],
    ) -> ConvoyResult<()> {
        info!(
            "更新deployment的镜像-开始: name={} images={:?}",
            deployment_name, images
        );
        let gvr = ResourceKind::Deployment.metadata().gvr;
        let mut attempt = 0u64;
        loop {
            attempt += 1;
            let mut deployment = self
                .api
                .get(&gvr, Some(DEFAULT_NAMESPACE), deployment_name)
                .await?;
            let containers = deployment
                .pointer_mut("/spec/template/spec/containers")
                .and_then(Value::as_array_mut)
                .ok_or_else(|| ConvoyError::cluster("提取容器信息失败"))?;
            if containers.len() != images.len() {
                return Err(ConvoyError::ArityMismatch {
                    expected: containers.len(),
                    actual: images.len(),
                });
            }
            for (container, image) in containers.iter_mut().zip(images) {
                container["image"] = Value::from(image.as_str());
            }
            match self
                .api
                .replace(&gvr, Some(DEFAULT_NAMESPACE), deployment_name, &deployment)
                .await
            {
                Ok(_) => {
                    info!("更新deployment的镜像-成功: name={}", deployment_name);
                    return Ok(());
                }
                Err(ConvoyError::ClusterConflict(msg)) if attempt < MAX_CONFLICT_ATTEMPTS => {
                    warn!(
                        "更新deployment的镜像-冲突重试: name={} attempt={} {}",
                        deployment_name, attempt, msg
                    );
                    tokio::time::sleep(Duration::from_millis(100 * attempt)).await;
                }
                Err(e) => {
                    error!("更新deployment的镜像-更新错误: name={} {}", deployment_name, e);
                    return Err(e);
                }
            }
        }
    }
}
