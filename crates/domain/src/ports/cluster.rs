//! k8s动态客户端端口

use async_trait::async_trait;
use convoy_errors::ConvoyResult;

/// 资源的group/version/resource三元组
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupVersionResource {
    /// core组为空字符串
    pub group: &'static str,
    pub version: &'static str,
    /// 资源复数名，如deployments
    pub resource: &'static str,
}

/// 按GVR操作任意资源的动态客户端。
///
/// `namespace`为None表示集群级资源。乐观并发冲突必须以
/// `ConvoyError::ClusterConflict`返回，由上层门面透明重试。
#[async_trait]
pub trait DynamicApi: Send + Sync {
    /// 创建资源，返回服务端视角的对象。
    async fn create(
        &self,
        gvr: &GroupVersionResource,
        namespace: Option<&str>,
        manifest: &serde_json::Value,
    ) -> ConvoyResult<serde_json::Value>;

    async fn get(
        &self,
        gvr: &GroupVersionResource,
        namespace: Option<&str>,
        name: &str,
    ) -> ConvoyResult<serde_json::Value>;

    /// 整体替换资源（PUT），冲突返回`ClusterConflict`。
    async fn replace(
        &self,
        gvr: &GroupVersionResource,
        namespace: Option<&str>,
        name: &str,
        manifest: &serde_json::Value,
    ) -> ConvoyResult<serde_json::Value>;

    /// 删除资源，前台级联传播。
    async fn delete(
        &self,
        gvr: &GroupVersionResource,
        namespace: Option<&str>,
        name: &str,
    ) -> ConvoyResult<()>;
}
