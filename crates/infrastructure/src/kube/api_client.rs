//! k8s REST动态客户端
//!
//! `DynamicApi`端口的生产实现：按GVR拼接API路径，直接调用
//! api server的REST接口。服务器地址优先取配置的`k8s_api_server`，
//! 否则从kubeconfig解析（`$HOME/.kube/config`或项目内配置）。

use async_trait::async_trait;
use convoy_config::AppConfig;
use convoy_domain::ports::{DynamicApi, GroupVersionResource};
use convoy_errors::{ConvoyError, ConvoyResult};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

pub struct KubeRestApi {
    base_url: String,
    client: reqwest::Client,
    bearer_token: Option<String>,
}

impl KubeRestApi {
    pub fn from_config(config: &AppConfig) -> ConvoyResult<Self> {
        let mut bearer_token = config.kube_bearer_token.clone();
        let mut insecure = config.kube_insecure_skip_tls_verify;

        let base_url = match &config.k8s_api_server {
            Some(server) if !server.is_empty() => server.clone(),
            _ => {
                let path = config.resolve_kube_config_path();
                info!("读取kube配置文件: {}", path.display());
                let kubeconfig = KubeConfigFile::load(&path)?;
                if bearer_token.is_none() {
                    bearer_token = kubeconfig.token();
                }
                insecure = insecure || kubeconfig.insecure_skip_tls_verify();
                kubeconfig.server()?
            }
        };

        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(insecure)
            .build()
            .map_err(|e| ConvoyError::cluster(format!("构建k8s http客户端失败: {e}")))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            bearer_token,
        })
    }

    fn collection_path(&self, gvr: &GroupVersionResource, namespace: Option<&str>) -> String {
        let prefix = if gvr.group.is_empty() {
            format!("{}/api/{}", self.base_url, gvr.version)
        } else {
            format!("{}/apis/{}/{}", self.base_url, gvr.group, gvr.version)
        };
        match namespace {
            Some(ns) => format!("{}/namespaces/{}/{}", prefix, ns, gvr.resource),
            None => format!("{}/{}", prefix, gvr.resource),
        }
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.bearer_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn check(&self, response: reqwest::Response) -> ConvoyResult<Value> {
        let status = response.status();
        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| ConvoyError::cluster(format!("解析api server响应失败: {e}")));
        }
        let body = response.text().await.unwrap_or_default();
        match status {
            StatusCode::CONFLICT => Err(ConvoyError::ClusterConflict(body)),
            StatusCode::NOT_FOUND => Err(ConvoyError::cluster(format!("资源不存在: {body}"))),
            _ => Err(ConvoyError::cluster(format!("api server返回{status}: {body}"))),
        }
    }
}

#[async_trait]
impl DynamicApi for KubeRestApi {
    async fn create(
        &self,
        gvr: &GroupVersionResource,
        namespace: Option<&str>,
        manifest: &Value,
    ) -> ConvoyResult<Value> {
        let url = self.collection_path(gvr, namespace);
        let response = self
            .request(self.client.post(&url).json(manifest))
            .send()
            .await
            .map_err(|e| ConvoyError::cluster(format!("请求api server失败: {e}")))?;
        self.check(response).await
    }

    async fn get(
        &self,
        gvr: &GroupVersionResource,
        namespace: Option<&str>,
        name: &str,
    ) -> ConvoyResult<Value> {
        let url = format!("{}/{}", self.collection_path(gvr, namespace), name);
        let response = self
            .request(self.client.get(&url))
            .send()
            .await
            .map_err(|e| ConvoyError::cluster(format!("请求api server失败: {e}")))?;
        self.check(response).await
    }

    async fn replace(
        &self,
        gvr: &GroupVersionResource,
        namespace: Option<&str>,
        name: &str,
        manifest: &Value,
    ) -> ConvoyResult<Value> {
        let url = format!("{}/{}", self.collection_path(gvr, namespace), name);
        let response = self
            .request(self.client.put(&url).json(manifest))
            .send()
            .await
            .map_err(|e| ConvoyError::cluster(format!("请求api server失败: {e}")))?;
        self.check(response).await
    }

    async fn delete(
        &self,
        gvr: &GroupVersionResource,
        namespace: Option<&str>,
        name: &str,
    ) -> ConvoyResult<()> {
        let url = format!("{}/{}", self.collection_path(gvr, namespace), name);
        let body = json!({
            "apiVersion": "v1",
            "kind": "DeleteOptions",
            "propagationPolicy": "Foreground",
        });
        let response = self
            .request(self.client.delete(&url).json(&body))
            .send()
            .await
            .map_err(|e| ConvoyError::cluster(format!("请求api server失败: {e}")))?;
        self.check(response).await.map(|_| ())
    }
}

/// kubeconfig的最小解析：server地址、token、TLS校验开关。
#[derive(Debug, Deserialize)]
struct KubeConfigFile {
    #[serde(default)]
    clusters: Vec<NamedCluster>,
    #[serde(default)]
    users: Vec<NamedUser>,
}

#[derive(Debug, Deserialize)]
struct NamedCluster {
    cluster: ClusterEntry,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ClusterEntry {
    server: String,
    #[serde(rename = "insecure-skip-tls-verify")]
    insecure_skip_tls_verify: bool,
}

#[derive(Debug, Deserialize)]
struct NamedUser {
    user: UserEntry,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct UserEntry {
    token: Option<String>,
}

impl KubeConfigFile {
    fn load(path: &std::path::Path) -> ConvoyResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConvoyError::config_error(format!("读取kube配置文件{}失败: {e}", path.display()))
        })?;
        serde_yaml::from_str(&content)
            .map_err(|e| ConvoyError::config_error(format!("解析kube配置文件失败: {e}")))
    }

    fn server(&self) -> ConvoyResult<String> {
        self.clusters
            .first()
            .map(|c| c.cluster.server.clone())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ConvoyError::config_error("kube配置文件缺少cluster server"))
    }

    fn token(&self) -> Option<String> {
        self.users.first().and_then(|u| u.user.token.clone())
    }

    fn insecure_skip_tls_verify(&self) -> bool {
        self.clusters
            .first()
            .map(|c| c.cluster.insecure_skip_tls_verify)
            .unwrap_or(false)
    }
}
