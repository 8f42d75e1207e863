//! manifest解析辅助
//!
//! yaml字符串到JSON对象的转换，以及kind/name/namespace的提取。
//! 一个任务项可能包含以`---`分隔的多份文档。

use convoy_errors::{ConvoyError, ConvoyResult};
use serde::Deserialize;
use serde_json::Value;

/// 解析manifest中的全部文档，空文档跳过。
pub fn parse_documents(yaml: &str) -> ConvoyResult<Vec<Value>> {
    let mut documents = Vec::new();
    for deserializer in serde_yaml::Deserializer::from_str(yaml) {
        let value = Value::deserialize(deserializer)?;
        if value.is_null() {
            continue;
        }
        if !value.is_object() {
            return Err(ConvoyError::validation("manifest必须是对象"));
        }
        documents.push(value);
    }
    if documents.is_empty() {
        return Err(ConvoyError::validation("manifest为空"));
    }
    Ok(documents)
}

pub fn kind_of(doc: &Value) -> ConvoyResult<&str> {
    doc.get("kind")
        .and_then(Value::as_str)
        .ok_or_else(|| ConvoyError::validation("manifest缺少kind字段"))
}

pub fn name_of(doc: &Value) -> ConvoyResult<&str> {
    doc.pointer("/metadata/name")
        .and_then(Value::as_str)
        .ok_or_else(|| ConvoyError::validation("manifest缺少metadata.name字段"))
}

/// manifest声明的namespace，未声明返回None。
pub fn namespace_of(doc: &Value) -> Option<&str> {
    doc.pointer("/metadata/namespace").and_then(Value::as_str)
}

/// 提取一段yaml内全部文档的(kind, name)。删除任务时用来清理已创建的资源。
pub fn kind_name_pairs(yaml: &str) -> ConvoyResult<Vec<(String, String)>> {
    let documents = parse_documents(yaml)?;
    let mut pairs = Vec::with_capacity(documents.len());
    for doc in &documents {
        pairs.push((kind_of(doc)?.to_string(), name_of(doc)?.to_string()));
    }
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEPLOYMENT: &str = r#"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: nginx
spec:
  replicas: 1
"#;

    #[test]
    fn single_document_parses() {
        let docs = parse_documents(DEPLOYMENT).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(kind_of(&docs[0]).unwrap(), "Deployment");
        assert_eq!(name_of(&docs[0]).unwrap(), "nginx");
        assert!(namespace_of(&docs[0]).is_none());
    }

    #[test]
    fn multi_document_yaml_splits() {
        let yaml = format!("{DEPLOYMENT}---\nkind: Service\nmetadata:\n  name: nginx-svc\n");
        let pairs = kind_name_pairs(&yaml).unwrap();
        assert_eq!(
            pairs,
            vec![
                ("Deployment".to_string(), "nginx".to_string()),
                ("Service".to_string(), "nginx-svc".to_string()),
            ]
        );
    }

    #[test]
    fn namespace_is_read_when_present() {
        let yaml = "kind: Pod\nmetadata:\n  name: p\n  namespace: staging\n";
        let docs = parse_documents(yaml).unwrap();
        assert_eq!(namespace_of(&docs[0]), Some("staging"));
    }

    #[test]
    fn empty_and_malformed_manifests_are_rejected() {
        assert!(parse_documents("").is_err());
        assert!(parse_documents("just a string").is_err());
        assert!(parse_documents("key: [unclosed").is_err());
    }

    #[test]
    fn missing_name_is_rejected() {
        let docs = parse_documents("kind: Pod\nmetadata: {}\n").unwrap();
        assert!(name_of(&docs[0]).is_err());
    }
}
