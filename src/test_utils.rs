// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Test utilities: an in-memory Kubernetes API server behind a kube Client.
//!
//! Supports get, list, create, replace (with resourceVersion conflicts),
//! merge-patch (including the status subresource) and delete with
//! finalizer semantics. Watches are not served.

use crate::constants::MASTER_SECRET_KEY;
use crate::types::{
    DerivedKeySpec, DerivedSecret, DerivedSecretSpec, MasterSecret, MasterSecretSpec,
    SecretReference, SecretType,
};
use bytes::Bytes;
use chrono::{SecondsFormat, Utc};
use http::{Request, Response};
use http_body_util::BodyExt;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;
use kube::client::Body;
use kube::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tower::Service;

/// (plural, namespace or "", name)
type ObjectKey = (String, String, String);

#[derive(Default)]
struct FakeState {
    objects: BTreeMap<ObjectKey, Value>,
    resource_version: u64,
    uid: u64,
    failures: Vec<(String, String, u16)>,
    requests: Vec<(String, String)>,
}

impl FakeState {
    fn next_resource_version(&mut self) -> String {
        self.resource_version += 1;
        self.resource_version.to_string()
    }

    fn next_uid(&mut self) -> String {
        self.uid += 1;
        format!("00000000-0000-0000-0000-{:012}", self.uid)
    }
}

struct Target {
    plural: String,
    namespace: Option<String>,
    name: Option<String>,
    subresource: Option<String>,
}

impl Target {
    fn parse(path: &str) -> Option<Self> {
        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
        let rest = match segments.first() {
            Some(&"api") if segments.len() >= 2 => &segments[2..],
            Some(&"apis") if segments.len() >= 3 => &segments[3..],
            _ => return None,
        };

        let (namespace, rest) = if rest.first() == Some(&"namespaces") && rest.len() >= 3 {
            (Some(rest[1].to_string()), &rest[2..])
        } else {
            (None, rest)
        };

        Some(Target {
            plural: rest.first()?.to_string(),
            namespace,
            name: rest.get(1).map(|s| s.to_string()),
            subresource: rest.get(2).map(|s| s.to_string()),
        })
    }

    fn key(&self, name: &str) -> ObjectKey {
        (
            self.plural.clone(),
            self.namespace.clone().unwrap_or_default(),
            name.to_string(),
        )
    }

    /// Custom resources carry a status subresource and a generation
    fn is_custom(&self) -> bool {
        self.plural != "secrets"
    }
}

/// A fake Kubernetes API server keeping objects in memory.
#[derive(Clone, Default)]
pub struct FakeApiServer {
    state: Arc<Mutex<FakeState>>,
}

impl FakeApiServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object (builder style)
    pub fn with_object(self, object: Value) -> Self {
        self.put_object(object);
        self
    }

    /// Seed a typed resource (builder style)
    pub fn with_resource<K: Serialize>(self, resource: &K) -> Self {
        self.put_object(serde_json::to_value(resource).unwrap());
        self
    }

    /// Store an object as an out-of-band writer would, stamping metadata
    pub fn put_object(&self, mut object: Value) {
        let plural = plural_for_kind(object["kind"].as_str().unwrap_or_default());
        let namespace = object["metadata"]["namespace"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        let name = object["metadata"]["name"].as_str().unwrap().to_string();

        let mut state = self.state.lock().unwrap();
        let key = (plural, namespace, name);
        let existing_uid = state
            .objects
            .get(&key)
            .and_then(|o| o["metadata"]["uid"].as_str().map(str::to_string));
        let uid = match existing_uid {
            Some(uid) => uid,
            None => state.next_uid(),
        };
        let rv = state.next_resource_version();

        let metadata = &mut object["metadata"];
        metadata["uid"] = json!(uid);
        metadata["resourceVersion"] = json!(rv);
        if metadata.get("creationTimestamp").is_none() {
            metadata["creationTimestamp"] = json!(now());
        }
        if key.0 != "secrets" && metadata.get("generation").is_none() {
            metadata["generation"] = json!(1);
        }
        state.objects.insert(key, object);
    }

    /// Remove an object without finalizer processing
    pub fn remove(&self, plural: &str, namespace: &str, name: &str) -> Option<Value> {
        self.state.lock().unwrap().objects.remove(&(
            plural.to_string(),
            namespace.to_string(),
            name.to_string(),
        ))
    }

    pub fn get(&self, plural: &str, namespace: &str, name: &str) -> Option<Value> {
        self.state
            .lock()
            .unwrap()
            .objects
            .get(&(plural.to_string(), namespace.to_string(), name.to_string()))
            .cloned()
    }

    fn get_typed<K: DeserializeOwned>(&self, plural: &str, namespace: &str, name: &str) -> Option<K> {
        self.get(plural, namespace, name)
            .map(|v| serde_json::from_value(v).unwrap())
    }

    pub fn secret(&self, namespace: &str, name: &str) -> Option<Secret> {
        self.get_typed("secrets", namespace, name)
    }

    pub fn master_secret(&self, name: &str) -> Option<MasterSecret> {
        self.get_typed("mastersecrets", "", name)
    }

    pub fn derived_secret(&self, namespace: &str, name: &str) -> Option<DerivedSecret> {
        self.get_typed("derivedsecrets", namespace, name)
    }

    /// Make the next matching request fail with the given status code
    pub fn fail_next(&self, method: &str, plural: &str, code: u16) {
        self.state
            .lock()
            .unwrap()
            .failures
            .push((method.to_string(), plural.to_string(), code));
    }

    /// Number of mutating requests received for a resource plural
    pub fn write_count(&self, plural: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .requests
            .iter()
            .filter(|(method, path)| method != "GET" && Target::parse(path).is_some_and(|t| t.plural == plural))
            .count()
    }

    /// Build a kube Client backed by this server
    pub fn into_client(self) -> Client {
        Client::new(self, "default")
    }

    fn handle(&self, method: &str, path: &str, body: &[u8]) -> (u16, Value) {
        let mut state = self.state.lock().unwrap();
        state.requests.push((method.to_string(), path.to_string()));

        let Some(target) = Target::parse(path) else {
            return status_json(404, path);
        };

        if let Some(pos) = state
            .failures
            .iter()
            .position(|(m, p, _)| m == method && *p == target.plural)
        {
            let (_, _, code) = state.failures.remove(pos);
            return status_json(code, &format!("injected failure for {}", path));
        }

        let body: Value = if body.is_empty() {
            Value::Null
        } else {
            match serde_json::from_slice(body) {
                Ok(v) => v,
                Err(e) => return status_json(400, &e.to_string()),
            }
        };

        match (method, target.name.clone()) {
            ("GET", Some(name)) => match state.objects.get(&target.key(&name)) {
                Some(object) => (200, object.clone()),
                None => status_json(404, &format!("{} \"{}\" not found", target.plural, name)),
            },
            ("GET", None) => list(&state, &target),
            ("POST", None) => create(&mut state, &target, body),
            ("PUT", Some(name)) => replace(&mut state, &target, &name, body),
            ("PATCH", Some(name)) => patch(&mut state, &target, &name, &body),
            ("DELETE", Some(name)) => delete(&mut state, &target, &name),
            _ => status_json(405, &format!("{} {} not supported", method, path)),
        }
    }
}

fn list(state: &FakeState, target: &Target) -> (u16, Value) {
    let items: Vec<Value> = state
        .objects
        .iter()
        .filter(|((plural, namespace, _), _)| {
            *plural == target.plural
                && target.namespace.as_ref().map_or(true, |ns| ns == namespace)
        })
        .map(|(_, object)| object.clone())
        .collect();

    (
        200,
        json!({
            "apiVersion": "v1",
            "kind": "List",
            "metadata": {"resourceVersion": state.resource_version.to_string()},
            "items": items,
        }),
    )
}

fn create(state: &mut FakeState, target: &Target, mut object: Value) -> (u16, Value) {
    let Some(name) = object["metadata"]["name"].as_str().map(str::to_string) else {
        return status_json(422, "metadata.name is required");
    };
    let key = target.key(&name);
    if state.objects.contains_key(&key) {
        return status_json(409, &format!("{} \"{}\" already exists", target.plural, name));
    }

    let uid = state.next_uid();
    let rv = state.next_resource_version();
    let metadata = &mut object["metadata"];
    metadata["uid"] = json!(uid);
    metadata["resourceVersion"] = json!(rv);
    metadata["creationTimestamp"] = json!(now());
    if let Some(namespace) = &target.namespace {
        metadata["namespace"] = json!(namespace);
    }
    if target.is_custom() {
        metadata["generation"] = json!(1);
        if let Some(map) = object.as_object_mut() {
            map.remove("status");
        }
    }

    state.objects.insert(key, object.clone());
    (201, object)
}

fn replace(state: &mut FakeState, target: &Target, name: &str, body: Value) -> (u16, Value) {
    let key = target.key(name);
    let Some(existing) = state.objects.get(&key).cloned() else {
        return status_json(404, &format!("{} \"{}\" not found", target.plural, name));
    };

    let current_rv = existing["metadata"]["resourceVersion"].clone();
    if let Some(rv) = body["metadata"]["resourceVersion"].as_str() {
        if Some(rv) != current_rv.as_str() {
            return status_json(
                409,
                &format!("Operation cannot be fulfilled on {} \"{}\": the object has been modified", target.plural, name),
            );
        }
    }

    if target.plural == "secrets" && target.subresource.is_none() && secret_type(&body) != secret_type(&existing) {
        return status_json(
            422,
            &format!("Secret \"{}\" is invalid: type: Invalid value: \"{}\": field is immutable", name, secret_type(&body)),
        );
    }

    let updated = if target.subresource.as_deref() == Some("status") {
        let mut updated = existing.clone();
        updated["status"] = body["status"].clone();
        updated
    } else {
        let mut updated = body;
        for field in ["uid", "creationTimestamp", "deletionTimestamp", "namespace", "generation"] {
            match existing["metadata"].get(field) {
                Some(value) => updated["metadata"][field] = value.clone(),
                None => {
                    if let Some(meta) = updated["metadata"].as_object_mut() {
                        meta.remove(field);
                    }
                }
            }
        }
        if target.is_custom() {
            updated["status"] = existing["status"].clone();
            if updated["spec"] != existing["spec"] {
                let generation = existing["metadata"]["generation"].as_i64().unwrap_or(1);
                updated["metadata"]["generation"] = json!(generation + 1);
            }
        }
        updated
    };

    store_or_finalize(state, key, updated)
}

fn patch(state: &mut FakeState, target: &Target, name: &str, body: &Value) -> (u16, Value) {
    let key = target.key(name);
    let Some(existing) = state.objects.get(&key).cloned() else {
        return status_json(404, &format!("{} \"{}\" not found", target.plural, name));
    };

    let mut updated = existing.clone();
    if target.subresource.as_deref() == Some("status") {
        if let Some(status) = body.get("status") {
            merge_patch(&mut updated["status"], status);
        }
    } else {
        merge_patch(&mut updated, body);
        if target.is_custom() {
            updated["status"] = existing["status"].clone();
        }
    }

    store_or_finalize(state, key, updated)
}

fn delete(state: &mut FakeState, target: &Target, name: &str) -> (u16, Value) {
    let key = target.key(name);
    let Some(mut existing) = state.objects.get(&key).cloned() else {
        return status_json(404, &format!("{} \"{}\" not found", target.plural, name));
    };

    if has_finalizers(&existing) {
        if existing["metadata"].get("deletionTimestamp").is_none() {
            existing["metadata"]["deletionTimestamp"] = json!(now());
            existing["metadata"]["resourceVersion"] = json!(state.next_resource_version());
            state.objects.insert(key, existing.clone());
        }
        return (200, existing);
    }

    state.objects.remove(&key);
    (200, existing)
}

fn store_or_finalize(state: &mut FakeState, key: ObjectKey, mut updated: Value) -> (u16, Value) {
    if let Some(status) = updated.get("status") {
        if status.is_null() {
            if let Some(map) = updated.as_object_mut() {
                map.remove("status");
            }
        }
    }
    updated["metadata"]["resourceVersion"] = json!(state.next_resource_version());

    if updated["metadata"].get("deletionTimestamp").is_some() && !has_finalizers(&updated) {
        state.objects.remove(&key);
    } else {
        state.objects.insert(key, updated.clone());
    }
    (200, updated)
}

fn secret_type(secret: &Value) -> &str {
    secret["type"].as_str().unwrap_or("Opaque")
}

fn has_finalizers(object: &Value) -> bool {
    object["metadata"]["finalizers"]
        .as_array()
        .is_some_and(|f| !f.is_empty())
}

/// RFC 7386 JSON merge patch
fn merge_patch(target: &mut Value, patch: &Value) {
    let Some(patch_map) = patch.as_object() else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = json!({});
    }
    if let Some(target_map) = target.as_object_mut() {
        for (key, value) in patch_map {
            if value.is_null() {
                target_map.remove(key);
            } else {
                merge_patch(target_map.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}

fn plural_for_kind(kind: &str) -> String {
    format!("{}s", kind.to_lowercase())
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn status_json(code: u16, message: &str) -> (u16, Value) {
    let reason = match code {
        404 => "NotFound",
        409 => "Conflict",
        422 => "Invalid",
        _ => "InternalError",
    };
    (
        code,
        json!({
            "kind": "Status",
            "apiVersion": "v1",
            "status": "Failure",
            "message": message,
            "reason": reason,
            "code": code
        }),
    )
}

impl Service<Request<Body>> for FakeApiServer {
    type Response = Response<Body>;
    type Error = tower::BoxError;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let server = self.clone();
        let method = req.method().to_string();
        let path = req.uri().path().to_string();

        Box::pin(async move {
            let body = req
                .into_body()
                .collect()
                .await
                .map_err(|e| tower::BoxError::from(e.to_string()))?
                .to_bytes();

            let (status, value) = server.handle(&method, &path, &body);

            Ok(Response::builder()
                .status(status)
                .header("content-type", "application/json")
                .body(Body::from(Bytes::from(value.to_string())))
                .unwrap())
        })
    }
}

/// A MasterSecret object, optionally pointing at a custom backing secret
pub fn master_secret_json(name: &str, secret_ref: Option<&str>) -> Value {
    let master = MasterSecret::new(
        name,
        MasterSecretSpec {
            secret_ref: secret_ref.map(|n| SecretReference {
                name: n.to_string(),
                create: None,
            }),
            ..Default::default()
        },
    );
    serde_json::to_value(&master).unwrap()
}

/// A plain secret with string data
pub fn secret_json(namespace: &str, name: &str, data: &[(&str, &str)]) -> Value {
    let secret = Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        data: Some(
            data.iter()
                .map(|(k, v)| (k.to_string(), ByteString(v.as_bytes().to_vec())))
                .collect(),
        ),
        type_: Some("Opaque".to_string()),
        ..Default::default()
    };
    serde_json::to_value(&secret).unwrap()
}

/// A backing secret in the operator namespace holding a master value
pub fn backing_secret_json(namespace: &str, name: &str, value: &str) -> Value {
    secret_json(namespace, name, &[(MASTER_SECRET_KEY, value)])
}

/// A DerivedSecret with the given keys
pub fn derived_secret_json(namespace: &str, name: &str, keys: &[(&str, SecretType, Option<&str>)]) -> Value {
    let mut ds = DerivedSecret::new(
        name,
        DerivedSecretSpec {
            output_type: "Opaque".to_string(),
            annotations: None,
            labels: None,
            keys: keys
                .iter()
                .map(|(key, secret_type, master)| {
                    (
                        key.to_string(),
                        DerivedKeySpec {
                            secret_type: *secret_type,
                            master_secret_ref: master.map(str::to_string),
                            length: None,
                        },
                    )
                })
                .collect(),
        },
    );
    ds.metadata.namespace = Some(namespace.to_string());
    serde_json::to_value(&ds).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::api::{Api, DeleteParams, Patch, PatchParams, PostParams};

    #[tokio::test]
    async fn test_replace_with_stale_resource_version_conflicts() {
        let server = FakeApiServer::new().with_object(secret_json("ns", "s", &[("k", "v")]));
        let secrets: Api<Secret> = Api::namespaced(server.clone().into_client(), "ns");

        let mut stale = secrets.get("s").await.unwrap();
        let mut fresh = stale.clone();
        fresh.metadata.labels = Some(BTreeMap::from([("a".to_string(), "b".to_string())]));
        secrets.replace("s", &PostParams::default(), &fresh).await.unwrap();

        stale.metadata.labels = Some(BTreeMap::from([("c".to_string(), "d".to_string())]));
        let err = secrets.replace("s", &PostParams::default(), &stale).await.unwrap_err();
        assert!(matches!(err, kube::Error::Api(ref e) if e.code == 409));
    }

    #[tokio::test]
    async fn test_secret_type_is_immutable() {
        let server = FakeApiServer::new().with_object(secret_json("ns", "s", &[("k", "v")]));
        let secrets: Api<Secret> = Api::namespaced(server.clone().into_client(), "ns");

        let mut secret = secrets.get("s").await.unwrap();
        secret.type_ = Some("kubernetes.io/basic-auth".to_string());
        let err = secrets.replace("s", &PostParams::default(), &secret).await.unwrap_err();
        assert!(matches!(err, kube::Error::Api(ref e) if e.code == 422));
        assert_eq!(server.secret("ns", "s").unwrap().type_.as_deref(), Some("Opaque"));
    }

    #[tokio::test]
    async fn test_delete_with_finalizer_sets_deletion_timestamp() {
        let server = FakeApiServer::new();
        let mut value = derived_secret_json("ns", "app", &[("password", SecretType::Password, None)]);
        value["metadata"]["finalizers"] = json!(["keep"]);
        server.put_object(value);

        let api: Api<DerivedSecret> = Api::namespaced(server.clone().into_client(), "ns");
        api.delete("app", &DeleteParams::default()).await.unwrap();

        let ds = server.derived_secret("ns", "app").unwrap();
        assert!(ds.metadata.deletion_timestamp.is_some());

        let mut released = ds.clone();
        released.metadata.finalizers = None;
        api.replace("app", &PostParams::default(), &released).await.unwrap();
        assert!(server.derived_secret("ns", "app").is_none());
    }

    #[tokio::test]
    async fn test_status_patch_leaves_spec_alone() {
        let server = FakeApiServer::new().with_object(master_secret_json("default", None));
        let api: Api<MasterSecret> = Api::all(server.clone().into_client());

        api.patch_status(
            "default",
            &PatchParams::default(),
            &Patch::Merge(json!({"spec": {"length": 99}, "status": {"ready": true}})),
        )
        .await
        .unwrap();

        let master = server.master_secret("default").unwrap();
        assert_eq!(master.spec.length, None);
        assert!(master.status.unwrap().ready);
    }

    #[test]
    fn test_merge_patch_removes_nulls() {
        let mut target = json!({"a": 1, "b": {"c": 2, "d": 3}});
        merge_patch(&mut target, &json!({"a": null, "b": {"c": 5, "d": null}}));
        assert_eq!(target, json!({"b": {"c": 5}}));
    }

    #[test]
    fn test_target_parse() {
        let t = Target::parse("/apis/keysmith.geeko.me/v1alpha1/namespaces/ns/derivedsecrets/app/status").unwrap();
        assert_eq!(t.plural, "derivedsecrets");
        assert_eq!(t.namespace.as_deref(), Some("ns"));
        assert_eq!(t.name.as_deref(), Some("app"));
        assert_eq!(t.subresource.as_deref(), Some("status"));

        let t = Target::parse("/api/v1/secrets").unwrap();
        assert_eq!(t.plural, "secrets");
        assert!(t.namespace.is_none());
        assert!(t.name.is_none());
    }
}
