use k8s_openapi::api::core::v1::{Namespace, Pod};
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::Client as KubeClient;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::info;

pub const FIELD_MANAGER: &str = "workspace-orchestrator";

/// Thin wrapper around [`kube::Client`], carrying the field manager name and
/// a couple of helpers every reconciler/handler needs repeatedly. Mirrors
/// the shape of a small client wrapper rather than threading a bare
/// `kube::Client` through every function signature.
#[derive(Clone)]
pub struct Client {
    pub kube: KubeClient,
}

impl Client {
    pub fn new(kube: KubeClient) -> Self {
        Client { kube }
    }

    pub async fn try_default() -> anyhow::Result<Self> {
        let kube = KubeClient::try_default().await?;
        Ok(Client::new(kube))
    }

    /// Translates a 404 into `Ok(None)`, letting callers use `?` while still
    /// distinguishing "does not exist" from a real error.
    pub async fn get_opt<K>(&self, api: &Api<K>, name: &str) -> anyhow::Result<Option<K>>
    where
        K: kube::Resource + Clone + DeserializeOwned + std::fmt::Debug,
    {
        match api.get(name).await {
            Ok(obj) => Ok(Some(obj)),
            Err(kube::Error::Api(err)) if err.code == 404 => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Server-side-apply patch, force-owning conflicting fields. This is
    /// the only write path reconcilers use for resources they own, so
    /// repeated reconciles of unchanged specs are no-ops at the apiserver.
    pub async fn apply<K>(&self, api: &Api<K>, name: &str, resource: &K) -> anyhow::Result<K>
    where
        K: kube::Resource + Clone + DeserializeOwned + Serialize + std::fmt::Debug,
    {
        let params = PatchParams::apply(FIELD_MANAGER).force();
        let applied = api.patch(name, &params, &Patch::Apply(resource)).await?;
        Ok(applied)
    }

    pub async fn ensure_namespace(&self, name: &str) -> anyhow::Result<()> {
        let api: Api<Namespace> = Api::all(self.kube.clone());
        if self.get_opt(&api, name).await?.is_some() {
            return Ok(());
        }
        let ns = Namespace {
            metadata: kube::api::ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        info!(namespace = name, "creating namespace");
        api.create(&PostParams::default(), &ns).await?;
        Ok(())
    }

    pub async fn pod_exec_stdout(
        &self,
        namespace: &str,
        pod_name: &str,
        command: Vec<&str>,
    ) -> anyhow::Result<String> {
        use kube::api::AttachParams;
        use tokio::io::AsyncReadExt;

        let pods: Api<Pod> = Api::namespaced(self.kube.clone(), namespace);
        let attach_params = AttachParams::default().stdout(true).stderr(false);
        let mut attached = pods.exec(pod_name, command, &attach_params).await?;
        let mut stdout = attached
            .stdout()
            .ok_or_else(|| anyhow::anyhow!("exec produced no stdout stream"))?;
        let mut out = String::new();
        stdout.read_to_string(&mut out).await?;
        attached.join().await?;
        Ok(out)
    }
}

/// Parses a Kubernetes `Quantity`-style resource string (e.g. `"500m"`,
/// `"2Gi"`) into a plain integer in its base unit. Handles the suffix set
/// the scheduler accepts: `m`, decimal `k/M/G/T/P/E`, and binary
/// `Ki/Mi/Gi/Ti/Pi/Ei`.
pub fn parse_quantity(raw: &str) -> anyhow::Result<i64> {
    let raw = raw.trim();
    let suffixes: &[(&str, i64)] = &[
        ("Ki", 1024),
        ("Mi", 1024i64.pow(2)),
        ("Gi", 1024i64.pow(3)),
        ("Ti", 1024i64.pow(4)),
        ("Pi", 1024i64.pow(5)),
        ("Ei", 1024i64.pow(6)),
        ("k", 1000),
        ("M", 1000i64.pow(2)),
        ("G", 1000i64.pow(3)),
        ("T", 1000i64.pow(4)),
        ("P", 1000i64.pow(5)),
        ("E", 1000i64.pow(6)),
    ];

    if let Some(stripped) = raw.strip_suffix('m') {
        let milli: i64 = stripped.parse()?;
        return Ok(milli / 1000);
    }

    for (suffix, multiplier) in suffixes {
        if let Some(stripped) = raw.strip_suffix(suffix) {
            let base: i64 = stripped.parse()?;
            return Ok(base * multiplier);
        }
    }

    Ok(raw.parse()?)
}

#[cfg(test)]
mod tests {
    use super::parse_quantity;

    #[test]
    fn parses_plain_integers() {
        assert_eq!(parse_quantity("4").unwrap(), 4);
    }

    #[test]
    fn parses_binary_suffixes() {
        assert_eq!(parse_quantity("2Gi").unwrap(), 2 * 1024 * 1024 * 1024);
    }

    #[test]
    fn parses_milli_suffix() {
        assert_eq!(parse_quantity("500m").unwrap(), 0);
        assert_eq!(parse_quantity("1500m").unwrap(), 1);
    }
}
