use std::fs;
use std::sync::Arc;
use std::time::Duration;

use futures::{StreamExt, TryStreamExt};
use futures_timer::Delay;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::{
    api::{ListParams, Meta, Resource, WatchEvent},
    client::APIClient,
    runtime::Informer,
};

use extcat_definitions::{metadata, LiferayExtension};

use super::{
    build::BuildController,
    deploy::DeployController,
    engine::{ContainerEngine, Podman},
    indices::Touched,
    watcher::Watcher,
    ConfigMapIndices, CrMirror, ErrorKind, FingerprintStore, OperatorConfig, Result,
};

/// Client creator: in-cluster service account first, kubeconfig fallback
async fn make_client() -> Result<APIClient> {
    let config = if let Ok(cfg) = kube::config::incluster_config() {
        cfg
    } else {
        kube::config::load_kube_config()
            .await
            .map_err(ErrorKind::KubeError)?
    };
    Ok(APIClient::new(config))
}

/// One scan pass over the input tree, for the `scan` subcommand
pub async fn scan(cfg: OperatorConfig) -> Result<usize> {
    let client = make_client().await?;
    let watcher = Watcher::new(client, FingerprintStore::new(), cfg);
    watcher.scan_once().await
}

async fn dispatch(deployer: &DeployController, touched: Touched) {
    match touched {
        Touched::Service {
            instance, service, ..
        } => {
            if let Err(e) = deployer.attempt_deployment(&instance, &service).await {
                warn!("Deployment of {}/{} failed: {}", instance, service, e);
            }
        }
        Touched::Instance { instance } => deployer.fan_out(&instance).await,
    }
}

/// The operator event loop.
///
/// Owns the process-lifetime state (fingerprint store, indices) and the
/// three subscriptions: the background scan task, the extension informer
/// feeding the mirror and the build controller, and the config object
/// informer feeding the indices and the deployment controller. Handler
/// failures are logged; the loops never terminate.
pub async fn run(cfg: OperatorConfig) -> Result<()> {
    let client = make_client().await?;
    fs::create_dir_all(&cfg.temp_dir)?;
    fs::create_dir_all(&cfg.manifest_dir)?;

    let store = FingerprintStore::new();
    let indices = ConfigMapIndices::new();
    let engine: Arc<dyn ContainerEngine> = Arc::new(Podman::new());
    let reporter = super::StatusReporter::new(client.clone(), &cfg.namespace);

    let mirror = CrMirror::new(store.clone());
    let builder = BuildController::new(client.clone(), engine.clone(), reporter.clone(), cfg.clone());
    let deployer = DeployController::new(
        client.clone(),
        engine,
        indices.clone(),
        reporter,
        cfg.clone(),
    );

    // the sole mechanism for picking up filesystem changes
    let watcher = Watcher::new(client.clone(), store, cfg.clone());
    tokio::spawn(watcher.run());

    // extension events: mirror first, then build
    let lex_informer = Informer::new(
        client.clone(),
        ListParams::default(),
        Resource::namespaced::<LiferayExtension>(&cfg.namespace),
    );
    tokio::spawn(async move {
        loop {
            let stream = match lex_informer.poll().await {
                Ok(s) => s,
                Err(e) => {
                    warn!("Extension watch failed, retrying: {}", e);
                    Delay::new(Duration::from_secs(5)).await;
                    continue;
                }
            };
            let mut stream = stream.boxed();
            loop {
                match stream.try_next().await {
                    Ok(Some(event)) => {
                        mirror.observe(&event);
                        match event {
                            WatchEvent::Added(lex) | WatchEvent::Modified(lex) => {
                                if let Err(e) = builder.reconcile(&lex).await {
                                    warn!("Build of {} failed: {}", Meta::name(&lex), e);
                                }
                            }
                            _ => (),
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!("Extension event stream hiccup: {}", e);
                        break;
                    }
                }
            }
        }
    });

    // config object events: indices first, then deployment fan-in
    let lp = ListParams {
        label_selector: Some(format!(
            "{} in (ext-provision,ext-init,dxp)",
            metadata::METADATA_TYPE_LABEL
        )),
        ..Default::default()
    };
    let cm_informer = Informer::new(client, lp, Resource::namespaced::<ConfigMap>(&cfg.namespace));
    info!("Operator ready in namespace {}", cfg.namespace);
    loop {
        let stream = match cm_informer.poll().await {
            Ok(s) => s,
            Err(e) => {
                warn!("Config object watch failed, retrying: {}", e);
                Delay::new(Duration::from_secs(5)).await;
                continue;
            }
        };
        let mut stream = stream.boxed();
        loop {
            match stream.try_next().await {
                Ok(Some(event)) => {
                    if let Some(touched) = indices.apply(&event) {
                        dispatch(&deployer, touched).await;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("Config object event stream hiccup: {}", e);
                    break;
                }
            }
        }
    }
}
