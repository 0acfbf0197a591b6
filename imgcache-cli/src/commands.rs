use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use imgcache_engine::{
    CacheStore, ConnectivityMonitor, HttpTransport, ProxyAuth, ProxyConfig, QueryKeyPolicy,
    ReachabilityProbe, Resolution, ResourceCacheController, ResourceRequest, TransportConfig,
    Transport,
};
use indicatif::MultiProgress;
use tokio::sync::broadcast::error::TryRecvError;
use tracing::{debug, info, warn};
use url::Url;

use crate::cli::FetchArgs;
use crate::error::AppError;
use crate::utils::progress::ProgressManager;
use crate::utils::{format_bytes, parse_headers};

const PROBE_INTERVAL: Duration = Duration::from_secs(30);

fn transport_config(args: &FetchArgs) -> Result<TransportConfig, AppError> {
    let mut builder = TransportConfig::builder()
        .with_timeout(Duration::from_secs(args.timeout))
        .with_connect_timeout(Duration::from_secs(args.connect_timeout))
        .with_read_timeout(Duration::from_secs(args.read_timeout));

    for (name, value) in parse_headers(&args.headers) {
        builder = builder.with_header(name, value);
    }

    if args.no_proxy {
        // No proxy flag overrides everything else
        info!("All proxy settings disabled (--no-proxy flag)");
        builder = builder.with_system_proxy(false);
    } else if let Some(proxy_url) = args.proxy.as_ref() {
        let proxy_type = args.proxy_type.parse()?;

        // Configure proxy authentication if both username and password are provided
        let auth = match (&args.proxy_user, &args.proxy_pass) {
            (Some(username), Some(password)) => Some(ProxyAuth {
                username: username.clone(),
                password: password.clone(),
            }),
            _ => None,
        };

        info!(
            proxy_url = %proxy_url,
            proxy_type = ?proxy_type,
            has_auth = auth.is_some(),
            "Using explicit proxy configuration for downloads"
        );

        builder = builder.with_proxy(ProxyConfig {
            url: proxy_url.clone(),
            proxy_type,
            auth,
        });
    }

    Ok(builder.build())
}

fn query_policy(args: &FetchArgs) -> QueryKeyPolicy {
    if args.query_all {
        QueryKeyPolicy::All
    } else if !args.query_param.is_empty() {
        QueryKeyPolicy::Names(args.query_param.clone())
    } else {
        QueryKeyPolicy::None
    }
}

/// Resolve every URI on its own controller, concurrently. Fails with
/// [`AppError::Unresolved`] if any URI did not end up in the cache.
pub async fn fetch(store: CacheStore, args: &FetchArgs) -> Result<(), AppError> {
    let transport = HttpTransport::with_config(&transport_config(args)?)?;
    let monitor = ConnectivityMonitor::new(!args.offline);

    if let Some(probe_url) = &args.probe {
        let url = Url::parse(probe_url)
            .map_err(|e| AppError::InvalidInput(format!("invalid probe URL '{probe_url}': {e}")))?;
        let probe = ReachabilityProbe::new(transport.client().clone(), url, PROBE_INTERVAL);
        let reachable = probe.check().await;
        monitor.set_reachable(reachable);
        info!(reachable, "Reachability probe finished");
    }

    let policy = query_policy(args);
    let transport: Arc<dyn Transport> = Arc::new(transport);
    let multi = MultiProgress::new();

    let slots = args.uris.iter().map(|uri| {
        let progress = if args.show_progress {
            ProgressManager::new(multi.clone())
        } else {
            ProgressManager::new_disabled(multi.clone())
        };
        let controller =
            ResourceCacheController::new(store.clone(), Arc::clone(&transport), monitor.clone());
        resolve_slot(controller, progress, uri, policy.clone())
    });

    let failures = join_all(slots)
        .await
        .into_iter()
        .filter(|resolved| !resolved)
        .count();

    if failures > 0 {
        return Err(AppError::Unresolved(failures));
    }
    Ok(())
}

async fn resolve_slot(
    mut controller: ResourceCacheController,
    mut progress: ProgressManager,
    uri: &str,
    policy: QueryKeyPolicy,
) -> bool {
    let request = match ResourceRequest::new(uri, policy) {
        Ok(request) => request,
        Err(e) => {
            warn!(uri, error = %e, "Skipping invalid URI");
            println!("{uri}: {e}");
            return false;
        }
    };

    let mut updates = controller.subscribe();
    controller.submit(request).await;

    loop {
        loop {
            match updates.try_recv() {
                Ok(resolution) => progress.handle_resolution(uri, &resolution),
                Err(TryRecvError::Lagged(skipped)) => debug!(uri, skipped, "Progress updates lagged"),
                Err(_) => break,
            }
        }
        if !controller.resolution().is_in_flight() || !controller.process_next().await {
            break;
        }
    }

    let resolved = match controller.resolution() {
        Resolution::Resolved(entry) => {
            println!("{uri} -> {} ({})", entry.path.display(), format_bytes(entry.size));
            true
        }
        Resolution::Deferred => {
            println!("{uri}: offline, not cached");
            false
        }
        Resolution::Uncacheable(reason) => {
            println!("{uri}: {reason}");
            false
        }
        other => {
            warn!(uri, resolution = ?other, "Resolution did not settle");
            false
        }
    };

    controller.teardown().await;
    resolved
}

pub async fn info(store: &CacheStore) -> Result<(), AppError> {
    let usage = store.usage().await?;
    println!("Cache root: {}", store.root().display());
    println!("Hosts:      {}", usage.namespaces);
    println!("Files:      {}", usage.files);
    println!("Size:       {}", format_bytes(usage.bytes));
    Ok(())
}

pub async fn clear(store: &CacheStore) -> Result<(), AppError> {
    let removed = store.clear().await?;
    info!(removed, root = ?store.root(), "Cache cleared");
    println!("Removed {removed} host director{}", if removed == 1 { "y" } else { "ies" });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{CliArgs, Command};
    use clap::Parser;

    fn fetch_args(extra: &[&str]) -> FetchArgs {
        let mut argv = vec!["imgcache", "fetch", "https://img.example.com/a.png"];
        argv.extend_from_slice(extra);
        match CliArgs::parse_from(argv).command {
            Command::Fetch(args) => args,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_query_policy_from_flags() {
        assert_eq!(query_policy(&fetch_args(&[])), QueryKeyPolicy::None);
        assert_eq!(query_policy(&fetch_args(&["--query-all"])), QueryKeyPolicy::All);
        assert_eq!(
            query_policy(&fetch_args(&["--query-param", "w"])),
            QueryKeyPolicy::Names(vec!["w".to_string()])
        );
    }

    #[test]
    fn test_transport_config_from_flags() {
        let config = transport_config(&fetch_args(&[
            "--timeout",
            "5",
            "-H",
            "Referer: https://example.com",
            "--proxy",
            "127.0.0.1:1080",
            "--proxy-type",
            "socks5",
        ]))
        .unwrap();

        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.headers["referer"], "https://example.com");
        assert!(config.proxy.is_some());
        assert!(!config.use_system_proxy);
    }

    #[tokio::test]
    async fn test_offline_fetch_reports_unresolved() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(&imgcache_engine::CacheConfig::new(dir.path()));

        let result = fetch(store, &fetch_args(&["--offline"])).await;
        assert!(matches!(result, Err(AppError::Unresolved(1))));
    }

    #[tokio::test]
    async fn test_info_and_clear_on_empty_cache() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(&imgcache_engine::CacheConfig::new(dir.path().join("none")));

        info(&store).await.unwrap();
        clear(&store).await.unwrap();
    }
}
