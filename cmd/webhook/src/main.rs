use sidecar_injector_admission::mutate::Mutator;
use sidecar_injector_admission::patch::{
    DEFAULT_SIDECAR_ARGS, DEFAULT_SIDECAR_IMAGE, DEFAULT_SIDECAR_NAME, SidecarSpec,
};
use sidecar_injector_admission::policy::DEFAULT_LOOKUP_TIMEOUT;
use sidecar_injector_admission::validate::{DEFAULT_REQUIRED_LABEL, Validator};
use sidecar_injector_k8s_util::namespace::KubeNamespaces;
use sidecar_injector_k8s_util::telemetry;

use std::fs::File;
use std::io::BufReader;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum_server::Handle;
use axum_server::tls_rustls::RustlsConfig;
use clap::{Parser, crate_authors, crate_description, crate_version};
use rustls::ServerConfig;
use rustls::crypto::aws_lc_rs::default_provider;
use rustls::pki_types::CertificateDer;
use tokio::signal::unix::{SignalKind, signal};

mod handlers;
mod state;

use state::WebhookState;

const HTTPS_PORT: u16 = 443;
const HTTP_PORT: u16 = 8080;
const GRACEFUL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

fn load_tls_config(cert_path: &Path, key_path: &Path) -> anyhow::Result<ServerConfig> {
    let cert_file = File::open(cert_path)?;
    let key_file = File::open(key_path)?;

    let mut cert_reader = BufReader::new(cert_file);
    let mut key_reader = BufReader::new(key_file);

    let certs: Vec<CertificateDer> =
        rustls_pemfile::certs(&mut cert_reader).collect::<Result<Vec<_>, _>>()?;

    let key = rustls_pemfile::private_key(&mut key_reader)?
        .ok_or_else(|| anyhow::anyhow!("No private key found in key file"))?;

    let mut config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)?;

    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    Ok(config)
}

#[derive(Parser, Debug)]
#[command(
    name = "sidecar-injector",
    about = crate_description!(),
    version = crate_version!(),
    author = crate_authors!("\n"),
)]
struct Args {
    /// Listen address (use "::" for IPv6, "0.0.0.0" for IPv4)
    #[arg(long, default_value = "0.0.0.0", env)]
    listen_address: String,

    /// Listen on given port. Defaults to 443 when serving TLS and 8080 otherwise
    #[arg(short, long, env)]
    port: Option<u16>,

    /// Filter for log messages
    #[arg(short, long, default_value = "info", env)]
    log_filter: String,

    /// Set log format
    #[arg(long, value_enum, default_value_t = telemetry::LogFormat::Text, env)]
    log_format: telemetry::LogFormat,

    /// URL for the OpenTelemetry tracing endpoint.
    ///
    /// This optional argument specifies the URL to which traces will be sent using
    /// OpenTelemetry. If not provided, tracing will be disabled.
    #[arg(short, long, env = "OPENTELEMETRY_ENDPOINT_URL")]
    tracing_url: Option<String>,

    /// Sampling ratio for tracing.
    ///
    /// Specifies the ratio of traces to sample. A value of `1.0` will sample all traces,
    /// while a lower value will sample fewer traces. The default is `0.1`, meaning 10%
    /// of traces are sampled.
    #[arg(short, long, default_value_t = 0.1, env)]
    sample_ratio: f64,

    /// Path to TLS certificate file. Without it the webhook serves plain HTTP
    #[arg(long, env, requires = "tls_key")]
    tls_cert: Option<PathBuf>,

    /// Path to TLS private key file
    #[arg(long, env, requires = "tls_cert")]
    tls_key: Option<PathBuf>,

    /// Seconds to wait for the namespace lookup before failing the review
    #[arg(long, default_value_t = DEFAULT_LOOKUP_TIMEOUT.as_secs(), env)]
    namespace_lookup_timeout: u64,

    /// Name of the injected container
    #[arg(long, default_value = DEFAULT_SIDECAR_NAME, env)]
    sidecar_name: String,

    /// Image of the injected container
    #[arg(long, default_value = DEFAULT_SIDECAR_IMAGE, env)]
    sidecar_image: String,

    /// Comma separated arguments of the injected container
    #[arg(
        long,
        value_delimiter = ',',
        allow_hyphen_values = true,
        default_values = DEFAULT_SIDECAR_ARGS,
        env
    )]
    sidecar_args: Vec<String>,

    /// Label every object sent to /validate must carry
    #[arg(long, default_value = DEFAULT_REQUIRED_LABEL, env)]
    required_label: String,
}

impl Args {
    fn sidecar(&self) -> SidecarSpec {
        SidecarSpec {
            name: self.sidecar_name.clone(),
            image: self.sidecar_image.clone(),
            args: self.sidecar_args.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Args = Args::parse();

    telemetry::init(
        &args.log_filter,
        args.log_format,
        args.tracing_url.as_deref(),
        args.sample_ratio,
    )
    .await?;

    let mutator = Mutator::new(
        KubeNamespaces::new(),
        args.sidecar(),
        Duration::from_secs(args.namespace_lookup_timeout),
    );
    let state = WebhookState::new(mutator, Validator::new(args.required_label.clone()));
    let app = handlers::router(state.clone());

    let handle: Handle<SocketAddr> = Handle::new();
    let shutdown_handle = handle.clone();
    let shutdown_state = state.clone();

    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown_state.set_not_ready();
        tracing::info!("Received shutdown signal, starting graceful shutdown");
        shutdown_handle.graceful_shutdown(Some(GRACEFUL_SHUTDOWN_TIMEOUT));
    });

    match (&args.tls_cert, &args.tls_key) {
        (Some(tls_cert), Some(tls_key)) => {
            default_provider()
                .install_default()
                .map_err(|_| anyhow::anyhow!("rustls crypto provider already installed"))?;

            let socket_addr = socket_addr(&args.listen_address, args.port.unwrap_or(HTTPS_PORT))?;
            let tls_config = load_tls_config(tls_cert, tls_key)?;
            let rustls_config = RustlsConfig::from_config(Arc::new(tls_config));

            tracing::info!("Starting webhook server on HTTPS at {}", socket_addr);
            axum_server::bind_rustls(socket_addr, rustls_config)
                .handle(handle)
                .serve(app.into_make_service())
                .await?;
        }
        _ => {
            let socket_addr = socket_addr(&args.listen_address, args.port.unwrap_or(HTTP_PORT))?;

            tracing::info!(
                "TLS certificates not provided, starting webhook server on HTTP at {}",
                socket_addr
            );
            axum_server::bind(socket_addr)
                .handle(handle)
                .serve(app.into_make_service())
                .await?;
        }
    }

    Ok(())
}

fn socket_addr(listen_address: &str, port: u16) -> anyhow::Result<SocketAddr> {
    let addr = if listen_address.contains(':') {
        format!("[{listen_address}]:{port}")
    } else {
        format!("{listen_address}:{port}")
    };
    Ok(addr.parse()?)
}

async fn shutdown_signal() {
    let sigterm = signal(SignalKind::terminate());

    match sigterm {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {},
                _ = sigterm.recv() => {},
            }
        }
        Err(e) => {
            tracing::warn!("failed to install SIGTERM handler, waiting for Ctrl-C only: {}", e);
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_addr() {
        assert_eq!(
            socket_addr("0.0.0.0", 8080).unwrap(),
            "0.0.0.0:8080".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(
            socket_addr("::", 443).unwrap(),
            "[::]:443".parse::<SocketAddr>().unwrap()
        );
        assert!(socket_addr("not an address", 443).is_err());
    }

    #[test]
    fn test_default_args() {
        let args = Args::try_parse_from(["sidecar-injector"]).unwrap();
        assert!(args.tls_cert.is_none());
        assert_eq!(args.namespace_lookup_timeout, 5);
        assert_eq!(args.sidecar(), SidecarSpec::default());
        assert_eq!(args.required_label, "owner");
    }

    #[test]
    fn test_sidecar_args() {
        let args = Args::try_parse_from([
            "sidecar-injector",
            "--sidecar-name",
            "proxy",
            "--sidecar-image",
            "envoyproxy/envoy:v1.31",
            "--sidecar-args",
            "serve,--log-level=debug",
        ])
        .unwrap();
        assert_eq!(
            args.sidecar(),
            SidecarSpec {
                name: "proxy".to_string(),
                image: "envoyproxy/envoy:v1.31".to_string(),
                args: vec!["serve".to_string(), "--log-level=debug".to_string()],
            }
        );
    }

    #[test]
    fn test_tls_flags_come_in_pairs() {
        assert!(
            Args::try_parse_from(["sidecar-injector", "--tls-cert", "/certs/tls.crt"]).is_err()
        );
        let args = Args::try_parse_from([
            "sidecar-injector",
            "--tls-cert",
            "/certs/tls.crt",
            "--tls-key",
            "/certs/tls.key",
        ])
        .unwrap();
        assert_eq!(args.tls_key, Some(PathBuf::from("/certs/tls.key")));
    }

    #[test]
    fn test_missing_tls_files() {
        assert!(
            load_tls_config(Path::new("/nonexistent/tls.crt"), Path::new("/nonexistent/tls.key"))
                .is_err()
        );
    }
}
