use std::io::Read;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info};

use beacon_api::{HttpBackend, InProcApi, StatelessClusters};
use beacon_core::kubeconfig;
use beacon_persist::ident::FileScope;
use beacon_persist::KubeconfigStore;
use beacon_sync::SharedConfig;

#[derive(Parser, Debug)]
#[command(name = "beaconctl", version, about = "Beacon CLI: stateless-cluster kubeconfigs")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// Backend base URL for /parseKubeConfig
    #[arg(long = "server", global = true, env = "BEACON_SERVER", default_value = "http://localhost:4466")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output {
    Human,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Store a kubeconfig (YAML file, or "-" for stdin)
    Add {
        /// Path to a kubeconfig file; "-" reads stdin
        file: String,
    },
    /// List stored kubeconfigs with their cluster names
    Ls,
    /// Print the kubeconfig matching a cluster or custom name
    Find {
        /// Cluster name or custom display name
        name: String,
    },
    /// Set a custom display name for a cluster
    Rename {
        /// Current cluster name (raw or custom)
        name: String,
        /// New display name
        new_name: String,
    },
    /// Remove the stored kubeconfig for a cluster
    Rm {
        /// Raw cluster name
        name: String,
    },
    /// Re-parse stored kubeconfigs against the backend and print the result
    Sync,
    /// Print the per-profile identifier
    UserId,
}

fn init_tracing() {
    let env = std::env::var("BEACON_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("BEACON_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => tracing::info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            tracing::warn!(addr = %addr, "invalid BEACON_METRICS_ADDR; expected host:port");
        }
    }
}

/// Accept either raw kubeconfig YAML or an already-encoded blob; return the
/// base64 form, validated through the codec.
fn to_blob(input: &str) -> Result<String> {
    if kubeconfig::decode(input.trim()).is_ok() {
        return Ok(input.trim().to_string());
    }
    let blob = BASE64.encode(input);
    kubeconfig::decode(&blob).context("input is not a valid kubeconfig")?;
    Ok(blob)
}

fn read_input(file: &str) -> Result<String> {
    if file == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf).context("reading stdin")?;
        return Ok(buf);
    }
    std::fs::read_to_string(file).with_context(|| format!("reading {file}"))
}

fn describe(blob: &str) -> (Vec<String>, Vec<String>) {
    match kubeconfig::decode(blob) {
        Ok(doc) => {
            let clusters = doc.clusters.iter().map(|c| c.name.clone()).collect();
            let custom = doc
                .contexts
                .iter()
                .filter_map(|c| c.context.custom_name().map(|s| s.to_string()))
                .collect();
            (clusters, custom)
        }
        Err(_) => (vec!["<undecodable>".to_string()], Vec::new()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();

    let store = KubeconfigStore::open_default().await?;
    let api = InProcApi::new(
        store,
        Arc::new(HttpBackend::new(cli.server.clone())),
        SharedConfig::new(),
        Arc::new(FileScope::open_default()),
    );

    match cli.command {
        Commands::Add { file } => {
            let input = read_input(&file)?;
            let blob = to_blob(&input)?;
            let id = api.store_kubeconfig(&blob).await?;
            info!(id, "kubeconfig stored");
            match cli.output {
                Output::Human => println!("stored record {id}"),
                Output::Json => println!("{}", serde_json::json!({ "id": id })),
            }
        }
        Commands::Ls => {
            let blobs = api.list_kubeconfigs().await?;
            match cli.output {
                Output::Human => {
                    for blob in &blobs {
                        let (clusters, custom) = describe(blob);
                        if custom.is_empty() {
                            println!("{}", clusters.join(", "));
                        } else {
                            println!("{} (as {})", clusters.join(", "), custom.join(", "));
                        }
                    }
                }
                Output::Json => {
                    let rows: Vec<_> = blobs
                        .iter()
                        .map(|b| {
                            let (clusters, custom) = describe(b);
                            serde_json::json!({ "clusters": clusters, "customNames": custom })
                        })
                        .collect();
                    println!("{}", serde_json::to_string_pretty(&rows)?);
                }
            }
        }
        Commands::Find { name } => match api.find_by_cluster_name(&name).await? {
            Some(blob) => match cli.output {
                Output::Human => {
                    let yaml = BASE64.decode(blob.trim()).context("decoding stored blob")?;
                    print!("{}", String::from_utf8_lossy(&yaml));
                }
                Output::Json => println!("{}", serde_json::json!({ "kubeconfig": blob })),
            },
            None => {
                eprintln!("no stored kubeconfig matches {name:?}");
                std::process::exit(1);
            }
        },
        Commands::Rename { name, new_name } => {
            if let Err(e) = api.rename_cluster(&name, &new_name).await {
                error!(error = %e, "rename failed");
                eprintln!("rename error: {e}");
                std::process::exit(1);
            }
            println!("renamed {name} -> {new_name}");
        }
        Commands::Rm { name } => match api.delete_cluster(&name).await? {
            Some(_) => println!("removed {name}"),
            None => {
                eprintln!("no stored kubeconfig has cluster {name:?}");
                std::process::exit(1);
            }
        },
        Commands::Sync => {
            api.sync().await;
            let cfg = api.config();
            match cfg.as_ref() {
                Some(cfg) => match cli.output {
                    Output::Human => {
                        for name in cfg.stateless_clusters.keys() {
                            println!("{name}");
                        }
                    }
                    Output::Json => println!("{}", serde_json::to_string_pretty(&cfg.response)?),
                },
                None => eprintln!("sync did not produce a config (backend unreachable?)"),
            }
        }
        Commands::UserId => println!("{}", api.user_id()),
    }

    Ok(())
}
