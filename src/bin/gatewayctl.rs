use std::path::PathBuf;

use axum::body::Bytes;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, Uri};
use clap::{Parser, Subcommand};
use serde_json::json;

use api_gateway::config::{load_config, GatewayConfig};
use api_gateway::http::RequestContext;
use api_gateway::routing::RouteTable;

#[derive(Parser)]
#[command(name = "gatewayctl")]
#[command(about = "Offline tooling for API gateway configurations", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a configuration file
    Check { config: PathBuf },
    /// List the compiled route table in match order
    Routes { config: PathBuf },
    /// Show which route a request would take and which routes it shadows
    Explain {
        config: PathBuf,
        method: String,
        path: String,
        /// Request header as `name:value`; repeatable
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Check { config } => {
            let config = load_config(&config)?;
            RouteTable::from_config(&config.routes)?;
            println!("OK: {} routes, auth mode {:?}", config.routes.len(), config.auth.mode);
        }
        Commands::Routes { config } => {
            let config = load_config(&config)?;
            let table = RouteTable::from_config(&config.routes)?;
            let routes: Vec<_> = table
                .routes()
                .iter()
                .zip(&config.routes)
                .map(|(route, raw)| {
                    json!({
                        "index": route.index,
                        "id": route.id,
                        "paths": route.path_patterns,
                        "methods": route.methods,
                        "filters": raw.filters,
                        "target": route.target.to_string(),
                        "public": route.public,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&routes)?);
        }
        Commands::Explain {
            config,
            method,
            path,
            headers,
        } => {
            let config = load_config(&config)?;
            explain(&config, &method, &path, &headers)?;
        }
    }

    Ok(())
}

fn explain(
    config: &GatewayConfig,
    method: &str,
    path: &str,
    raw_headers: &[String],
) -> Result<(), Box<dyn std::error::Error>> {
    let table = RouteTable::from_config(&config.routes)?;

    let mut headers = HeaderMap::new();
    for raw in raw_headers {
        let (name, value) = raw
            .split_once(':')
            .ok_or_else(|| format!("header '{raw}' is not name:value"))?;
        headers.append(
            HeaderName::from_bytes(name.trim().as_bytes())?,
            HeaderValue::from_str(value.trim())?,
        );
    }

    let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())?;
    let uri: Uri = path.parse()?;
    let ctx = RequestContext::new(method, &uri, headers, Bytes::new());

    let report = match table.explain(&ctx) {
        Some(explanation) => json!({
            "matched": true,
            "route": { "index": explanation.winner.0, "id": explanation.winner.1 },
            "shadowed": explanation
                .shadowed
                .iter()
                .map(|(index, id)| json!({ "index": index, "id": id }))
                .collect::<Vec<_>>(),
        }),
        None => json!({ "matched": false }),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
