mod cli;

use clipforge::{
    config,
    publish::authorize::{authorize, ClientSecrets},
    server::{self, AppContext},
    transcode::{FfmpegTranscoder, Transcoder},
};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use std::path::Path;

async fn start_server(
    host: Option<String>,
    port: Option<u16>,
    config_path: Option<&Path>,
) -> Result<()> {
    let mut config = config::load_config_or_default(config_path)?;

    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    tracing::info!("Starting clipforge server");
    tracing::info!(
        "Server will listen on {}:{}",
        config.server.host,
        config.server.port
    );
    if config.storage.folder_id.is_none() {
        tracing::info!("No storage folder configured; uploads go to the Drive root");
    }

    let ctx = AppContext::from_config(config)?;
    tracing::info!(
        "Temp artifacts in {}",
        ctx.pipeline.store().root().display()
    );

    server::start_server(ctx).await
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "clipforge=trace,clipforge_av=trace,clipforge_common=debug,tower_http=debug".to_string()
        } else {
            "clipforge=info,clipforge_av=info,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    match cli.command {
        Commands::Start { host, port } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(start_server(host, port, cli.config.as_deref()))
        }
        Commands::Convert { input, output } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(convert_file(&input, output.as_deref(), cli.config.as_deref()))
        }
        Commands::CheckTools => check_tools(cli.config.as_deref()),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Authorize => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(run_authorize(cli.config.as_deref()))
        }
        Commands::Version => {
            println!("clipforge {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

async fn convert_file(input: &Path, output: Option<&Path>, config_path: Option<&Path>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;

    if !input.exists() {
        anyhow::bail!("Input file does not exist: {:?}", input);
    }

    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| input.with_extension("mp4"));
    if output == input {
        anyhow::bail!("Output would overwrite the input: {:?}", output);
    }

    let transcoder = FfmpegTranscoder::from_config(&config.transcode)?;
    tracing::info!("Converting {:?} -> {:?}", input, output);

    transcoder
        .convert(input, &output)
        .await
        .with_context(|| format!("Failed to convert {:?}", input))?;

    println!("Output: {}", output.display());
    Ok(())
}

fn check_tools(config_path: Option<&Path>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;

    println!("Checking external tools...\n");

    let tools = clipforge_av::check_tools(config.transcode.ffmpeg_path.as_deref());
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version.lines().next().unwrap_or(""));
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Install ffmpeg to enable conversion.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            println!("  Server: {}:{}", config.server.host, config.server.port);
            println!(
                "  Allowed extensions: {}",
                config.upload.allowed_extensions.join(", ")
            );
            println!("  Temp dir: {}", config.artifacts.temp_dir().display());
            println!(
                "  Codecs: {} / {}",
                config.transcode.video_codec, config.transcode.audio_codec
            );
            println!(
                "  Storage folder: {}",
                config.storage.folder_id.as_deref().unwrap_or("(root)")
            );
        }
        None => {
            println!("No config file specified, using defaults");
            let config = config::Config::default();
            println!("Default config:");
            println!("  Server: {}:{}", config.server.host, config.server.port);
        }
    }

    Ok(())
}

async fn run_authorize(config_path: Option<&Path>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let mut secrets = ClientSecrets::load(&config.storage.client_secrets_path)?;
    if let Some(ref token_uri) = config.storage.token_uri {
        secrets.token_uri = token_uri.clone();
    }

    let credential = authorize(
        &secrets,
        &config.storage.scope,
        &config.storage.credentials_path,
        |url| {
            println!("Open this URL in a browser to authorize clipforge:\n\n  {}\n", url);
            println!("Waiting for the redirect...");
        },
    )
    .await?;

    println!(
        "✓ Credential saved to {}",
        config.storage.credentials_path.display()
    );
    if credential.refresh_token.is_none() {
        println!("  No refresh token was granted; re-run authorize when it expires.");
    }
    Ok(())
}
