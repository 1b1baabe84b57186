use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, anyhow};
use axum_server::tls_rustls::RustlsConfig;
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::info;

use speech_relay::{
    ServerConfig,
    core::{synthesis::SynthesisRequest, tts::resolve_voice, tts::VoiceParams},
    routes,
    state::AppState,
};

/// Speech Relay - OpenAI-compatible speech synthesis server
#[derive(Parser, Debug)]
#[command(name = "speech-relay")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Subcommand to run
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Synthesize a text file to audio without starting the server
    Speak {
        /// Input text file
        #[arg(short = 'i', long = "input", value_name = "FILE")]
        input: PathBuf,

        /// Output audio file
        #[arg(short = 'o', long = "output", value_name = "FILE")]
        output: PathBuf,

        /// Voice alias or backend voice name
        #[arg(long = "voice")]
        voice: Option<String>,

        /// Speaking rate multiplier (0.25 - 2.0)
        #[arg(long = "speed", default_value_t = 1.0)]
        speed: f32,
    },
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<ServerConfig> {
    match path {
        Some(config_path) => {
            println!("Loading configuration from {}", config_path.display());
            ServerConfig::from_file(&config_path).map_err(|e| anyhow!(e.to_string()))
        }
        None => ServerConfig::from_env().map_err(|e| anyhow!(e.to_string())),
    }
}

async fn speak(
    config: ServerConfig,
    input: PathBuf,
    output: PathBuf,
    voice: Option<String>,
    speed: f32,
) -> anyhow::Result<()> {
    if !(0.25..=2.0).contains(&speed) {
        anyhow::bail!("Speed must be between 0.25 and 2.0, got {speed}");
    }

    let text = tokio::fs::read_to_string(&input)
        .await
        .with_context(|| format!("Failed to read {}", input.display()))?;

    let voice_name = resolve_voice(
        voice.as_deref(),
        None,
        &config.voice_aliases,
        &config.default_voice,
    );
    let params = VoiceParams::from_speed_pitch(
        voice_name,
        speed,
        1.0,
        config.default_style.clone(),
        config.output_format.clone(),
    );

    let state = AppState::new(config).map_err(|e| anyhow!(e.to_string()))?;
    let audio = state
        .synthesis
        .synthesize_buffered(SynthesisRequest::new(text, params))
        .await?;

    tokio::fs::write(&output, &audio)
        .await
        .with_context(|| format!("Failed to write {}", output.display()))?;
    info!(bytes = audio.len(), output = %output.display(), "Audio written");
    println!("Wrote {} bytes to {}", audio.len(), output.display());

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (must be done before config loading)
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Initialize crypto provider for TLS connections
    // This must be done before any TLS connections are attempted
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install default crypto provider"))?;

    // Parse CLI arguments
    let cli = Cli::parse();
    let config = load_config(cli.config)?;

    if let Some(Commands::Speak {
        input,
        output,
        voice,
        speed,
    }) = cli.command
    {
        return speak(config, input, output, voice, speed).await;
    }

    let address = config.address();
    let tls_config = config.tls.clone();
    let is_tls_enabled = config.is_tls_enabled();
    println!("Starting server on {address}");

    let app_state = AppState::new(config).map_err(|e| anyhow!(e.to_string()))?;
    let app = routes::create_app(app_state).map_err(|e| anyhow!(e.to_string()))?;

    // Parse socket address
    let socket_addr: SocketAddr = address
        .parse()
        .map_err(|e| anyhow!("Invalid server address '{}': {}", address, e))?;

    // Start server with or without TLS
    match tls_config.filter(|_| is_tls_enabled) {
        Some(tls) => {
            // Load TLS configuration from certificate and key files
            let rustls_config = RustlsConfig::from_pem_file(&tls.cert_path, &tls.key_path)
                .await
                .map_err(|e| {
                    anyhow!(
                        "Failed to load TLS certificates from {} and {}: {}",
                        tls.cert_path.display(),
                        tls.key_path.display(),
                        e
                    )
                })?;

            println!("Server listening on https://{} (TLS enabled)", socket_addr);

            axum_server::bind_rustls(socket_addr, rustls_config)
                .serve(app.into_make_service_with_connect_info::<SocketAddr>())
                .await
                .map_err(|e| anyhow!("TLS server error: {}", e))?;
        }
        None => {
            println!("Server listening on http://{}", socket_addr);

            let listener = TcpListener::bind(&socket_addr).await?;
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await?;
        }
    }

    Ok(())
}
