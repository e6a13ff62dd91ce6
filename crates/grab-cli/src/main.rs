use clap::{ArgAction, Parser, Subcommand};
use futures::StreamExt;
use grab_agent::{
    ChatParticipant, EventBus, LocalHost, LocalWorkspace, RequestAttachments, SessionConfig,
    TracingSink,
};
use grab_bridge::{BridgeConfig, TransportBridge, serve};
use grab_llm::utils::sse::{SseEvent, SseParser};
use grab_llm::{
    Client, ImageAttachment, ModelCapabilities, OpenAiCompatibleConfig, OpenAiCompatibleProvider,
};
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "grab-cli")]
#[command(about = "HTTP bridge that drives a single chat session as a request/response API")]
struct Cli {
    /// Log filter, e.g. `info` or `grab_bridge=debug`. Falls back to RUST_LOG.
    #[arg(long, global = true, env = "GRAB_LOG_LEVEL")]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the bridge with an in-process chat host.
    Serve(ServeArgs),
    /// Submit one request to a running bridge and print its event stream.
    Send(SendArgs),
}

#[derive(clap::Args, Debug)]
struct ServeArgs {
    #[arg(long, env = "GRAB_PORT", default_value_t = grab_bridge::config::DEFAULT_PORT)]
    port: u16,
    #[arg(long, env = "GRAB_WORKSPACE", default_value = ".")]
    workspace: PathBuf,
    #[arg(long, env = "GRAB_PROVIDER_BASE_URL", default_value = "https://api.openai.com/v1")]
    provider_base_url: String,
    #[arg(long, env = "GRAB_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
    #[arg(long, env = "GRAB_MODEL", default_value = "gpt-4o")]
    model: String,
    #[arg(long = "no-vision", action = ArgAction::SetTrue)]
    no_vision: bool,
    #[arg(long = "no-tools", action = ArgAction::SetTrue)]
    no_tools: bool,
    /// Images embedded per model message; 0 means unlimited.
    #[arg(long, env = "GRAB_MAX_IMAGES_PER_TURN", default_value_t = 1)]
    max_images_per_turn: usize,
    #[arg(long, env = "GRAB_SYSTEM_PROMPT")]
    system_prompt: Option<String>,
    #[arg(long = "no-agents-md", action = ArgAction::SetTrue)]
    no_agents_md: bool,
    #[arg(long = "no-screenshots-to-model", action = ArgAction::SetTrue)]
    no_screenshots_to_model: bool,
    #[arg(long, env = "GRAB_MAX_TOOL_ROUNDS", default_value_t = 200)]
    max_tool_rounds: usize,
    #[arg(long, env = "GRAB_COMPLETION_TIMEOUT_SECS", default_value_t = 60)]
    completion_timeout_secs: u64,
    #[arg(long, env = "GRAB_PUBLIC_BASE_URL")]
    public_base_url: Option<String>,
}

#[derive(clap::Args, Debug)]
struct SendArgs {
    prompt: String,
    #[arg(long, env = "GRAB_BRIDGE_URL", default_value = "http://localhost:6567")]
    url: String,
    #[arg(long)]
    content: Option<String>,
    #[arg(long, conflicts_with = "content")]
    content_file: Option<PathBuf>,
    #[arg(long = "image")]
    images: Vec<PathBuf>,
    #[arg(long)]
    system_prompt: Option<String>,
    #[arg(long, action = ArgAction::SetTrue)]
    direct: bool,
    #[arg(long, action = ArgAction::SetTrue)]
    background: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    let result = match cli.command {
        Commands::Serve(args) => serve_command(args).await,
        Commands::Send(args) => send_command(args).await,
    };

    match result {
        Ok(code) => code,
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::from(1)
        }
    }
}

fn init_tracing(level: Option<&str>) {
    let filter = level
        .and_then(|level| EnvFilter::try_new(level).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn serve_command(args: ServeArgs) -> Result<ExitCode, String> {
    let session_config = SessionConfig {
        max_tool_rounds: args.max_tool_rounds,
        custom_system_prompt: args.system_prompt.clone(),
        use_agents_md: !args.no_agents_md,
        send_screenshots_to_model: !args.no_screenshots_to_model,
        ..SessionConfig::default()
    };
    session_config.validate().map_err(|error| error.to_string())?;

    let workspace_root = args
        .workspace
        .canonicalize()
        .map_err(|error| format!("workspace {}: {error}", args.workspace.display()))?;
    let client = Arc::new(build_client(&args)?);

    let bus = EventBus::new();
    let attachments = RequestAttachments::new();
    let workspace = Arc::new(LocalWorkspace::new(&workspace_root));
    let participant = ChatParticipant::new(
        client,
        Arc::clone(&bus),
        Arc::clone(&attachments),
        workspace.clone(),
        session_config,
    );
    let host = Arc::new(LocalHost::new(Arc::new(participant), Arc::new(TracingSink)));

    let bridge_config = BridgeConfig {
        port: args.port,
        completion_timeout: Duration::from_secs(args.completion_timeout_secs),
        public_base_url: args.public_base_url,
        ..BridgeConfig::default()
    };
    let bridge = TransportBridge::new(host.clone(), bus, attachments, workspace, bridge_config)
        .with_custom_system_prompt(args.system_prompt);

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", args.port))
        .await
        .map_err(|error| format!("failed to bind port {}: {error}", args.port))?;
    info!(
        workspace = %workspace_root.display(),
        model = %args.model,
        "serving chat bridge"
    );

    serve(listener, Arc::new(bridge), async {
        if tokio::signal::ctrl_c().await.is_err() {
            futures::future::pending::<()>().await;
        }
    })
    .await;

    host.shutdown();
    host.wait().await;
    Ok(ExitCode::SUCCESS)
}

fn build_client(args: &ServeArgs) -> Result<Client, String> {
    let mut config = OpenAiCompatibleConfig::new(&args.provider_base_url, &args.model);
    config.api_key = args.api_key.clone();
    config.capabilities = ModelCapabilities {
        supports_vision: !args.no_vision,
        supports_tools: !args.no_tools,
        max_images_per_turn: (args.max_images_per_turn > 0).then_some(args.max_images_per_turn),
    };
    let provider = OpenAiCompatibleProvider::new(config).map_err(|error| error.to_string())?;

    let mut client = Client::default();
    client
        .register_provider(Arc::new(provider))
        .map_err(|error| error.to_string())?;
    Ok(client)
}

async fn send_command(args: SendArgs) -> Result<ExitCode, String> {
    let content = match &args.content_file {
        Some(path) => Some(
            std::fs::read_to_string(path)
                .map_err(|error| format!("failed to read {}: {error}", path.display()))?,
        ),
        None => args.content.clone(),
    };
    let images = args
        .images
        .iter()
        .map(|path| load_image(path))
        .collect::<Result<Vec<_>, _>>()?;
    let body = json!({
        "prompt": args.prompt,
        "content": content,
        "images": images,
        "systemPrompt": args.system_prompt,
        "directMessage": args.direct,
        "background": args.background,
    });

    let endpoint = format!("{}/agent", args.url.trim_end_matches('/'));
    let response = reqwest::Client::new()
        .post(&endpoint)
        .json(&body)
        .send()
        .await
        .map_err(|error| format!("request to {endpoint} failed: {error}"))?;

    if !response.status().is_success() {
        let status = response.status();
        let payload: Value = response.json().await.unwrap_or(Value::Null);
        let message = payload
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("unexpected response");
        return Err(format!("bridge rejected request ({status}): {message}"));
    }

    let mut parser = SseParser::new();
    let mut decoder = Utf8Decoder::default();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|error| format!("event stream interrupted: {error}"))?;
        for event in parser.push(&decoder.push(&chunk)) {
            if let Some(code) = print_event(&event) {
                return Ok(code);
            }
        }
    }
    if let Some(code) = parser.finish().as_ref().and_then(print_event) {
        return Ok(code);
    }
    Err("event stream ended without a done or error event".to_string())
}

fn load_image(path: &Path) -> Result<ImageAttachment, String> {
    let bytes =
        std::fs::read(path).map_err(|error| format!("failed to read {}: {error}", path.display()))?;
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    let description = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string());
    Ok(ImageAttachment::from_bytes(mime.essence_str(), &bytes, description))
}

/// Prints one streamed event; returns the exit code once the stream is over.
fn print_event(event: &SseEvent) -> Option<ExitCode> {
    match event.name() {
        "status" => {
            println!("· {}", event.data);
            None
        }
        "done" => {
            println!("done");
            Some(ExitCode::SUCCESS)
        }
        "error" => {
            eprintln!("error: {}", event.data);
            Some(ExitCode::from(1))
        }
        _ => None,
    }
}

/// Reassembles UTF-8 text from byte chunks that may split a code point.
#[derive(Default)]
struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    fn push(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);
        let valid = match std::str::from_utf8(&self.pending) {
            Ok(_) => self.pending.len(),
            Err(error) if error.error_len().is_none() => error.valid_up_to(),
            Err(_) => {
                let text = String::from_utf8_lossy(&self.pending).into_owned();
                self.pending.clear();
                return text;
            }
        };
        let rest = self.pending.split_off(valid);
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending = rest;
        text
    }
}
