use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use live_session::types::audio::Voice;
use live_session::types::{CaptureMode, SessionConfig};
use live_session::utils::backend::VideoBackend;
#[cfg(feature = "camera")]
use live_session::utils::camera::NokhwaCamera;
use live_session::utils::device;
use live_session::utils::microphone::CpalMicrophone;
use live_session::utils::speaker::CpalSpeaker;
use live_session::{
    Client, ClientConfig, ControllerHandle, MediaBackends, SessionController, SessionEvent,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::EnvFilter;

/// Streams microphone audio to a live model session and plays its replies.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Base WebSocket URL of the session bridge (overrides LIVE_SESSION_URL).
    #[arg(long)]
    url: Option<String>,
    /// Mode to start streaming in right after connecting.
    #[arg(long)]
    mode: Option<CaptureMode>,
    #[arg(long)]
    prompt: Option<String>,
    #[arg(long)]
    voice: Option<Voice>,
    #[arg(long)]
    model: Option<String>,
    #[arg(long)]
    temperature: Option<f32>,
    #[arg(long)]
    input_device: Option<String>,
    #[arg(long)]
    output_device: Option<String>,
    /// Camera index used for `camera` mode.
    #[cfg(feature = "camera")]
    #[arg(long, default_value_t = 0)]
    camera: u32,
    /// Print audio devices and exit.
    #[arg(long)]
    list_devices: bool,
}

fn session_config(cli: &Cli) -> SessionConfig {
    let mut builder = SessionConfig::builder();
    if let Some(prompt) = &cli.prompt {
        builder = builder.with_system_prompt(prompt);
    }
    if let Some(voice) = &cli.voice {
        builder = builder.with_voice(voice.clone());
    }
    if let Some(model) = &cli.model {
        builder = builder.with_model_id(model);
    }
    if let Some(temperature) = cli.temperature {
        builder = builder.with_temperature(temperature);
    }
    builder.build()
}

fn list_devices() -> anyhow::Result<()> {
    println!("inputs:");
    for info in device::list_inputs().context("failed to list input devices")? {
        println!("{info}");
    }
    println!("outputs:");
    for info in device::list_outputs().context("failed to list output devices")? {
        println!("{info}");
    }
    Ok(())
}

#[cfg(feature = "camera")]
fn video_backend(cli: &Cli) -> Option<Arc<dyn VideoBackend>> {
    Some(Arc::new(NokhwaCamera::new(cli.camera)))
}

#[cfg(not(feature = "camera"))]
fn video_backend(_cli: &Cli) -> Option<Arc<dyn VideoBackend>> {
    None
}

/// `/start [mode]`, `/stop` and `/quit`; any other line is sent as text.
async fn read_commands(handle: ControllerHandle) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut words = line.split_whitespace();
        match words.next() {
            Some("/start") => {
                let mode = match words.next().map(str::parse::<CaptureMode>) {
                    None => CaptureMode::Audio,
                    Some(Ok(mode)) => mode,
                    Some(Err(e)) => {
                        eprintln!("{e}");
                        continue;
                    }
                };
                handle.start(mode).await?;
            }
            Some("/stop") => handle.stop().await?,
            Some("/quit") => break,
            _ => handle.send_text(line).await?,
        }
    }
    Ok(())
}

fn print_event(event: SessionEvent) {
    match event {
        SessionEvent::Connected => println!("[connected]"),
        SessionEvent::Disconnected => println!("[disconnected, reconnecting...]"),
        SessionEvent::Reconnecting { attempt, delay } => {
            println!("[retry {attempt} in {}ms]", delay.as_millis())
        }
        SessionEvent::GaveUp { attempts } => println!("[gave up after {attempts} retries]"),
        SessionEvent::StateChanged(state) => tracing::debug!("state: {:?}", state),
        SessionEvent::Text(text) => println!("model: {text}"),
        SessionEvent::TurnComplete => println!("[turn complete]"),
        SessionEvent::ServerError(message) => eprintln!("server error: {message}"),
        SessionEvent::Unknown(value) => tracing::debug!("unhandled message: {}", value),
        SessionEvent::Error(message) => eprintln!("error: {message}"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv_override().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_timer(ChronoLocal::rfc_3339())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if cli.list_devices {
        return list_devices();
    }

    let mut client_config = ClientConfig::from_env().context("invalid environment")?;
    if let Some(url) = &cli.url {
        client_config = client_config.with_base_url(url);
    }
    let reconnect = client_config.reconnect().clone();

    let speaker = CpalSpeaker::new(cli.output_device.clone()).context("failed to open speaker")?;
    tracing::info!("speaker running at {} Hz", speaker.device_rate());
    let backends = MediaBackends {
        microphone: Arc::new(CpalMicrophone::new(cli.input_device.clone())),
        video: video_backend(&cli),
        speaker: Arc::new(speaker),
    };

    let transport = Arc::new(Client::new(client_config));
    let (controller, mut events) =
        SessionController::new(transport, session_config(&cli), reconnect, backends);
    let (handle, task) = controller.spawn();

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            print_event(event);
        }
    });

    if let Some(mode) = cli.mode {
        handle.start(mode).await?;
    }

    tokio::select! {
        result = read_commands(handle.clone()) => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("interrupted"),
    }

    handle.shutdown().await.ok();
    task.await.context("controller task failed")?;
    Ok(())
}
