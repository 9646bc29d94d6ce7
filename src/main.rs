use anyhow::{Context, Result};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use voiceflow::capture::{ScriptedMicrophone, ScriptedRecognizer};
use voiceflow::files::{compose_preview, export_archive};
use voiceflow::llm::GeminiBackend;
use voiceflow::messages::LogKind;
use voiceflow::speech::{GeminiSpeech, Muted, NarratorChain, SpeechSynthesizer, SystemNarrator};
use voiceflow::{AppEvent, CaptureDevices, Controller, ControllerHandle, VoiceFlowConfig};

const HELP: &str = "\
Commands:
  /mic                 start or stop listening
  /handsfree on|off    toggle hands-free mode
  /files               list project files
  /show [path]         select and print a file
  /export <zip>        write the project as a zip archive
  /preview <html>      write the composed preview page
  /log                 print the conversation log
  /quit                exit
Anything else is sent as a text command.";

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "voiceflow=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Voiceflow");

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = VoiceFlowConfig::load_or_default(config_path.as_deref())
        .context("Failed to load configuration")?;

    let backend = Arc::new(GeminiBackend::new(&config.backend)?);
    let synthesizer = build_synthesizer(&config);
    let devices = build_devices(&config);

    let (controller, handle) = Controller::new(config, devices, backend, synthesizer);
    let threads = controller.start()?;

    let printer = {
        let events = handle.clone();
        std::thread::spawn(move || print_events(events))
    };

    println!("{}", HELP);
    run_console(&handle)?;

    handle.shutdown()?;
    for thread in threads {
        let _ = thread.join();
    }
    let _ = printer.join();
    info!("Voiceflow stopped");
    Ok(())
}

fn build_synthesizer(config: &VoiceFlowConfig) -> Arc<dyn SpeechSynthesizer> {
    if !config.speech.enabled {
        return Arc::new(Muted);
    }

    let primary: Option<Box<dyn SpeechSynthesizer>> =
        match GeminiSpeech::new(&config.backend, &config.speech) {
            Ok(speech) => Some(Box::new(speech)),
            Err(e) => {
                warn!("Cloud voice unavailable: {}", e);
                None
            }
        };
    let fallback = Box::new(SystemNarrator::new(config.speech.narrator_command.as_deref()));
    Arc::new(NarratorChain::new(primary, fallback))
}

#[cfg(feature = "audio-io")]
fn build_devices(config: &VoiceFlowConfig) -> CaptureDevices {
    match native_devices(config) {
        Ok(devices) => devices,
        Err(e) => {
            warn!("No usable microphone ({}), voice input disabled", e);
            scripted_devices()
        }
    }
}

#[cfg(not(feature = "audio-io"))]
fn build_devices(_config: &VoiceFlowConfig) -> CaptureDevices {
    info!("Built without audio input, voice input disabled");
    scripted_devices()
}

#[cfg(feature = "audio-io")]
fn native_devices(config: &VoiceFlowConfig) -> Result<CaptureDevices> {
    use voiceflow::audio::CpalMicrophone;
    use voiceflow::speech::{SegmentingRecognizer, Transcriber};

    let transcriber: Arc<dyn Transcriber> = build_transcriber(config)?;
    let recognizer = |mic: CpalMicrophone| {
        Box::new(SegmentingRecognizer::new(
            Box::new(mic),
            Arc::clone(&transcriber),
            config.recognizer.clone(),
        ))
    };

    Ok(CaptureDevices {
        wake_recognizer: recognizer(CpalMicrophone::new()?),
        transcript_recognizer: recognizer(CpalMicrophone::new()?),
        microphone: Box::new(CpalMicrophone::new()?),
    })
}

#[cfg(all(feature = "audio-io", feature = "whisper"))]
fn build_transcriber(config: &VoiceFlowConfig) -> Result<Arc<dyn voiceflow::speech::Transcriber>> {
    use voiceflow::speech::{GeminiTranscriber, WhisperTranscriber};

    if config.recognizer.whisper_model_path.exists() {
        return Ok(Arc::new(WhisperTranscriber::new(&config.recognizer)?));
    }
    warn!("Whisper model missing, using cloud transcription");
    Ok(Arc::new(GeminiTranscriber::new(&config.backend)?))
}

#[cfg(all(feature = "audio-io", not(feature = "whisper")))]
fn build_transcriber(config: &VoiceFlowConfig) -> Result<Arc<dyn voiceflow::speech::Transcriber>> {
    Ok(Arc::new(voiceflow::speech::GeminiTranscriber::new(&config.backend)?))
}

/// Devices that never hear anything
fn scripted_devices() -> CaptureDevices {
    let (wake_recognizer, _) = ScriptedRecognizer::new();
    let (transcript_recognizer, _) = ScriptedRecognizer::new();
    let (microphone, _) = ScriptedMicrophone::new(16000);
    CaptureDevices {
        wake_recognizer: Box::new(wake_recognizer),
        transcript_recognizer: Box::new(transcript_recognizer),
        microphone: Box::new(microphone),
    }
}

fn print_events(handle: ControllerHandle) {
    while let Some(event) = handle.recv_event() {
        match event {
            AppEvent::StateChanged(state) => println!("  [{}]", state),
            AppEvent::Log(entry) => match entry.kind {
                LogKind::User => println!("you: {}", entry.message),
                LogKind::System => println!("assistant: {}", entry.message),
                LogKind::Error => println!("error: {}", entry.message),
            },
            AppEvent::HandsFreeChanged(enabled) => {
                println!("  [hands-free {}]", if enabled { "on" } else { "off" })
            }
            AppEvent::FilesChanged | AppEvent::SelectionChanged(_) => {}
            AppEvent::Shutdown => break,
        }
    }
}

fn run_console(handle: &ControllerHandle) -> Result<()> {
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();

    for line in stdin.lock().lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (command, argument) = match line.split_once(char::is_whitespace) {
            Some((command, rest)) => (command, rest.trim()),
            None => (line, ""),
        };

        match command {
            "/quit" | "/exit" => break,
            "/help" => println!("{}", HELP),
            "/mic" => handle.toggle_microphone()?,
            "/handsfree" => match argument {
                "on" => handle.set_hands_free(true)?,
                "off" => handle.set_hands_free(false)?,
                _ => println!("usage: /handsfree on|off"),
            },
            "/files" => {
                let state = handle.state().read();
                for path in state.files.paths() {
                    let marker = if state.selected_path.as_deref() == Some(path) { "*" } else { " " };
                    println!("{} {}", marker, path);
                }
            }
            "/show" => {
                let path = if argument.is_empty() {
                    handle.state().selected_path()
                } else {
                    handle.select_file(argument)?;
                    Some(argument.to_string())
                };
                match path.and_then(|p| handle.state().file_content(&p)) {
                    Some(content) => println!("{}", content),
                    None => println!("no such file"),
                }
            }
            "/export" if !argument.is_empty() => {
                let files = handle.state().read().files.clone();
                match export_archive(&files, argument) {
                    Ok(()) => println!("exported {} files to {}", files.len(), argument),
                    Err(e) => println!("export failed: {}", e),
                }
            }
            "/preview" if !argument.is_empty() => {
                let page = compose_preview(&handle.state().read().files);
                match std::fs::write(argument, page) {
                    Ok(()) => println!("preview written to {}", argument),
                    Err(e) => println!("preview failed: {}", e),
                }
            }
            "/log" => {
                for entry in handle.state().logs() {
                    println!("{}", entry);
                }
            }
            _ if command.starts_with('/') => println!("unknown command, try /help"),
            _ => handle.submit_text(line)?,
        }
        stdout.flush()?;
    }

    Ok(())
}
