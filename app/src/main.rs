use clap::Parser;
use etude_core::{Command, CoreError, Event, PracticeCore, PracticeStatus, ScoreSource};
use etude_domain_eval::ComparisonResult;
use etude_infra_midi_midir::MidirMidiInputPort;
use etude_infra_storage_fs::FsStorage;
use etude_ports::storage::StoragePort;
use log::info;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "etude", version, about = "MIDI piano practice trainer")]
struct Args {
    /// List available MIDI inputs and exit
    #[arg(long)]
    list_inputs: bool,

    /// MIDI input to use (index from --list-inputs); defaults to the first
    #[arg(long)]
    input: Option<usize>,

    /// Practice a Standard MIDI File
    #[arg(long)]
    score: Option<PathBuf>,

    /// Practice the built-in C-major scale instead of a score file
    #[arg(long)]
    demo: bool,

    /// Loop the current measure instead of moving on
    #[arg(long)]
    repeat: bool,

    /// Compare on every note instead of micro-batching input
    #[arg(long)]
    immediate: bool,

    /// Ignore score tempo and advance at a fixed pace
    #[arg(long)]
    fixed_pace: bool,

    /// Input debounce window in milliseconds
    #[arg(long)]
    debounce_ms: Option<u64>,

    /// Write a diagnostics snapshot to this directory and exit
    #[arg(long)]
    export_diagnostics: Option<PathBuf>,
}

fn main() {
    env_logger::init();
    let args = Args::parse();
    if let Err(e) = run(args) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), CoreError> {
    let storage: Box<dyn StoragePort> = Box::new(FsStorage::default());
    let mut core = PracticeCore::new(Box::new(MidirMidiInputPort::default()), Some(storage));

    if args.list_inputs {
        core.handle_command(Command::ListMidiInputs)?;
        for event in core.drain_events() {
            if let Event::MidiInputsUpdated { devices } = event {
                if devices.is_empty() {
                    println!("no MIDI inputs found");
                }
                for (index, device) in devices.iter().enumerate() {
                    println!("[{index}] {}", device.name);
                }
            }
        }
        return Ok(());
    }

    if let Some(dir) = args.export_diagnostics {
        core.handle_command(Command::ExportDiagnostics {
            path: dir.to_string_lossy().into_owned(),
        })?;
        println!("diagnostics written to {}", dir.display());
        return Ok(());
    }

    if let Some(ms) = args.debounce_ms {
        core.handle_command(Command::SetDebounceMs { ms })?;
    }
    if args.immediate {
        core.handle_command(Command::SetMicroBatching { enabled: false })?;
    }
    if args.fixed_pace {
        core.handle_command(Command::SetScorePaced { enabled: false })?;
    }

    let source = match (&args.score, args.demo) {
        (Some(path), _) => ScoreSource::MidiFile(path.to_string_lossy().into_owned()),
        (None, true) => ScoreSource::DemoScale,
        (None, false) => {
            eprintln!("nothing to practice; pass --score <file.mid> or --demo");
            std::process::exit(2);
        }
    };
    core.handle_command(Command::LoadScore { source })?;

    select_input(&mut core, args.input)?;

    if args.repeat {
        core.handle_command(Command::ToggleRepeat)?;
    }
    core.handle_command(Command::StartPractice)?;
    info!("practice started");

    loop {
        core.tick();
        for event in core.drain_events() {
            render_event(&core, &event);
        }
        if core.snapshot().status == PracticeStatus::Idle {
            break;
        }
        std::thread::sleep(Duration::from_millis(2));
    }

    Ok(())
}

fn select_input(core: &mut PracticeCore, requested: Option<usize>) -> Result<(), CoreError> {
    core.handle_command(Command::ListMidiInputs)?;
    let mut devices = Vec::new();
    for event in core.drain_events() {
        if let Event::MidiInputsUpdated { devices: found } = event {
            devices = found;
        }
    }

    let index = requested.unwrap_or(0);
    let device = devices.into_iter().nth(index).ok_or_else(|| {
        CoreError::Midi(etude_ports::midi::MidiError::DeviceNotFound(format!(
            "input index {index}"
        )))
    })?;

    println!("using MIDI input: {}", device.name);
    core.handle_command(Command::SelectMidiInput {
        device_id: device.id,
    })
}

fn render_event(core: &PracticeCore, event: &Event) {
    match event {
        Event::ScoreLoaded { title, steps } => {
            let title = title.as_deref().unwrap_or("untitled");
            println!("loaded \"{title}\" ({steps} steps)");
        }
        Event::CursorMoved { step_index, measure_index } => {
            let prompt = core
                .snapshot()
                .current_step
                .map(|step| {
                    if step.is_rest {
                        "(rest)".to_string()
                    } else {
                        step.notes
                            .iter()
                            .map(|n| format!("{}{}", n.pitch_name, n.octave))
                            .collect::<Vec<_>>()
                            .join(" ")
                    }
                })
                .unwrap_or_default();
            println!("step {step_index} (measure {measure_index}): {prompt}");
        }
        Event::ComparisonFeedback { result, .. } => match result {
            ComparisonResult::Correct => println!("  correct"),
            ComparisonResult::MissingNotes { missing } => println!("  missing: {missing:?}"),
            ComparisonResult::WrongNotes { wrong, .. } => println!("  wrong: {wrong:?}"),
        },
        Event::RepeatToggled { active } => {
            println!("repeat {}", if *active { "on" } else { "off" });
        }
        Event::PracticeError { message } => {
            println!("session ended: {message}");
        }
        _ => {}
    }
}
