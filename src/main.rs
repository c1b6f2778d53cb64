use anyhow::Result;
use chip8_session::{
    input::{Keymap, Layout},
    repl::Console,
    session::{Cadence, SessionBuilder},
    vm::demo::DemoCore,
};
use clap::Parser;
use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode};
use tokio::runtime::Builder;

#[cfg(debug_assertions)]
const DEFAULT_LEVEL: LevelFilter = LevelFilter::Trace;
#[cfg(not(debug_assertions))]
const DEFAULT_LEVEL: LevelFilter = LevelFilter::Info;

/// Interactive host for a CHIP-8 emulator session.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Program to load at startup.
    #[arg(short, long, default_value = "DEMO")]
    program: String,
    /// Run loop rate in cycles per second. 0 steps as fast as the runtime allows.
    #[arg(long, default_value_t = 0.0)]
    rate_hz: f64,
    /// Physical keyboard layout used to reach the keypad.
    #[arg(long, value_enum, default_value_t = Layout::Qwerty)]
    layout: Layout,
    /// Log level (off, error, warn, info, debug, trace).
    #[arg(long)]
    log_level: Option<LevelFilter>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    TermLogger::init(
        args.log_level.unwrap_or(DEFAULT_LEVEL),
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )?;

    // The console blocks on stdin, so the run loop needs a worker thread of its own.
    let rt = Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name("chip8-loop")
        .enable_time()
        .build()?;
    let _guard = rt.enter();

    let session = SessionBuilder::new()
        .cadence(Cadence::from_hz(args.rate_hz))
        .keymap(Keymap::for_layout(args.layout))
        .build(DemoCore::new())?;

    let mut views = session.subscribe();
    rt.spawn(async move {
        let mut reported = false;
        while views.changed().await.is_ok() {
            let fault = views.borrow_and_update().fault.clone();
            match fault {
                Some(fault) if !reported => {
                    eprintln!("run loop stopped: {}", fault);
                    reported = true;
                }
                Some(_) => {}
                None => reported = false,
            }
        }
    });

    if let Err(err) = session.reset(&args.program) {
        eprintln!("error: {}", err);
    }
    Console::new(&session).run()?;
    session.shutdown();
    Ok(())
}
