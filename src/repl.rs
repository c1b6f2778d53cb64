//! An interactive terminal host for a [`Session`].

use anyhow::Result;
use easy_repl::{command, repl::LoopStatus, CommandStatus, Repl};

use crate::{
    render::RenderContext,
    session::{Session, SessionResult},
    vm::{demo::KEYPAD_LAYOUT, programs::Program, Key, VmCore},
};

/// Drives a [`Session`] from typed commands.
pub struct Console<'s, C> {
    session: &'s Session<C>,
}

impl<'s, C: VmCore + 'static> Console<'s, C> {
    pub fn new(session: &'s Session<C>) -> Self {
        Self { session }
    }

    pub fn run(&self) -> Result<()> {
        let mut repl = Repl::builder()
            .description("CHIP-8 session console")
            .add(
                "reset",
                command! {
                    "Load a program and step once",
                    (program:String) => |program: String| {
                        if let Some(ctx) = report(self.session.reset(&program)) {
                            eprintln!("loaded {}", ctx.title());
                        }
                        Ok(CommandStatus::Done)
                    }
                },
            )
            .add(
                "s",
                command! {
                    "Step one cycle",
                    () => || {
                        if let Some(ctx) = report(self.session.step()) {
                            print_registers(&ctx);
                        }
                        Ok(CommandStatus::Done)
                    }
                },
            )
            .add(
                "r",
                command! {
                    "Start or stop the run loop",
                    () => || {
                        if let Some(running) = report(self.session.toggle_run()) {
                            eprintln!("{}", if running { "running" } else { "paused" });
                        }
                        Ok(CommandStatus::Done)
                    }
                },
            )
            .add(
                "stop",
                command! {
                    "Stop the run loop",
                    () => || {
                        self.session.stop_ticking();
                        Ok(CommandStatus::Done)
                    }
                },
            )
            .add(
                "down",
                command! {
                    "Press a key (physical name, e.g. q)",
                    (key:String) => |key: String| {
                        match self.session.handle_key_down(&key) {
                            Some(k) => eprintln!("{} down", k),
                            None => eprintln!("{:?} is not mapped", key),
                        }
                        Ok(CommandStatus::Done)
                    }
                },
            )
            .add(
                "up",
                command! {
                    "Release a key (physical name, e.g. q)",
                    (key:String) => |key: String| {
                        match self.session.handle_key_up(&key) {
                            Some(k) => eprintln!("{} up", k),
                            None => eprintln!("{:?} is not mapped", key),
                        }
                        Ok(CommandStatus::Done)
                    }
                },
            )
            .add(
                "pr",
                command! {
                    "Print the value of all registers",
                    () => || {
                        match self.session.last_render_context() {
                            Some(ctx) => print_registers(&ctx),
                            None => eprintln!("no program loaded"),
                        }
                        Ok(CommandStatus::Done)
                    }
                },
            )
            .add(
                "show",
                command! {
                    "Draw the framebuffer",
                    () => || {
                        match self.session.last_render_context() {
                            Some(ctx) => println!("{}", ctx),
                            None => eprintln!("no program loaded"),
                        }
                        Ok(CommandStatus::Done)
                    }
                },
            )
            .add(
                "keys",
                command! {
                    "Show which physical keys drive the keypad",
                    () => || {
                        self.print_keypad();
                        Ok(CommandStatus::Done)
                    }
                },
            )
            .add(
                "programs",
                command! {
                    "List the programs that can be loaded",
                    () => || {
                        for program in Program::ALL {
                            eprintln!("{:<8} {}", program, program.description());
                        }
                        Ok(CommandStatus::Done)
                    }
                },
            )
            .add(
                "q",
                command! {
                    "Quit",
                    () => || {
                        self.session.shutdown();
                        Ok(CommandStatus::Quit)
                    }
                },
            )
            .build()?;

        eprintln!("CHIP-8 session console");
        loop {
            eprintln!("[{}]", self.session.phase());
            if let LoopStatus::Break = repl.next()? {
                break;
            }
        }
        Ok(())
    }

    fn print_keypad(&self) {
        let Some(keymap) = self.session.keymap() else {
            eprintln!("key handling is disabled");
            return;
        };
        for row in KEYPAD_LAYOUT {
            let line: Vec<String> = row
                .iter()
                .filter_map(|&code| Key::new(code))
                .map(|key| format!("{}={:<5}", key, keymap.physical(key).unwrap_or("-")))
                .collect();
            eprintln!("{}", line.join(" "));
        }
    }
}

fn report<T>(result: SessionResult<T>) -> Option<T> {
    result.map_err(|err| eprintln!("error: {}", err)).ok()
}

fn print_registers(ctx: &RenderContext) {
    for (i, val) in ctx.registries().iter().enumerate() {
        eprintln!("V{:X}={:02X}", i, val);
    }
}
