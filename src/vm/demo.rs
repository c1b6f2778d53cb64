//! A small reference [`VmCore`] that executes no CHIP-8 instructions.
//!
//! It exists so a session always has a collaborator to drive: each cycle updates a handful
//! of registers and redraws the framebuffer according to the loaded [`Program`].

use crate::render::{RenderContext, DISPLAY_WIDTH, PIXEL_COUNT, REGISTER_COUNT};

use super::{programs::Program, CoreError, Key, VmCore};

bitflags::bitflags! {
    /// The keys currently held on the keypad.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Keypad: u16 {
        const K0 = 1 << 0x0;
        const K1 = 1 << 0x1;
        const K2 = 1 << 0x2;
        const K3 = 1 << 0x3;
        const K4 = 1 << 0x4;
        const K5 = 1 << 0x5;
        const K6 = 1 << 0x6;
        const K7 = 1 << 0x7;
        const K8 = 1 << 0x8;
        const K9 = 1 << 0x9;
        const KA = 1 << 0xA;
        const KB = 1 << 0xB;
        const KC = 1 << 0xC;
        const KD = 1 << 0xD;
        const KE = 1 << 0xE;
        const KF = 1 << 0xF;
    }
}

impl From<Key> for Keypad {
    fn from(key: Key) -> Self {
        Self::from_bits_truncate(1 << key.code())
    }
}

/// The COSMAC VIP keypad, as it is physically laid out.
pub const KEYPAD_LAYOUT: [[u8; 4]; 4] = [
    [0x1, 0x2, 0x3, 0xC],
    [0x4, 0x5, 0x6, 0xD],
    [0x7, 0x8, 0x9, 0xE],
    [0xA, 0x0, 0xB, 0xF],
];

/// Side length of one key's cell when the keypad program draws it.
const CELL: usize = 8;

/// The bundled reference core.
///
/// Register usage:
/// * `V0`: cycle counter (wrapping)
/// * `V1`/`V2`: low/high byte of the held-key mask
/// * `VF`: 1 while any key is held
#[derive(Debug, Clone)]
pub struct DemoCore {
    program: Option<Program>,
    cycles: u64,
    keypad: Keypad,
    registers: [u8; REGISTER_COUNT],
    pixels: Box<[bool; PIXEL_COUNT]>,
}

impl DemoCore {
    /// Creates a new [`DemoCore`] with no program loaded.
    pub fn new() -> Self {
        Self {
            program: None,
            cycles: 0,
            keypad: Keypad::empty(),
            registers: [0; REGISTER_COUNT],
            pixels: Box::new([false; PIXEL_COUNT]),
        }
    }

    pub fn program(&self) -> Option<Program> {
        self.program
    }

    /// Cycles executed since the last [`initialize`][VmCore::initialize].
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn keypad(&self) -> Keypad {
        self.keypad
    }

    fn sweep(&mut self) {
        let pos = (self.cycles % PIXEL_COUNT as u64) as usize;
        self.pixels[pos] ^= true;
    }

    fn draw_keypad(&mut self) {
        self.pixels.fill(false);
        for (row, keys) in KEYPAD_LAYOUT.iter().enumerate() {
            for (col, &code) in keys.iter().enumerate() {
                if !self.keypad.contains(Keypad::from(Key(code))) {
                    continue;
                }
                // leave a one pixel gutter around each key
                for dy in 1..CELL - 1 {
                    for dx in 1..CELL - 1 {
                        let (x, y) = (col * CELL + dx, row * CELL + dy);
                        self.pixels[y * DISPLAY_WIDTH + x] = true;
                    }
                }
            }
        }
    }
}

impl Default for DemoCore {
    fn default() -> Self {
        Self::new()
    }
}

impl VmCore for DemoCore {
    fn initialize(&mut self, program: &str) -> Result<(), CoreError> {
        let program = program.parse::<Program>()?;
        *self = Self::new();
        self.program = Some(program);
        log::debug!("demo core loaded {}", program);
        Ok(())
    }

    fn step(&mut self) -> Result<(), CoreError> {
        let program = self.program.ok_or(CoreError::NotInitialized)?;
        match program {
            Program::Demo => self.sweep(),
            Program::Keypad => self.draw_keypad(),
        }
        self.cycles += 1;

        let [lo, hi] = self.keypad.bits().to_le_bytes();
        self.registers[0x0] = self.cycles as u8;
        self.registers[0x1] = lo;
        self.registers[0x2] = hi;
        self.registers[0xF] = u8::from(!self.keypad.is_empty());
        Ok(())
    }

    fn snapshot(&self) -> RenderContext {
        let title = self.program.map(Program::name).unwrap_or_default();
        RenderContext::new(title, self.registers, self.pixels.clone())
    }

    fn key_down(&mut self, key: Key) {
        log::trace!("key down: {}", key);
        self.keypad.insert(key.into());
    }

    fn key_up(&mut self, key: Key) {
        log::trace!("key up: {}", key);
        self.keypad.remove(key.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: u8) -> Key {
        Key::new(code).unwrap()
    }

    #[test]
    fn test_step_requires_program() {
        let mut core = DemoCore::new();
        assert_eq!(core.step(), Err(CoreError::NotInitialized));
        assert_eq!(core.snapshot().title(), "");
    }

    #[test]
    fn test_initialize_rejects_unknown() {
        let mut core = DemoCore::new();
        assert_eq!(
            core.initialize("PONG"),
            Err(CoreError::UnknownProgram("PONG".into()))
        );
        assert_eq!(core.program(), None);
    }

    #[test]
    fn test_demo_sweeps() {
        let mut core = DemoCore::new();
        core.initialize("demo").unwrap();
        for _ in 0..3 {
            core.step().unwrap();
        }
        let snap = core.snapshot();
        assert_eq!(snap.title(), "DEMO");
        assert_eq!(snap.registries()[0], 3);
        assert_eq!(snap.lit(), 3);
        assert_eq!(snap.pixel(2, 0), Some(true));
    }

    #[test]
    fn test_keys_latch() {
        let mut core = DemoCore::new();
        core.initialize("KEYPAD").unwrap();
        core.key_down(key(0x1));
        core.key_down(key(0xF));
        core.step().unwrap();

        let snap = core.snapshot();
        assert_eq!(core.keypad(), Keypad::K1 | Keypad::KF);
        assert_eq!(snap.registries()[0x1], 0b10);
        assert_eq!(snap.registries()[0x2], 0x80);
        assert_eq!(snap.registries()[0xF], 1);
        // key 1 sits in the top-left cell, key F in the bottom-right one
        assert_eq!(snap.pixel(1, 1), Some(true));
        assert_eq!(snap.pixel(0, 0), Some(false));
        assert_eq!(snap.pixel(3 * CELL + 1, 3 * CELL + 1), Some(true));
        assert_eq!(snap.lit(), 2 * (CELL - 2) * (CELL - 2));

        core.key_up(key(0x1));
        core.key_up(key(0xF));
        core.step().unwrap();
        assert_eq!(core.snapshot().lit(), 0);
        assert_eq!(core.snapshot().registries()[0xF], 0);
    }

    #[test]
    fn test_initialize_clears_state() {
        let mut core = DemoCore::new();
        core.initialize("DEMO").unwrap();
        core.key_down(key(0x5));
        core.step().unwrap();
        core.initialize("DEMO").unwrap();
        assert_eq!(core.cycles(), 0);
        assert_eq!(core.keypad(), Keypad::empty());
        assert_eq!(core.snapshot().lit(), 0);
    }
}
