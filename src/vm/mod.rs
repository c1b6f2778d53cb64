//! The contract between a session and the virtual machine core it drives.
//!
//! The session never decodes instructions itself. Anything that can load a program,
//! advance one cycle, describe its display and latch keypad input can be driven by a
//! [`Session`][crate::session::Session] through [`VmCore`].

use std::fmt;

use thiserror::Error;

use crate::render::RenderContext;

pub mod demo;
pub mod programs;

/// An error raised by a [`VmCore`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("unknown program: {0}")]
    UnknownProgram(String),
    #[error("malformed program identifier: {0:?}")]
    MalformedProgram(String),
    #[error("core has not been initialized with a program")]
    NotInitialized,
    #[error("invalid keypad key: {0:#04x}")]
    InvalidKey(u8),
    #[error("vm core fault: {0}")]
    Fault(String),
}

/// One of the sixteen keys (`0x0` - `0xF`) of the CHIP-8 hexadecimal keypad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key(u8);

impl Key {
    /// Number of keys on the keypad.
    pub const COUNT: usize = 16;

    /// Returns `None` if `code` is outside `0x0..=0xF`.
    pub const fn new(code: u8) -> Option<Self> {
        if code < Self::COUNT as u8 {
            Some(Self(code))
        } else {
            None
        }
    }

    pub const fn code(self) -> u8 {
        self.0
    }

    /// Every key, in code order.
    pub fn all() -> impl Iterator<Item = Key> {
        (0..Self::COUNT as u8).map(Self)
    }
}

impl TryFrom<u8> for Key {
    type Error = CoreError;

    fn try_from(value: u8) -> Result<Self, CoreError> {
        Self::new(value).ok_or(CoreError::InvalidKey(value))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:X}", self.0)
    }
}

/// A virtual machine that a session can load, advance, observe and feed input to.
pub trait VmCore: Send {
    /// Resets the core to the initial state of `program`.
    ///
    /// # Errors
    ///
    /// [`CoreError::UnknownProgram`] or [`CoreError::MalformedProgram`] if the identifier
    /// is rejected.
    fn initialize(&mut self, program: &str) -> Result<(), CoreError>;

    /// Advances the core by one execution cycle.
    ///
    /// # Errors
    ///
    /// [`CoreError::NotInitialized`] if no program has been loaded. Cores may also report
    /// [`CoreError::Fault`] for anything that stops execution.
    fn step(&mut self) -> Result<(), CoreError>;

    /// Describes the current machine-visible state.
    fn snapshot(&self) -> RenderContext;

    /// Latches `key` as held.
    fn key_down(&mut self, key: Key);

    /// Releases `key`.
    fn key_up(&mut self, key: Key);
}

impl<T: VmCore + ?Sized> VmCore for Box<T> {
    fn initialize(&mut self, program: &str) -> Result<(), CoreError> {
        (**self).initialize(program)
    }

    fn step(&mut self) -> Result<(), CoreError> {
        (**self).step()
    }

    fn snapshot(&self) -> RenderContext {
        (**self).snapshot()
    }

    fn key_down(&mut self, key: Key) {
        (**self).key_down(key)
    }

    fn key_up(&mut self, key: Key) {
        (**self).key_up(key)
    }
}
