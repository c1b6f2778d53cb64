//! The catalog of programs the bundled [`DemoCore`][super::demo::DemoCore] can load.

use std::{fmt, str::FromStr};

use super::CoreError;

/// A program known to the demo core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Program {
    /// Sweeps a single pixel across the screen, counting cycles in `V0`.
    Demo,
    /// Lights the keypad layout as keys are held.
    Keypad,
}

impl Program {
    pub const ALL: [Program; 2] = [Program::Demo, Program::Keypad];

    /// The canonical identifier, which is also the display title.
    pub fn name(self) -> &'static str {
        match self {
            Program::Demo => "DEMO",
            Program::Keypad => "KEYPAD",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Program::Demo => "sweeps a pixel across the display",
            Program::Keypad => "lights up the keys being held",
        }
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Program {
    type Err = CoreError;

    /// Identifiers are matched case-insensitively. Anything that is empty or contains
    /// characters other than ASCII alphanumerics, `_` and `-` is malformed.
    fn from_str(s: &str) -> Result<Self, CoreError> {
        let well_formed = !s.is_empty()
            && s
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !well_formed {
            return Err(CoreError::MalformedProgram(s.to_owned()));
        }
        Self::ALL
            .into_iter()
            .find(|program| program.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| CoreError::UnknownProgram(s.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_program() {
        assert_eq!("DEMO".parse(), Ok(Program::Demo));
        assert_eq!("keypad".parse(), Ok(Program::Keypad));
        assert_eq!(
            "PONG".parse::<Program>(),
            Err(CoreError::UnknownProgram("PONG".into()))
        );
        assert_eq!(
            "".parse::<Program>(),
            Err(CoreError::MalformedProgram(String::new()))
        );
        assert_eq!(
            "../roms/ibm.ch8".parse::<Program>(),
            Err(CoreError::MalformedProgram("../roms/ibm.ch8".into()))
        );
    }

    #[test]
    fn test_names_round_trip() {
        for program in Program::ALL {
            assert_eq!(program.to_string().parse(), Ok(program));
        }
    }
}
