//! Translation of physical key identifiers (as a host reports them, e.g. `"q"` or
//! `"ArrowUp"`) into keys of the CHIP-8 keypad.

use std::borrow::Cow;

use rustc_hash::FxHashMap;

use crate::vm::Key;

/// Left-hand side of a QWERTY keyboard, laid out like the COSMAC VIP keypad:
///
/// ```text
/// 1 2 3 4        1 2 3 C
/// q w e r   ->   4 5 6 D
/// a s d f        7 8 9 E
/// z x c v        A 0 B F
/// ```
const QWERTY: [(char, u8); 16] = [
    ('1', 0x1),
    ('2', 0x2),
    ('3', 0x3),
    ('4', 0xC),
    ('q', 0x4),
    ('w', 0x5),
    ('e', 0x6),
    ('r', 0xD),
    ('a', 0x7),
    ('s', 0x8),
    ('d', 0x9),
    ('f', 0xE),
    ('z', 0xA),
    ('x', 0x0),
    ('c', 0xB),
    ('v', 0xF),
];

/// Physical keyboard layouts with a built-in table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Layout {
    #[default]
    Qwerty,
    /// Same as [`Layout::Qwerty`], with `y` in place of `z`.
    Qwertz,
}

/// A fixed table from physical key identifiers to keypad keys.
///
/// Single-character identifiers are matched case-insensitively so shifted keys still
/// map; anything longer must match exactly. Lookups never fail loudly: an unknown key
/// simply has no mapping.
#[derive(Debug, Clone)]
pub struct Keymap {
    to_key: FxHashMap<String, Key>,
    to_physical: FxHashMap<Key, String>,
}

impl Keymap {
    pub fn qwerty() -> Self {
        Self::from_table(QWERTY)
    }

    pub fn qwertz() -> Self {
        Self::from_table(QWERTY.map(|(c, code)| (if c == 'z' { 'y' } else { c }, code)))
    }

    pub fn for_layout(layout: Layout) -> Self {
        match layout {
            Layout::Qwerty => Self::qwerty(),
            Layout::Qwertz => Self::qwertz(),
        }
    }

    /// Builds a custom table. Later pairs override earlier ones for the same physical key.
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, Key)>,
        S: AsRef<str>,
    {
        let mut this = Self {
            to_key: FxHashMap::default(),
            to_physical: FxHashMap::default(),
        };
        for (physical, key) in pairs {
            this.insert(physical.as_ref(), key);
        }
        this
    }

    fn from_table(table: [(char, u8); 16]) -> Self {
        Self::from_pairs(
            table
                .into_iter()
                .filter_map(|(c, code)| Some((c.to_string(), Key::new(code)?))),
        )
    }

    fn insert(&mut self, physical: &str, key: Key) {
        let physical = normalize(physical).into_owned();
        if let Some(previous) = self.to_key.insert(physical.clone(), key) {
            if self.to_physical.get(&previous) == Some(&physical) {
                self.to_physical.remove(&previous);
            }
        }
        self.to_physical.insert(key, physical);
    }

    /// The keypad key for a raw physical identifier, if it is mapped.
    pub fn lookup(&self, raw: &str) -> Option<Key> {
        self.to_key.get(&*normalize(raw)).copied()
    }

    /// The physical identifier bound to `key`, if any.
    pub fn physical(&self, key: Key) -> Option<&str> {
        self.to_physical.get(&key).map(String::as_str)
    }

    /// Number of physical keys in the table.
    pub fn len(&self) -> usize {
        self.to_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.to_key.is_empty()
    }
}

impl Default for Keymap {
    fn default() -> Self {
        Self::qwerty()
    }
}

fn normalize(raw: &str) -> Cow<'_, str> {
    let mut chars = raw.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_uppercase() => Cow::Owned(c.to_lowercase().collect()),
        _ => Cow::Borrowed(raw),
    }
}
