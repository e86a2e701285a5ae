//! Keybinding registry: maps keys to actions per context, with config overrides.
use crossterm::event::{KeyCode, KeyModifiers};
use std::collections::HashMap;

// ============================================================================
// Action Enum
// ============================================================================

/// All user-facing actions that can be triggered by keybindings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Quit,
    NavDown,
    NavUp,
    Open,
    ToggleRead,
    ToggleShowRead,
    CycleDateRange,
    HideItem,
    UnhideAll,
    Refresh,
    LoadMore,
    CycleSort,
    ReaderNext,
    ReaderPrev,
    ReaderClose,
    ScrollDown,
    ScrollUp,
    FocusNext,
    FocusPrev,
    Activate,
}

impl Action {
    /// Config name, as used in the `[keybindings]` table.
    pub fn name(self) -> &'static str {
        match self {
            Self::Quit => "quit",
            Self::NavDown => "nav_down",
            Self::NavUp => "nav_up",
            Self::Open => "open",
            Self::ToggleRead => "toggle_read",
            Self::ToggleShowRead => "toggle_show_read",
            Self::CycleDateRange => "cycle_date_range",
            Self::HideItem => "hide_item",
            Self::UnhideAll => "unhide_all",
            Self::Refresh => "refresh",
            Self::LoadMore => "load_more",
            Self::CycleSort => "cycle_sort",
            Self::ReaderNext => "reader_next",
            Self::ReaderPrev => "reader_prev",
            Self::ReaderClose => "reader_close",
            Self::ScrollDown => "scroll_down",
            Self::ScrollUp => "scroll_up",
            Self::FocusNext => "focus_next",
            Self::FocusPrev => "focus_prev",
            Self::Activate => "activate",
        }
    }

    const ALL: [Action; 20] = [
        Self::Quit,
        Self::NavDown,
        Self::NavUp,
        Self::Open,
        Self::ToggleRead,
        Self::ToggleShowRead,
        Self::CycleDateRange,
        Self::HideItem,
        Self::UnhideAll,
        Self::Refresh,
        Self::LoadMore,
        Self::CycleSort,
        Self::ReaderNext,
        Self::ReaderPrev,
        Self::ReaderClose,
        Self::ScrollDown,
        Self::ScrollUp,
        Self::FocusNext,
        Self::FocusPrev,
        Self::Activate,
    ];
}

/// Parse an action name from config. Accepts `snake_case` or squashed forms.
fn parse_action_name(name: &str) -> Option<Action> {
    let wanted = name.trim().to_lowercase().replace('-', "_");
    Action::ALL
        .into_iter()
        .find(|a| a.name() == wanted || a.name().replace('_', "") == wanted)
}

// ============================================================================
// Context Enum
// ============================================================================

/// Dispatch context: which bindings are active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Context {
    Global,
    List,
    Reader,
}

// ============================================================================
// Key Specification
// ============================================================================

/// A key event: code + modifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeySpec {
    pub code: KeyCode,
    pub modifiers: KeyModifiers,
}

impl KeySpec {
    pub const fn new(code: KeyCode, modifiers: KeyModifiers) -> Self {
        Self { code, modifiers }
    }

    pub const fn plain(code: KeyCode) -> Self {
        Self::new(code, KeyModifiers::NONE)
    }

    pub const fn char(c: char) -> Self {
        Self::plain(KeyCode::Char(c))
    }

    pub const fn ctrl(c: char) -> Self {
        Self::new(KeyCode::Char(c), KeyModifiers::CONTROL)
    }

    /// Drops SHIFT where the key code already carries it (`R`, BackTab).
    fn normalized(self) -> Self {
        match self.code {
            KeyCode::Char(_) | KeyCode::BackTab => {
                Self::new(self.code, self.modifiers - KeyModifiers::SHIFT)
            }
            _ => self,
        }
    }
}

/// Parse a key string from config into a KeySpec.
///
/// Supported formats:
/// - Single char: "q", "j", "/"
/// - Named keys: "Enter", "Esc", "Tab", "Shift+Tab", "Up", "Down", "Left", "Right"
/// - Modifier combos: "Ctrl+d"
/// - Function keys: "F1" through "F12"
fn parse_key_string(s: &str) -> Option<KeySpec> {
    let s = s.trim();

    if let Some(rest) = s.strip_prefix("Ctrl+") {
        let mut chars = rest.trim().chars();
        let c = chars.next()?;
        return chars.next().is_none().then(|| KeySpec::ctrl(c));
    }

    let named = match s.to_lowercase().as_str() {
        "enter" | "return" => Some(KeyCode::Enter),
        "esc" | "escape" => Some(KeyCode::Esc),
        "tab" => Some(KeyCode::Tab),
        "shift+tab" | "backtab" => Some(KeyCode::BackTab),
        "up" => Some(KeyCode::Up),
        "down" => Some(KeyCode::Down),
        "left" => Some(KeyCode::Left),
        "right" => Some(KeyCode::Right),
        "pageup" => Some(KeyCode::PageUp),
        "pagedown" => Some(KeyCode::PageDown),
        "backspace" => Some(KeyCode::Backspace),
        "space" => Some(KeyCode::Char(' ')),
        _ => None,
    };
    if let Some(code) = named {
        return Some(KeySpec::plain(code));
    }

    if let Some(n) = s.strip_prefix(['F', 'f']).and_then(|n| n.parse::<u8>().ok()) {
        return (1..=12).contains(&n).then(|| KeySpec::plain(KeyCode::F(n)));
    }

    let mut chars = s.chars();
    let c = chars.next()?;
    chars.next().is_none().then(|| KeySpec::char(c))
}

/// Format a KeySpec for display.
pub fn format_key(key: &KeySpec) -> String {
    let modifier = if key.modifiers.contains(KeyModifiers::CONTROL) {
        "Ctrl+"
    } else {
        ""
    };

    let key_name = match key.code {
        KeyCode::Char(' ') => "Space".to_string(),
        KeyCode::Char(c) => c.to_string(),
        KeyCode::Enter => "Enter".to_string(),
        KeyCode::Esc => "Esc".to_string(),
        KeyCode::Tab => "Tab".to_string(),
        KeyCode::BackTab => "Shift+Tab".to_string(),
        KeyCode::Up => "Up".to_string(),
        KeyCode::Down => "Down".to_string(),
        KeyCode::Left => "Left".to_string(),
        KeyCode::Right => "Right".to_string(),
        KeyCode::PageUp => "PageUp".to_string(),
        KeyCode::PageDown => "PageDown".to_string(),
        KeyCode::Backspace => "Backspace".to_string(),
        KeyCode::F(n) => format!("F{}", n),
        _ => "?".to_string(),
    };

    format!("{}{}", modifier, key_name)
}

// ============================================================================
// Default Bindings
// ============================================================================

const DEFAULT_BINDINGS: &[(Context, KeySpec, Action)] = &[
    (Context::Global, KeySpec::char('q'), Action::Quit),
    (Context::Global, KeySpec::ctrl('c'), Action::Quit),
    (Context::Global, KeySpec::char('r'), Action::Refresh),
    // List
    (Context::List, KeySpec::char('j'), Action::NavDown),
    (Context::List, KeySpec::plain(KeyCode::Down), Action::NavDown),
    (Context::List, KeySpec::char('k'), Action::NavUp),
    (Context::List, KeySpec::plain(KeyCode::Up), Action::NavUp),
    (Context::List, KeySpec::plain(KeyCode::Enter), Action::Open),
    (Context::List, KeySpec::char('m'), Action::ToggleRead),
    (Context::List, KeySpec::char('a'), Action::ToggleShowRead),
    (Context::List, KeySpec::char('d'), Action::CycleDateRange),
    (Context::List, KeySpec::char('x'), Action::HideItem),
    (Context::List, KeySpec::char('X'), Action::UnhideAll),
    (Context::List, KeySpec::char('n'), Action::LoadMore),
    (Context::List, KeySpec::char('s'), Action::CycleSort),
    // Reader
    (Context::Reader, KeySpec::char('l'), Action::ReaderNext),
    (Context::Reader, KeySpec::plain(KeyCode::Right), Action::ReaderNext),
    (Context::Reader, KeySpec::char('h'), Action::ReaderPrev),
    (Context::Reader, KeySpec::plain(KeyCode::Left), Action::ReaderPrev),
    (Context::Reader, KeySpec::plain(KeyCode::Esc), Action::ReaderClose),
    (Context::Reader, KeySpec::char('b'), Action::ReaderClose),
    (Context::Reader, KeySpec::char('j'), Action::ScrollDown),
    (Context::Reader, KeySpec::plain(KeyCode::Down), Action::ScrollDown),
    (Context::Reader, KeySpec::char('k'), Action::ScrollUp),
    (Context::Reader, KeySpec::plain(KeyCode::Up), Action::ScrollUp),
    (Context::Reader, KeySpec::char('m'), Action::ToggleRead),
    (Context::Reader, KeySpec::plain(KeyCode::Tab), Action::FocusNext),
    (Context::Reader, KeySpec::plain(KeyCode::BackTab), Action::FocusPrev),
    (Context::Reader, KeySpec::plain(KeyCode::Enter), Action::Activate),
    (Context::Reader, KeySpec::char(' '), Action::Activate),
];

// ============================================================================
// Keybinding Registry
// ============================================================================

/// Registry of keybindings, supporting default bindings and config overrides.
///
/// The same key can map to different actions in different contexts; a
/// lookup that misses its own context falls back to Global.
#[derive(Debug, Clone)]
pub struct KeybindingRegistry {
    lookup: HashMap<(Context, KeySpec), Action>,
    bindings: Vec<(Context, KeySpec, Action)>,
}

impl KeybindingRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            lookup: HashMap::new(),
            bindings: Vec::new(),
        };
        for &(context, key, action) in DEFAULT_BINDINGS {
            registry.bind(context, key, action);
        }
        registry
    }

    fn bind(&mut self, context: Context, key: KeySpec, action: Action) {
        self.lookup.insert((context, key), action);
        self.bindings.push((context, key, action));
    }

    /// Apply user overrides from the config keybindings map.
    ///
    /// An override replaces every default key of that action, in each context
    /// the action was bound in. Returns warnings for unknown action names or
    /// unparseable keys.
    pub fn apply_overrides(&mut self, overrides: &HashMap<String, String>) -> Vec<String> {
        let mut warnings = Vec::new();

        for (action_name, key_str) in overrides {
            let Some(action) = parse_action_name(action_name) else {
                warnings.push(format!("Unknown action '{}', ignoring", action_name));
                continue;
            };
            let Some(key) = parse_key_string(key_str) else {
                warnings.push(format!(
                    "Cannot parse key '{}' for action '{}', ignoring",
                    key_str, action_name
                ));
                continue;
            };

            let mut contexts: Vec<Context> = Vec::new();
            for (ctx, _, a) in &self.bindings {
                if *a == action && !contexts.contains(ctx) {
                    contexts.push(*ctx);
                }
            }

            self.lookup.retain(|_, a| *a != action);
            self.bindings.retain(|(_, _, a)| *a != action);
            for ctx in contexts {
                // The key now belongs to `action` alone in this context.
                self.bindings.retain(|(c, k, _)| !(*c == ctx && *k == key));
                self.bind(ctx, key, action);
            }

            tracing::info!(action = %action_name, key = %key_str, "Applied keybinding override");
        }

        warnings
    }

    /// Look up the action for a key, trying `context` first, then Global.
    pub fn action_for_key(
        &self,
        code: KeyCode,
        modifiers: KeyModifiers,
        context: Context,
    ) -> Option<Action> {
        let key = KeySpec::new(code, modifiers).normalized();
        self.lookup.get(&(context, key)).copied().or_else(|| {
            (context != Context::Global)
                .then(|| self.lookup.get(&(Context::Global, key)).copied())
                .flatten()
        })
    }

    /// First key bound to `action` in `context` (or Global), for hints.
    pub fn key_for(&self, action: Action, context: Context) -> Option<String> {
        self.bindings
            .iter()
            .find(|(c, _, a)| *a == action && (*c == context || *c == Context::Global))
            .map(|(_, key, _)| format_key(key))
    }
}

impl Default for KeybindingRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================
