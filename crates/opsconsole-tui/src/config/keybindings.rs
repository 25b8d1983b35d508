use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use std::collections::HashMap;

use crate::app::Action;

/// A key combination
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct KeyBinding {
    pub code: KeyCode,
    pub modifiers: KeyModifiers,
}

impl KeyBinding {
    pub fn new(code: KeyCode) -> Self {
        Self {
            code,
            modifiers: KeyModifiers::NONE,
        }
    }

    pub fn ctrl(code: KeyCode) -> Self {
        Self {
            code,
            modifiers: KeyModifiers::CONTROL,
        }
    }

    pub fn shift(code: KeyCode) -> Self {
        Self {
            code,
            modifiers: KeyModifiers::SHIFT,
        }
    }

    pub fn from_event(event: &KeyEvent) -> Self {
        Self {
            code: event.code,
            modifiers: event.modifiers,
        }
    }
}

/// Context for keybindings
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum KeyContext {
    Global,
    Console,
    FilterInput,
}

/// Keybinding configuration
pub struct KeyBindings {
    bindings: HashMap<KeyContext, HashMap<KeyBinding, Action>>,
}

impl KeyBindings {
    pub fn new() -> Self {
        let mut bindings = HashMap::new();

        let mut global = HashMap::new();
        global.insert(KeyBinding::new(KeyCode::Char('?')), Action::ToggleHelp);
        global.insert(KeyBinding::ctrl(KeyCode::Char('c')), Action::Quit);
        global.insert(KeyBinding::new(KeyCode::Char('q')), Action::Quit);
        bindings.insert(KeyContext::Global, global);

        // Console bindings - less-like navigation plus stream controls
        let mut console = HashMap::new();
        console.insert(KeyBinding::new(KeyCode::Char('j')), Action::ScrollDown(1));
        console.insert(KeyBinding::new(KeyCode::Down), Action::ScrollDown(1));
        console.insert(KeyBinding::new(KeyCode::Char('k')), Action::ScrollUp(1));
        console.insert(KeyBinding::new(KeyCode::Up), Action::ScrollUp(1));
        console.insert(KeyBinding::ctrl(KeyCode::Char('d')), Action::PageDown);
        console.insert(KeyBinding::ctrl(KeyCode::Char('u')), Action::PageUp);
        console.insert(KeyBinding::new(KeyCode::PageDown), Action::PageDown);
        console.insert(KeyBinding::new(KeyCode::PageUp), Action::PageUp);
        console.insert(KeyBinding::new(KeyCode::Char('g')), Action::ScrollToTop);
        console.insert(KeyBinding::shift(KeyCode::Char('G')), Action::ScrollToBottom);
        console.insert(KeyBinding::new(KeyCode::Home), Action::ScrollToTop);
        console.insert(KeyBinding::new(KeyCode::End), Action::ScrollToBottom);
        console.insert(KeyBinding::new(KeyCode::Char('f')), Action::ToggleAutoScroll);
        console.insert(KeyBinding::new(KeyCode::Char('t')), Action::ToggleTimestamps);
        console.insert(KeyBinding::shift(KeyCode::Char('T')), Action::ToggleLocalTime);
        console.insert(KeyBinding::new(KeyCode::Char('i')), Action::ToggleStats);
        // Filters
        console.insert(KeyBinding::new(KeyCode::Char('s')), Action::CycleSource);
        console.insert(KeyBinding::new(KeyCode::Char('l')), Action::CycleLevel);
        console.insert(KeyBinding::new(KeyCode::Char('/')), Action::OpenTextInput);
        console.insert(KeyBinding::shift(KeyCode::Char('R')), Action::OpenRegexInput);
        console.insert(KeyBinding::new(KeyCode::Char('n')), Action::ClearFilters);
        // Stream, buffer, metrics
        console.insert(KeyBinding::new(KeyCode::Char('p')), Action::TogglePause);
        console.insert(KeyBinding::new(KeyCode::Char('r')), Action::Reconnect);
        console.insert(KeyBinding::new(KeyCode::Char('c')), Action::ClearLogs);
        console.insert(KeyBinding::new(KeyCode::Char('e')), Action::ExportLogs);
        console.insert(KeyBinding::new(KeyCode::Char('m')), Action::ToggleMetrics);
        console.insert(KeyBinding::shift(KeyCode::Char('M')), Action::RefreshMetrics);
        console.insert(KeyBinding::new(KeyCode::Esc), Action::DismissNotice);
        bindings.insert(KeyContext::Console, console);

        // Filter input bindings (when the filter bar is being edited)
        let mut filter_input = HashMap::new();
        filter_input.insert(KeyBinding::new(KeyCode::Enter), Action::ApplyFilterInput);
        filter_input.insert(KeyBinding::new(KeyCode::Esc), Action::CancelFilterInput);
        filter_input.insert(KeyBinding::new(KeyCode::Backspace), Action::FilterBackspace);
        filter_input.insert(KeyBinding::ctrl(KeyCode::Char('u')), Action::FilterInputClear);
        filter_input.insert(KeyBinding::ctrl(KeyCode::Char('c')), Action::CancelFilterInput);
        bindings.insert(KeyContext::FilterInput, filter_input);

        Self { bindings }
    }

    /// Look up action for key event in given context
    pub fn get_action(&self, context: KeyContext, key: &KeyEvent) -> Option<Action> {
        let binding = KeyBinding::from_event(key);

        if let Some(action) = self
            .bindings
            .get(&context)
            .and_then(|bindings| bindings.get(&binding))
        {
            return Some(action.clone());
        }

        self.bindings
            .get(&KeyContext::Global)?
            .get(&binding)
            .cloned()
    }

    /// Handle key event in filter input mode
    /// Returns Some(Action) for special keys and typed characters
    pub fn get_filter_input_action(&self, key: &KeyEvent) -> Option<Action> {
        let binding = KeyBinding::from_event(key);

        if let Some(action) = self
            .bindings
            .get(&KeyContext::FilterInput)
            .and_then(|bindings| bindings.get(&binding))
        {
            return Some(action.clone());
        }

        match key.code {
            KeyCode::Char(c) if key.modifiers.is_empty() || key.modifiers == KeyModifiers::SHIFT => {
                Some(Action::FilterInput(c))
            }
            _ => None,
        }
    }

    /// Route a key press given whether the filter bar is being edited
    pub fn resolve(&self, editing: bool, key: &KeyEvent) -> Option<Action> {
        if editing {
            self.get_filter_input_action(key)
        } else {
            self.get_action(KeyContext::Console, key)
        }
    }
}

impl Default for KeyBindings {
    fn default() -> Self {
        Self::new()
    }
}
