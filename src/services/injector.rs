//! Host input injection.
//!
//! The protocol layer only ever speaks in [`InputEvent`]s. Turning those
//! into real keystrokes is the job of an [`InputInjector`];
//! [`CommandInjector`] does it by driving the host's automation tool as a
//! child process.
//!
//! | Platform | Tool |
//! |----------|------|
//! | Linux / BSD | `xdotool` |
//! | macOS | `osascript` (System Events) |
//! | Windows | PowerShell `SendKeys` |
//!
//! # Example
//!
//! ```ignore
//! use ginkgo_talk::services::{CommandInjector, InputEvent, InputInjector, Key};
//!
//! let injector = CommandInjector::for_host();
//! injector.inject(&InputEvent::Type("hello".into()))?;
//! injector.inject(&InputEvent::Press(Key::Enter))?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::process::{Command, Stdio};

use tracing::trace;

use crate::error::{Error, Result};

// ============================================================================
// Key
// ============================================================================

/// Keys the protocol can press.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    // ========================================================================
    // Control
    // ========================================================================
    /// Enter/Return key
    Enter,
    /// Tab key
    Tab,
    /// Escape key
    Escape,
    /// Forward delete key
    Delete,

    // ========================================================================
    // Letters (combos only)
    // ========================================================================
    /// A key
    A,
    /// V key
    V,
    /// Z key
    Z,
}

impl Key {
    /// Returns the key properties: (xdotool keysym, macOS key code, SendKeys token).
    #[must_use]
    pub fn properties(self) -> (&'static str, u16, &'static str) {
        match self {
            Key::Enter => ("Return", 36, "{ENTER}"),
            Key::Tab => ("Tab", 48, "{TAB}"),
            Key::Escape => ("Escape", 53, "{ESC}"),
            Key::Delete => ("Delete", 117, "{DEL}"),
            Key::A => ("a", 0, "a"),
            Key::V => ("v", 9, "v"),
            Key::Z => ("z", 6, "z"),
        }
    }

    /// Returns the X11 keysym name.
    #[inline]
    #[must_use]
    pub fn keysym(self) -> &'static str {
        self.properties().0
    }

    /// Returns the macOS virtual key code.
    #[inline]
    #[must_use]
    pub fn mac_key_code(self) -> u16 {
        self.properties().1
    }

    /// Returns the `SendKeys` token.
    #[inline]
    #[must_use]
    pub fn send_keys(self) -> &'static str {
        self.properties().2
    }
}

// ============================================================================
// Modifier
// ============================================================================

/// Modifier held during a [`InputEvent::Combo`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modifier {
    /// Control (Command on macOS).
    Ctrl,
    /// Shift.
    Shift,
}

impl Modifier {
    /// Returns the modifier properties: (xdotool prefix, AppleScript clause, SendKeys prefix).
    #[must_use]
    pub fn properties(self) -> (&'static str, &'static str, &'static str) {
        match self {
            Modifier::Ctrl => ("ctrl", "command down", "^"),
            Modifier::Shift => ("shift", "shift down", "+"),
        }
    }
}

// ============================================================================
// InputEvent
// ============================================================================

/// One logical input operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    /// Type literal text. Newlines become Shift+Enter.
    Type(String),
    /// Press and release a key.
    Press(Key),
    /// Press a key while holding a modifier.
    Combo(Modifier, Key),
    /// Select all then delete in the focused field.
    ClearField,
}

impl fmt::Display for InputEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Type(text) => write!(f, "type {} chars", text.chars().count()),
            Self::Press(key) => write!(f, "press {key:?}"),
            Self::Combo(modifier, key) => write!(f, "press {modifier:?}+{key:?}"),
            Self::ClearField => f.write_str("clear field"),
        }
    }
}

// ============================================================================
// InputInjector
// ============================================================================

/// Performs logical input events on the host.
///
/// Calls block until the host has accepted the input.
pub trait InputInjector: Send + Sync {
    /// Performs one event.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Injection`] if the host rejects the input.
    fn inject(&self, event: &InputEvent) -> Result<()>;
}

// ============================================================================
// CommandInjector
// ============================================================================

/// Host automation tool driven by [`CommandInjector`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// `xdotool` under X11.
    Xdotool,
    /// `osascript` talking to System Events.
    AppleScript,
    /// PowerShell `System.Windows.Forms.SendKeys`.
    SendKeys,
}

impl Backend {
    /// Backend for the compilation target.
    #[must_use]
    pub const fn for_host() -> Self {
        if cfg!(target_os = "macos") {
            Self::AppleScript
        } else if cfg!(windows) {
            Self::SendKeys
        } else {
            Self::Xdotool
        }
    }

    /// Default executable name.
    #[must_use]
    pub const fn program(self) -> &'static str {
        match self {
            Self::Xdotool => "xdotool",
            Self::AppleScript => "osascript",
            Self::SendKeys => "powershell",
        }
    }
}

/// One child process invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Arguments after the program name.
    pub args: Vec<String>,
}

impl Invocation {
    fn new(args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

/// [`InputInjector`] backed by an external automation tool.
#[derive(Debug, Clone)]
pub struct CommandInjector {
    /// Argument dialect.
    backend: Backend,
    /// Executable to spawn.
    program: String,
}

impl Default for CommandInjector {
    fn default() -> Self {
        Self::for_host()
    }
}

impl CommandInjector {
    /// Creates an injector for `backend` using its default executable.
    #[must_use]
    pub fn new(backend: Backend) -> Self {
        Self {
            backend,
            program: backend.program().to_string(),
        }
    }

    /// Creates an injector for the compilation target.
    #[must_use]
    pub fn for_host() -> Self {
        Self::new(Backend::for_host())
    }

    /// Overrides the executable.
    #[must_use]
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Backend in use.
    #[inline]
    #[must_use]
    pub fn backend(&self) -> Backend {
        self.backend
    }

    /// Builds the invocations that perform `event`, in order.
    #[must_use]
    pub fn plan(&self, event: &InputEvent) -> Vec<Invocation> {
        match event {
            InputEvent::Type(text) => {
                let mut plan = Vec::new();
                for (i, line) in text.split('\n').enumerate() {
                    if i > 0 {
                        plan.push(self.combo(Modifier::Shift, Key::Enter));
                    }
                    let line = line.strip_suffix('\r').unwrap_or(line);
                    if !line.is_empty() {
                        plan.push(self.type_line(line));
                    }
                }
                plan
            }
            InputEvent::Press(key) => vec![self.press(*key)],
            InputEvent::Combo(modifier, key) => vec![self.combo(*modifier, *key)],
            InputEvent::ClearField => match self.backend {
                Backend::Xdotool => vec![Invocation::new([
                    "key",
                    "--clearmodifiers",
                    "ctrl+a",
                    Key::Delete.keysym(),
                ])],
                Backend::AppleScript => vec![apple_script(&format!(
                    "key code {} using command down\nkey code {}",
                    Key::A.mac_key_code(),
                    Key::Delete.mac_key_code()
                ))],
                Backend::SendKeys => vec![send_keys(&format!("^a{}", Key::Delete.send_keys()))],
            },
        }
    }

    fn type_line(&self, line: &str) -> Invocation {
        match self.backend {
            Backend::Xdotool => Invocation::new(["type", "--clearmodifiers", "--", line]),
            Backend::AppleScript => {
                apple_script(&format!("keystroke \"{}\"", escape_apple_string(line)))
            }
            Backend::SendKeys => send_keys(&escape_send_keys(line)),
        }
    }

    fn press(&self, key: Key) -> Invocation {
        match self.backend {
            Backend::Xdotool => Invocation::new(["key", "--clearmodifiers", key.keysym()]),
            Backend::AppleScript => apple_script(&format!("key code {}", key.mac_key_code())),
            Backend::SendKeys => send_keys(key.send_keys()),
        }
    }

    fn combo(&self, modifier: Modifier, key: Key) -> Invocation {
        let (xdo, apple, sendkeys) = modifier.properties();
        match self.backend {
            Backend::Xdotool => Invocation::new([
                "key".to_string(),
                "--clearmodifiers".to_string(),
                format!("{xdo}+{}", key.keysym()),
            ]),
            Backend::AppleScript => {
                apple_script(&format!("key code {} using {apple}", key.mac_key_code()))
            }
            Backend::SendKeys => send_keys(&format!("{sendkeys}{}", key.send_keys())),
        }
    }

    fn run(&self, invocation: &Invocation) -> Result<()> {
        trace!(program = %self.program, args = ?invocation.args, "Running input tool");

        let output = Command::new(&self.program)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| Error::injection(format!("failed to run {}: {e}", self.program)))?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(Error::injection(format!(
            "{} failed ({}): {}",
            self.program,
            output.status,
            stderr.trim()
        )))
    }
}

impl InputInjector for CommandInjector {
    fn inject(&self, event: &InputEvent) -> Result<()> {
        for invocation in self.plan(event) {
            self.run(&invocation)?;
        }
        Ok(())
    }
}

// ============================================================================
// Script Builders
// ============================================================================

fn apple_script(body: &str) -> Invocation {
    let script = format!("tell application \"System Events\"\n{body}\nend tell");
    Invocation::new(["-e".to_string(), script])
}

fn send_keys(keys: &str) -> Invocation {
    let script = format!(
        "Add-Type -AssemblyName System.Windows.Forms; [System.Windows.Forms.SendKeys]::SendWait('{}')",
        keys.replace('\'', "''")
    );
    Invocation::new([
        "-NoProfile".to_string(),
        "-NonInteractive".to_string(),
        "-Command".to_string(),
        script,
    ])
}

/// Escapes text for an AppleScript string literal.
fn escape_apple_string(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Wraps `SendKeys` metacharacters in braces so they type literally.
fn escape_send_keys(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '+' | '^' | '%' | '~' | '(' | ')' | '{' | '}' | '[' | ']' => {
                escaped.push('{');
                escaped.push(c);
                escaped.push('}');
            }
            _ => escaped.push(c),
        }
    }
    escaped
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn xdotool() -> CommandInjector {
        CommandInjector::new(Backend::Xdotool)
    }

    #[test]
    fn test_key_properties() {
        let (keysym, code, token) = Key::Enter.properties();
        assert_eq!(keysym, "Return");
        assert_eq!(code, 36);
        assert_eq!(token, "{ENTER}");
    }

    #[test]
    fn test_xdotool_type_plan() {
        let plan = xdotool().plan(&InputEvent::Type("hello".into()));
        assert_eq!(plan, vec![Invocation::new(["type", "--clearmodifiers", "--", "hello"])]);
    }

    #[test]
    fn test_newlines_become_shift_enter() {
        let plan = xdotool().plan(&InputEvent::Type("one\r\ntwo\n".into()));
        assert_eq!(
            plan,
            vec![
                Invocation::new(["type", "--clearmodifiers", "--", "one"]),
                Invocation::new(["key", "--clearmodifiers", "shift+Return"]),
                Invocation::new(["type", "--clearmodifiers", "--", "two"]),
                Invocation::new(["key", "--clearmodifiers", "shift+Return"]),
            ]
        );
    }

    #[test]
    fn test_xdotool_combo_and_clear() {
        let injector = xdotool();
        assert_eq!(
            injector.plan(&InputEvent::Combo(Modifier::Ctrl, Key::Z)),
            vec![Invocation::new(["key", "--clearmodifiers", "ctrl+z"])]
        );
        assert_eq!(
            injector.plan(&InputEvent::ClearField),
            vec![Invocation::new(["key", "--clearmodifiers", "ctrl+a", "Delete"])]
        );
    }

    #[test]
    fn test_apple_script_plan() {
        let injector = CommandInjector::new(Backend::AppleScript);
        let plan = injector.plan(&InputEvent::Type("say \"hi\"".into()));
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].args[0], "-e");
        assert!(plan[0].args[1].contains("keystroke \"say \\\"hi\\\"\""));

        let plan = injector.plan(&InputEvent::Combo(Modifier::Ctrl, Key::V));
        assert!(plan[0].args[1].contains("key code 9 using command down"));
    }

    #[test]
    fn test_send_keys_plan_escapes() {
        let injector = CommandInjector::new(Backend::SendKeys);
        let plan = injector.plan(&InputEvent::Type("1+1 it's (ok)".into()));
        let script = plan[0].args.last().expect("script");
        assert!(script.contains("SendWait('1{+}1 it''s {(}ok{)}')"));

        let plan = injector.plan(&InputEvent::Combo(Modifier::Shift, Key::Enter));
        assert!(plan[0].args.last().expect("script").contains("SendWait('+{ENTER}')"));
    }

    #[test]
    fn test_missing_program_is_injection_error() {
        let injector = xdotool().with_program("ginkgo-talk-no-such-tool");
        let err = injector
            .inject(&InputEvent::Press(Key::Tab))
            .expect_err("spawn should fail");
        assert!(matches!(err, Error::Injection { .. }));
    }

    #[test]
    fn test_empty_text_plans_nothing() {
        assert!(xdotool().plan(&InputEvent::Type(String::new())).is_empty());
    }
}
