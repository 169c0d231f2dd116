//! Capabilities injected into the template renderer.
//!
//! Rendering itself is pure. Everything effectful (reading the process environment, asking a
//! human for a secret, consulting the keychain) sits behind the two traits below so the
//! renderer can be exercised without a terminal.

use std::{
    collections::HashMap,
    fmt,
    io::{self, IsTerminal, Write},
};

use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    terminal,
};
use hiproc_util::{SecretsBackend, resolve_secret};
use tracing::{debug, warn};

/// Looks up a placeholder value in some environment.
pub trait EnvLookup {
    fn lookup(&self, name: &str) -> Option<String>;
}

/// The current process environment.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessEnvironment;

impl EnvLookup for ProcessEnvironment {
    fn lookup(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

impl EnvLookup for HashMap<String, String> {
    fn lookup(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

/// Obtains a secret value interactively.
///
/// `None` means no value could be obtained, for example because nobody is at a terminal
/// or the user aborted. Implementations must not echo the value.
pub trait SecretPrompt {
    fn prompt_secret(&self, name: &str) -> Option<String>;
}

/// Never obtains anything. Used for unattended execution.
#[derive(Debug, Default, Clone, Copy)]
pub struct NonInteractivePrompt;

impl SecretPrompt for NonInteractivePrompt {
    fn prompt_secret(&self, _name: &str) -> Option<String> {
        None
    }
}

/// Reads a secret from the controlling terminal with echo disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalSecretPrompt;

impl SecretPrompt for TerminalSecretPrompt {
    fn prompt_secret(&self, name: &str) -> Option<String> {
        if !io::stdin().is_terminal() {
            debug!(placeholder = name, "stdin is not a terminal; cannot prompt");
            return None;
        }
        let mut stderr = io::stderr();
        write!(stderr, "Enter value for {{{{{name}}}}}: ").ok()?;
        stderr.flush().ok()?;

        if let Err(error) = terminal::enable_raw_mode() {
            warn!(error = %error, "failed to disable terminal echo");
            return None;
        }
        let value = read_hidden_line();
        let _ = terminal::disable_raw_mode();
        let _ = writeln!(stderr);
        value
    }
}

fn read_hidden_line() -> Option<String> {
    let mut value = String::new();
    loop {
        let Event::Key(KeyEvent {
            code, modifiers, kind, ..
        }) = event::read().ok()?
        else {
            continue;
        };
        if kind != KeyEventKind::Press {
            continue;
        }
        match code {
            KeyCode::Enter => return Some(value),
            KeyCode::Esc => return None,
            KeyCode::Char('c' | 'd') if modifiers.contains(KeyModifiers::CONTROL) => return None,
            KeyCode::Backspace => {
                value.pop();
            }
            KeyCode::Char(character) => value.push(character),
            _ => {}
        }
    }
}

/// Consults the configured secrets backend before falling back to `inner`.
pub struct KeychainSecretPrompt<P> {
    backend: SecretsBackend,
    inner: P,
}

impl<P> KeychainSecretPrompt<P> {
    pub fn new(backend: SecretsBackend, inner: P) -> Self {
        Self { backend, inner }
    }
}

impl<P: fmt::Debug> fmt::Debug for KeychainSecretPrompt<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeychainSecretPrompt")
            .field("backend", &self.backend)
            .field("inner", &self.inner)
            .finish()
    }
}

impl<P: SecretPrompt> SecretPrompt for KeychainSecretPrompt<P> {
    fn prompt_secret(&self, name: &str) -> Option<String> {
        match resolve_secret(self.backend, name) {
            Ok(Some(value)) => return Some(value),
            Ok(None) => {}
            Err(error) => warn!(placeholder = name, error = %error, "secret backend lookup failed"),
        }
        self.inner.prompt_secret(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(&'static str);

    impl SecretPrompt for Fixed {
        fn prompt_secret(&self, _name: &str) -> Option<String> {
            Some(self.0.to_string())
        }
    }

    #[test]
    fn keychain_prompt_prefers_the_backend_value() {
        temp_env::with_var("SECRETS_TEST_TOKEN", Some("from-env"), || {
            let prompt = KeychainSecretPrompt::new(SecretsBackend::Environment, Fixed("typed"));
            assert_eq!(prompt.prompt_secret("SECRETS_TEST_TOKEN").as_deref(), Some("from-env"));
        });
        temp_env::with_var("SECRETS_TEST_TOKEN", None::<&str>, || {
            let prompt = KeychainSecretPrompt::new(SecretsBackend::Environment, Fixed("typed"));
            assert_eq!(prompt.prompt_secret("SECRETS_TEST_TOKEN").as_deref(), Some("typed"));
        });
    }

    #[test]
    fn non_interactive_prompt_never_answers() {
        assert!(NonInteractivePrompt.prompt_secret("ANY").is_none());
        let prompt = KeychainSecretPrompt::new(SecretsBackend::Environment, NonInteractivePrompt);
        temp_env::with_var("SECRETS_TEST_MISSING", None::<&str>, || {
            assert!(prompt.prompt_secret("SECRETS_TEST_MISSING").is_none());
        });
    }

    #[test]
    fn map_environment_looks_up_by_name() {
        let env = HashMap::from([("REGION".to_string(), "eu".to_string())]);
        assert_eq!(env.lookup("REGION").as_deref(), Some("eu"));
        assert!(env.lookup("ZONE").is_none());
    }
}
